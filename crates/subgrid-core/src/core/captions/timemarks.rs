//! Voice Timeline Export
//!
//! Writes detected voice segments as a bare cue file, after short segments
//! are dropped and segments separated by short gaps are joined. Timestamps
//! are either relative to the window start or absolute, plus an offset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::formats::{format_cue, format_unnumbered_cue};
use crate::core::{fs, tracks::AutoSegment, CoreError, CoreResult, Ms};

/// Default threshold for both dropping and joining, in milliseconds
pub const DEFAULT_TIME_MARK_THRESHOLD_MS: Ms = 100;

/// Which rule applies first when a segment is both short and close to a
/// neighbour
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergePriority {
    /// Join close segments, then drop joined groups that are still short
    #[default]
    Merge,
    /// Drop short segments, then join what is left
    Ignore,
}

/// How output timestamps are anchored
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimingMode {
    /// The window start is written as zero
    #[default]
    Relative,
    /// Media time is written unchanged
    Absolute,
}

/// Knobs for a voice timeline export
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeMarkOptions {
    #[serde(default)]
    pub timing: TimingMode,

    /// Added to every output timestamp
    #[serde(default)]
    pub offset_ms: Ms,

    /// Segments this long or shorter are dropped (0 keeps everything)
    #[serde(default = "default_threshold")]
    pub max_ignore_ms: Ms,

    /// Segments separated by a gap this long or shorter are joined
    /// (0 joins nothing)
    #[serde(default = "default_threshold")]
    pub max_merge_ms: Ms,

    #[serde(default)]
    pub priority: MergePriority,

    /// Also write a copy without cue numbers
    #[serde(default)]
    pub unnumbered_copy: bool,
}

fn default_threshold() -> Ms {
    DEFAULT_TIME_MARK_THRESHOLD_MS
}

impl Default for TimeMarkOptions {
    fn default() -> Self {
        Self {
            timing: TimingMode::default(),
            offset_ms: 0,
            max_ignore_ms: DEFAULT_TIME_MARK_THRESHOLD_MS,
            max_merge_ms: DEFAULT_TIME_MARK_THRESHOLD_MS,
            priority: MergePriority::default(),
            unnumbered_copy: false,
        }
    }
}

/// One output interval, already in output time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeMark {
    pub start_ms: Ms,
    pub end_ms: Ms,
}

/// Outcome of writing a voice timeline
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeMarkReport {
    pub marks: usize,
    /// Path of the unnumbered copy, when one was written
    pub unnumbered_path: Option<PathBuf>,
}

/// Clips `segments` to `[window_start_ms, window_end_ms)`, applies the drop
/// and join rules and converts the result to output time
pub fn time_marks(
    segments: &[AutoSegment],
    window_start_ms: Ms,
    window_end_ms: Ms,
    options: &TimeMarkOptions,
) -> Vec<TimeMark> {
    let mut clipped: Vec<(Ms, Ms)> = segments
        .iter()
        .filter_map(|segment| {
            let start = segment.start_ms.max(window_start_ms);
            let end = segment.end_ms.min(window_end_ms);
            (start < end).then_some((start, end))
        })
        .collect();
    clipped.sort_unstable();

    let kept = match options.priority {
        MergePriority::Merge => drop_short(join_gaps(clipped, options.max_merge_ms), options.max_ignore_ms),
        MergePriority::Ignore => join_gaps(drop_short(clipped, options.max_ignore_ms), options.max_merge_ms),
    };

    let base = match options.timing {
        TimingMode::Relative => window_start_ms,
        TimingMode::Absolute => 0,
    };
    kept.into_iter()
        .map(|(start, end)| TimeMark {
            start_ms: (start - base).saturating_add(options.offset_ms),
            end_ms: (end - base).saturating_add(options.offset_ms),
        })
        .collect()
}

fn drop_short(marks: Vec<(Ms, Ms)>, max_ignore_ms: Ms) -> Vec<(Ms, Ms)> {
    if max_ignore_ms == 0 {
        return marks;
    }
    marks
        .into_iter()
        .filter(|(start, end)| end - start > max_ignore_ms)
        .collect()
}

/// Overlapping segments are always joined; gaps only when `max_merge_ms > 0`
fn join_gaps(marks: Vec<(Ms, Ms)>, max_merge_ms: Ms) -> Vec<(Ms, Ms)> {
    let mut joined: Vec<(Ms, Ms)> = Vec::with_capacity(marks.len());
    for (start, end) in marks {
        if let Some(last) = joined.last_mut() {
            let close = start < last.1 || (max_merge_ms > 0 && start - last.1 <= max_merge_ms);
            if close {
                last.1 = last.1.max(end);
                continue;
            }
        }
        joined.push((start, end));
    }
    joined
}

/// Renders marks as cue records carrying `text`, numbered from 1 or bare
pub fn render_time_marks(marks: &[TimeMark], text: &str, numbered: bool) -> String {
    marks
        .iter()
        .enumerate()
        .map(|(i, mark)| {
            if numbered {
                format_cue(i + 1, mark.start_ms, mark.end_ms, text)
            } else {
                format_unnumbered_cue(mark.start_ms, mark.end_ms, text)
            }
        })
        .collect()
}

/// `dir/name.srt` -> `dir/name.unnumbered.srt`
pub fn unnumbered_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "timeline".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}.unnumbered.{}", ext.to_string_lossy()),
        None => format!("{stem}.unnumbered"),
    };
    path.with_file_name(name)
}

/// Writes the voice timeline of `segments` to `path`, plus the unnumbered
/// copy when `options.unnumbered_copy` is set.
///
/// Fails with `NothingToExport` when no segment was ever detected.
pub fn export_time_marks(
    segments: &[AutoSegment],
    window_start_ms: Ms,
    window_end_ms: Ms,
    text: &str,
    options: &TimeMarkOptions,
    path: &Path,
    atomic: bool,
) -> CoreResult<TimeMarkReport> {
    if segments.is_empty() {
        return Err(CoreError::NothingToExport(
            "no voice segments have been detected".to_string(),
        ));
    }

    let marks = time_marks(segments, window_start_ms, window_end_ms, options);
    write_output(path, &render_time_marks(&marks, text, true), atomic)?;

    let unnumbered = if options.unnumbered_copy {
        let copy = unnumbered_path(path);
        write_output(&copy, &render_time_marks(&marks, text, false), atomic)?;
        Some(copy)
    } else {
        None
    };

    tracing::info!(
        path = %path.display(),
        marks = marks.len(),
        dropped_or_joined = segments.len().saturating_sub(marks.len()),
        unnumbered = unnumbered.is_some(),
        "voice timeline exported"
    );
    Ok(TimeMarkReport {
        marks: marks.len(),
        unnumbered_path: unnumbered,
    })
}

fn write_output(path: &Path, content: &str, atomic: bool) -> CoreResult<()> {
    if atomic {
        return fs::atomic_write_bytes(path, content.as_bytes());
    }
    fs::prepare_output_path(path)?;
    std::fs::write(path, content)?;
    Ok(())
}
