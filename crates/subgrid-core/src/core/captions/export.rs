//! Caption Export
//!
//! Slices a time window out of one track and renders it as a renumbered
//! cue stream, shifted by an output offset.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::formats::format_cue;
use crate::core::{fs, spans::SpanMap, timegrid, CoreResult, GlobalInterval, Ms};

// =============================================================================
// Selection
// =============================================================================

/// What to export: a track, a window over span start offsets (inclusive at
/// both ends) and the offset added to every output timestamp
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSelection {
    pub track_index: usize,
    pub window_start_ms: Ms,
    pub window_end_ms: Ms,
    #[serde(default)]
    pub output_offset_ms: Ms,
}

impl ExportSelection {
    pub fn new(track_index: usize, window_start_ms: Ms, window_end_ms: Ms, output_offset_ms: Ms) -> Self {
        Self {
            track_index,
            window_start_ms,
            window_end_ms,
            output_offset_ms,
        }
    }

    /// Window covering spans that start in rows `first_row..=last_row`
    pub fn from_rows(
        track_index: usize,
        first_row: u64,
        last_row: u64,
        interval: GlobalInterval,
        output_offset_ms: Ms,
    ) -> Self {
        Self::new(
            track_index,
            timegrid::offset_for_row(first_row, interval),
            timegrid::offset_for_row(last_row, interval),
            output_offset_ms,
        )
    }
}

// =============================================================================
// Cues
// =============================================================================

/// One numbered output cue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cue<'a> {
    /// 1-based sequence number
    pub index: usize,
    /// Output start (span start plus the output offset)
    pub start_ms: Ms,
    /// Output end
    pub end_ms: Ms,
    pub text: &'a str,
}

impl Cue<'_> {
    pub fn start_timestamp(&self) -> String {
        timegrid::ms_to_timestamp(self.start_ms)
    }

    pub fn end_timestamp(&self) -> String {
        timegrid::ms_to_timestamp(self.end_ms)
    }
}

impl fmt::Display for Cue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_cue(self.index, self.start_ms, self.end_ms, self.text))
    }
}

/// Lazy cue sequence over a selection.
///
/// Ascending by start offset, skips empty text, numbers from 1. Cloning
/// before iterating gives an independent pass over the same cues.
#[derive(Clone, Debug)]
pub struct Cues<'a> {
    track: &'a SpanMap,
    selection: ExportSelection,
    cursor: Option<Ms>,
    next_index: usize,
}

impl<'a> Cues<'a> {
    /// Starts a pass over `selection` of `track`
    pub fn new(track: &'a SpanMap, selection: ExportSelection) -> Self {
        Self {
            track,
            selection,
            cursor: Some(selection.window_start_ms),
            next_index: 1,
        }
    }

    /// Rewinds to the first cue
    pub fn restart(&mut self) {
        self.cursor = Some(self.selection.window_start_ms);
        self.next_index = 1;
    }
}

impl<'a> Iterator for Cues<'a> {
    type Item = Cue<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let from = self.cursor?;
        let track = self.track;
        let found = track
            .range_inclusive(from, self.selection.window_end_ms)
            .find(|(_, span)| !span.text.is_empty());
        let Some((start, span)) = found else {
            self.cursor = None;
            return None;
        };

        self.cursor = start.checked_add(1);
        let index = self.next_index;
        self.next_index += 1;

        let start_ms = start.saturating_add(self.selection.output_offset_ms);
        Some(Cue {
            index,
            start_ms,
            end_ms: start_ms.saturating_add(span.duration_ms),
            text: span.text.as_str(),
        })
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Outcome of writing an export file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub cues: usize,
    pub bytes: usize,
}

/// Renders the whole selection as cue text
pub fn render_srt(track: &SpanMap, selection: ExportSelection) -> String {
    Cues::new(track, selection).map(|cue| cue.to_string()).collect()
}

/// Writes the selection to `path` as UTF-8 without a byte-order mark.
///
/// With `atomic` the file is rendered in memory and swapped into place, so
/// a failure leaves any previous file untouched. Otherwise cues are streamed
/// straight to the destination and a failure may leave a partial file.
pub fn export_to_file(
    track: &SpanMap,
    selection: ExportSelection,
    path: &Path,
    atomic: bool,
) -> CoreResult<ExportReport> {
    let mut report = ExportReport::default();

    if atomic {
        let mut rendered = String::new();
        for cue in Cues::new(track, selection) {
            rendered.push_str(&cue.to_string());
            report.cues += 1;
        }
        report.bytes = rendered.len();
        fs::atomic_write_bytes(path, rendered.as_bytes())?;
    } else {
        fs::prepare_output_path(path)?;
        let mut writer = BufWriter::new(File::create(path)?);
        for cue in Cues::new(track, selection) {
            let record = cue.to_string();
            writer.write_all(record.as_bytes())?;
            report.cues += 1;
            report.bytes += record.len();
        }
        writer.flush()?;
    }

    tracing::info!(
        path = %path.display(),
        track = selection.track_index,
        cues = report.cues,
        atomic,
        "captions exported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spans::Span;
    use tempfile::TempDir;

    fn sample() -> SpanMap {
        let mut map = SpanMap::new();
        map.put(0, 400, "hi").unwrap();
        map
    }

    #[test]
    fn test_export_window_with_offset() {
        // An empty-text entry can only come from pre-built maps; `put` drops it
        let map: SpanMap = [(0, Span::new(400, "hi")), (600, Span::new(200, ""))]
            .into_iter()
            .collect();
        let selection = ExportSelection::new(1, 0, 1_000, 5_000);

        let cues: Vec<Cue<'_>> = Cues::new(&map, selection).collect();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[0].start_timestamp(), "00:00:05,000");
        assert_eq!(cues[0].end_timestamp(), "00:00:05,400");
        assert_eq!(cues[0].text, "hi");
    }

    #[test]
    fn test_window_is_inclusive_and_renumbered() {
        let mut map = sample();
        map.put(1_000, 200, "a").unwrap();
        map.put(2_000, 200, "b").unwrap();
        map.put(3_000, 200, "c").unwrap();

        let selection = ExportSelection::new(2, 1_000, 2_000, 0);
        let cues: Vec<(usize, Ms, &str)> = Cues::new(&map, selection)
            .map(|c| (c.index, c.start_ms, c.text))
            .collect();
        assert_eq!(cues, vec![(1, 1_000, "a"), (2, 2_000, "b")]);
    }

    #[test]
    fn test_cues_are_restartable() {
        let mut map = sample();
        map.put(1_000, 200, "a").unwrap();
        let mut cues = Cues::new(&map, ExportSelection::new(0, 0, 5_000, 0));

        let first: Vec<String> = cues.clone().map(|c| c.to_string()).collect();
        assert_eq!(cues.by_ref().count(), 2);
        assert!(cues.next().is_none());

        cues.restart();
        let second: Vec<String> = cues.map(|c| c.to_string()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let selection = ExportSelection::new(0, 1_000, 0, 0);
        assert_eq!(Cues::new(&sample(), selection).count(), 0);
        assert_eq!(render_srt(&sample(), selection), "");
    }

    #[test]
    fn test_from_rows() {
        let iv = GlobalInterval::new(200).unwrap();
        let selection = ExportSelection::from_rows(3, 2, 5, iv, 1_000);
        assert_eq!(selection, ExportSelection::new(3, 400, 1_000, 1_000));
    }

    #[test]
    fn test_render_srt() {
        let mut map = sample();
        map.put(61_230, 770, "next").unwrap();
        let text = render_srt(&map, ExportSelection::new(0, 0, 100_000, 0));
        assert_eq!(
            text,
            "1\n00:00:00,000 --> 00:00:00,400\nhi\n\n2\n00:01:01,230 --> 00:01:02,000\nnext\n\n"
        );
    }

    #[test]
    fn test_export_to_file_atomic_and_streamed() {
        let dir = TempDir::new().unwrap();
        let selection = ExportSelection::new(0, 0, 1_000, 0);
        let expected = render_srt(&sample(), selection);

        for atomic in [true, false] {
            let path = dir.path().join(format!("out-{atomic}.srt"));
            let report = export_to_file(&sample(), selection, &path, atomic).unwrap();
            assert_eq!(report.cues, 1);
            assert_eq!(report.bytes, expected.len());

            let bytes = std::fs::read(&path).unwrap();
            assert!(!bytes.starts_with(&[0xef, 0xbb, 0xbf]));
            assert_eq!(String::from_utf8(bytes).unwrap(), expected);
        }
    }

    #[test]
    fn test_export_to_directory_fails() {
        let dir = TempDir::new().unwrap();
        let selection = ExportSelection::new(0, 0, 1_000, 0);
        for atomic in [true, false] {
            assert!(export_to_file(&sample(), selection, dir.path(), atomic).is_err());
        }
    }
}
