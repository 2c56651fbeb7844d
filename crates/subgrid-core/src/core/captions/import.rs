//! Caption Import
//!
//! Best-effort ingestion of cue files and streaming auto-caption files into
//! one track. Malformed lines are skipped; only an unreadable source fails.

use std::collections::BTreeMap;
use std::path::Path;

use super::formats::{
    has_inline_fragments, is_streaming_source, is_timing_line, parse_streaming_line,
    parse_timing_line, strip_markup,
};
use crate::core::{
    spans::{Span, SpanMap, VacantInsert},
    CoreResult, GlobalInterval, Ms, ParseError, IMPORT_SNAP_MS,
};

/// Cues this short or shorter are transition artifacts and never imported
pub const MIN_CUE_MS: Ms = 10;

/// Knobs for one import
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportOptions {
    /// Active interval, used as the duration of single-fragment streaming lines
    pub interval: GlobalInterval,
    /// Resolution imported offsets are snapped down to
    pub snap_ms: Ms,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            interval: GlobalInterval::default(),
            snap_ms: IMPORT_SNAP_MS,
        }
    }
}

/// Parsed entries ready to merge, plus what was left out
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Accepted `start -> span` entries, non-overlapping with each other and
    /// with the destination track
    pub entries: BTreeMap<Ms, Span>,
    /// Exclusive end of the last accepted entry; the grid must cover it
    pub required_duration_ms: Ms,
    /// Lines that failed to parse
    pub skipped_lines: usize,
    /// Entries whose start offset was already taken
    pub key_taken: usize,
    /// Entries that would overlap an accepted or existing span
    pub overlapping: usize,
    /// Cues dropped for being too short after parsing or snapping
    pub too_short: usize,
    /// Cues dropped for carrying no text
    pub empty: usize,
    /// Whether the source was the streaming auto-caption variant
    pub streaming: bool,
}

struct Candidate {
    line: usize,
    start_ms: Ms,
    duration_ms: Ms,
    text: String,
}

/// Parses `content` into entries for a track currently holding `existing`.
///
/// Offsets are snapped down to `options.snap_ms`. An entry never replaces a
/// key already present in `existing` or claimed earlier in the same source,
/// and never overlaps a span that is already there.
pub fn import_captions(content: &str, existing: &SpanMap, options: &ImportOptions) -> ImportResult {
    let snap = options.snap_ms.max(1);
    let streaming = is_streaming_source(content);
    let mut result = ImportResult {
        streaming,
        ..ImportResult::default()
    };

    let candidates = collect_candidates(content, streaming, options.interval, snap, &mut result);

    let mut scratch = existing.clone();
    for candidate in candidates {
        let span = Span::new(candidate.duration_ms, candidate.text);
        match scratch.insert_if_vacant(candidate.start_ms, span.clone()) {
            VacantInsert::Inserted => {
                result.required_duration_ms = result
                    .required_duration_ms
                    .max(span.end_ms(candidate.start_ms));
                result.entries.insert(candidate.start_ms, span);
            }
            VacantInsert::KeyTaken => {
                tracing::debug!(
                    line = candidate.line,
                    start_ms = candidate.start_ms,
                    "import skipped occupied offset"
                );
                result.key_taken += 1;
            }
            VacantInsert::Overlaps => {
                tracing::debug!(
                    line = candidate.line,
                    start_ms = candidate.start_ms,
                    "import skipped overlapping entry"
                );
                result.overlapping += 1;
            }
            VacantInsert::Invalid => {
                tracing::debug!(line = candidate.line, "import skipped cue without text");
                result.empty += 1;
            }
        }
    }

    tracing::info!(
        imported = result.entries.len(),
        skipped_lines = result.skipped_lines,
        key_taken = result.key_taken,
        overlapping = result.overlapping,
        too_short = result.too_short,
        streaming,
        "captions parsed"
    );
    result
}

/// Reads `path` as UTF-8 text and imports it
pub fn import_file(
    path: &Path,
    existing: &SpanMap,
    options: &ImportOptions,
) -> CoreResult<ImportResult> {
    let content = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "caption source read");
    Ok(import_captions(&content, existing, options))
}

fn collect_candidates(
    content: &str,
    streaming: bool,
    interval: GlobalInterval,
    snap: Ms,
    result: &mut ImportResult,
) -> Vec<Candidate> {
    let lines: Vec<&str> = content.lines().collect();
    let mut candidates = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if streaming && has_inline_fragments(line) {
            match parse_streaming_line(line) {
                Ok(parsed) => {
                    let start_ms = snap_down(parsed.start_ms, snap);
                    let duration_ms = match parsed.end_ms {
                        Some(end_ms) => snap_down(end_ms, snap).saturating_sub(start_ms),
                        None => interval.ms(),
                    };
                    push_candidate(&mut candidates, result, i + 1, start_ms, duration_ms, parsed.text);
                }
                Err(e) => skip_line(result, i + 1, &e),
            }
            i += 1;
            continue;
        }
        if !is_timing_line(line) {
            i += 1;
            continue;
        }

        let timing_line = i;
        let body_start = i + 1;
        let mut body_end = body_start;
        while body_end < lines.len()
            && !lines[body_end].trim().is_empty()
            && !is_timing_line(lines[body_end])
        {
            body_end += 1;
        }
        let body = &lines[body_start..body_end];

        // Fragment lines carry their own timing and are picked up one by one
        if streaming && body.iter().any(|line| has_inline_fragments(line)) {
            i = body_start;
            continue;
        }
        i = body_end;

        let line_no = timing_line + 1;
        let (start_raw, end_raw) = match parse_timing_line(lines[timing_line]) {
            Ok(timing) => timing,
            Err(e) => {
                skip_line(result, line_no, &e);
                continue;
            }
        };

        let text = match cue_text(body, streaming) {
            Ok(text) => text,
            Err(e) => {
                skip_line(result, line_no, &e);
                continue;
            }
        };
        if text.is_empty() {
            result.empty += 1;
            continue;
        }
        if end_raw - start_raw <= MIN_CUE_MS {
            result.too_short += 1;
            continue;
        }

        let start_ms = snap_down(start_raw, snap);
        let duration_ms = snap_down(end_raw, snap) - start_ms;
        push_candidate(&mut candidates, result, line_no, start_ms, duration_ms, text);
    }

    candidates
}

/// Cue body text. Streaming sources repeat the previous line above the new
/// one, so only the last line counts there.
fn cue_text(body: &[&str], streaming: bool) -> Result<String, ParseError> {
    if streaming {
        return match body.iter().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => strip_markup(line),
            None => Ok(String::new()),
        };
    }
    let mut parts = Vec::with_capacity(body.len());
    for line in body {
        let stripped = strip_markup(line)?;
        if !stripped.is_empty() {
            parts.push(stripped);
        }
    }
    Ok(parts.join("\n"))
}

fn push_candidate(
    candidates: &mut Vec<Candidate>,
    result: &mut ImportResult,
    line: usize,
    start_ms: Ms,
    duration_ms: Ms,
    text: String,
) {
    if duration_ms == 0 {
        result.too_short += 1;
        return;
    }
    candidates.push(Candidate {
        line,
        start_ms,
        duration_ms,
        text,
    });
}

fn skip_line(result: &mut ImportResult, line: usize, error: &ParseError) {
    tracing::warn!(line, error = %error, "skipping malformed caption line");
    result.skipped_lines += 1;
}

fn snap_down(ms: Ms, snap: Ms) -> Ms {
    ms / snap * snap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spans::is_non_overlapping;
    use crate::core::CoreError;
    use tempfile::TempDir;

    fn options() -> ImportOptions {
        ImportOptions::default()
    }

    fn keys(result: &ImportResult) -> Vec<(Ms, Ms, &str)> {
        result
            .entries
            .iter()
            .map(|(k, s)| (*k, s.duration_ms, s.text.as_str()))
            .collect()
    }

    const CUES: &str = "\
1
00:00:01,005 --> 00:00:02,517
First line

2
00:00:03,000 --> 00:00:04,000
<b>Second</b>
continued

3
00:00:05,000 --> 00:00:05,010
flash
";

    // -------------------------------------------------------------------------
    // Cue format
    // -------------------------------------------------------------------------

    #[test]
    fn test_import_cue_format_snaps_to_20ms() {
        let result = import_captions(CUES, &SpanMap::new(), &options());

        assert!(!result.streaming);
        assert_eq!(
            keys(&result),
            vec![(1_000, 1_500, "First line"), (3_000, 1_000, "Second\ncontinued")]
        );
        assert_eq!(result.too_short, 1);
        assert_eq!(result.skipped_lines, 0);
        assert_eq!(result.required_duration_ms, 4_000);
    }

    #[test]
    fn test_import_never_overwrites_existing_key() {
        let mut existing = SpanMap::new();
        existing.put(1_000, 500, "A").unwrap();

        let source = "1\n00:00:01,000 --> 00:00:01,500\nB\n";
        let result = import_captions(source, &existing, &options());

        assert!(result.entries.is_empty());
        assert_eq!(result.key_taken, 1);
        assert_eq!(existing.get(1_000).unwrap().text, "A");
    }

    #[test]
    fn test_import_first_writer_wins_within_source() {
        let source = "\
00:00:01,000 --> 00:00:02,000
one

00:00:01,000 --> 00:00:01,500
two

00:00:01,500 --> 00:00:03,000
three
";
        let result = import_captions(source, &SpanMap::new(), &options());
        assert_eq!(keys(&result), vec![(1_000, 1_000, "one")]);
        assert_eq!(result.key_taken, 1);
        assert_eq!(result.overlapping, 1);
        let merged: SpanMap = result.entries.clone().into_iter().collect();
        assert!(is_non_overlapping(&merged));
    }

    #[test]
    fn test_import_skips_malformed_lines() {
        let source = "\
1
00:00:xx,000 --> 00:00:02,000
broken

2
00:00:02,000 00:00:03,000
no arrow is not a timing line

3
00:00:04,000 --> 00:00:04,600
kept
";
        let result = import_captions(source, &SpanMap::new(), &options());
        assert_eq!(result.skipped_lines, 1);
        assert_eq!(keys(&result), vec![(4_000, 600, "kept")]);
    }

    #[test]
    fn test_import_counts_cues_without_text() {
        let source = "\
1
00:00:01,000 --> 00:00:02,000
<i></i>

2
00:00:03,000 --> 00:00:03,500
kept
";
        let result = import_captions(source, &SpanMap::new(), &options());
        assert_eq!(result.empty, 1);
        assert_eq!(result.overlapping, 0);
        assert_eq!(keys(&result), vec![(3_000, 500, "kept")]);
    }

    #[test]
    fn test_import_ignores_cue_settings_and_headers() {
        let source = "\
WEBVTT
Kind: captions

00:00:00.500 --> 00:00:01.300 align:start position:0%
<i>hello</i>
";
        let result = import_captions(source, &SpanMap::new(), &options());
        assert_eq!(keys(&result), vec![(500, 800, "hello")]);
    }

    // -------------------------------------------------------------------------
    // Streaming variant
    // -------------------------------------------------------------------------

    const STREAMING: &str = "\
WEBVTT
Kind: captions
Language: en

00:00:00.000 --> 00:00:02.990 align:start position:0%

good<00:00:00.480><c> morning</c><00:00:01.230><c> all</c>

00:00:02.990 --> 00:00:03.000 align:start position:0%
good morning all

00:00:03.000 --> 00:00:05.000 align:start position:0%
good morning all
so<00:00:03.333><c> yes</c>
";

    #[test]
    fn test_import_streaming_concatenates_fragments() {
        let result = import_captions(STREAMING, &SpanMap::new(), &options());

        assert!(result.streaming);
        assert_eq!(
            keys(&result),
            vec![(480, 740, "good morning all"), (3_320, 100, "so yes")]
        );
        // The 10 ms transition cue is dropped
        assert_eq!(result.too_short, 1);
        assert_eq!(result.required_duration_ms, 3_420);
    }

    #[test]
    fn test_import_streaming_single_fragment_uses_interval() {
        let opts = ImportOptions {
            interval: GlobalInterval::new(400).unwrap(),
            ..options()
        };
        let source = "00:00:03.000 --> 00:00:05.000\nso<00:00:03.333><c> yes</c>\n";
        let result = import_captions(source, &SpanMap::new(), &opts);
        assert_eq!(keys(&result), vec![(3_320, 400, "so yes")]);
    }

    // -------------------------------------------------------------------------
    // Files
    // -------------------------------------------------------------------------

    #[test]
    fn test_import_file_reads_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.srt");
        std::fs::write(&path, "1\n00:00:01,000 --> 00:00:02,000\nこんにちは\n").unwrap();

        let result = import_file(&path, &SpanMap::new(), &options()).unwrap();
        assert_eq!(keys(&result), vec![(1_000, 1_000, "こんにちは")]);
    }

    #[test]
    fn test_import_file_errors_are_io() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.srt");
        assert!(matches!(
            import_file(&missing, &SpanMap::new(), &options()),
            Err(CoreError::IoError(_))
        ));

        let binary = dir.path().join("binary.srt");
        std::fs::write(&binary, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        assert!(matches!(
            import_file(&binary, &SpanMap::new(), &options()),
            Err(CoreError::IoError(_))
        ));
    }
}
