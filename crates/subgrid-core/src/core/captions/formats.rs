//! Caption Text Formats
//!
//! Line-level parsing for the two accepted input formats and cue
//! serialization for export.
//!
//! # Cue format
//!
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:04,000
//! First caption text
//!
//! ```
//!
//! # Streaming auto-caption variant
//!
//! Words carry inline timing markers inside a cue body:
//!
//! ```text
//! 00:00:03.200 --> 00:00:05.000 align:start position:0%
//! next<00:00:03.400><c> few</c><00:00:03.700><c> words</c>
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::core::{timegrid, Ms, ParseError};

/// Separator between the start and end timestamps of a cue
pub const TIMING_ARROW: &str = "-->";

fn cached(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex, ParseError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| ParseError::InvalidFormat(format!("pattern {pattern}: {e}")))
}

fn inline_timestamp_re() -> Result<&'static Regex, ParseError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(&RE, r"<((?:\d+:)?\d{1,2}:\d{1,2}[.,]\d{1,3})>")
}

fn fragment_re() -> Result<&'static Regex, ParseError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(&RE, r"<c(?:\.[^>]*)?>(.*?)</c>")
}

fn markup_re() -> Result<&'static Regex, ParseError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(&RE, r"<[^>]*>")
}

// =============================================================================
// Detection
// =============================================================================

/// Whether `line` opens an inline-timed word fragment
pub fn has_inline_fragments(line: &str) -> bool {
    line.contains("<c>") || line.contains("<c.")
}

/// Whether `content` is the streaming auto-caption variant
pub fn is_streaming_source(content: &str) -> bool {
    content.lines().any(has_inline_fragments)
}

/// Whether `line` is a cue timing line
pub fn is_timing_line(line: &str) -> bool {
    line.contains(TIMING_ARROW)
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses `start --> end [settings]` into raw millisecond offsets.
///
/// Anything after the end timestamp (cue settings such as
/// `align:start position:0%`) is ignored.
pub fn parse_timing_line(line: &str) -> Result<(Ms, Ms), ParseError> {
    let (start, rest) = line.split_once(TIMING_ARROW).ok_or_else(|| {
        ParseError::InvalidFormat(format!("Expected 'start --> end' format: {}", line.trim()))
    })?;

    let start = timegrid::timestamp_to_ms(start)?;
    let end = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::MissingData(format!("end timestamp in: {}", line.trim())))?;
    let end = timegrid::timestamp_to_ms(end)?;

    if end < start {
        return Err(ParseError::InvalidFormat(format!(
            "Cue ends before it starts: {}",
            line.trim()
        )));
    }
    Ok((start, end))
}

/// Removes inline markup (`<b>`, `<i>`, `<c>`, timing tags) and trims
pub fn strip_markup(text: &str) -> Result<String, ParseError> {
    Ok(markup_re()?.replace_all(text, "").trim().to_string())
}

/// One line of inline-timed word fragments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingLine {
    /// First inline timestamp
    pub start_ms: Ms,
    /// Last inline timestamp, when the line carries more than one
    pub end_ms: Option<Ms>,
    /// Leading word followed by every fragment, concatenated
    pub text: String,
}

/// Parses a streaming line such as
/// `next<00:00:03.400><c> few</c><00:00:03.700><c> words</c>`
pub fn parse_streaming_line(line: &str) -> Result<StreamingLine, ParseError> {
    let mut stamps = Vec::new();
    for caps in inline_timestamp_re()?.captures_iter(line) {
        stamps.push(timegrid::timestamp_to_ms(&caps[1])?);
    }
    let (Some(&start_ms), Some(&last)) = (stamps.first(), stamps.last()) else {
        return Err(ParseError::MissingData(format!(
            "inline timestamp in: {}",
            line.trim()
        )));
    };

    let leading = line.split('<').next().unwrap_or_default();
    let mut text = leading.to_string();
    for caps in fragment_re()?.captures_iter(line) {
        text.push_str(&caps[1]);
    }
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ParseError::MissingData(format!(
            "fragment text in: {}",
            line.trim()
        )));
    }

    Ok(StreamingLine {
        start_ms,
        end_ms: (stamps.len() > 1).then_some(last),
        text,
    })
}

// =============================================================================
// Serialization
// =============================================================================

/// Renders one cue record: index line, timing line, text line, blank line
pub fn format_cue(index: usize, start_ms: Ms, end_ms: Ms, text: &str) -> String {
    format!("{}\n{}", index, format_unnumbered_cue(start_ms, end_ms, text))
}

/// Cue record without the index line
pub fn format_unnumbered_cue(start_ms: Ms, end_ms: Ms, text: &str) -> String {
    format!(
        "{} {} {}\n{}\n\n",
        timegrid::ms_to_timestamp(start_ms),
        TIMING_ARROW,
        timegrid::ms_to_timestamp(end_ms),
        text
    )
}
