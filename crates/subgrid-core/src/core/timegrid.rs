//! Time Grid Utilities
//!
//! Conversions between millisecond offsets, caption timestamps and grid rows.
//! All arithmetic is integer milliseconds with truncating division.

use super::{GlobalInterval, Ms, ParseError};

/// Decimal separator between seconds and milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecimalSeparator {
    /// `,` as used by cue (SRT) files
    Comma,
    /// `.` as used by WebVTT / auto-caption files
    Dot,
}

impl DecimalSeparator {
    fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Dot => '.',
        }
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Formats an offset as `HH:MM:SS,mmm`.
///
/// Milliseconds keep two significant digits (10 ms resolution) and are
/// padded back to three.
pub fn ms_to_timestamp(ms: Ms) -> String {
    format_timestamp(ms, DecimalSeparator::Comma)
}

/// Formats an offset as `HH:MM:SS.mmm` with the same 10 ms resolution.
pub fn ms_to_vtt_timestamp(ms: Ms) -> String {
    format_timestamp(ms, DecimalSeparator::Dot)
}

/// Formats an offset with an explicit decimal separator
pub fn format_timestamp(ms: Ms, sep: DecimalSeparator) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let centis = (ms % 1_000) / 10;

    format!(
        "{:02}:{:02}:{:02}{}{:02}0",
        hours,
        minutes,
        seconds,
        sep.as_char(),
        centis
    )
}

/// Parses `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or the short `M:S.mmm` form.
///
/// The fractional part is read as a decimal fraction (`5.4` is 5400 ms) and
/// digits beyond milliseconds are truncated. A full-width colon is accepted
/// in place of `:`.
pub fn timestamp_to_ms(input: &str) -> Result<Ms, ParseError> {
    let normalized = input.trim().replace('：', ":").replace(',', ".");
    let invalid = || ParseError::InvalidTimestamp(input.trim().to_string());

    let parts: Vec<&str> = normalized.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (parse_field(h).ok_or_else(invalid)?, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return Err(invalid()),
    };
    let minutes = parse_field(minutes).ok_or_else(invalid)?;

    let (whole, frac) = match seconds.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (seconds, None),
    };
    let seconds = parse_field(whole).ok_or_else(invalid)?;

    let millis = match frac {
        Some(frac) => {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let mut digits: String = frac.chars().take(3).collect();
            while digits.len() < 3 {
                digits.push('0');
            }
            digits.parse::<Ms>().map_err(|_| invalid())?
        }
        None => 0,
    };

    hours
        .checked_mul(3_600_000)
        .and_then(|h| h.checked_add(minutes.checked_mul(60_000)?))
        .and_then(|t| t.checked_add(seconds.checked_mul(1_000)?))
        .and_then(|t| t.checked_add(millis))
        .ok_or_else(invalid)
}

fn parse_field(field: &str) -> Option<Ms> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

// =============================================================================
// Grid Rows
// =============================================================================

/// Row containing `ms` on a grid of `interval`
pub fn row_for_offset(ms: Ms, interval: GlobalInterval) -> u64 {
    ms / interval.ms()
}

/// Start offset of `row`, saturating at `Ms::MAX`
pub fn offset_for_row(row: u64, interval: GlobalInterval) -> Ms {
    row.saturating_mul(interval.ms())
}

/// Number of rows needed to display `duration_ms`
pub fn row_count(duration_ms: Ms, interval: GlobalInterval) -> u64 {
    duration_ms / interval.ms() + 1
}

/// Rows covered by a span of `duration_ms`, rounded up
pub fn rows_spanned(duration_ms: Ms, interval: GlobalInterval) -> u64 {
    duration_ms.div_ceil(interval.ms())
}

/// Vertical header label for `row`: `M:SS.cc`
pub fn row_label(row: u64, interval: GlobalInterval) -> String {
    let ms = offset_for_row(row, interval);
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let centis = (ms % 1_000) / 10;
    format!("{minutes}:{seconds:02}.{centis:02}")
}

/// Vertical header labels for the first `count` rows
pub fn row_labels(count: u64, interval: GlobalInterval) -> Vec<String> {
    (0..count).map(|row| row_label(row, interval)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(ms: Ms) -> GlobalInterval {
        GlobalInterval::new(ms).unwrap()
    }

    // -------------------------------------------------------------------------
    // Formatting
    // -------------------------------------------------------------------------

    #[test]
    fn test_ms_to_timestamp() {
        assert_eq!(ms_to_timestamp(0), "00:00:00,000");
        assert_eq!(ms_to_timestamp(5_400), "00:00:05,400");
        assert_eq!(ms_to_timestamp(3_661_004), "01:01:01,000");
        assert_eq!(ms_to_timestamp(3_661_999), "01:01:01,990");
        assert_eq!(ms_to_timestamp(90_000), "00:01:30,000");
    }

    #[test]
    fn test_ms_to_vtt_timestamp() {
        assert_eq!(ms_to_vtt_timestamp(1_520), "00:00:01.520");
        assert_eq!(ms_to_vtt_timestamp(3_661_004), "01:01:01.000");
    }

    // -------------------------------------------------------------------------
    // Parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_timestamp_to_ms_long_forms() {
        assert_eq!(timestamp_to_ms("01:01:01,000").unwrap(), 3_661_000);
        assert_eq!(timestamp_to_ms("00:00:01.280").unwrap(), 1_280);
        assert_eq!(timestamp_to_ms("00:01:30").unwrap(), 90_000);
        assert_eq!(timestamp_to_ms(" 00:00:02,5 ").unwrap(), 2_500);
        assert_eq!(timestamp_to_ms("00:00:02.12345").unwrap(), 2_123);
    }

    #[test]
    fn test_timestamp_to_ms_short_form() {
        assert_eq!(timestamp_to_ms("1:05.250").unwrap(), 65_250);
        assert_eq!(timestamp_to_ms("0:00.0").unwrap(), 0);
        assert_eq!(timestamp_to_ms("2:03").unwrap(), 123_000);
    }

    #[test]
    fn test_timestamp_to_ms_full_width_colon() {
        assert_eq!(timestamp_to_ms("00：00：03,000").unwrap(), 3_000);
    }

    #[test]
    fn test_timestamp_to_ms_rejects_malformed() {
        for bad in ["", "abc", "00-00-01,000", "00:xx:01,000", "1:2:3:4", "00:00:01,", "00:00:01,5a"] {
            assert!(
                matches!(timestamp_to_ms(bad), Err(ParseError::InvalidTimestamp(_))),
                "expected failure for {bad:?}"
            );
        }
    }

    #[test]
    fn test_format_parse_roundtrip_at_10ms_resolution() {
        for ms in [0, 10, 990, 61_230, 3_599_990, 36_000_000] {
            assert_eq!(timestamp_to_ms(&ms_to_timestamp(ms)).unwrap(), ms);
        }
    }

    // -------------------------------------------------------------------------
    // Rows
    // -------------------------------------------------------------------------

    #[test]
    fn test_row_for_offset_floors() {
        assert_eq!(row_for_offset(0, iv(100)), 0);
        assert_eq!(row_for_offset(199, iv(100)), 1);
        assert_eq!(row_for_offset(200, iv(100)), 2);
        assert_eq!(row_for_offset(1_999, iv(1000)), 1);
    }

    #[test]
    fn test_offset_for_row_saturates() {
        assert_eq!(offset_for_row(7, iv(100)), 700);
        assert_eq!(offset_for_row(u64::MAX, iv(100)), Ms::MAX);
    }

    #[test]
    fn test_row_count_and_span() {
        assert_eq!(row_count(1_000, iv(100)), 11);
        assert_eq!(row_count(0, iv(100)), 1);
        assert_eq!(rows_spanned(250, iv(100)), 3);
        assert_eq!(rows_spanned(200, iv(100)), 2);
    }

    #[test]
    fn test_row_labels() {
        assert_eq!(row_label(0, iv(100)), "0:00.00");
        assert_eq!(row_label(15, iv(100)), "0:01.50");
        assert_eq!(row_label(125, iv(500)), "1:02.50");
        assert_eq!(row_labels(3, iv(20)), vec!["0:00.00", "0:00.02", "0:00.04"]);
    }
}
