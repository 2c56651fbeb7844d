//! Regrid Module
//!
//! Re-expresses a track set on a new display interval.
//!
//! Span start/duration values are never rewritten: they stay at millisecond
//! precision. What changes is the derived row layout used for rendering and
//! the interval-driven spans on track 0, which are recomputed from the
//! auto-detected segments at the new granularity.

mod worker;

pub use worker::*;

use serde::Serialize;

use crate::core::{
    timegrid,
    tracks::{AutoPreset, AutoSegment, TrackSet},
    CoreResult, GlobalInterval, Ms, AUTO_TRACK, TRACK_COUNT,
};

// =============================================================================
// Layout Types
// =============================================================================

/// One span as drawn on the grid
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSpan {
    /// First row covered
    pub row: u64,
    /// Rows covered, rounded up
    pub row_span: u64,
    /// Underlying start offset
    pub start_ms: Ms,
    /// Underlying duration
    pub duration_ms: Ms,
    /// Caption text
    pub text: String,
}

impl RowSpan {
    /// Exclusive last row
    pub fn end_row(&self) -> u64 {
        self.row.saturating_add(self.row_span)
    }
}

/// Row layout of every track for one interval
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    /// Interval the rows were computed for
    pub interval_ms: Ms,
    /// Number of rows in the grid
    pub row_count: u64,
    /// Drawn spans per track, ascending by row
    pub tracks: [Vec<RowSpan>; TRACK_COUNT],
}

impl GridLayout {
    /// Computes the layout of `tracks` on `interval`, growing `duration_ms`
    /// when a span's rounded-up rows would run past it.
    ///
    /// Returns the layout and the (possibly grown) duration.
    pub fn compute(tracks: &TrackSet, interval: GlobalInterval, duration_ms: Ms) -> (Self, Ms) {
        let mut layout = GridLayout {
            interval_ms: interval.ms(),
            ..GridLayout::default()
        };
        let mut required = duration_ms;

        for (index, track) in tracks.iter() {
            layout.tracks[index] = track
                .iter()
                .map(|(start_ms, span)| {
                    let row = timegrid::row_for_offset(start_ms, interval);
                    let row_span = timegrid::rows_spanned(span.duration_ms, interval).max(1);
                    RowSpan {
                        row,
                        row_span,
                        start_ms,
                        duration_ms: span.duration_ms,
                        text: span.text.clone(),
                    }
                })
                .collect();

            if let Some(last) = layout.tracks[index].iter().map(RowSpan::end_row).max() {
                required = required.max(timegrid::offset_for_row(last, interval));
            }
        }

        layout.row_count = timegrid::row_count(required, interval);
        (layout, required)
    }

    /// Drawn span covering `row` on `track`
    pub fn span_at(&self, track: usize, row: u64) -> Option<&RowSpan> {
        self.tracks
            .get(track)?
            .iter()
            .find(|span| span.row <= row && row < span.end_row())
    }
}

// =============================================================================
// Regrid
// =============================================================================

/// Inputs of one regrid computation
#[derive(Clone, Debug)]
pub struct RegridRequest {
    /// Current tracks (consumed; the caller keeps its own copy)
    pub tracks: TrackSet,
    /// Interval the tracks are currently laid out on
    pub old_interval: GlobalInterval,
    /// Interval to lay them out on
    pub new_interval: GlobalInterval,
    /// Current total duration
    pub duration_ms: Ms,
    /// Detected voice segments feeding track 0
    pub auto_segments: Vec<AutoSegment>,
    /// Policy for folding the segments
    pub preset: AutoPreset,
}

/// Result of a regrid computation
#[derive(Clone, Debug)]
pub struct RegridOutcome {
    /// Tracks with track 0 re-derived on the new interval
    pub tracks: TrackSet,
    /// The new interval
    pub interval: GlobalInterval,
    /// Total duration, grown if spans run past the old one
    pub duration_ms: Ms,
    /// Row layout on the new interval
    pub layout: GridLayout,
}

/// Recomputes `request` on its new interval.
///
/// `checkpoint` is polled between units of work; an error from it aborts
/// the computation and is returned unchanged.
pub fn regrid(
    request: RegridRequest,
    checkpoint: &dyn Fn() -> CoreResult<()>,
) -> CoreResult<RegridOutcome> {
    let RegridRequest {
        mut tracks,
        old_interval,
        new_interval,
        duration_ms,
        auto_segments,
        preset,
    } = request;

    if !preset.text.is_empty() {
        let auto = tracks.track_mut(AUTO_TRACK)?;
        for segment in &auto_segments {
            checkpoint()?;
            if preset.merge_as_single_span {
                auto.clear_range(segment.start_ms, segment.end_ms);
            } else {
                let first_row = timegrid::row_for_offset(segment.start_ms, old_interval);
                let end_row = timegrid::row_for_offset(segment.end_ms, old_interval);
                if end_row > first_row {
                    auto.clear_rows(first_row, end_row - 1, old_interval);
                }
            }
        }
        checkpoint()?;
        tracks.apply_auto_segments(&auto_segments, &preset, new_interval)?;
    }

    checkpoint()?;
    let (layout, duration_ms) = GridLayout::compute(&tracks, new_interval, duration_ms);
    checkpoint()?;

    tracing::info!(
        old_interval_ms = old_interval.ms(),
        new_interval_ms = new_interval.ms(),
        rows = layout.row_count,
        duration_ms,
        "regrid computed"
    );

    Ok(RegridOutcome {
        tracks,
        interval: new_interval,
        duration_ms,
        layout,
    })
}
