//! Track Set
//!
//! The five parallel caption tracks of a document, plus the policy that
//! folds auto-detected voice segments into track 0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    check_track,
    spans::{Span, SpanMap, VacantInsert},
    timegrid, CoreError, CoreResult, GlobalInterval, Ms, AUTO_TRACK, TRACK_COUNT,
};

// =============================================================================
// Auto Segments
// =============================================================================

/// Voice-activity interval handed over by the segmenter (`start < end`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(Ms, Ms)", into = "(Ms, Ms)")]
pub struct AutoSegment {
    pub start_ms: Ms,
    pub end_ms: Ms,
}

impl AutoSegment {
    /// Creates a segment, rejecting empty or inverted intervals
    pub fn new(start_ms: Ms, end_ms: Ms) -> CoreResult<Self> {
        if end_ms <= start_ms {
            return Err(CoreError::InvalidSpan {
                start_ms,
                duration_ms: end_ms.saturating_sub(start_ms),
            });
        }
        Ok(Self { start_ms, end_ms })
    }

    /// Whether `ms` falls inside the segment
    pub fn contains(&self, ms: Ms) -> bool {
        self.start_ms <= ms && ms < self.end_ms
    }
}

impl From<(Ms, Ms)> for AutoSegment {
    fn from((start_ms, end_ms): (Ms, Ms)) -> Self {
        Self { start_ms, end_ms }
    }
}

impl From<AutoSegment> for (Ms, Ms) {
    fn from(segment: AutoSegment) -> Self {
        (segment.start_ms, segment.end_ms)
    }
}

/// How detected voice segments populate track 0
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPreset {
    /// Text placed in every detected segment (may be empty)
    #[serde(default)]
    pub text: String,
    /// One merged span per segment instead of one span per grid cell
    #[serde(default = "default_true")]
    pub merge_as_single_span: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AutoPreset {
    fn default() -> Self {
        Self {
            text: String::new(),
            merge_as_single_span: true,
        }
    }
}

// =============================================================================
// Cell Query
// =============================================================================

/// What a grid cell shows at a given offset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell<'a> {
    /// A caption span covers the offset
    Caption { start_ms: Ms, span: &'a Span },
    /// A detected voice segment covers the offset but carries no text
    Occupied,
    /// No caption yet
    Empty,
}

impl Cell<'_> {
    /// Whether the cell is rendered as occupied (with or without text)
    pub fn is_occupied(&self) -> bool {
        !matches!(self, Cell::Empty)
    }

    /// Caption text, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Cell::Caption { span, .. } => Some(span.text.as_str()),
            _ => None,
        }
    }
}

/// Outcome of merging externally sourced entries into a track
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Entries stored
    pub inserted: usize,
    /// Entries skipped because their start offset was already taken
    pub key_taken: usize,
    /// Entries skipped because they would overlap an existing span
    pub overlapping: usize,
    /// Entries skipped for a zero duration or empty text
    pub invalid: usize,
}

// =============================================================================
// Track Set
// =============================================================================

/// Exactly five span maps; index 0 holds auto-detected voice activity
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSet {
    tracks: [SpanMap; TRACK_COUNT],
}

impl TrackSet {
    /// Creates a track set with every track in the "no caption" state
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows one track
    pub fn track(&self, index: usize) -> CoreResult<&SpanMap> {
        Ok(&self.tracks[check_track(index)?])
    }

    /// Mutably borrows one track
    pub fn track_mut(&mut self, index: usize) -> CoreResult<&mut SpanMap> {
        Ok(&mut self.tracks[check_track(index)?])
    }

    /// Iterates `(index, track)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SpanMap)> + '_ {
        self.tracks.iter().enumerate()
    }

    /// Exclusive end of the last span across all tracks
    pub fn end_ms(&self) -> Ms {
        self.tracks.iter().map(SpanMap::end_ms).max().unwrap_or(0)
    }

    /// Folds detected segments into track 0 under `preset`.
    ///
    /// Merge mode stores one span per segment. Cell mode stores one
    /// interval-sized span per grid cell from the segment's start row up to
    /// (not including) its end row. An empty preset text records nothing;
    /// the segments alone mark the cells as occupied.
    pub fn apply_auto_segments(
        &mut self,
        segments: &[AutoSegment],
        preset: &AutoPreset,
        interval: GlobalInterval,
    ) -> CoreResult<()> {
        if preset.text.is_empty() {
            return Ok(());
        }
        let track = &mut self.tracks[AUTO_TRACK];

        for segment in segments {
            if preset.merge_as_single_span {
                track.merge(segment.start_ms, segment.end_ms, &preset.text)?;
                continue;
            }

            let first_row = timegrid::row_for_offset(segment.start_ms, interval);
            let end_row = timegrid::row_for_offset(segment.end_ms, interval);
            if end_row <= first_row {
                continue;
            }
            track.clear_rows(first_row, end_row - 1, interval);
            for row in first_row..end_row {
                track.put(
                    timegrid::offset_for_row(row, interval),
                    interval.ms(),
                    &preset.text,
                )?;
            }
        }

        tracing::debug!(
            segments = segments.len(),
            merged = preset.merge_as_single_span,
            interval_ms = interval.ms(),
            "applied auto segments"
        );
        Ok(())
    }

    /// Cell contents at `ms` on `index`, including the occupied-but-textless
    /// state of detected segments on track 0
    pub fn query<'a>(
        &'a self,
        index: usize,
        ms: Ms,
        segments: &[AutoSegment],
    ) -> CoreResult<Cell<'a>> {
        let track = self.track(index)?;
        if let Some((start_ms, span)) = track.query(ms) {
            return Ok(Cell::Caption { start_ms, span });
        }
        if index == AUTO_TRACK && segments.iter().any(|s| s.contains(ms)) {
            return Ok(Cell::Occupied);
        }
        Ok(Cell::Empty)
    }

    /// Writes the cell at `row` spanning `row_span` rows; empty text clears it
    pub fn edit_cell(
        &mut self,
        index: usize,
        row: u64,
        row_span: u64,
        text: &str,
        interval: GlobalInterval,
    ) -> CoreResult<()> {
        let track = self.track_mut(index)?;
        let start = timegrid::offset_for_row(row, interval);
        track.put(start, row_span.max(1).saturating_mul(interval.ms()), text)
    }

    /// Merges rows `first_row..=last_row` into one span carrying the text of
    /// the first row
    pub fn merge_rows(
        &mut self,
        index: usize,
        first_row: u64,
        last_row: u64,
        interval: GlobalInterval,
    ) -> CoreResult<()> {
        let track = self.track_mut(index)?;
        let start = timegrid::offset_for_row(first_row, interval);
        let end = timegrid::offset_for_row(last_row.saturating_add(1), interval);
        let text = track
            .query(start)
            .map(|(_, span)| span.text.clone())
            .unwrap_or_default();
        track.merge(start, end, &text)
    }

    /// Splits merged spans in rows `first_row..=last_row` back into cells
    pub fn split_rows(
        &mut self,
        index: usize,
        first_row: u64,
        last_row: u64,
        interval: GlobalInterval,
    ) -> CoreResult<()> {
        let track = self.track_mut(index)?;
        let start = timegrid::offset_for_row(first_row, interval);
        let end = timegrid::offset_for_row(last_row.saturating_add(1), interval);
        track.split(start, end, interval)
    }

    /// Moves one track by `rows` grid rows (negative is earlier).
    /// Returns the number of spans dropped before zero.
    pub fn shift_track(
        &mut self,
        index: usize,
        rows: i64,
        interval: GlobalInterval,
    ) -> CoreResult<usize> {
        let delta = rows
            .checked_mul(interval.ms() as i64)
            .ok_or_else(|| CoreError::Internal(format!("shift of {rows} rows overflows")))?;
        let dropped = self.track_mut(index)?.shift(delta);
        if dropped > 0 {
            tracing::debug!(track = index, dropped, "spans shifted before zero were dropped");
        }
        Ok(dropped)
    }

    /// Returns one track to the "no caption" state
    pub fn clear_track(&mut self, index: usize) -> CoreResult<()> {
        self.track_mut(index)?.clear();
        Ok(())
    }

    /// Merges already-parsed entries into a track without overwriting:
    /// an occupied start offset or an overlapping span keeps what is there.
    pub fn merge_external(
        &mut self,
        index: usize,
        entries: BTreeMap<Ms, Span>,
    ) -> CoreResult<MergeReport> {
        let track = self.track_mut(index)?;
        let mut report = MergeReport::default();

        for (start, span) in entries {
            match track.insert_if_vacant(start, span) {
                VacantInsert::Inserted => report.inserted += 1,
                VacantInsert::KeyTaken => report.key_taken += 1,
                VacantInsert::Overlaps => report.overlapping += 1,
                VacantInsert::Invalid => report.invalid += 1,
            }
        }

        tracing::debug!(
            track = index,
            inserted = report.inserted,
            key_taken = report.key_taken,
            overlapping = report.overlapping,
            invalid = report.invalid,
            "merged external entries"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spans::is_non_overlapping;

    fn iv(ms: Ms) -> GlobalInterval {
        GlobalInterval::new(ms).unwrap()
    }

    fn seg(start: Ms, end: Ms) -> AutoSegment {
        AutoSegment::new(start, end).unwrap()
    }

    fn keys(map: &SpanMap) -> Vec<(Ms, Ms)> {
        map.iter().map(|(k, s)| (k, s.duration_ms)).collect()
    }

    // -------------------------------------------------------------------------
    // Auto segments
    // -------------------------------------------------------------------------

    #[test]
    fn test_auto_segment_validation() {
        assert!(AutoSegment::new(100, 100).is_err());
        assert!(AutoSegment::new(200, 100).is_err());
        assert!(seg(100, 200).contains(100));
        assert!(!seg(100, 200).contains(200));
    }

    #[test]
    fn test_apply_auto_segments_merged() {
        let mut tracks = TrackSet::new();
        let preset = AutoPreset {
            text: "voice".to_string(),
            merge_as_single_span: true,
        };
        tracks
            .apply_auto_segments(&[seg(120, 480), seg(1_000, 1_500)], &preset, iv(100))
            .unwrap();

        let track = tracks.track(AUTO_TRACK).unwrap();
        assert_eq!(keys(track), vec![(120, 360), (1_000, 500)]);
        assert!(tracks.track(1).unwrap().is_empty());
    }

    #[test]
    fn test_apply_auto_segments_per_cell() {
        let mut tracks = TrackSet::new();
        let preset = AutoPreset {
            text: "voice".to_string(),
            merge_as_single_span: false,
        };
        tracks
            .apply_auto_segments(&[seg(120, 480)], &preset, iv(100))
            .unwrap();

        let track = tracks.track(AUTO_TRACK).unwrap();
        assert_eq!(keys(track), vec![(100, 100), (200, 100), (300, 100)]);
    }

    #[test]
    fn test_apply_auto_segments_twice_is_stable() {
        let mut tracks = TrackSet::new();
        let preset = AutoPreset {
            text: "v".to_string(),
            merge_as_single_span: false,
        };
        let segments = [seg(0, 400), seg(400, 800)];
        tracks.apply_auto_segments(&segments, &preset, iv(100)).unwrap();
        let first = tracks.clone();
        tracks.apply_auto_segments(&segments, &preset, iv(100)).unwrap();
        assert_eq!(tracks, first);
    }

    #[test]
    fn test_empty_preset_text_marks_occupied_only() {
        let mut tracks = TrackSet::new();
        let segments = [seg(0, 400)];
        tracks
            .apply_auto_segments(&segments, &AutoPreset::default(), iv(100))
            .unwrap();

        assert!(tracks.track(AUTO_TRACK).unwrap().is_empty());
        let cell = tracks.query(AUTO_TRACK, 200, &segments).unwrap();
        assert_eq!(cell, Cell::Occupied);
        assert!(cell.is_occupied());
        assert!(cell.text().is_none());
        assert_eq!(tracks.query(AUTO_TRACK, 500, &segments).unwrap(), Cell::Empty);
        // Segments only mark the auto track
        assert_eq!(tracks.query(1, 200, &segments).unwrap(), Cell::Empty);
    }

    // -------------------------------------------------------------------------
    // Editing
    // -------------------------------------------------------------------------

    #[test]
    fn test_edit_cell_and_query() {
        let mut tracks = TrackSet::new();
        tracks.edit_cell(2, 3, 2, "hi", iv(100)).unwrap();

        match tracks.query(2, 450, &[]).unwrap() {
            Cell::Caption { start_ms, span } => {
                assert_eq!(start_ms, 300);
                assert_eq!(span.duration_ms, 200);
                assert_eq!(span.text, "hi");
            }
            other => panic!("unexpected cell {other:?}"),
        }

        tracks.edit_cell(2, 3, 2, "", iv(100)).unwrap();
        assert!(tracks.track(2).unwrap().is_empty());
    }

    #[test]
    fn test_track_index_out_of_range() {
        let mut tracks = TrackSet::new();
        assert!(matches!(
            tracks.edit_cell(5, 0, 1, "x", iv(100)),
            Err(CoreError::TrackOutOfRange(5))
        ));
        assert!(tracks.track(7).is_err());
    }

    #[test]
    fn test_merge_and_split_rows() {
        let mut tracks = TrackSet::new();
        let interval = iv(200);
        tracks.edit_cell(1, 0, 1, "first", interval).unwrap();
        tracks.merge_rows(1, 0, 2, interval).unwrap();
        assert_eq!(keys(tracks.track(1).unwrap()), vec![(0, 600)]);

        tracks.split_rows(1, 0, 2, interval).unwrap();
        let track = tracks.track(1).unwrap();
        assert_eq!(keys(track), vec![(0, 200), (200, 200), (400, 200)]);
        assert!(track.iter().all(|(_, s)| s.text == "first"));
    }

    #[test]
    fn test_shift_track_by_rows() {
        let mut tracks = TrackSet::new();
        let interval = iv(100);
        tracks.edit_cell(3, 0, 1, "a", interval).unwrap();
        tracks.edit_cell(3, 5, 1, "b", interval).unwrap();

        assert_eq!(tracks.shift_track(3, -1, interval).unwrap(), 1);
        assert_eq!(keys(tracks.track(3).unwrap()), vec![(400, 100)]);
        assert_eq!(tracks.shift_track(3, 2, interval).unwrap(), 0);
        assert_eq!(keys(tracks.track(3).unwrap()), vec![(600, 100)]);
    }

    #[test]
    fn test_clear_track() {
        let mut tracks = TrackSet::new();
        tracks.edit_cell(4, 0, 1, "a", iv(100)).unwrap();
        tracks.clear_track(4).unwrap();
        assert!(tracks.track(4).unwrap().is_empty());
    }

    #[test]
    fn test_merge_external_first_writer_wins() {
        let mut tracks = TrackSet::new();
        tracks.track_mut(1).unwrap().put(1_000, 500, "A").unwrap();

        let mut incoming = BTreeMap::new();
        incoming.insert(1_000, Span::new(500, "B"));
        incoming.insert(1_200, Span::new(100, "C"));
        incoming.insert(2_000, Span::new(300, "D"));
        incoming.insert(3_000, Span::new(0, "E"));
        incoming.insert(4_000, Span::new(100, ""));

        let report = tracks.merge_external(1, incoming).unwrap();
        assert_eq!(
            report,
            MergeReport {
                inserted: 1,
                key_taken: 1,
                overlapping: 1,
                invalid: 2,
            }
        );
        let track = tracks.track(1).unwrap();
        assert_eq!(track.get(1_000).unwrap().text, "A");
        assert_eq!(track.get(2_000).unwrap().text, "D");
        assert!(is_non_overlapping(track));
    }

    #[test]
    fn test_end_ms_across_tracks() {
        let mut tracks = TrackSet::new();
        tracks.edit_cell(0, 1, 1, "a", iv(100)).unwrap();
        tracks.edit_cell(4, 30, 2, "b", iv(100)).unwrap();
        assert_eq!(tracks.end_ms(), 3_200);
    }
}
