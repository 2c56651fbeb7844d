//! Span Map
//!
//! Per-track sparse map from start offset to `(duration, text)`.
//!
//! # Invariants
//!
//! - Keys are unique start offsets in milliseconds.
//! - For any two entries `(s1, d1)` and `(s2, d2)` with `s1 < s2`,
//!   `s2 >= s1 + d1`: spans never overlap.
//! - Durations are always positive and texts never empty; clearing a cell
//!   removes its entry instead of storing an empty span.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use serde::{Deserialize, Serialize};

use super::{timegrid, CoreError, CoreResult, GlobalInterval, Ms};

// =============================================================================
// Span
// =============================================================================

/// A caption span anchored at a start offset within one track
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Length in milliseconds (> 0)
    pub duration_ms: Ms,
    /// Caption text (never empty once stored)
    pub text: String,
    /// Finer-grained entries this span replaced when it was merged.
    /// Dropped whenever the span is rewritten.
    #[serde(skip)]
    folded: Vec<(Ms, Span)>,
}

impl Span {
    /// Creates a span
    pub fn new(duration_ms: Ms, text: impl Into<String>) -> Self {
        Self {
            duration_ms,
            text: text.into(),
            folded: Vec::new(),
        }
    }

    /// Exclusive end offset for a span anchored at `start_ms`
    pub fn end_ms(&self, start_ms: Ms) -> Ms {
        start_ms.saturating_add(self.duration_ms)
    }

    /// Whether this span still remembers the cells it was merged from
    pub fn is_merged(&self) -> bool {
        !self.folded.is_empty()
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        self.duration_ms == other.duration_ms && self.text == other.text
    }
}

/// Result of a non-overwriting insert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VacantInsert {
    /// Entry stored
    Inserted,
    /// An entry already starts at this offset
    KeyTaken,
    /// Entry would overlap an existing span
    Overlaps,
    /// Entry has a zero duration or empty text
    Invalid,
}

// =============================================================================
// Span Map
// =============================================================================

/// Sparse, non-overlapping map of caption spans for one track
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanMap {
    entries: BTreeMap<Ms, Span>,
}

impl SpanMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored spans
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no span is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates spans in ascending start order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Ms, &Span)> + '_ {
        self.entries.iter().map(|(start, span)| (*start, span))
    }

    /// Spans whose start lies in `[from_ms, to_ms]`, ascending
    pub fn range_inclusive(
        &self,
        from_ms: Ms,
        to_ms: Ms,
    ) -> impl DoubleEndedIterator<Item = (Ms, &Span)> + '_ {
        let range = if from_ms <= to_ms {
            Some(self.entries.range(from_ms..=to_ms))
        } else {
            None
        };
        range
            .into_iter()
            .flatten()
            .map(|(start, span)| (*start, span))
    }

    /// Span starting exactly at `start_ms`
    pub fn get(&self, start_ms: Ms) -> Option<&Span> {
        self.entries.get(&start_ms)
    }

    /// Whether a span starts exactly at `start_ms`
    pub fn contains_key(&self, start_ms: Ms) -> bool {
        self.entries.contains_key(&start_ms)
    }

    /// Exclusive end of the last span (0 when empty)
    pub fn end_ms(&self) -> Ms {
        self.entries
            .iter()
            .map(|(start, span)| span.end_ms(*start))
            .max()
            .unwrap_or(0)
    }

    /// Inserts or overwrites the span at `start_ms`.
    ///
    /// Empty text removes the entry instead. Fails with `InvalidSpan` for a
    /// zero duration and `SpanOverlap` if the span would overlap a neighbour.
    pub fn put(&mut self, start_ms: Ms, duration_ms: Ms, text: &str) -> CoreResult<()> {
        if duration_ms == 0 {
            return Err(CoreError::InvalidSpan {
                start_ms,
                duration_ms,
            });
        }
        if text.is_empty() {
            self.entries.remove(&start_ms);
            return Ok(());
        }
        if let Some(existing_start_ms) = self.overlapping(start_ms, duration_ms) {
            return Err(CoreError::SpanOverlap {
                start_ms,
                end_ms: start_ms.saturating_add(duration_ms),
                existing_start_ms,
            });
        }
        self.entries.insert(start_ms, Span::new(duration_ms, text));
        Ok(())
    }

    /// Stores `span` only if its key is free and it overlaps nothing
    pub fn insert_if_vacant(&mut self, start_ms: Ms, span: Span) -> VacantInsert {
        if self.entries.contains_key(&start_ms) {
            return VacantInsert::KeyTaken;
        }
        if span.duration_ms == 0 || span.text.is_empty() {
            return VacantInsert::Invalid;
        }
        if self.overlapping(start_ms, span.duration_ms).is_some() {
            return VacantInsert::Overlaps;
        }
        self.entries.insert(start_ms, span);
        VacantInsert::Inserted
    }

    /// Replaces every entry starting in `[start_ms, end_ms)` with a single
    /// `(start_ms, end_ms - start_ms, text)` span.
    ///
    /// Spans crossing either edge of the range keep their outside part as
    /// their own span. The replaced entries are remembered so [`split`]
    /// can restore them while the merged span stays unedited.
    ///
    /// [`split`]: SpanMap::split
    pub fn merge(&mut self, start_ms: Ms, end_ms: Ms, text: &str) -> CoreResult<()> {
        if end_ms <= start_ms {
            return Err(CoreError::InvalidSpan {
                start_ms,
                duration_ms: end_ms.saturating_sub(start_ms),
            });
        }

        let folded = self.carve(start_ms, end_ms);
        if !text.is_empty() {
            let mut span = Span::new(end_ms - start_ms, text);
            span.folded = folded
                .into_iter()
                .flat_map(|(start, mut cell)| {
                    if cell.is_merged() {
                        std::mem::take(&mut cell.folded)
                    } else {
                        vec![(start, cell)]
                    }
                })
                .filter(|(start, _)| *start < end_ms)
                .map(|(start, mut cell)| {
                    cell.duration_ms = cell.duration_ms.min(end_ms - start);
                    (start, cell)
                })
                .collect();
            self.entries.insert(start_ms, span);
        }
        Ok(())
    }

    /// Re-expands merged spans touching `[start_ms, end_ms)` into one entry
    /// per grid cell, each carrying the block's text.
    ///
    /// Cells a still-unedited merge replaced are restored as they were.
    pub fn split(&mut self, start_ms: Ms, end_ms: Ms, interval: GlobalInterval) -> CoreResult<()> {
        if end_ms <= start_ms {
            return Err(CoreError::InvalidSpan {
                start_ms,
                duration_ms: end_ms.saturating_sub(start_ms),
            });
        }

        let mut blocks: Vec<Ms> = self
            .entries
            .range(start_ms..end_ms)
            .map(|(start, _)| *start)
            .collect();
        if let Some((start, _)) = self.covering(start_ms) {
            if start < start_ms {
                blocks.insert(0, start);
            }
        }

        let cell = interval.ms();
        for block_start in blocks {
            let Some(block) = self.entries.get(&block_start) else {
                continue;
            };
            if block.duration_ms <= cell && !block.is_merged() {
                continue;
            }
            let Some(block) = self.entries.remove(&block_start) else {
                continue;
            };
            let block_end = block.end_ms(block_start);

            for (start, span) in &block.folded {
                self.entries.insert(*start, span.clone());
            }

            let mut cursor = block_start;
            while cursor < block_end {
                if let Some((start, span)) = self.covering(cursor) {
                    cursor = span.end_ms(start).max(cursor + 1);
                    continue;
                }
                let next_start = self
                    .entries
                    .range((Excluded(cursor), Unbounded))
                    .next()
                    .map(|(start, _)| *start)
                    .unwrap_or(block_end);
                let duration = cell.min(block_end - cursor).min(next_start - cursor);
                self.entries
                    .insert(cursor, Span::new(duration, block.text.clone()));
                cursor += duration;
            }
        }
        Ok(())
    }

    /// Moves every span by `delta_ms`; spans that would land before zero are
    /// dropped. Returns how many were dropped.
    pub fn shift(&mut self, delta_ms: i64) -> usize {
        let before = self.entries.len();
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .filter_map(|(start, span)| {
                let shifted = if delta_ms >= 0 {
                    start.checked_add(delta_ms.unsigned_abs())
                } else {
                    start.checked_sub(delta_ms.unsigned_abs())
                };
                shifted.map(|start| (start, span))
            })
            .collect();
        before - self.entries.len()
    }

    /// Deletes the span at `start_ms` if present
    pub fn remove(&mut self, start_ms: Ms) -> Option<Span> {
        self.entries.remove(&start_ms)
    }

    /// Empties `[start_ms, end_ms)`, keeping the outside parts of spans that
    /// cross its edges
    pub fn clear_range(&mut self, start_ms: Ms, end_ms: Ms) {
        if start_ms < end_ms {
            self.carve(start_ms, end_ms);
        }
    }

    /// Removes every span
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Span whose `[start, start + duration)` contains `ms`
    pub fn query(&self, ms: Ms) -> Option<(Ms, &Span)> {
        self.covering(ms)
    }

    // -------------------------------------------------------------------------
    // Row-based editing
    // -------------------------------------------------------------------------

    /// Texts of rows `first_row..=last_row`, empty where no span covers a row
    pub fn copy_rows(&self, first_row: u64, last_row: u64, interval: GlobalInterval) -> Vec<String> {
        (first_row..=last_row)
            .map(|row| {
                self.covering(timegrid::offset_for_row(row, interval))
                    .map(|(_, span)| span.text.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Writes one cell-sized span per text starting at `first_row`.
    ///
    /// Each target cell is cleared first; empty texts leave it cleared.
    pub fn paste_rows(&mut self, first_row: u64, texts: &[String], interval: GlobalInterval) {
        for (offset, text) in texts.iter().enumerate() {
            let cell_start =
                timegrid::offset_for_row(first_row.saturating_add(offset as u64), interval);
            let cell_end = cell_start.saturating_add(interval.ms());
            if cell_end == cell_start {
                break;
            }
            self.carve(cell_start, cell_end);
            if !text.is_empty() {
                self.entries
                    .insert(cell_start, Span::new(cell_end - cell_start, text.clone()));
            }
        }
    }

    /// Clears rows `first_row..=last_row`
    pub fn clear_rows(&mut self, first_row: u64, last_row: u64, interval: GlobalInterval) {
        if last_row < first_row {
            return;
        }
        let start = timegrid::offset_for_row(first_row, interval);
        let end = timegrid::offset_for_row(last_row.saturating_add(1), interval);
        self.carve(start, end);
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn covering(&self, ms: Ms) -> Option<(Ms, &Span)> {
        self.entries
            .range(..=ms)
            .next_back()
            .filter(|(start, span)| ms < span.end_ms(**start))
            .map(|(start, span)| (*start, span))
    }

    /// Start of an entry (other than the one keyed at `start_ms`) that
    /// overlaps `[start_ms, start_ms + duration_ms)`.
    fn overlapping(&self, start_ms: Ms, duration_ms: Ms) -> Option<Ms> {
        let end_ms = start_ms.saturating_add(duration_ms);
        if let Some((prev, span)) = self.entries.range(..start_ms).next_back() {
            if span.end_ms(*prev) > start_ms {
                return Some(*prev);
            }
        }
        self.entries
            .range((Excluded(start_ms), Unbounded))
            .next()
            .filter(|(next, _)| **next < end_ms)
            .map(|(next, _)| *next)
    }

    /// Empties `[start_ms, end_ms)`. Spans crossing either edge keep the
    /// part outside the range. Returns the removed entries as they were.
    fn carve(&mut self, start_ms: Ms, end_ms: Ms) -> Vec<(Ms, Span)> {
        let mut tail = None;
        if let Some((prev, span)) = self.entries.range_mut(..start_ms).next_back() {
            let prev_end = span.end_ms(*prev);
            if prev_end > start_ms {
                if prev_end > end_ms {
                    tail = Some(Span::new(prev_end - end_ms, span.text.clone()));
                }
                span.duration_ms = start_ms - *prev;
                span.folded.clear();
            }
        }

        let keys: Vec<Ms> = self
            .entries
            .range(start_ms..end_ms)
            .map(|(start, _)| *start)
            .collect();
        let removed: Vec<(Ms, Span)> = keys
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|span| (key, span)))
            .collect();

        if let Some((start, span)) = removed.last() {
            let end = span.end_ms(*start);
            if end > end_ms {
                tail = Some(Span::new(end - end_ms, span.text.clone()));
            }
        }
        // At most one span crosses `end_ms`, so its key is free
        if let Some(span) = tail {
            self.entries.insert(end_ms, span);
        }
        removed
    }
}

impl FromIterator<(Ms, Span)> for SpanMap {
    /// Builds a map from pre-validated entries; later duplicates of a key win
    fn from_iter<I: IntoIterator<Item = (Ms, Span)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Whether no two entries of `map` overlap
pub fn is_non_overlapping(map: &SpanMap) -> bool {
    let mut last_end = 0;
    for (start, span) in map.iter() {
        if start < last_end {
            return false;
        }
        last_end = span.end_ms(start);
    }
    true
}
