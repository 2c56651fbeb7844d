//! Project State Module
//!
//! The single logical owner of a document's tracks and grid, and the edit
//! session that serializes edits against background regrids.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::core::{
    captions::{self, Cues, ExportReport, ExportSelection, ImportResult, TimeMark, TimeMarkReport},
    regrid::{GridLayout, RegridHandle, RegridOutcome, RegridRequest, Regridder},
    settings::EditorSettings,
    spans::Span,
    timegrid,
    tracks::{AutoPreset, AutoSegment, Cell, MergeReport, TrackSet},
    CoreError, CoreResult, GlobalInterval, MediaInfo, Ms, AUTO_TRACK,
};

// =============================================================================
// Project State
// =============================================================================

/// Tracks, grid granularity and auto-detect inputs of one open document
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    /// The five caption tracks
    pub tracks: TrackSet,
    /// Active display interval
    pub interval: GlobalInterval,
    /// Total grid duration; grows to cover every span, never shrinks
    pub duration_ms: Ms,
    /// Detected voice segments feeding track 0
    pub auto_segments: Vec<AutoSegment>,
    /// Policy for folding the segments
    pub preset: AutoPreset,
    /// Probe metadata of the open media
    pub media: MediaInfo,
    /// Row layout for the active interval
    pub layout: GridLayout,
}

impl ProjectState {
    /// Creates the state for freshly opened media; every track starts empty
    pub fn new(media: &MediaInfo, interval: GlobalInterval, preset: AutoPreset) -> Self {
        let tracks = TrackSet::new();
        let (layout, duration_ms) = GridLayout::compute(&tracks, interval, media.duration_ms);
        Self {
            tracks,
            interval,
            duration_ms,
            auto_segments: Vec::new(),
            preset,
            media: media.clone(),
            layout,
        }
    }

    /// Number of grid rows
    pub fn row_count(&self) -> u64 {
        self.layout.row_count
    }

    /// Recomputes the layout after an edit, growing the duration if needed
    fn refresh_layout(&mut self) {
        let required = self.duration_ms.max(self.tracks.end_ms());
        let (layout, duration_ms) = GridLayout::compute(&self.tracks, self.interval, required);
        self.layout = layout;
        self.duration_ms = duration_ms;
    }
}

// =============================================================================
// Edit Session
// =============================================================================

/// Editing front door for one document.
///
/// Synchronous edits are refused with `EditLocked` while a regrid is
/// pending. A regrid either commits completely or leaves the state as it
/// was.
#[derive(Debug)]
pub struct EditSession {
    state: ProjectState,
    settings: EditorSettings,
    regridder: Regridder,
    pending: Option<RegridHandle>,
}

impl EditSession {
    /// Opens a session for `media` using the interval and preset from
    /// `settings`
    pub fn open(media: &MediaInfo, settings: &EditorSettings) -> Self {
        let mut settings = settings.clone();
        settings.normalize();
        let state = ProjectState::new(media, settings.interval(), settings.auto_preset.clone());

        tracing::info!(
            duration_ms = state.duration_ms,
            interval_ms = state.interval.ms(),
            rows = state.row_count(),
            "edit session opened"
        );

        Self {
            state,
            settings,
            regridder: Regridder::new(),
            pending: None,
        }
    }

    /// Current state
    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    /// Row layout for the active interval
    pub fn layout(&self) -> &GridLayout {
        &self.state.layout
    }

    /// Settings the session was opened with
    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Whether a regrid is pending and edits are refused
    pub fn is_locked(&self) -> bool {
        self.pending.is_some()
    }

    fn ensure_unlocked(&self) -> CoreResult<()> {
        if self.is_locked() {
            return Err(CoreError::EditLocked);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Cell contents at `ms` on `track`
    pub fn query(&self, track: usize, ms: Ms) -> CoreResult<Cell<'_>> {
        self.state
            .tracks
            .query(track, ms, &self.state.auto_segments)
    }

    /// Vertical header labels for every row
    pub fn row_labels(&self) -> Vec<String> {
        timegrid::row_labels(self.state.row_count(), self.state.interval)
    }

    /// Texts of rows `first_row..=last_row` on `track`
    pub fn copy_rows(&self, track: usize, first_row: u64, last_row: u64) -> CoreResult<Vec<String>> {
        Ok(self
            .state
            .tracks
            .track(track)?
            .copy_rows(first_row, last_row, self.state.interval))
    }

    /// Lazy cue sequence for `selection`
    pub fn cues(&self, selection: ExportSelection) -> CoreResult<Cues<'_>> {
        let track = self.state.tracks.track(selection.track_index)?;
        Ok(Cues::new(track, selection))
    }

    /// Renders `selection` as cue text
    pub fn export(&self, selection: ExportSelection) -> CoreResult<String> {
        let track = self.state.tracks.track(selection.track_index)?;
        Ok(captions::render_srt(track, selection))
    }

    /// Writes `selection` to `path`, atomically unless disabled in settings
    pub fn export_to_file(&self, selection: ExportSelection, path: &Path) -> CoreResult<ExportReport> {
        let track = self.state.tracks.track(selection.track_index)?;
        captions::export_to_file(track, selection, path, self.settings.export.atomic_write)
    }

    /// Detected segments inside `[window_start_ms, window_end_ms)` after the
    /// configured drop and join rules, in output time
    pub fn time_marks(&self, window_start_ms: Ms, window_end_ms: Ms) -> Vec<TimeMark> {
        captions::time_marks(
            &self.state.auto_segments,
            window_start_ms,
            window_end_ms,
            &self.settings.time_marks,
        )
    }

    /// Writes the voice timeline to `path`; every cue carries the preset text
    pub fn export_time_marks(
        &self,
        window_start_ms: Ms,
        window_end_ms: Ms,
        path: &Path,
    ) -> CoreResult<TimeMarkReport> {
        captions::export_time_marks(
            &self.state.auto_segments,
            window_start_ms,
            window_end_ms,
            &self.state.preset.text,
            &self.settings.time_marks,
            path,
            self.settings.export.atomic_write,
        )
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    /// Writes one cell (spanning `row_span` rows); empty text clears it
    pub fn edit_cell(&mut self, track: usize, row: u64, row_span: u64, text: &str) -> CoreResult<()> {
        self.ensure_unlocked()?;
        let interval = self.state.interval;
        self.state
            .tracks
            .edit_cell(track, row, row_span, text, interval)?;
        self.state.refresh_layout();
        Ok(())
    }

    /// Merges rows `first_row..=last_row` into one span
    pub fn merge_rows(&mut self, track: usize, first_row: u64, last_row: u64) -> CoreResult<()> {
        self.ensure_unlocked()?;
        let interval = self.state.interval;
        self.state
            .tracks
            .merge_rows(track, first_row, last_row, interval)?;
        self.state.refresh_layout();
        Ok(())
    }

    /// Splits merged spans in rows `first_row..=last_row` back into cells
    pub fn split_rows(&mut self, track: usize, first_row: u64, last_row: u64) -> CoreResult<()> {
        self.ensure_unlocked()?;
        let interval = self.state.interval;
        self.state
            .tracks
            .split_rows(track, first_row, last_row, interval)?;
        self.state.refresh_layout();
        Ok(())
    }

    /// Clears rows `first_row..=last_row`
    pub fn clear_rows(&mut self, track: usize, first_row: u64, last_row: u64) -> CoreResult<()> {
        self.ensure_unlocked()?;
        let interval = self.state.interval;
        self.state
            .tracks
            .track_mut(track)?
            .clear_rows(first_row, last_row, interval);
        self.state.refresh_layout();
        Ok(())
    }

    /// Pastes `texts` one per row starting at `first_row`
    pub fn paste_rows(&mut self, track: usize, first_row: u64, texts: &[String]) -> CoreResult<()> {
        self.ensure_unlocked()?;
        let interval = self.state.interval;
        self.state
            .tracks
            .track_mut(track)?
            .paste_rows(first_row, texts, interval);
        self.state.refresh_layout();
        Ok(())
    }

    /// Moves `track` by `rows` rows; returns how many spans fell before zero
    pub fn shift_track(&mut self, track: usize, rows: i64) -> CoreResult<usize> {
        self.ensure_unlocked()?;
        let interval = self.state.interval;
        let dropped = self.state.tracks.shift_track(track, rows, interval)?;
        self.state.refresh_layout();
        Ok(dropped)
    }

    /// Empties `track`. Clearing track 0 also forgets the detected segments.
    pub fn clear_track(&mut self, track: usize) -> CoreResult<()> {
        self.ensure_unlocked()?;
        self.state.tracks.clear_track(track)?;
        if track == AUTO_TRACK {
            self.state.auto_segments.clear();
        }
        self.state.refresh_layout();
        Ok(())
    }

    /// Adds a batch of detected segments and folds it into track 0 under
    /// `preset`. Earlier batches stay in the segment list.
    pub fn apply_auto_segments(
        &mut self,
        mut segments: Vec<AutoSegment>,
        preset: AutoPreset,
    ) -> CoreResult<()> {
        self.ensure_unlocked()?;
        segments.sort();
        segments.dedup();

        let mut tracks = self.state.tracks.clone();
        tracks.apply_auto_segments(&segments, &preset, self.state.interval)?;

        let mut all = self.state.auto_segments.clone();
        all.extend(segments);
        all.sort();
        all.dedup();

        self.state.tracks = tracks;
        self.state.auto_segments = all;
        self.state.preset = preset;
        self.state.refresh_layout();
        Ok(())
    }

    /// Forgets the detected segments; track 0's spans stay as they are
    pub fn clear_auto_segments(&mut self) -> CoreResult<()> {
        self.ensure_unlocked()?;
        self.state.auto_segments.clear();
        Ok(())
    }

    /// Imports caption text into `track` and grows the grid to cover it
    pub fn import_captions(&mut self, track: usize, content: &str) -> CoreResult<ImportResult> {
        self.ensure_unlocked()?;
        let options = self.import_options();
        let existing = self.state.tracks.track(track)?;
        let result = captions::import_captions(content, existing, &options);
        self.commit_import(track, &result)?;
        Ok(result)
    }

    /// Reads a caption file and imports it into `track`
    pub fn import_file(&mut self, track: usize, path: &Path) -> CoreResult<ImportResult> {
        self.ensure_unlocked()?;
        let options = self.import_options();
        let existing = self.state.tracks.track(track)?;
        let result = captions::import_file(path, existing, &options)?;
        self.commit_import(track, &result)?;
        Ok(result)
    }

    fn import_options(&self) -> captions::ImportOptions {
        captions::ImportOptions {
            interval: self.state.interval,
            ..self.settings.import_options()
        }
    }

    fn commit_import(&mut self, track: usize, result: &ImportResult) -> CoreResult<()> {
        self.state
            .tracks
            .merge_external(track, result.entries.clone())?;
        self.state.duration_ms = self.state.duration_ms.max(result.required_duration_ms);
        self.state.refresh_layout();
        Ok(())
    }

    /// Merges a pre-parsed `start -> span` map into `track` without
    /// overwriting anything already there
    pub fn merge_external(
        &mut self,
        track: usize,
        entries: BTreeMap<Ms, Span>,
    ) -> CoreResult<MergeReport> {
        self.ensure_unlocked()?;
        let report = self.state.tracks.merge_external(track, entries)?;
        self.state.refresh_layout();
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Regrid
    // -------------------------------------------------------------------------

    /// Starts regridding to `new_interval` in the background, superseding a
    /// pending regrid. Returns the request generation.
    pub fn request_regrid(&mut self, new_interval: GlobalInterval) -> CoreResult<u64> {
        let request = self.regrid_request(new_interval);
        let handle = self.regridder.spawn(request)?;
        let generation = handle.generation;
        if let Some(previous) = self.pending.replace(handle) {
            tracing::debug!(
                superseded = previous.generation,
                generation,
                "pending regrid replaced"
            );
        }
        Ok(generation)
    }

    /// Waits for the pending regrid and commits it.
    ///
    /// Returns `false` when nothing was pending. On error the previous
    /// tracks, interval and duration stay authoritative and the lock is
    /// released.
    pub async fn finish_regrid(&mut self) -> CoreResult<bool> {
        let Some(handle) = self.pending.take() else {
            return Ok(false);
        };
        let outcome = handle.wait().await?;
        self.commit_regrid(outcome);
        Ok(true)
    }

    /// Discards the pending regrid, if any
    pub fn cancel_regrid(&mut self) {
        if self.pending.take().is_some() {
            self.regridder.cancel();
        }
    }

    /// Regrids synchronously on the current thread
    pub fn regrid_now(&mut self, new_interval: GlobalInterval) -> CoreResult<()> {
        self.ensure_unlocked()?;
        let request = self.regrid_request(new_interval);
        let outcome = self.regridder.run_blocking(request)?;
        self.commit_regrid(outcome);
        Ok(())
    }

    fn regrid_request(&self, new_interval: GlobalInterval) -> RegridRequest {
        RegridRequest {
            tracks: self.state.tracks.clone(),
            old_interval: self.state.interval,
            new_interval,
            duration_ms: self.state.duration_ms,
            auto_segments: self.state.auto_segments.clone(),
            preset: self.state.preset.clone(),
        }
    }

    fn commit_regrid(&mut self, outcome: RegridOutcome) {
        self.state.tracks = outcome.tracks;
        self.state.interval = outcome.interval;
        self.state.duration_ms = outcome.duration_ms;
        self.state.layout = outcome.layout;
        self.settings.interval_ms = outcome.interval.ms();

        tracing::info!(
            interval_ms = self.state.interval.ms(),
            rows = self.state.row_count(),
            duration_ms = self.state.duration_ms,
            "regrid committed"
        );
    }
}
