//! Captions Module
//!
//! Caption file ingestion and export:
//! - Line-level format parsing and cue rendering
//! - Best-effort import into one track with 20 ms snapping
//! - Windowed, renumbered export with an output offset
//! - Voice timeline export of detected segments

pub mod export;
pub mod formats;
pub mod import;
pub mod timemarks;

pub use export::{export_to_file, render_srt, Cue, Cues, ExportReport, ExportSelection};
pub use formats::{parse_streaming_line, parse_timing_line, strip_markup, StreamingLine};
pub use import::{import_captions, import_file, ImportOptions, ImportResult};
pub use timemarks::{
    export_time_marks, render_time_marks, time_marks, MergePriority, TimeMark, TimeMarkOptions,
    TimeMarkReport, TimingMode,
};
