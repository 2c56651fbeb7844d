//! Subgrid Error Definitions
//!
//! Defines error types used throughout the engine.

use thiserror::Error;

use super::Ms;

/// Errors raised while parsing timestamps and caption lines
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid timestamp format
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Invalid caption line format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Missing required data
    #[error("Missing data: {0}")]
    MissingData(String),
}

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Parsing Errors
    // =========================================================================
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // =========================================================================
    // Span Errors
    // =========================================================================
    #[error("Invalid span at {start_ms} ms: duration {duration_ms} ms must be positive")]
    InvalidSpan { start_ms: Ms, duration_ms: Ms },

    #[error(
        "Span overlap: {start_ms}~{end_ms} ms conflicts with span starting at {existing_start_ms} ms"
    )]
    SpanOverlap {
        start_ms: Ms,
        end_ms: Ms,
        existing_start_ms: Ms,
    },

    #[error("Invalid interval: {0} ms")]
    InvalidInterval(Ms),

    #[error("Track index out of range: {0}")]
    TrackOutOfRange(usize),

    // =========================================================================
    // Concurrency Errors
    // =========================================================================
    #[error("Regrid request {generation} was superseded by a newer request")]
    ConcurrencyConflict { generation: u64 },

    #[error("Edits are locked while a regrid is in progress")]
    EditLocked,

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Nothing to export: {0}")]
    NothingToExport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether this error is the silent "superseded regrid" outcome that
    /// front-ends should not surface to the user.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
