//! Subgrid Core Type Definitions
//!
//! Defines fundamental types used throughout the engine.

use serde::{Deserialize, Serialize};

use super::{CoreError, CoreResult};

// =============================================================================
// Time Types
// =============================================================================

/// Time offset or duration in milliseconds
pub type Ms = u64;

/// Number of parallel caption tracks in a document
pub const TRACK_COUNT: usize = 5;

/// Track reserved for auto-detected voice activity
pub const AUTO_TRACK: usize = 0;

/// Fixed resolution imported caption offsets are snapped to
pub const IMPORT_SNAP_MS: Ms = 20;

/// Selectable display intervals, in selector order
pub const INTERVAL_PRESETS: [Ms; 6] = [20, 50, 100, 400, 500, 1000];

// =============================================================================
// Global Interval
// =============================================================================

/// Active display/row granularity in milliseconds (always positive)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct GlobalInterval(Ms);

impl GlobalInterval {
    /// Creates an interval, rejecting zero
    pub fn new(ms: Ms) -> CoreResult<Self> {
        if ms == 0 {
            return Err(CoreError::InvalidInterval(ms));
        }
        Ok(Self(ms))
    }

    /// Maps an interval selector index onto [`INTERVAL_PRESETS`]
    pub fn preset(index: usize) -> Option<Self> {
        INTERVAL_PRESETS.get(index).copied().map(Self)
    }

    /// Interval length in milliseconds
    pub fn ms(self) -> Ms {
        self.0
    }

    /// Whether this interval is one of the selectable presets
    pub fn is_preset(self) -> bool {
        INTERVAL_PRESETS.contains(&self.0)
    }
}

impl Default for GlobalInterval {
    fn default() -> Self {
        Self(100)
    }
}

impl TryFrom<u64> for GlobalInterval {
    type Error = CoreError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GlobalInterval> for u64 {
    fn from(value: GlobalInterval) -> Self {
        value.0
    }
}

impl std::fmt::Display for GlobalInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ms", self.0)
    }
}

// =============================================================================
// Media Info
// =============================================================================

/// Metadata handed over by the media inspection collaborator.
///
/// Only `duration_ms` drives grid sizing; the rest is carried for display.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    /// Total media duration
    pub duration_ms: Ms,
    /// Frames per second
    #[serde(default)]
    pub fps: Option<f64>,
    /// Frame width in pixels
    #[serde(default)]
    pub width: Option<u32>,
    /// Frame height in pixels
    #[serde(default)]
    pub height: Option<u32>,
    /// Overall bitrate
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
}

impl MediaInfo {
    /// Media info carrying only a duration
    pub fn with_duration(duration_ms: Ms) -> Self {
        Self {
            duration_ms,
            ..Self::default()
        }
    }
}

/// Validates a track index against [`TRACK_COUNT`]
pub fn check_track(index: usize) -> CoreResult<usize> {
    if index < TRACK_COUNT {
        Ok(index)
    } else {
        Err(CoreError::TrackOutOfRange(index))
    }
}
