//! Subgrid Core Engine
//!
//! Core reconciliation engine module.
//! Handles the per-track span maps, grid re-tiling, caption import and export.

pub mod captions;
pub mod fs;
pub mod project;
pub mod regrid;
pub mod settings;
pub mod spans;
pub mod timegrid;
pub mod tracks;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
