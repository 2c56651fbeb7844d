//! Project Module
//!
//! Owns the in-memory document state and the edit session around it.

mod state;

pub use state::*;
