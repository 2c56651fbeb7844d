//! Subgrid Core Library
//!
//! Grid-based, multi-track subtitle authoring engine.
//! This library contains the interval/track reconciliation engine and all
//! caption import/export logic. It carries no GUI dependency: a front-end
//! drives it through [`core::project::EditSession`] and renders the
//! [`core::regrid::GridLayout`] it returns.

pub mod core;

pub use crate::core::{CoreError, CoreResult};
