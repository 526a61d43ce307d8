//! Database module for Focuslight.
//!
//! Provides SQLite storage for single-series and composite definitions.

mod models;
mod store;

pub use models::*;
pub use store::*;
