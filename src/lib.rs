//! Focuslight - graph definition service.
//!
//! Stores single-series and composite graph definitions in SQLite and serves
//! them over a JSON API.

pub mod config;
pub mod db;
pub mod graph;
pub mod render;
pub mod web;
