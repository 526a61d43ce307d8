//! Renderer port.
//!
//! Drawing and exporting series is done by an external time-series backend.
//! This module defines what the backend receives: ordered series bindings and
//! the request's rendering options.

use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::graph::SeriesBinding;

/// Renderer error types.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid render option: {0}")]
    Options(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Time span shorthand accepted by the `t` option.
pub const TERMS: &[&str] = &["d", "h", "m", "sh", "sd"];

/// Consolidation functions accepted by the `cf` option.
pub const CONSOLIDATIONS: &[&str] = &["AVERAGE", "MAX"];

/// Rendering options taken from a graph/xport request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub t: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(deserialize_with = "deserialize_flag")]
    pub graphonly: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub logarithmic: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub sumup: bool,
    pub step: Option<u64>,
    pub cf: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            t: "d".to_string(),
            from: None,
            to: None,
            width: 390,
            height: 110,
            graphonly: false,
            logarithmic: false,
            sumup: false,
            step: None,
            cf: "AVERAGE".to_string(),
        }
    }
}

impl RenderOptions {
    /// Check the enumerated options.
    pub fn validate(&self) -> Result<(), RenderError> {
        if !TERMS.contains(&self.t.as_str()) {
            return Err(RenderError::Options(format!("t must be one of {:?}", TERMS)));
        }
        if !CONSOLIDATIONS.contains(&self.cf.as_str()) {
            return Err(RenderError::Options(format!(
                "cf must be one of {:?}",
                CONSOLIDATIONS
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::Options("width and height must be positive".to_string()));
        }
        Ok(())
    }
}

/// Accept `true`/`false` as well as `1`/`0`, as JSON values or query text.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid flag value: {:?}", other))),
        },
        Flag::Int(n) => Err(de::Error::custom(format!("invalid flag value: {}", n))),
    }
}

/// Numeric export of rendered series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesExport {
    pub column_names: Vec<String>,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub step: u64,
    pub rows: Vec<Vec<Option<f64>>>,
}

/// A time-series backend able to draw or export bound series.
pub trait Renderer: Send + Sync {
    /// Draw `bindings` as a PNG image.
    fn graph(&self, bindings: &[SeriesBinding], options: &RenderOptions) -> Result<Vec<u8>, RenderError>;

    /// Export the numbers behind `bindings`.
    fn export(
        &self,
        bindings: &[SeriesBinding],
        options: &RenderOptions,
    ) -> Result<SeriesExport, RenderError>;
}
