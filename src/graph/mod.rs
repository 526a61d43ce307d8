//! Graph definition model.
//!
//! A definition describes how stored series are drawn on the dashboard. It
//! is either a single series or a composite that stacks several single
//! series together. Rows come in from the store as [`RawRecord`]s and are
//! dispatched on their shape by [`GraphDefinition::from_record`].

mod binding;
mod complex;
mod error;
pub mod meta;
mod record;
mod simple;

pub use binding::*;
pub use complex::*;
pub use error::*;
pub use meta::Meta;
pub use record::*;
pub use simple::*;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Display format for definition timestamps.
pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Fields shared by both kinds of definition.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBase {
    id: i64,
    service: String,
    section: String,
    graph: String,
    number: i64,
    description: String,
    sort: i64,
    meta: Meta,
    meta_blob: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GraphBase {
    /// Build the shared fields, dropping any `reserved` keys found in the
    /// stored blob.
    fn from_record(record: &RawRecord, reserved: &[&str]) -> Result<Self, GraphError> {
        let decoded = meta::decode(record.meta.as_deref())?;
        let meta = meta::clean(&decoded, reserved);
        let meta_blob = match record.meta.as_deref() {
            Some(blob) if !blob.trim().is_empty() && meta.len() == decoded.len() => blob.to_string(),
            _ => meta::encode(&meta),
        };

        Ok(Self {
            id: record.id,
            service: record.service_name.clone(),
            section: record.section_name.clone(),
            graph: record.graph_name.clone(),
            number: record.number,
            description: record.description.clone(),
            sort: record.sort,
            meta,
            meta_blob,
            created_at: DateTime::from_timestamp(record.created_at, 0).unwrap_or_default(),
            updated_at: DateTime::from_timestamp(record.updated_at, 0).unwrap_or_default(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sort(&self) -> i64 {
        self.sort
    }

    /// Decoded extended attributes. Never contains reserved keys after an update.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Extended attributes in their stored (JSON) form.
    pub fn meta_blob(&self) -> &str {
        &self.meta_blob
    }

    pub fn created_at_time(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at_time(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Creation time formatted for display.
    pub fn created_at(&self) -> String {
        self.created_at.format(TIME_FORMAT).to_string()
    }

    /// Last update time formatted for display.
    pub fn updated_at(&self) -> String {
        self.updated_at.format(TIME_FORMAT).to_string()
    }

    /// Apply `key` if it names one of the shared columns.
    ///
    /// Returns `false` when the key belongs somewhere else.
    fn apply_common(&mut self, key: &str, value: &Value) -> Result<bool, GraphError> {
        match key {
            "number" => self.number = int_field(key, value)?,
            "description" => self.description = text_field(key, value)?,
            "sort" => self.sort = int_field(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn store_meta(&mut self, merged: Meta, reserved: &[&str]) {
        self.meta = meta::clean(&merged, reserved);
        self.meta_blob = meta::encode(&self.meta);
    }

    fn common_json(&self) -> Map<String, Value> {
        let value = json!({
            "id": self.id,
            "service_name": self.service,
            "section_name": self.section,
            "graph_name": self.graph,
            "number": self.number,
            "description": self.description,
            "sort": self.sort,
            "meta": self.meta_blob,
            "created_at": self.created_at(),
            "updated_at": self.updated_at(),
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn to_record(&self) -> RawRecord {
        RawRecord {
            id: self.id,
            service_name: self.service.clone(),
            section_name: self.section.clone(),
            graph_name: self.graph.clone(),
            number: self.number,
            description: self.description.clone(),
            sort: self.sort,
            meta: Some(self.meta_blob.clone()),
            created_at: self.created_at.timestamp(),
            updated_at: self.updated_at.timestamp(),
            ..Default::default()
        }
    }
}

/// A stored graph definition.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphDefinition {
    Single(SingleSeries),
    Composite(CompositeSeries),
}

impl GraphDefinition {
    /// Build the definition a row describes.
    ///
    /// Rows carrying both `mode` and `type` are single series; every other
    /// row is read as a composite.
    pub fn from_record(record: &RawRecord) -> Result<Self, GraphError> {
        if record.is_single_series() {
            Ok(Self::Single(SingleSeries::from_record(record)?))
        } else {
            Ok(Self::Composite(CompositeSeries::from_record(record)?))
        }
    }

    pub fn base(&self) -> &GraphBase {
        match self {
            Self::Single(g) => g.base(),
            Self::Composite(g) => g.base(),
        }
    }

    pub fn id(&self) -> i64 {
        self.base().id()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// Apply `changes` in place. See [`SingleSeries::update`] and
    /// [`CompositeSeries::update`].
    pub fn update(&mut self, changes: &Meta) -> Result<(), GraphError> {
        match self {
            Self::Single(g) => g.update(changes),
            Self::Composite(g) => g.update(changes),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Single(g) => g.to_json(),
            Self::Composite(g) => g.to_json(),
        }
    }

    pub fn to_record(&self) -> RawRecord {
        match self {
            Self::Single(g) => g.to_record(),
            Self::Composite(g) => g.to_record(),
        }
    }
}

/// Read an integer column value. Numeric strings and whole floats are
/// accepted; fractional or out-of-range values are rejected.
pub(crate) fn int_field(key: &str, value: &Value) -> Result<i64, GraphError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    };

    parsed.ok_or_else(|| GraphError::InvalidField {
        key: key.to_string(),
        expected: "an integer",
    })
}

fn whole(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then(|| f as i64)
}

/// Read a text column value. Numbers and booleans are taken as their JSON text.
pub(crate) fn text_field(key: &str, value: &Value) -> Result<String, GraphError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => Ok(value.to_string()),
        _ => Err(GraphError::InvalidField {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Text form of a metadata value, `None` for null.
pub(crate) fn value_token(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
