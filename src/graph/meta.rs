//! Extended-attribute ("meta") codec.
//!
//! Every definition carries a free-form JSON object next to its structural
//! columns. This module turns the stored blob into a map, writes it back, and
//! strips the structural keys that must never live inside it.

use serde_json::{Map, Value};

use super::GraphError;

/// Decoded extended attributes.
pub type Meta = Map<String, Value>;

/// Keys owned by the shared definition columns.
pub const COMMON_RESERVED: &[&str] = &[
    "id",
    "service_name",
    "section_name",
    "graph_name",
    "number",
    "description",
    "sort",
];

/// Keys owned by single-series columns, on top of [`COMMON_RESERVED`].
pub const SERIES_RESERVED: &[&str] = &[
    "id",
    "service_name",
    "section_name",
    "graph_name",
    "number",
    "description",
    "sort",
    "mode",
    "gmode",
    "color",
    "ulimit",
    "llimit",
    "sulimit",
    "sllimit",
    "type",
    "stype",
];

/// Parse a stored blob into a map.
///
/// An absent or blank blob decodes to an empty map. Anything else must be a
/// JSON object.
pub fn decode(blob: Option<&str>) -> Result<Meta, GraphError> {
    let blob = match blob {
        Some(b) if !b.trim().is_empty() => b,
        _ => return Ok(Meta::new()),
    };

    match serde_json::from_str::<Value>(blob) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(GraphError::Decode(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(GraphError::Decode(e.to_string())),
    }
}

/// Serialize a map back into its stored form.
pub fn encode(meta: &Meta) -> String {
    // A map of JSON values always serializes.
    Value::Object(meta.clone()).to_string()
}

/// Return a copy of `meta` without any of the `reserved` keys.
pub fn clean(meta: &Meta, reserved: &[&str]) -> Meta {
    meta.iter()
        .filter(|(k, _)| !reserved.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
