//! Composite definitions and their component layout.
//!
//! A composite stores its layout inside the extended attributes:
//!
//! - primary component: `type-1`, `path-1`, `gmode-1`
//! - secondary components: parallel `type-2`, `path-2`, `gmode-2`, `stack-2`
//!   (arrays, or plain scalars when there is exactly one)
//! - `sump`: whether the renderer should add a summed series
//!
//! The layout is derived once, at construction, into an ordered component
//! list and the colon-joined descriptor that ad-hoc render requests use.

use serde::Serialize;
use serde_json::{json, Value};

use super::binding::is_stack_token;
use super::meta::{Meta, COMMON_RESERVED};
use super::{value_token, GraphBase, GraphError, RawRecord};

/// Stacked field of the primary component in a descriptor.
const PRIMARY_STACK_TOKEN: &str = "0";

/// One series reference inside a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub render_type: String,
    pub path: String,
    pub gmode: String,
    #[serde(rename = "stack")]
    pub stacked: bool,
    /// Id of the single series this component draws.
    #[serde(rename = "graphid")]
    pub reference_id: String,
}

/// Everything a composite derives from its extended attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeLayout {
    pub components: Vec<Component>,
    pub descriptor: String,
    pub sumup: bool,
}

/// Build the component list, descriptor and sum-up flag from `meta`.
pub fn build_layout(meta: &Meta) -> Result<CompositeLayout, GraphError> {
    let primary_field = |key: &'static str| {
        meta.get(key)
            .and_then(value_token)
            .filter(|v| !v.trim().is_empty())
            .ok_or(GraphError::MissingComponent(key))
            .and_then(|v| descriptor_token(key, v))
    };
    let render_type = primary_field("type-1")?;
    let path = primary_field("path-1")?;
    let gmode = primary_field("gmode-1")?;

    let mut components = vec![Component {
        render_type,
        reference_id: path.clone(),
        path,
        gmode,
        stacked: false,
    }];

    let types = sequence(meta, "type-2");
    let paths = sequence(meta, "path-2");
    let gmodes = sequence(meta, "gmode-2");
    let stacks = sequence(meta, "stack-2");

    let count = types.len();
    if paths.len() != count || gmodes.len() != count || stacks.len() != count {
        return Err(GraphError::CompositeMismatch {
            types: types.len(),
            paths: paths.len(),
            gmodes: gmodes.len(),
            stacks: stacks.len(),
        });
    }

    for i in 0..count {
        let path = secondary_field(paths[i], "path-2")?;
        components.push(Component {
            render_type: secondary_field(types[i], "type-2")?,
            reference_id: path.clone(),
            path,
            gmode: secondary_field(gmodes[i], "gmode-2")?,
            stacked: flag(stacks[i]),
        });
    }

    let sumup = meta
        .get("sump")
        .or_else(|| meta.get("sumup"))
        .map(flag)
        .unwrap_or(false);

    Ok(CompositeLayout {
        descriptor: descriptor_for(&components),
        components,
        sumup,
    })
}

/// Encode a component list as `type:path:gmode:stacked` groups.
///
/// The first component is the primary one; its stacked field is always `0`.
pub fn descriptor_for(components: &[Component]) -> String {
    let mut fields = Vec::with_capacity(components.len() * 4);
    for (i, c) in components.iter().enumerate() {
        fields.push(c.render_type.clone());
        fields.push(c.path.clone());
        fields.push(c.gmode.clone());
        if i == 0 {
            fields.push(PRIMARY_STACK_TOKEN.to_string());
        } else {
            fields.push(c.stacked.to_string());
        }
    }
    fields.join(":")
}

/// Read a secondary key as a sequence: arrays as-is, a scalar as one entry,
/// absent or null as nothing.
fn sequence<'a>(meta: &'a Meta, key: &str) -> Vec<&'a Value> {
    match meta.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(scalar) => vec![scalar],
    }
}

fn secondary_field(value: &Value, key: &'static str) -> Result<String, GraphError> {
    value_token(value)
        .filter(|v| !v.trim().is_empty())
        .ok_or(GraphError::MissingComponent(key))
        .and_then(|v| descriptor_token(key, v))
}

/// Descriptor fields are `:`-separated, so a field may not contain one.
fn descriptor_token(key: &str, token: String) -> Result<String, GraphError> {
    if token.contains(':') {
        return Err(GraphError::InvalidField {
            key: key.to_string(),
            expected: "a value without ':'",
        });
    }
    Ok(token)
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => is_stack_token(s),
        _ => false,
    }
}

/// A definition that draws several single series together.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSeries {
    base: GraphBase,
    layout: CompositeLayout,
}

impl CompositeSeries {
    pub fn from_record(record: &RawRecord) -> Result<Self, GraphError> {
        let base = GraphBase::from_record(record, COMMON_RESERVED)?;
        let layout = build_layout(base.meta())?;
        Ok(Self { base, layout })
    }

    pub fn base(&self) -> &GraphBase {
        &self.base
    }

    pub fn id(&self) -> i64 {
        self.base.id()
    }

    /// Components in draw order; the primary component comes first.
    pub fn components(&self) -> &[Component] {
        &self.layout.components
    }

    /// Canonical `type:path:gmode:stacked` encoding of [`Self::components`].
    pub fn descriptor(&self) -> &str {
        &self.layout.descriptor
    }

    pub fn sumup(&self) -> bool {
        self.layout.sumup
    }

    /// Apply `changes` in place.
    ///
    /// Only `number`, `description` and `sort` are columns; every other key,
    /// layout keys included, goes into the extended attributes. The component
    /// list and descriptor are left as they were: call [`Self::rebuilt`] (or
    /// construct from [`Self::to_record`]) once the edit is complete.
    pub fn update(&mut self, changes: &Meta) -> Result<(), GraphError> {
        let mut next = self.base.clone();
        let mut merged = next.meta().clone();

        for (key, value) in changes {
            if !next.apply_common(key, value)? {
                merged.insert(key.clone(), value.clone());
            }
        }
        next.store_meta(merged, COMMON_RESERVED);

        self.base = next;
        Ok(())
    }

    /// A fresh composite derived from the current extended attributes.
    pub fn rebuilt(&self) -> Result<Self, GraphError> {
        Self::from_record(&self.to_record())
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.base.common_json();
        map.insert("sumup".to_string(), json!(self.layout.sumup));
        map.insert("complex".to_string(), json!(self.layout.descriptor));
        map.insert("data".to_string(), json!(self.layout.components));
        Value::Object(map)
    }

    pub fn to_record(&self) -> RawRecord {
        self.base.to_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Meta {
        value.as_object().cloned().unwrap()
    }

    fn record(value: Value) -> RawRecord {
        RawRecord {
            id: 11,
            service_name: "app".to_string(),
            section_name: "web".to_string(),
            graph_name: "overview".to_string(),
            meta: Some(value.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_primary_only() {
        let layout = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 10, "gmode-1": "gauge", "type-2": []
        })))
        .unwrap();

        assert_eq!(layout.components.len(), 1);
        assert_eq!(layout.descriptor, "AREA:10:gauge:0");
        assert!(!layout.sumup);

        let primary = &layout.components[0];
        assert_eq!(primary.path, "10");
        assert_eq!(primary.reference_id, "10");
        assert!(!primary.stacked);
    }

    #[test]
    fn test_absent_secondary_keys() {
        let layout = build_layout(&meta(json!({
            "type-1": "LINE1", "path-1": "4", "gmode-1": "subtract"
        })))
        .unwrap();
        assert_eq!(layout.descriptor, "LINE1:4:subtract:0");
    }

    #[test]
    fn test_descriptor_with_secondary() {
        let layout = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 101, "gmode-1": "gauge",
            "type-2": ["LINE1"], "path-2": [202], "gmode-2": ["subtract"], "stack-2": [true]
        })))
        .unwrap();
        assert_eq!(layout.descriptor, "AREA:101:gauge:0:LINE1:202:subtract:true");
        assert_eq!(layout.components.len(), 2);
        assert!(layout.components[1].stacked);
        assert_eq!(layout.components[1].reference_id, "202");
    }

    #[test]
    fn test_components_keep_order() {
        let layout = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": ["LINE1", "LINE2", "AREA"],
            "path-2": [2, 3, 4],
            "gmode-2": ["gauge", "subtract", "gauge"],
            "stack-2": ["1", "false", 1]
        })))
        .unwrap();

        let paths: Vec<_> = layout.components.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["1", "2", "3", "4"]);
        let stacks: Vec<_> = layout.components.iter().map(|c| c.stacked).collect();
        assert_eq!(stacks, [false, true, false, true]);
        assert_eq!(
            layout.descriptor,
            "AREA:1:gauge:0:LINE1:2:gauge:true:LINE2:3:subtract:false:AREA:4:gauge:true"
        );
    }

    #[test]
    fn test_scalar_secondary_matches_single_element_arrays() {
        let scalar = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": "LINE2", "path-2": 5, "gmode-2": "gauge", "stack-2": "true"
        })))
        .unwrap();
        let arrays = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": ["LINE2"], "path-2": [5], "gmode-2": ["gauge"], "stack-2": ["true"]
        })))
        .unwrap();
        assert_eq!(scalar, arrays);
    }

    #[test]
    fn test_separator_in_component_rejected() {
        let err = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gau:ge"
        })))
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::InvalidField {
                key: "gmode-1".to_string(),
                expected: "a value without ':'"
            }
        );

        let err = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": ["LINE1"], "path-2": ["2:3"], "gmode-2": ["gauge"], "stack-2": [false]
        })))
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidField { ref key, .. } if key == "path-2"));
    }

    #[test]
    fn test_blank_secondary_rejected() {
        let err = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": [" "], "path-2": [2], "gmode-2": ["gauge"], "stack-2": [false]
        })))
        .unwrap_err();
        assert_eq!(err, GraphError::MissingComponent("type-2"));
    }

    #[test]
    fn test_built_descriptor_resolves() {
        let layout = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": ["LINE1", "LINE2"],
            "path-2": [2, "3"],
            "gmode-2": ["subtract", "gauge"],
            "stack-2": ["1", 0],
            "sump": 1
        })))
        .unwrap();

        let bindings = crate::graph::resolve_descriptor(&layout.descriptor, |id| {
            let id: i64 = id.parse().ok()?;
            crate::graph::SingleSeries::from_record(&RawRecord {
                id,
                mode: Some("gauge".to_string()),
                render_type: Some("AREA".to_string()),
                ..Default::default()
            })
            .ok()
        })
        .unwrap();

        assert_eq!(bindings.len(), layout.components.len());
        for (binding, component) in bindings.iter().zip(&layout.components) {
            assert_eq!(binding.series.id().to_string(), component.reference_id);
            assert_eq!(binding.render_type, component.render_type);
            assert_eq!(binding.gmode, component.gmode);
            assert_eq!(binding.stacked, component.stacked);
        }
    }

    #[test]
    fn test_stored_common_keys_are_dropped() {
        let g = CompositeSeries::from_record(&record(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "description": "stale", "sort": 4, "color": "#FF0000"
        })))
        .unwrap();

        assert_eq!(g.base().description(), "");
        assert_eq!(g.base().sort(), 0);
        assert!(!g.base().meta().contains_key("description"));
        assert!(!g.base().meta().contains_key("sort"));
        assert_eq!(g.base().meta().get("color"), Some(&json!("#FF0000")));
        assert!(!g.base().meta_blob().contains("stale"));
    }

    #[test]
    fn test_length_mismatch() {
        let err = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": ["LINE1", "LINE1"],
            "path-2": [2, 3],
            "gmode-2": ["gauge", "gauge", "gauge"],
            "stack-2": [false, false]
        })))
        .unwrap_err();

        assert_eq!(
            err,
            GraphError::CompositeMismatch {
                types: 2,
                paths: 2,
                gmodes: 3,
                stacks: 2
            }
        );
    }

    #[test]
    fn test_missing_primary() {
        let err = build_layout(&meta(json!({"type-1": "AREA", "gmode-1": "gauge"}))).unwrap_err();
        assert_eq!(err, GraphError::MissingComponent("path-1"));

        let err = build_layout(&meta(json!({"type-1": null, "path-1": 1, "gmode-1": "gauge"})))
            .unwrap_err();
        assert_eq!(err, GraphError::MissingComponent("type-1"));

        let err = build_layout(&Meta::new()).unwrap_err();
        assert_eq!(err, GraphError::MissingComponent("type-1"));
    }

    #[test]
    fn test_null_secondary_entry() {
        let err = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": ["LINE1"], "path-2": [null], "gmode-2": ["gauge"], "stack-2": [false]
        })))
        .unwrap_err();
        assert_eq!(err, GraphError::MissingComponent("path-2"));
    }

    #[test]
    fn test_sumup_flag() {
        let on = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge", "sump": 1
        })))
        .unwrap();
        assert!(on.sumup);

        let off = build_layout(&meta(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge", "sump": "0"
        })))
        .unwrap();
        assert!(!off.sumup);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let value = json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge",
            "type-2": ["LINE1"], "path-2": [2], "gmode-2": ["gauge"], "stack-2": [true]
        });
        let a = CompositeSeries::from_record(&record(value.clone())).unwrap();
        let b = CompositeSeries::from_record(&record(value)).unwrap();
        assert_eq!(a.descriptor(), b.descriptor());
        assert_eq!(a.components(), b.components());
        assert_eq!(descriptor_for(a.components()), a.descriptor());
    }

    #[test]
    fn test_update_does_not_rebuild_layout() {
        let mut g = CompositeSeries::from_record(&record(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge"
        })))
        .unwrap();

        g.update(&meta(json!({
            "sort": 4,
            "color": "#FF0000",
            "type-2": ["LINE1"], "path-2": [9], "gmode-2": ["gauge"], "stack-2": [false]
        })))
        .unwrap();

        assert_eq!(g.base().sort(), 4);
        assert!(!g.base().meta().contains_key("sort"));
        // color is a plain attribute on composites
        assert_eq!(g.base().meta().get("color"), Some(&json!("#FF0000")));
        assert_eq!(g.descriptor(), "AREA:1:gauge:0");

        let fresh = g.rebuilt().unwrap();
        assert_eq!(fresh.descriptor(), "AREA:1:gauge:0:LINE1:9:gauge:false");
        assert_eq!(fresh.components().len(), 2);
        assert_eq!(fresh.base().sort(), 4);
    }

    #[test]
    fn test_rebuild_surfaces_bad_layout() {
        let mut g = CompositeSeries::from_record(&record(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge"
        })))
        .unwrap();
        g.update(&meta(json!({"type-2": ["LINE1"], "path-2": [2, 3]})))
            .unwrap();

        assert!(matches!(
            g.rebuilt().unwrap_err(),
            GraphError::CompositeMismatch { .. }
        ));
    }

    #[test]
    fn test_to_json() {
        let g = CompositeSeries::from_record(&record(json!({
            "type-1": "AREA", "path-1": 1, "gmode-1": "gauge", "sump": true
        })))
        .unwrap();
        let v = g.to_json();
        assert_eq!(v["complex"], "AREA:1:gauge:0");
        assert_eq!(v["sumup"], true);
        assert_eq!(v["data"][0]["graphid"], "1");
        assert_eq!(v["data"][0]["type"], "AREA");
        assert_eq!(v["graph_name"], "overview");
    }
}
