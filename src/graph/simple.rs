//! Single-series definitions.

use md5::{Digest, Md5};
use serde_json::{json, Value};

use super::meta::{Meta, SERIES_RESERVED};
use super::{int_field, text_field, value_token, GraphBase, GraphError, RawRecord};

pub const DEFAULT_MODE: &str = "gauge";
pub const DEFAULT_GMODE: &str = "gauge";
pub const DEFAULT_COLOR: &str = "#00CC00";
pub const DEFAULT_ULIMIT: i64 = 1_000_000_000_000_000;
pub const DEFAULT_LLIMIT: i64 = 0;
pub const DEFAULT_SULIMIT: i64 = 100_000;
pub const DEFAULT_SLLIMIT: i64 = 0;
pub const DEFAULT_RENDER_TYPE: &str = "AREA";
pub const DEFAULT_ADJUST: &str = "*";
pub const DEFAULT_ADJUSTVAL: &str = "1";
pub const DEFAULT_UNIT: &str = "";

/// A definition that draws one stored series.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleSeries {
    base: GraphBase,
    mode: String,
    gmode: String,
    color: String,
    ulimit: i64,
    llimit: i64,
    sulimit: i64,
    sllimit: i64,
    render_type: String,
    stype: String,
    md5: String,
    adjust: String,
    adjustval: String,
    unit: String,
}

impl SingleSeries {
    pub fn from_record(record: &RawRecord) -> Result<Self, GraphError> {
        let base = GraphBase::from_record(record, SERIES_RESERVED)?;
        let md5 = id_digest(base.id());

        let mut series = Self {
            base,
            mode: record.mode.clone().unwrap_or_else(|| DEFAULT_MODE.to_string()),
            gmode: record.gmode.clone().unwrap_or_else(|| DEFAULT_GMODE.to_string()),
            color: record.color.clone().unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            ulimit: record.ulimit.unwrap_or(DEFAULT_ULIMIT),
            llimit: record.llimit.unwrap_or(DEFAULT_LLIMIT),
            sulimit: record.sulimit.unwrap_or(DEFAULT_SULIMIT),
            sllimit: record.sllimit.unwrap_or(DEFAULT_SLLIMIT),
            render_type: record
                .render_type
                .clone()
                .unwrap_or_else(|| DEFAULT_RENDER_TYPE.to_string()),
            stype: record.stype.clone().unwrap_or_else(|| DEFAULT_RENDER_TYPE.to_string()),
            md5,
            adjust: String::new(),
            adjustval: String::new(),
            unit: String::new(),
        };
        series.read_adjustments();
        Ok(series)
    }

    pub fn base(&self) -> &GraphBase {
        &self.base
    }

    pub fn id(&self) -> i64 {
        self.base.id()
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn gmode(&self) -> &str {
        &self.gmode
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn ulimit(&self) -> i64 {
        self.ulimit
    }

    pub fn llimit(&self) -> i64 {
        self.llimit
    }

    pub fn sulimit(&self) -> i64 {
        self.sulimit
    }

    pub fn sllimit(&self) -> i64 {
        self.sllimit
    }

    /// Primary draw type (`type` column).
    pub fn render_type(&self) -> &str {
        &self.render_type
    }

    /// Draw type used when stacked (`stype` column).
    pub fn stype(&self) -> &str {
        &self.stype
    }

    /// Hex MD5 of the decimal id. Stable keying material for external caches.
    pub fn md5(&self) -> &str {
        &self.md5
    }

    pub fn adjust(&self) -> &str {
        &self.adjust
    }

    pub fn adjustval(&self) -> &str {
        &self.adjustval
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Apply `changes` in place.
    ///
    /// Keys naming a column update that column. Every other key is merged
    /// into the extended attributes, which are then stripped of reserved keys
    /// and re-encoded. On error nothing is modified.
    pub fn update(&mut self, changes: &Meta) -> Result<(), GraphError> {
        let mut next = self.clone();
        next.apply(changes)?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, changes: &Meta) -> Result<(), GraphError> {
        let mut merged = self.base.meta().clone();

        for (key, value) in changes {
            if self.base.apply_common(key, value)? {
                continue;
            }
            match key.as_str() {
                "mode" => self.mode = text_field(key, value)?,
                "gmode" => self.gmode = text_field(key, value)?,
                "color" => self.color = text_field(key, value)?,
                "ulimit" => self.ulimit = int_field(key, value)?,
                "llimit" => self.llimit = int_field(key, value)?,
                "sulimit" => self.sulimit = int_field(key, value)?,
                "sllimit" => self.sllimit = int_field(key, value)?,
                "type" => self.render_type = text_field(key, value)?,
                "stype" => self.stype = text_field(key, value)?,
                _ => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }

        self.base.store_meta(merged, SERIES_RESERVED);
        self.read_adjustments();
        Ok(())
    }

    fn read_adjustments(&mut self) {
        let meta = self.base.meta();
        let read = |key: &str, default: &str| {
            meta.get(key)
                .and_then(value_token)
                .unwrap_or_else(|| default.to_string())
        };
        let adjust = read("adjust", DEFAULT_ADJUST);
        let adjustval = read("adjustval", DEFAULT_ADJUSTVAL);
        let unit = read("unit", DEFAULT_UNIT);

        self.adjust = adjust;
        self.adjustval = adjustval;
        self.unit = unit;
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.base.common_json();
        let columns = json!({
            "mode": self.mode,
            "gmode": self.gmode,
            "color": self.color,
            "ulimit": self.ulimit,
            "llimit": self.llimit,
            "sulimit": self.sulimit,
            "sllimit": self.sllimit,
            "type": self.render_type,
            "stype": self.stype,
            "md5": self.md5,
            "adjust": self.adjust,
            "adjustval": self.adjustval,
            "unit": self.unit,
        });
        if let Value::Object(columns) = columns {
            map.extend(columns);
        }
        Value::Object(map)
    }

    pub fn to_record(&self) -> RawRecord {
        RawRecord {
            mode: Some(self.mode.clone()),
            gmode: Some(self.gmode.clone()),
            color: Some(self.color.clone()),
            ulimit: Some(self.ulimit),
            llimit: Some(self.llimit),
            sulimit: Some(self.sulimit),
            sllimit: Some(self.sllimit),
            render_type: Some(self.render_type.clone()),
            stype: Some(self.stype.clone()),
            ..self.base.to_record()
        }
    }
}

fn id_digest(id: i64) -> String {
    let mut hasher = Md5::new();
    hasher.update(id.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> RawRecord {
        RawRecord {
            id: 1,
            service_name: "app".to_string(),
            section_name: "db".to_string(),
            graph_name: "queries".to_string(),
            meta: Some(r#"{"unit":"qps","owner":"ops"}"#.to_string()),
            mode: Some("gauge".to_string()),
            render_type: Some("LINE1".to_string()),
            ..Default::default()
        }
    }

    fn changes(value: Value) -> Meta {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults() {
        let g = SingleSeries::from_record(&record()).unwrap();
        assert_eq!(g.mode(), "gauge");
        assert_eq!(g.gmode(), "gauge");
        assert_eq!(g.color(), "#00CC00");
        assert_eq!(g.ulimit(), 1_000_000_000_000_000);
        assert_eq!(g.llimit(), 0);
        assert_eq!(g.sulimit(), 100_000);
        assert_eq!(g.sllimit(), 0);
        assert_eq!(g.render_type(), "LINE1");
        assert_eq!(g.stype(), "AREA");
        assert_eq!(g.adjust(), "*");
        assert_eq!(g.adjustval(), "1");
        assert_eq!(g.unit(), "qps");
    }

    #[test]
    fn test_md5_of_id() {
        let g = SingleSeries::from_record(&record()).unwrap();
        // md5("1")
        assert_eq!(g.md5(), "c4ca4238a0b923820dcc509a6f75849b");

        let again = SingleSeries::from_record(&record()).unwrap();
        assert_eq!(g.md5(), again.md5());
    }

    #[test]
    fn test_adjustval_number_in_meta() {
        let mut r = record();
        r.meta = Some(r#"{"adjust":"/","adjustval":1000}"#.to_string());
        let g = SingleSeries::from_record(&r).unwrap();
        assert_eq!(g.adjust(), "/");
        assert_eq!(g.adjustval(), "1000");
        assert_eq!(g.unit(), "");
    }

    #[test]
    fn test_fractional_limit_rejected() {
        let mut g = SingleSeries::from_record(&record()).unwrap();
        let err = g
            .update(&changes(json!({"ulimit": 0.75, "llimit": 1e30})))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidField { .. }));
        assert_eq!(g.ulimit(), DEFAULT_ULIMIT);
        assert_eq!(g.llimit(), DEFAULT_LLIMIT);
    }

    #[test]
    fn test_stored_reserved_keys_are_dropped() {
        let mut r = record();
        r.meta = Some(r##"{"color":"#FF0000","sort":9,"unit":"x"}"##.to_string());
        let g = SingleSeries::from_record(&r).unwrap();

        assert_eq!(g.color(), "#00CC00");
        assert_eq!(g.base().sort(), 0);
        assert!(!g.base().meta().contains_key("color"));
        assert!(!g.base().meta().contains_key("sort"));
        assert_eq!(g.base().meta_blob(), r#"{"unit":"x"}"#);
        assert_eq!(g.to_json()["meta"], r#"{"unit":"x"}"#);
    }

    #[test]
    fn test_clean_blob_kept_verbatim() {
        let g = SingleSeries::from_record(&record()).unwrap();
        assert_eq!(g.base().meta_blob(), r#"{"unit":"qps","owner":"ops"}"#);
    }

    #[test]
    fn test_update_splits_columns_and_meta() {
        let mut g = SingleSeries::from_record(&record()).unwrap();
        g.update(&changes(json!({"color": "#FF0000", "customkey": "x"})))
            .unwrap();

        assert_eq!(g.color(), "#FF0000");
        assert_eq!(g.base().meta().get("customkey"), Some(&json!("x")));
        assert!(!g.base().meta().contains_key("color"));
        assert_eq!(g.base().meta().get("owner"), Some(&json!("ops")));
        assert!(g.base().meta_blob().contains("\"customkey\":\"x\""));
        assert!(!g.base().meta_blob().contains("color"));
    }

    #[test]
    fn test_update_every_column() {
        let mut g = SingleSeries::from_record(&record()).unwrap();
        g.update(&changes(json!({
            "number": 42,
            "description": "read queries",
            "sort": "5",
            "mode": "subtract",
            "gmode": "subtract",
            "ulimit": 500,
            "llimit": -5,
            "sulimit": 50,
            "sllimit": 1,
            "type": "LINE2",
            "stype": "LINE1"
        })))
        .unwrap();

        assert_eq!(g.base().number(), 42);
        assert_eq!(g.base().description(), "read queries");
        assert_eq!(g.base().sort(), 5);
        assert_eq!(g.mode(), "subtract");
        assert_eq!(g.gmode(), "subtract");
        assert_eq!(g.ulimit(), 500);
        assert_eq!(g.llimit(), -5);
        assert_eq!(g.sulimit(), 50);
        assert_eq!(g.sllimit(), 1);
        assert_eq!(g.render_type(), "LINE2");
        assert_eq!(g.stype(), "LINE1");
        for key in SERIES_RESERVED {
            assert!(!g.base().meta().contains_key(*key));
        }
    }

    #[test]
    fn test_update_rejects_structural_keys_from_meta() {
        let mut g = SingleSeries::from_record(&record()).unwrap();
        g.update(&changes(json!({"id": 99, "graph_name": "renamed", "unit": "ops"})))
            .unwrap();

        assert_eq!(g.id(), 1);
        assert_eq!(g.base().graph(), "queries");
        assert!(!g.base().meta().contains_key("id"));
        assert!(!g.base().meta().contains_key("graph_name"));
        assert_eq!(g.unit(), "ops");
    }

    #[test]
    fn test_update_failure_leaves_definition_untouched() {
        let mut g = SingleSeries::from_record(&record()).unwrap();
        let before = g.clone();
        let err = g
            .update(&changes(json!({"color": "#123456", "ulimit": [1, 2]})))
            .unwrap_err();

        assert!(matches!(err, GraphError::InvalidField { .. }));
        assert_eq!(g, before);
    }

    #[test]
    fn test_to_json_fields() {
        let g = SingleSeries::from_record(&record()).unwrap();
        let v = g.to_json();
        assert_eq!(v["graph_name"], "queries");
        assert_eq!(v["type"], "LINE1");
        assert_eq!(v["md5"], "c4ca4238a0b923820dcc509a6f75849b");
        assert_eq!(v["unit"], "qps");
        assert_eq!(v["ulimit"], 1_000_000_000_000_000i64);
    }

    #[test]
    fn test_to_record_round_trip() {
        let mut g = SingleSeries::from_record(&record()).unwrap();
        g.update(&changes(json!({"color": "#000000", "unit": "rps"})))
            .unwrap();
        let rebuilt = SingleSeries::from_record(&g.to_record()).unwrap();
        assert_eq!(rebuilt, g);
    }
}
