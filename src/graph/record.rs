//! Raw definition rows as handed over by the store.

/// One stored definition row, before it is turned into a [`GraphDefinition`].
///
/// The single-series columns are optional: composite rows do not carry them,
/// and their absence is what marks a row as composite.
///
/// [`GraphDefinition`]: super::GraphDefinition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub id: i64,
    pub service_name: String,
    pub section_name: String,
    pub graph_name: String,
    pub number: i64,
    pub description: String,
    pub sort: i64,
    /// Extended-attribute blob (a JSON object).
    pub meta: Option<String>,
    /// Epoch seconds.
    pub created_at: i64,
    /// Epoch seconds.
    pub updated_at: i64,

    pub mode: Option<String>,
    pub gmode: Option<String>,
    pub color: Option<String>,
    pub ulimit: Option<i64>,
    pub llimit: Option<i64>,
    pub sulimit: Option<i64>,
    pub sllimit: Option<i64>,
    /// The `type` column.
    pub render_type: Option<String>,
    pub stype: Option<String>,
}

impl RawRecord {
    /// Whether this row has the shape of a single-series definition.
    pub fn is_single_series(&self) -> bool {
        self.mode.is_some() && self.render_type.is_some()
    }
}
