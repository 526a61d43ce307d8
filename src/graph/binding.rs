//! Binding composite components to concrete series for rendering.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use super::{CompositeSeries, GraphError, SingleSeries};

/// A single series together with how one composite wants it drawn.
///
/// The draw settings override the series' own `type`/`gmode` for one render
/// only; the stored definition is never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBinding {
    pub series: SingleSeries,
    pub render_type: String,
    pub gmode: String,
    pub stacked: bool,
}

impl SeriesBinding {
    pub fn to_json(&self) -> Value {
        json!({
            "graph_id": self.series.id(),
            "service_name": self.series.base().service(),
            "section_name": self.series.base().section(),
            "graph_name": self.series.base().graph(),
            "md5": self.series.md5(),
            "type": self.render_type,
            "gmode": self.gmode,
            "stack": self.stacked,
        })
    }
}

/// Whether a descriptor token marks a component as stacked (`1` or `true`,
/// any case).
pub fn is_stack_token(token: &str) -> bool {
    static STACK_RE: OnceLock<Regex> = OnceLock::new();
    let re = STACK_RE.get_or_init(|| Regex::new(r"(?i)^(1|true)$").unwrap());
    re.is_match(token)
}

/// Resolve every component of `composite`, in order.
///
/// Components whose series `lookup` cannot find are skipped.
pub fn resolve<F>(composite: &CompositeSeries, mut lookup: F) -> Vec<SeriesBinding>
where
    F: FnMut(&str) -> Option<SingleSeries>,
{
    composite
        .components()
        .iter()
        .filter_map(|c| {
            lookup(&c.reference_id).map(|series| SeriesBinding {
                series,
                render_type: c.render_type.clone(),
                gmode: c.gmode.clone(),
                stacked: c.stacked,
            })
        })
        .collect()
}

/// Resolve a raw `type:id:gmode:stacked[:...]` descriptor.
///
/// Unknown ids are skipped like in [`resolve`]. A descriptor that does not
/// split into whole four-field groups is rejected.
pub fn resolve_descriptor<F>(descriptor: &str, mut lookup: F) -> Result<Vec<SeriesBinding>, GraphError>
where
    F: FnMut(&str) -> Option<SingleSeries>,
{
    let tokens: Vec<&str> = descriptor.split(':').collect();
    if tokens.len() % 4 != 0 {
        return Err(GraphError::MalformedDescriptor(format!(
            "{} fields in {:?}, expected groups of 4",
            tokens.len(),
            descriptor
        )));
    }

    let bindings = tokens
        .chunks(4)
        .filter_map(|chunk| {
            let [render_type, id, gmode, stack] = chunk else {
                return None;
            };
            lookup(*id).map(|series| SeriesBinding {
                series,
                render_type: render_type.to_string(),
                gmode: gmode.to_string(),
                stacked: is_stack_token(stack),
            })
        })
        .collect();

    Ok(bindings)
}
