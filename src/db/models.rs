//! Database row mapping.

use rusqlite::Row;
use std::fmt;
use std::str::FromStr;

use crate::graph::RawRecord;

/// Columns selected for single-series rows, in [`series_from_row`] order.
pub const GRAPH_COLUMNS: &str = "id, service_name, section_name, graph_name, number, description, sort, meta, created_at, updated_at, \
     mode, gmode, color, ulimit, llimit, sulimit, sllimit, type, stype";

/// Columns selected for composite rows, in [`complex_from_row`] order.
pub const COMPLEX_COLUMNS: &str =
    "id, service_name, section_name, graph_name, number, description, sort, meta, created_at, updated_at";

/// Which table a definition lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Graph,
    Complex,
}

impl FromStr for GraphKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph" => Ok(Self::Graph),
            "complex" => Ok(Self::Complex),
            other => Err(format!("unknown graph type: {}", other)),
        }
    }
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph => write!(f, "graph"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// Map a `graphs` row selected with [`GRAPH_COLUMNS`].
pub fn series_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        mode: row.get(10)?,
        gmode: row.get(11)?,
        color: row.get(12)?,
        ulimit: row.get(13)?,
        llimit: row.get(14)?,
        sulimit: row.get(15)?,
        sllimit: row.get(16)?,
        render_type: row.get(17)?,
        stype: row.get(18)?,
        ..complex_from_row(row)?
    })
}

/// Map a `complex_graphs` row selected with [`COMPLEX_COLUMNS`].
pub fn complex_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        service_name: row.get(1)?,
        section_name: row.get(2)?,
        graph_name: row.get(3)?,
        number: row.get(4)?,
        description: row.get(5)?,
        sort: row.get(6)?,
        meta: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        ..Default::default()
    })
}
