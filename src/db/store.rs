//! SQLite database store implementation.

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use crate::graph::meta::{self, Meta, COMMON_RESERVED};
use crate::graph::{CompositeSeries, GraphDefinition, GraphError, RawRecord, SingleSeries};

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("Already exists")]
    Conflict,
    #[error("connection lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Thread-safe database store.
///
/// Every read-modify-write runs under the connection lock, so concurrent
/// edits of one definition are serialized here.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Raw records ---

    /// Fetch the raw single-series row with the given id.
    pub fn fetch_record(&self, id: i64) -> Result<Option<RawRecord>, DbError> {
        let conn = self.conn()?;
        query_series(&conn, id)
    }

    /// Fetch the raw single-series row with the given name.
    pub fn fetch_record_by_name(
        &self,
        service: &str,
        section: &str,
        graph: &str,
    ) -> Result<Option<RawRecord>, DbError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM graphs WHERE service_name = ?1 AND section_name = ?2 AND graph_name = ?3",
                    GRAPH_COLUMNS
                ),
                params![service, section, graph],
                series_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Fetch the raw composite row with the given id.
    pub fn fetch_complex_record(&self, id: i64) -> Result<Option<RawRecord>, DbError> {
        let conn = self.conn()?;
        query_complex(&conn, id)
    }

    /// Fetch the raw composite row with the given name.
    pub fn fetch_complex_record_by_name(
        &self,
        service: &str,
        section: &str,
        graph: &str,
    ) -> Result<Option<RawRecord>, DbError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM complex_graphs WHERE service_name = ?1 AND section_name = ?2 AND graph_name = ?3",
                    COMPLEX_COLUMNS
                ),
                params![service, section, graph],
                complex_from_row,
            )
            .optional()?;
        Ok(record)
    }

    // --- Single series ---

    /// Get a single series by id.
    pub fn get_by_id(&self, id: i64) -> Result<Option<SingleSeries>, DbError> {
        self.fetch_record(id)?
            .map(|r| SingleSeries::from_record(&r))
            .transpose()
            .map_err(DbError::from)
    }

    /// Get a single series by name.
    pub fn get(&self, service: &str, section: &str, graph: &str) -> Result<Option<SingleSeries>, DbError> {
        self.fetch_record_by_name(service, section, graph)?
            .map(|r| SingleSeries::from_record(&r))
            .transpose()
            .map_err(DbError::from)
    }

    /// Create a single series with default columns.
    pub fn create_graph(&self, service: &str, section: &str, graph: &str) -> Result<SingleSeries, DbError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO graphs (service_name, section_name, graph_name, meta, created_at, updated_at) \
             VALUES (?1, ?2, ?3, '{}', ?4, ?4)",
            params![service, section, graph, now],
        )
        .map_err(insert_error)?;
        let id = conn.last_insert_rowid();
        tracing::info!("Created graph {}/{}/{} (id={})", service, section, graph, id);

        let record = query_series(&conn, id)?.ok_or(DbError::NotFound)?;
        Ok(SingleSeries::from_record(&record)?)
    }

    /// Apply `changes` to a single series and persist it.
    pub fn update_graph(&self, id: i64, changes: &Meta) -> Result<SingleSeries, DbError> {
        let conn = self.conn()?;
        let record = query_series(&conn, id)?.ok_or(DbError::NotFound)?;
        let mut graph = SingleSeries::from_record(&record)?;
        graph.update(changes)?;

        let base = graph.base();
        conn.execute(
            "UPDATE graphs SET number=?1, description=?2, sort=?3, mode=?4, gmode=?5, color=?6, \
             ulimit=?7, llimit=?8, sulimit=?9, sllimit=?10, type=?11, stype=?12, meta=?13, updated_at=?14 \
             WHERE id=?15",
            params![
                base.number(),
                base.description(),
                base.sort(),
                graph.mode(),
                graph.gmode(),
                graph.color(),
                graph.ulimit(),
                graph.llimit(),
                graph.sulimit(),
                graph.sllimit(),
                graph.render_type(),
                graph.stype(),
                base.meta_blob(),
                Utc::now().timestamp(),
                id,
            ],
        )?;

        let record = query_series(&conn, id)?.ok_or(DbError::NotFound)?;
        Ok(SingleSeries::from_record(&record)?)
    }

    /// Delete a single series.
    pub fn remove(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM graphs WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        tracing::info!("Removed graph id={}", id);
        Ok(())
    }

    /// Get all single series.
    pub fn list_graphs(&self) -> Result<Vec<SingleSeries>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM graphs ORDER BY service_name, section_name, sort DESC, graph_name",
            GRAPH_COLUMNS
        ))?;
        let records = stmt
            .query_map([], series_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        let graphs = records
            .iter()
            .map(SingleSeries::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(graphs)
    }

    // --- Composites ---

    /// Get a composite by id.
    pub fn get_complex_by_id(&self, id: i64) -> Result<Option<CompositeSeries>, DbError> {
        self.fetch_complex_record(id)?
            .map(|r| CompositeSeries::from_record(&r))
            .transpose()
            .map_err(DbError::from)
    }

    /// Get a composite by name.
    pub fn get_complex(
        &self,
        service: &str,
        section: &str,
        graph: &str,
    ) -> Result<Option<CompositeSeries>, DbError> {
        self.fetch_complex_record_by_name(service, section, graph)?
            .map(|r| CompositeSeries::from_record(&r))
            .transpose()
            .map_err(DbError::from)
    }

    /// Create a composite from request fields.
    ///
    /// `number`, `description` and `sort` become columns; everything else is
    /// stored as extended attributes. The layout is validated before the row
    /// is written.
    pub fn create_complex(
        &self,
        service: &str,
        section: &str,
        graph: &str,
        fields: &Meta,
    ) -> Result<CompositeSeries, DbError> {
        let now = Utc::now().timestamp();
        let mut draft = CompositeSeries::from_record(&RawRecord {
            service_name: service.to_string(),
            section_name: section.to_string(),
            graph_name: graph.to_string(),
            meta: Some(meta::encode(&meta::clean(fields, COMMON_RESERVED))),
            created_at: now,
            updated_at: now,
            ..Default::default()
        })?;
        draft.update(fields)?;

        let conn = self.conn()?;
        let base = draft.base();
        conn.execute(
            "INSERT INTO complex_graphs (service_name, section_name, graph_name, number, description, sort, meta, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                service,
                section,
                graph,
                base.number(),
                base.description(),
                base.sort(),
                base.meta_blob(),
                now,
            ],
        )
        .map_err(insert_error)?;
        let id = conn.last_insert_rowid();
        tracing::info!("Created complex graph {}/{}/{} (id={})", service, section, graph, id);

        let record = query_complex(&conn, id)?.ok_or(DbError::NotFound)?;
        Ok(CompositeSeries::from_record(&record)?)
    }

    /// Apply `changes` to a composite and persist it.
    ///
    /// The composite is rebuilt from the edited attributes before anything is
    /// written, so a broken layout leaves the stored row as it was.
    pub fn update_complex(&self, id: i64, changes: &Meta) -> Result<CompositeSeries, DbError> {
        let conn = self.conn()?;
        let record = query_complex(&conn, id)?.ok_or(DbError::NotFound)?;
        let mut graph = CompositeSeries::from_record(&record)?;
        graph.update(changes)?;
        let graph = graph.rebuilt()?;

        let base = graph.base();
        conn.execute(
            "UPDATE complex_graphs SET number=?1, description=?2, sort=?3, meta=?4, updated_at=?5 WHERE id=?6",
            params![
                base.number(),
                base.description(),
                base.sort(),
                base.meta_blob(),
                Utc::now().timestamp(),
                id,
            ],
        )?;

        let record = query_complex(&conn, id)?.ok_or(DbError::NotFound)?;
        Ok(CompositeSeries::from_record(&record)?)
    }

    /// Delete a composite.
    pub fn remove_complex(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM complex_graphs WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        tracing::info!("Removed complex graph id={}", id);
        Ok(())
    }

    /// Get all composites.
    ///
    /// A stored composite whose layout no longer builds fails the whole call.
    pub fn list_complex(&self) -> Result<Vec<CompositeSeries>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM complex_graphs ORDER BY service_name, section_name, sort DESC, graph_name",
            COMPLEX_COLUMNS
        ))?;
        let records = stmt
            .query_map([], complex_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        let graphs = records
            .iter()
            .map(CompositeSeries::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(graphs)
    }

    // --- Mixed ---

    /// Get every definition of a section, both kinds, highest `sort` first.
    pub fn get_graphs(&self, service: &str, section: &str) -> Result<Vec<GraphDefinition>, DbError> {
        let conn = self.conn()?;

        let mut records = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM graphs WHERE service_name = ?1 AND section_name = ?2",
                GRAPH_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![service, section], series_from_row)?
                .collect::<SqlResult<Vec<_>>>()?;
            rows
        };
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM complex_graphs WHERE service_name = ?1 AND section_name = ?2",
                COMPLEX_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![service, section], complex_from_row)?
                .collect::<SqlResult<Vec<_>>>()?;
            records.extend(rows);
        }

        let mut graphs = records
            .iter()
            .map(GraphDefinition::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        graphs.sort_by(|a, b| {
            b.base()
                .sort()
                .cmp(&a.base().sort())
                .then_with(|| a.base().graph().cmp(b.base().graph()))
        });
        Ok(graphs)
    }

    /// Get every definition, single series first.
    pub fn list_all(&self) -> Result<Vec<GraphDefinition>, DbError> {
        let mut all: Vec<GraphDefinition> = self
            .list_graphs()?
            .into_iter()
            .map(GraphDefinition::Single)
            .collect();
        all.extend(self.list_complex()?.into_iter().map(GraphDefinition::Composite));
        Ok(all)
    }

    /// Delete a definition of either kind.
    pub fn remove_definition(&self, graph: &GraphDefinition) -> Result<(), DbError> {
        match graph {
            GraphDefinition::Single(g) => self.remove(g.id()),
            GraphDefinition::Composite(g) => self.remove_complex(g.id()),
        }
    }
}

/// A unique-name violation means another writer created the row first.
fn insert_error(e: rusqlite::Error) -> DbError {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            DbError::Conflict
        }
        e => DbError::Sqlite(e),
    }
}

fn query_series(conn: &Connection, id: i64) -> Result<Option<RawRecord>, DbError> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM graphs WHERE id = ?1", GRAPH_COLUMNS),
            params![id],
            series_from_row,
        )
        .optional()?;
    Ok(record)
}

fn query_complex(conn: &Connection, id: i64) -> Result<Option<RawRecord>, DbError> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM complex_graphs WHERE id = ?1", COMPLEX_COLUMNS),
            params![id],
            complex_from_row,
        )
        .optional()?;
    Ok(record)
}
