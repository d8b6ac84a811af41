//! Relational store for the four output relations.
//!
//! Loads are append-only and run inside a single transaction: either every
//! relation receives its rows or none does.

use std::path::Path;

use polars::prelude::{DataFrame, DataType};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use tracing::{info, instrument};

use crate::freelance::etl::error::{EtlError, Result};
use crate::freelance::etl::partition::Relation;
use crate::freelance::etl::schema::{ColumnType, canonical_type};

/// Rows appended per relation by one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub rows: Vec<(Relation, usize)>,
}

pub struct Warehouse {
    db: Connection,
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        let warehouse = Self { db };
        warehouse.ensure_schema()?;
        Ok(warehouse)
    }

    fn ensure_schema(&self) -> Result<()> {
        for relation in Relation::ALL {
            self.db.execute(&create_table_sql(relation), [])?;
        }
        Ok(())
    }

    /// Appends every relation's rows in one transaction. The frames must carry
    /// the relation's columns; extra columns are ignored.
    #[instrument(level = "info", skip_all, fields(relations = frames.len()))]
    pub fn append(&mut self, frames: &[(Relation, DataFrame)]) -> Result<LoadSummary> {
        let tx = self.db.transaction()?;
        let mut summary = LoadSummary::default();
        for (relation, frame) in frames {
            let projected = frame.select(relation.columns().iter().copied())?;
            let rows = frame_rows(&projected)?;
            {
                let mut statement = tx.prepare(&insert_sql(*relation))?;
                for row in &rows {
                    statement.execute(params_from_iter(row.iter()))?;
                }
            }
            info!(relation = %relation, rows = rows.len(), "rows staged for insert");
            summary.rows.push((*relation, rows.len()));
        }
        tx.commit()?;
        Ok(summary)
    }

    pub fn row_count(&self, relation: Relation) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", relation.table_name());
        let count: i64 = self.db.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn sql_type(name: &str) -> &'static str {
    match canonical_type(name) {
        Some(ColumnType::Float) => "REAL",
        Some(ColumnType::Integer) => "INTEGER",
        _ => "TEXT",
    }
}

fn create_table_sql(relation: Relation) -> String {
    let columns: Vec<String> = relation
        .columns()
        .iter()
        .map(|name| format!("{name} {} NOT NULL", sql_type(name)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({}, PRIMARY KEY (pid, user_id))",
        relation.table_name(),
        columns.join(", ")
    )
}

fn insert_sql(relation: Relation) -> String {
    let columns = relation.columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        relation.table_name(),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Row-major SQL values of a frame.
fn frame_rows(frame: &DataFrame) -> Result<Vec<Vec<Value>>> {
    let mut rows: Vec<Vec<Value>> = vec![Vec::with_capacity(frame.width()); frame.height()];
    for series in frame.get_columns() {
        match series.dtype() {
            DataType::String => {
                for (row, value) in rows.iter_mut().zip(series.str()?.into_iter()) {
                    row.push(value.map_or(Value::Null, |text| Value::Text(text.to_string())));
                }
            }
            DataType::Float64 => {
                for (row, value) in rows.iter_mut().zip(series.f64()?.into_iter()) {
                    row.push(value.map_or(Value::Null, Value::Real));
                }
            }
            DataType::Int64 => {
                for (row, value) in rows.iter_mut().zip(series.i64()?.into_iter()) {
                    row.push(value.map_or(Value::Null, Value::Integer));
                }
            }
            other => {
                return Err(EtlError::UnsupportedColumnType {
                    column: series.name().to_string(),
                    dtype: other.to_string(),
                });
            }
        }
    }
    Ok(rows)
}
