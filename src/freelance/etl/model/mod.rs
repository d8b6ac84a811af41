use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::freelance::etl::error::{EtlError, Result};

/// A single spreadsheet cell before type coercion.
///
/// Serialises to the matching JSON primitive so the staging artifact stays a
/// plain record-per-line file: numbers as numbers, text as strings and missing
/// cells as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCell {
    Missing,
    Number(f64),
    Text(String),
}

impl RawCell {
    pub fn text(value: impl Into<String>) -> Self {
        RawCell::Text(value.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RawCell::Missing)
    }

    /// String rendering of the cell; `None` for missing cells. Integral numbers
    /// render without a fractional part.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawCell::Missing => None,
            RawCell::Number(value) => Some(value.to_string()),
            RawCell::Text(value) => Some(value.clone()),
        }
    }
}

/// One staging record: column name → cell, in source order.
///
/// Kept as an ordered list rather than a map so duplicate column names survive
/// deserialisation and can be reported by the extraction gate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    cells: Vec<(String, RawCell)>,
}

impl Record {
    pub fn new(cells: Vec<(String, RawCell)>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[(String, RawCell)] {
        &self.cells
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    /// First cell stored under `name`.
    pub fn get(&self, name: &str) -> Option<&RawCell> {
        self.cells
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, cell)| cell)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in &self.cells {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("an object mapping column names to cell values")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Record, A::Error> {
                let mut cells = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, cell)) = access.next_entry::<String, RawCell>()? {
                    cells.push((name, cell));
                }
                Ok(Record { cells })
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// A rectangular table of raw cells. Every row carries exactly one cell per
/// column; the constructors and mutators keep it that way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    columns: Vec<String>,
    rows: Vec<Vec<RawCell>>,
}

impl RawDataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<RawCell>>) -> Result<Self> {
        let mut dataset = Self::new(columns);
        dataset.rows.reserve(rows.len());
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Builds a dataset from staging records. The column set is the union of
    /// every record's columns in first-seen order; absent cells are missing.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for record in records {
            for name in record.column_names() {
                if !positions.contains_key(name) {
                    positions.insert(name.to_string(), columns.len());
                    columns.push(name.to_string());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                let mut row = vec![RawCell::Missing; columns.len()];
                for (index, name) in columns.iter().enumerate() {
                    if let Some(cell) = record.get(name) {
                        row[index] = cell.clone();
                    }
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                Record::new(
                    self.columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect(),
                )
            })
            .collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawCell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&RawCell> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|cells| &cells[index])
    }

    /// Iterates the cells of one column, top to bottom.
    pub fn column_cells(&self, name: &str) -> Option<impl Iterator<Item = &RawCell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    pub fn push_row(&mut self, row: Vec<RawCell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::RaggedRow {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Appends the rows of `other`, matching cells by column name. Columns of
    /// `other` unknown to `self` are ignored; columns it lacks become missing.
    pub fn append(&mut self, other: RawDataset) {
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|name| other.column_index(name))
            .collect();
        for mut row in other.rows {
            let aligned = mapping
                .iter()
                .map(|source| match source {
                    Some(index) => std::mem::replace(&mut row[*index], RawCell::Missing),
                    None => RawCell::Missing,
                })
                .collect();
            self.rows.push(aligned);
        }
    }

    /// Sets every cell of `name` to `value`, adding the column if needed.
    pub fn fill_constant(&mut self, name: &str, value: RawCell) {
        match self.column_index(name) {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = value.clone();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Appends a column computed from each existing row, or recomputes it in
    /// place when it already exists.
    pub fn derive_column<F>(&mut self, name: &str, mut derive: F)
    where
        F: FnMut(&[RawCell]) -> RawCell,
    {
        match self.column_index(name) {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = derive(row);
                }
            }
            None => {
                for row in &mut self.rows {
                    let value = derive(row);
                    row.push(value);
                }
                self.columns.push(name.to_string());
            }
        }
    }

    /// Projects the dataset onto `columns`, in that order. Columns the dataset
    /// lacks are synthesised as missing.
    pub fn conform_to(mut self, columns: &[&str]) -> Self {
        let mapping: Vec<Option<usize>> = columns
            .iter()
            .map(|name| self.column_index(name))
            .collect();
        let rows = self
            .rows
            .iter_mut()
            .map(|row| {
                mapping
                    .iter()
                    .map(|source| match source {
                        Some(index) => std::mem::replace(&mut row[*index], RawCell::Missing),
                        None => RawCell::Missing,
                    })
                    .collect()
            })
            .collect();
        Self {
            columns: columns.iter().map(|name| name.to_string()).collect(),
            rows,
        }
    }

    pub fn rename_columns<F>(mut self, mut rename: F) -> Self
    where
        F: FnMut(&str) -> String,
    {
        self.columns = self.columns.iter().map(|name| rename(name)).collect();
        self
    }

    /// Keeps only the rows accepted by `keep`; returns how many were dropped.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[RawCell]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Rewrites every cell of `name` in place. Returns `false` when the column
    /// is absent.
    pub fn map_column<F>(&mut self, name: &str, mut map: F) -> bool
    where
        F: FnMut(&RawCell) -> RawCell,
    {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            row[index] = map(&row[index]);
        }
        true
    }
}

/// A fully coerced worker record; one field per canonical column.
///
/// Numeric columns stay optional: unparseable numbers degrade to missing and the
/// post-transformation gate rejects any that remain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub user_id: String,
    pub gender: String,
    pub earnings_in_thousands: Option<f64>,
    pub job_success_perc: Option<f64>,
    pub rating: String,
    pub total_hours: Option<i64>,
    pub price_per_hour: Option<f64>,
    pub main_profession: String,
    pub job_title: String,
    pub country: String,
    pub city: String,
    pub completed_jobs: Option<i64>,
    pub country_code: String,
    pub region: String,
    pub measure_code: String,
    pub pid: String,
}
