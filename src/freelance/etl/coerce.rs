//! Converts the normalized raw dataset into typed [`WorkerRecord`]s.
//!
//! Numeric parsing is lenient: a cell that does not parse becomes missing. The
//! final cast is strict: a column whose cells cannot take the declared type
//! aborts the pipeline, because the data no longer has the contract's shape.

use tracing::{info, instrument, warn};

use crate::freelance::etl::error::{EtlError, Result};
use crate::freelance::etl::model::{RawCell, RawDataset, WorkerRecord};
use crate::freelance::etl::schema::{
    CANONICAL_COLUMNS, ColumnType, FEMALE, MALE, NUMERIC_COLUMNS, canonical_type, column,
};

/// Source values are recorded in thousands.
pub const EARNINGS_SCALE: f64 = 1000.0;

/// 2^63: the first float past the `i64` range.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Exact `i64` value of an integral float inside the `i64` range.
fn integral(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && (-I64_LIMIT..I64_LIMIT).contains(&value)).then_some(value as i64)
}

/// Applies numeric parsing, earnings scaling and gender decoding, then casts
/// every canonical column.
#[derive(Debug, Default)]
pub struct CoercionEngine;

impl CoercionEngine {
    #[instrument(level = "info", skip_all, fields(rows = dataset.len()))]
    pub fn coerce(&self, mut dataset: RawDataset) -> Result<Vec<WorkerRecord>> {
        parse_numeric_columns(&mut dataset);
        scale_earnings(&mut dataset);
        decode_gender(&mut dataset);
        let records = cast_records(&dataset)?;
        info!(records = records.len(), "coerced records to canonical types");
        Ok(records)
    }
}

/// Parses the numeric columns; unparseable cells become missing.
pub fn parse_numeric_columns(dataset: &mut RawDataset) {
    for name in NUMERIC_COLUMNS {
        let mut degraded = 0usize;
        dataset.map_column(name, |cell| match cell {
            RawCell::Text(text) => match text.trim().parse::<f64>() {
                Ok(value) => RawCell::Number(value),
                Err(_) => {
                    degraded += 1;
                    RawCell::Missing
                }
            },
            other => other.clone(),
        });
        if degraded > 0 {
            warn!(column = name, degraded, "non-numeric values set to missing");
        }
    }
}

pub fn scale_earnings(dataset: &mut RawDataset) {
    dataset.map_column(column::EARNINGS, |cell| match cell {
        RawCell::Number(value) => RawCell::Number(value * EARNINGS_SCALE),
        other => other.clone(),
    });
}

/// Maps the coded gender domain `{0, 1}` to `FEMALE`/`MALE`. Other integer
/// codes are kept as their decimal text so the post-transformation gate can
/// reject them; text values are left untouched.
pub fn decode_gender(dataset: &mut RawDataset) {
    let mut unrecognised = 0usize;
    dataset.map_column(column::GENDER, |cell| {
        let code = match cell {
            RawCell::Number(value) => integral(*value),
            RawCell::Text(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        match code {
            Some(0) => RawCell::text(FEMALE),
            Some(1) => RawCell::text(MALE),
            Some(other) => {
                unrecognised += 1;
                RawCell::Text(other.to_string())
            }
            None => cell.clone(),
        }
    });
    if unrecognised > 0 {
        warn!(rows = unrecognised, "unrecognised gender codes left undecoded");
    }
}

/// Casts the dataset to typed records. The dataset must carry exactly the
/// canonical columns.
pub fn cast_records(dataset: &RawDataset) -> Result<Vec<WorkerRecord>> {
    for name in dataset.columns() {
        if canonical_type(name).is_none() {
            return Err(EtlError::Coercion {
                column: name.clone(),
                expected: ColumnType::String,
                reason: "column is not part of the canonical schema".to_string(),
            });
        }
    }
    let mut indices = Vec::with_capacity(CANONICAL_COLUMNS.len());
    for spec in &CANONICAL_COLUMNS {
        let index = dataset
            .column_index(spec.name)
            .ok_or_else(|| EtlError::Coercion {
                column: spec.name.to_string(),
                expected: spec.column_type,
                reason: "column is absent".to_string(),
            })?;
        indices.push(index);
    }

    dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            let cells = RowCells {
                row,
                row_index,
                indices: &indices,
            };
            Ok(WorkerRecord {
                user_id: cells.string(0)?,
                gender: cells.string(1)?,
                earnings_in_thousands: cells.float(2)?,
                job_success_perc: cells.float(3)?,
                rating: cells.string(4)?,
                total_hours: cells.integer(5)?,
                price_per_hour: cells.float(6)?,
                main_profession: cells.string(7)?,
                job_title: cells.string(8)?,
                country: cells.string(9)?,
                city: cells.string(10)?,
                completed_jobs: cells.integer(11)?,
                country_code: cells.string(12)?,
                region: cells.string(13)?,
                measure_code: cells.string(14)?,
                pid: cells.string(15)?,
            })
        })
        .collect()
}

/// One row viewed through the canonical column order.
struct RowCells<'a> {
    row: &'a [RawCell],
    row_index: usize,
    indices: &'a [usize],
}

impl RowCells<'_> {
    fn cell(&self, position: usize) -> &RawCell {
        &self.row[self.indices[position]]
    }

    fn failure(&self, position: usize, reason: String) -> EtlError {
        let spec = CANONICAL_COLUMNS[position];
        EtlError::Coercion {
            column: spec.name.to_string(),
            expected: spec.column_type,
            reason: format!("{reason} in row {}", self.row_index),
        }
    }

    fn string(&self, position: usize) -> Result<String> {
        self.cell(position)
            .as_text()
            .ok_or_else(|| self.failure(position, "missing value".to_string()))
    }

    fn float(&self, position: usize) -> Result<Option<f64>> {
        match self.cell(position) {
            RawCell::Missing => Ok(None),
            RawCell::Number(value) => Ok(Some(*value)),
            RawCell::Text(text) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.failure(position, format!("'{text}' is not a number"))),
        }
    }

    /// Missing stays missing; a present value must be an in-range integer.
    fn integer(&self, position: usize) -> Result<Option<i64>> {
        match self.cell(position) {
            RawCell::Missing => Ok(None),
            RawCell::Number(value) => integral(*value).map(Some).ok_or_else(|| {
                self.failure(position, format!("{value} is not a 64-bit integer"))
            }),
            RawCell::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| self.failure(position, format!("'{text}' is not an integer"))),
        }
    }
}
