//! Record identity: the PID derived from `user_id` and `measure_code`, and
//! deduplication on it.
//!
//! The same worker can appear in several measurements; since the measurement
//! is part of the PID those rows survive. Only repeats inside one measurement
//! collapse, keeping the first occurrence.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::freelance::etl::error::{EtlError, Result};
use crate::freelance::etl::model::{RawCell, RawDataset};
use crate::freelance::etl::normalize::Stage;
use crate::freelance::etl::schema::column;

/// Canonical PID for a worker in one measurement.
pub fn pid_for(user_id: &str, measure_code: &str) -> String {
    format!("{}_{}", user_id.to_uppercase(), measure_code.to_uppercase())
}

fn required_column(dataset: &RawDataset, stage: &'static str, name: &str) -> Result<usize> {
    dataset
        .column_index(name)
        .ok_or_else(|| EtlError::MissingColumn {
            stage,
            column: name.to_string(),
        })
}

/// Adds (or recomputes) the `pid` column.
pub struct GeneratePid;

impl Stage for GeneratePid {
    fn name(&self) -> &'static str {
        "generate_pid"
    }

    fn apply(&self, mut dataset: RawDataset) -> Result<RawDataset> {
        let user_id = required_column(&dataset, self.name(), column::USER_ID)?;
        let measure_code = required_column(&dataset, self.name(), column::MEASURE_CODE)?;

        let mut unkeyed = 0usize;
        dataset.derive_column(column::PID, |row| {
            match (row[user_id].as_text(), row[measure_code].as_text()) {
                (Some(user_id), Some(measure_code)) => {
                    RawCell::Text(pid_for(&user_id, &measure_code))
                }
                _ => {
                    unkeyed += 1;
                    RawCell::Missing
                }
            }
        });
        if unkeyed > 0 {
            warn!(rows = unkeyed, "rows without a measure_code left without pid");
        }
        Ok(dataset)
    }
}

/// Keeps the first row of every PID, in original order.
pub struct DeduplicatePid;

impl Stage for DeduplicatePid {
    fn name(&self) -> &'static str {
        "deduplicate_pid"
    }

    fn apply(&self, mut dataset: RawDataset) -> Result<RawDataset> {
        let pid = required_column(&dataset, self.name(), column::PID)?;
        let mut seen: HashSet<Option<String>> = HashSet::with_capacity(dataset.len());
        let dropped = dataset.retain_rows(|row| seen.insert(row[pid].as_text()));
        if dropped > 0 {
            info!(dropped, "removed duplicate records");
        }
        Ok(dataset)
    }
}
