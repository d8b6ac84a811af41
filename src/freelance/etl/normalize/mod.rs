//! Column-level normalization stages and the driver that chains them.
//!
//! Each stage consumes a [`RawDataset`] and returns the next one. Stages never
//! fail because of an individual cell: a value that cannot be transformed
//! becomes [`RawCell::Missing`]. A stage only returns an error when it cannot
//! run at all, and the driver aborts the chain on the first such error.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::freelance::etl::error::{EtlError, Result};
use crate::freelance::etl::identity::{DeduplicatePid, GeneratePid};
use crate::freelance::etl::model::{RawCell, RawDataset};
use crate::freelance::etl::schema::{UNKNOWN, UPPERCASE_COLUMNS, column};

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid digit run regex"));
static EARNINGS_SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$+k]").expect("Invalid earnings symbol regex"));
static CURRENCY_SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$]").expect("Invalid currency symbol regex"));
static PERCENT_SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[%]").expect("Invalid percent symbol regex"));

/// One transformation over a whole dataset.
pub trait Stage {
    /// Stable identifier used in logs and summaries.
    fn name(&self) -> &'static str;

    fn apply(&self, dataset: RawDataset) -> Result<RawDataset>;
}

/// Row counts observed around one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: &'static str,
    pub rows_before: usize,
    pub rows_after: usize,
}

/// Runs an ordered list of stages.
pub struct Normalizer {
    stages: Vec<Box<dyn Stage>>,
}

impl Normalizer {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The column normalizer chain with the identity resolver folded in at the
    /// point where `user_id` is known to be present.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(CleanColumnNames),
            Box::new(RenameColumns::default()),
            Box::new(DropMissingUserId),
            Box::new(GeneratePid),
            Box::new(DeduplicatePid),
            Box::new(FillMissing::default()),
            Box::new(StripSymbols),
            Box::new(ExtractNumbers),
            Box::new(UppercaseColumns),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(&self, mut dataset: RawDataset) -> Result<(RawDataset, Vec<StageSummary>)> {
        let mut summaries = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let rows_before = dataset.len();
            dataset = match stage.apply(dataset) {
                Ok(next) => next,
                Err(err) => {
                    error!(stage = stage.name(), error = %err, "stage failed");
                    return Err(err);
                }
            };
            debug!(stage = stage.name(), rows_before, rows_after = dataset.len(), "stage applied");
            summaries.push(StageSummary {
                stage: stage.name(),
                rows_before,
                rows_after: dataset.len(),
            });
        }
        info!(rows = dataset.len(), stages = self.stages.len(), "normalization finished");
        Ok((dataset, summaries))
    }
}

/// Lower-cases column names and replaces spaces with underscores.
pub struct CleanColumnNames;

impl Stage for CleanColumnNames {
    fn name(&self) -> &'static str {
        "clean_column_names"
    }

    fn apply(&self, dataset: RawDataset) -> Result<RawDataset> {
        Ok(dataset.rename_columns(|name| name.replace(' ', "_").to_lowercase()))
    }
}

/// Renames source columns to their canonical names.
pub struct RenameColumns {
    mapping: Vec<(&'static str, &'static str)>,
}

impl Default for RenameColumns {
    fn default() -> Self {
        Self {
            mapping: vec![
                ("pol", column::GENDER),
                ("ratings", column::RATING),
                ("title", column::JOB_TITLE),
                ("job_success", column::JOB_SUCCESS),
                ("earnings", column::EARNINGS),
            ],
        }
    }
}

impl Stage for RenameColumns {
    fn name(&self) -> &'static str {
        "rename_columns"
    }

    fn apply(&self, dataset: RawDataset) -> Result<RawDataset> {
        Ok(dataset.rename_columns(|name| {
            self.mapping
                .iter()
                .find(|(from, _)| *from == name)
                .map_or_else(|| name.to_string(), |(_, to)| to.to_string())
        }))
    }
}

/// Drops rows without a `user_id`; they cannot be keyed downstream.
pub struct DropMissingUserId;

impl Stage for DropMissingUserId {
    fn name(&self) -> &'static str {
        "drop_missing_user_id"
    }

    fn apply(&self, mut dataset: RawDataset) -> Result<RawDataset> {
        let index = dataset
            .column_index(column::USER_ID)
            .ok_or_else(|| EtlError::MissingColumn {
                stage: self.name(),
                column: column::USER_ID.to_string(),
            })?;
        let dropped = dataset.retain_rows(|row| !row[index].is_missing());
        if dropped > 0 {
            info!(dropped, "dropped rows without user_id");
        }
        Ok(dataset)
    }
}

/// Replaces missing cells with a per-column default.
pub struct FillMissing {
    defaults: Vec<(&'static str, &'static str)>,
}

impl Default for FillMissing {
    fn default() -> Self {
        Self {
            defaults: vec![
                (column::GENDER, UNKNOWN),
                (column::EARNINGS, "0"),
                (column::JOB_SUCCESS, "0"),
                (column::RATING, UNKNOWN),
                (column::TOTAL_HOURS, "0"),
                (column::PRICE_PER_HOUR, "0"),
                (column::MAIN_PROFESSION, UNKNOWN),
                (column::JOB_TITLE, UNKNOWN),
                (column::COUNTRY, UNKNOWN),
                (column::CITY, UNKNOWN),
                (column::COMPLETED_JOBS, "0"),
                (column::REGION, UNKNOWN),
            ],
        }
    }
}

impl Stage for FillMissing {
    fn name(&self) -> &'static str {
        "fill_missing"
    }

    fn apply(&self, mut dataset: RawDataset) -> Result<RawDataset> {
        for (name, default) in &self.defaults {
            let mut filled = 0usize;
            let present = dataset.map_column(name, |cell| {
                if cell.is_missing() {
                    filled += 1;
                    RawCell::text(*default)
                } else {
                    cell.clone()
                }
            });
            if !present {
                debug!(column = name, "column absent, nothing to fill");
            } else if filled > 0 {
                debug!(column = name, filled, "filled missing values");
            }
        }
        Ok(dataset)
    }
}

/// Removes currency, sign and percent markers from numeric-as-string columns.
pub struct StripSymbols;

impl StripSymbols {
    fn patterns() -> [(&'static str, &'static Regex); 3] {
        [
            (column::EARNINGS, &*EARNINGS_SYMBOLS),
            (column::PRICE_PER_HOUR, &*CURRENCY_SYMBOLS),
            (column::JOB_SUCCESS, &*PERCENT_SYMBOLS),
        ]
    }
}

impl Stage for StripSymbols {
    fn name(&self) -> &'static str {
        "strip_symbols"
    }

    fn apply(&self, mut dataset: RawDataset) -> Result<RawDataset> {
        for (name, pattern) in Self::patterns() {
            dataset.map_column(name, |cell| match cell.as_text() {
                Some(text) => RawCell::Text(pattern.replace_all(&text, "").into_owned()),
                None => RawCell::Missing,
            });
        }
        Ok(dataset)
    }
}

/// Keeps the first run of decimal digits of each numeric column.
pub struct ExtractNumbers;

impl ExtractNumbers {
    const COLUMNS: [&'static str; 5] = [
        column::COMPLETED_JOBS,
        column::TOTAL_HOURS,
        column::PRICE_PER_HOUR,
        column::JOB_SUCCESS,
        column::EARNINGS,
    ];
}

/// First contiguous run of decimal digits in `text`.
pub fn first_digit_run(text: &str) -> Option<&str> {
    DIGIT_RUN.find(text).map(|found| found.as_str())
}

impl Stage for ExtractNumbers {
    fn name(&self) -> &'static str {
        "extract_numbers"
    }

    fn apply(&self, mut dataset: RawDataset) -> Result<RawDataset> {
        for name in Self::COLUMNS {
            let mut degraded = 0usize;
            dataset.map_column(name, |cell| {
                let digits = cell
                    .as_text()
                    .and_then(|text| first_digit_run(&text).map(str::to_string));
                match digits {
                    Some(digits) => RawCell::Text(digits),
                    None => {
                        if !cell.is_missing() {
                            degraded += 1;
                        }
                        RawCell::Missing
                    }
                }
            });
            if degraded > 0 {
                warn!(column = name, degraded, "values without digits set to missing");
            }
        }
        Ok(dataset)
    }
}

/// Upper-cases identifier and categorical columns.
pub struct UppercaseColumns;

impl Stage for UppercaseColumns {
    fn name(&self) -> &'static str {
        "uppercase_columns"
    }

    fn apply(&self, mut dataset: RawDataset) -> Result<RawDataset> {
        for name in UPPERCASE_COLUMNS {
            dataset.map_column(name, |cell| match cell.as_text() {
                Some(text) => RawCell::Text(text.to_uppercase()),
                None => RawCell::Missing,
            });
        }
        Ok(dataset)
    }
}
