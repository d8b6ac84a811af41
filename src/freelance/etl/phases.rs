use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::freelance::etl::coerce::CoercionEngine;
use crate::freelance::etl::config::PipelineConfig;
use crate::freelance::etl::error::Result;
use crate::freelance::etl::io::store::{LoadSummary, Warehouse};
use crate::freelance::etl::io::{excel_read, parquet, staging};
use crate::freelance::etl::identity::DeduplicatePid;
use crate::freelance::etl::model::{RawDataset, WorkerRecord};
use crate::freelance::etl::normalize::{DropMissingUserId, Normalizer, Stage, StageSummary};
use crate::freelance::etl::partition::{Relation, Table, partition};
use crate::freelance::etl::schema::REQUIRED_INPUT_COLUMNS;
use crate::freelance::etl::validate;

/// Sheets and rows gathered by one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub sheets: usize,
    pub rows: usize,
}

/// Row counts around one transformation, per normalizer stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    pub rows_in: usize,
    pub dropped_without_user_id: usize,
    pub dropped_duplicates: usize,
    /// Numeric cells left missing after numeric parsing.
    pub degraded_cells: usize,
    pub rows_out: usize,
    pub stages: Vec<StageSummary>,
}

impl TransformSummary {
    fn new(rows_in: usize, records: &[WorkerRecord], stages: Vec<StageSummary>) -> Self {
        let dropped_by = |name: &str| {
            stages
                .iter()
                .find(|summary| summary.stage == name)
                .map_or(0, |summary| summary.rows_before - summary.rows_after)
        };
        let degraded_cells = records
            .iter()
            .map(|record| {
                let floats = [
                    record.earnings_in_thousands,
                    record.job_success_perc,
                    record.price_per_hour,
                ];
                let integers = [record.total_hours, record.completed_jobs];
                floats.iter().filter(|value| value.is_none()).count()
                    + integers.iter().filter(|value| value.is_none()).count()
            })
            .sum();
        Self {
            rows_in,
            dropped_without_user_id: dropped_by(DropMissingUserId.name()),
            dropped_duplicates: dropped_by(DeduplicatePid.name()),
            degraded_cells,
            rows_out: records.len(),
            stages,
        }
    }
}

/// Reads every sheet of every source workbook into the staging artifact.
#[instrument(
    level = "info",
    skip_all,
    fields(sources = config.sources.len(), output = %config.staging_path().display())
)]
pub fn extract(config: &PipelineConfig) -> Result<ExtractSummary> {
    let mut combined = RawDataset::new(
        REQUIRED_INPUT_COLUMNS
            .iter()
            .map(|name| name.to_string())
            .collect(),
    );
    let mut summary = ExtractSummary::default();

    for source in &config.sources {
        for sheet in excel_read::read_sheets(source)? {
            let missing: Vec<&str> = REQUIRED_INPUT_COLUMNS
                .iter()
                .copied()
                .filter(|name| !sheet.dataset.has_column(name))
                .collect();
            if !missing.is_empty() {
                warn!(sheet = %sheet.sheet_name, ?missing, "sheet lacks input columns");
            }
            debug!(sheet = %sheet.sheet_name, rows = sheet.dataset.len(), "sheet extracted");
            summary.sheets += 1;
            combined.append(sheet.dataset.conform_to(&REQUIRED_INPUT_COLUMNS));
        }
    }

    summary.rows = combined.len();
    staging::write_staging(&config.staging_path(), &combined)?;
    info!(sheets = summary.sheets, rows = summary.rows, "staging artifact written");
    Ok(summary)
}

/// Post-extraction gate over the staging artifact.
#[instrument(level = "info", skip_all, fields(input = %config.staging_path().display()))]
pub fn validate_extraction(config: &PipelineConfig) -> Result<()> {
    validate::validate_extraction(&config.staging_path())?;
    info!("staging artifact passed validation");
    Ok(())
}

/// Normalizes, deduplicates, coerces and partitions the staging artifact,
/// then writes the relation snapshots and the transformed snapshot together.
#[instrument(level = "info", skip_all, fields(input = %config.staging_path().display()))]
pub fn transform(config: &PipelineConfig) -> Result<TransformSummary> {
    let dataset = staging::read_staging(&config.staging_path())?;
    let rows_in = dataset.len();
    info!(rows = rows_in, "read staging artifact");

    let (normalized, stages) = Normalizer::standard().run(dataset)?;
    let records = CoercionEngine.coerce(normalized)?;
    let outputs = partition(&records);

    let mut targets: Vec<(&Table, PathBuf)> = outputs
        .relations
        .iter()
        .map(|(relation, table)| (table, config.relation_path(*relation)))
        .collect();
    targets.push((&outputs.transformed, config.transformed_path()));
    parquet::write_tables(&targets)?;

    let summary = TransformSummary::new(rows_in, &records, stages);
    info!(
        rows_in,
        dropped_without_user_id = summary.dropped_without_user_id,
        dropped_duplicates = summary.dropped_duplicates,
        degraded_cells = summary.degraded_cells,
        rows_out = summary.rows_out,
        snapshots = targets.len(),
        "snapshots written"
    );
    Ok(summary)
}

/// Post-transformation gate over the transformed snapshot.
#[instrument(level = "info", skip_all, fields(input = %config.transformed_path().display()))]
pub fn validate_transformation(config: &PipelineConfig) -> Result<()> {
    validate::validate_transformation(&config.transformed_path())?;
    info!("transformed snapshot passed validation");
    Ok(())
}

/// Appends the four relation snapshots to the store in one transaction.
#[instrument(level = "info", skip_all, fields(database = %config.database.display()))]
pub fn load(config: &PipelineConfig) -> Result<LoadSummary> {
    let frames = Relation::ALL
        .iter()
        .map(|relation| Ok((*relation, parquet::read_frame(&config.relation_path(*relation))?)))
        .collect::<Result<Vec<_>>>()?;

    let mut warehouse = Warehouse::open(&config.database)?;
    let summary = warehouse.append(&frames)?;
    info!(relations = summary.rows.len(), "load committed");
    Ok(summary)
}
