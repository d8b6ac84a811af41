//! The two quality gates around transformation.
//!
//! Both gates only read their artifact. Each check logs when it passes and the
//! first failing check is returned as a [`ValidationError`] naming the broken
//! predicate.

use std::collections::HashSet;
use std::path::Path;

use polars::prelude::{DataFrame, DataType, Series};
use tracing::{error, info, instrument};

use crate::freelance::etl::error::{EtlError, Result, ValidationError};
use crate::freelance::etl::io::{parquet, staging};
use crate::freelance::etl::model::Record;
use crate::freelance::etl::schema::{
    CANONICAL_COLUMNS, ColumnType, GENDER_VALUES, NUMERIC_COLUMNS, RATING_VALUES,
    REQUIRED_INPUT_COLUMNS, UPPERCASE_COLUMNS, column,
};

type Check = std::result::Result<(), ValidationError>;

fn log_outcome(check: Check) -> Result<()> {
    check.map_err(|violation| {
        error!(%violation, "validation failed");
        EtlError::from(violation)
    })
}

/// Post-extraction gate over the staging artifact.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn validate_extraction(path: &Path) -> Result<()> {
    if !path.exists() {
        return log_outcome(Err(ValidationError::MissingArtifact(path.to_path_buf())));
    }
    info!("staging artifact exists");
    let records = staging::read_records(path)?;
    if records.is_empty() {
        return log_outcome(Err(ValidationError::EmptyArtifact(path.to_path_buf())));
    }
    info!(records = records.len(), "staging artifact is not empty");
    log_outcome(check_staging_columns(&records))?;
    info!("all extraction validations passed");
    Ok(())
}

/// Membership, count and uniqueness of the staging column set.
pub fn check_staging_columns(records: &[Record]) -> Check {
    let mut columns: Vec<&str> = Vec::new();
    let mut duplicate: Option<&str> = None;
    for record in records {
        let mut in_record = HashSet::new();
        for name in record.column_names() {
            if !in_record.insert(name) && duplicate.is_none() {
                duplicate = Some(name);
            }
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    for required in REQUIRED_INPUT_COLUMNS {
        if !columns.contains(&required) {
            return Err(ValidationError::MissingColumn(required.to_string()));
        }
    }
    info!("all required columns present");
    if let Some(extra) = columns
        .iter()
        .find(|name| !REQUIRED_INPUT_COLUMNS.contains(*name))
    {
        return Err(ValidationError::UnexpectedColumn(extra.to_string()));
    }
    info!(columns = columns.len(), "column count matches");
    if let Some(name) = duplicate {
        return Err(ValidationError::DuplicateColumn(name.to_string()));
    }
    info!("no duplicate column names");
    Ok(())
}

/// Post-transformation gate over the full transformed snapshot.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn validate_transformation(path: &Path) -> Result<()> {
    if !path.exists() {
        return log_outcome(Err(ValidationError::MissingArtifact(path.to_path_buf())));
    }
    info!("transformed snapshot exists");
    let frame = parquet::read_frame(path)?;
    if frame.height() == 0 {
        return log_outcome(Err(ValidationError::EmptyArtifact(path.to_path_buf())));
    }
    info!(rows = frame.height(), "transformed snapshot is not empty");
    check_transformed(&frame)?;
    info!("all transformation validations passed");
    Ok(())
}

/// Every schema and data-quality predicate over a transformed frame.
pub fn check_transformed(frame: &DataFrame) -> Result<()> {
    log_outcome(check_canonical_columns(frame))?;
    info!("expected columns present");
    log_outcome(check_types(frame))?;
    info!("column types as declared");
    log_outcome(check_no_nulls(frame))?;
    info!("no null values");
    log_outcome(check_domain(frame, column::GENDER, &GENDER_VALUES)?)?;
    info!("gender values valid");
    log_outcome(check_non_negative(frame)?)?;
    info!("numeric columns non-negative");
    log_outcome(check_domain(frame, column::RATING, &RATING_VALUES)?)?;
    info!("rating values valid");
    log_outcome(check_unique_pid(frame)?)?;
    info!("pid values unique");
    log_outcome(check_uppercase(frame)?)?;
    info!("designated columns upper-case");
    Ok(())
}

fn check_canonical_columns(frame: &DataFrame) -> Check {
    let names = frame.get_column_names();
    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(*name) {
            return Err(ValidationError::DuplicateColumn(name.to_string()));
        }
        if !CANONICAL_COLUMNS.iter().any(|spec| spec.name == *name) {
            return Err(ValidationError::UnexpectedColumn(name.to_string()));
        }
    }
    for spec in &CANONICAL_COLUMNS {
        if !seen.contains(spec.name) {
            return Err(ValidationError::MissingColumn(spec.name.to_string()));
        }
    }
    Ok(())
}

fn storage_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::String => DataType::String,
        ColumnType::Float => DataType::Float64,
        ColumnType::Integer => DataType::Int64,
    }
}

fn check_types(frame: &DataFrame) -> Check {
    for spec in &CANONICAL_COLUMNS {
        let Ok(series) = frame.column(spec.name) else {
            return Err(ValidationError::MissingColumn(spec.name.to_string()));
        };
        if series.dtype() != &storage_type(spec.column_type) {
            return Err(ValidationError::ColumnType {
                column: spec.name.to_string(),
                expected: spec.column_type,
                found: series.dtype().to_string(),
            });
        }
    }
    Ok(())
}

fn null_count(series: &Series) -> usize {
    let nan_count = match series.f64() {
        Ok(values) => values
            .into_iter()
            .filter(|value| value.is_some_and(f64::is_nan))
            .count(),
        Err(_) => 0,
    };
    series.null_count() + nan_count
}

fn check_no_nulls(frame: &DataFrame) -> Check {
    for series in frame.get_columns() {
        let count = null_count(series);
        if count > 0 {
            return Err(ValidationError::NullValues {
                column: series.name().to_string(),
                count,
            });
        }
    }
    Ok(())
}

fn check_domain(frame: &DataFrame, name: &str, allowed: &[&str]) -> Result<Check> {
    for value in frame.column(name)?.str()?.into_iter().flatten() {
        if !allowed.contains(&value) {
            return Ok(Err(ValidationError::InvalidCategory {
                column: name.to_string(),
                value: value.to_string(),
            }));
        }
    }
    Ok(Ok(()))
}

fn check_non_negative(frame: &DataFrame) -> Result<Check> {
    for name in NUMERIC_COLUMNS {
        let series = frame.column(name)?;
        let negative = match series.dtype() {
            DataType::Int64 => series
                .i64()?
                .into_iter()
                .flatten()
                .find(|value| *value < 0)
                .map(|value| value as f64),
            _ => series.f64()?.into_iter().flatten().find(|value| *value < 0.0),
        };
        if let Some(value) = negative {
            return Ok(Err(ValidationError::NegativeValue {
                column: name.to_string(),
                value,
            }));
        }
    }
    Ok(Ok(()))
}

fn check_unique_pid(frame: &DataFrame) -> Result<Check> {
    let mut seen = HashSet::with_capacity(frame.height());
    for pid in frame.column(column::PID)?.str()?.into_iter().flatten() {
        if !seen.insert(pid) {
            return Ok(Err(ValidationError::DuplicatePid(pid.to_string())));
        }
    }
    Ok(Ok(()))
}

/// A value is upper-case when it has no lower-case characters; digits and
/// punctuation pass.
pub fn is_uppercase(value: &str) -> bool {
    !value.chars().any(char::is_lowercase)
}

fn check_uppercase(frame: &DataFrame) -> Result<Check> {
    for name in UPPERCASE_COLUMNS {
        for value in frame.column(name)?.str()?.into_iter().flatten() {
            if !is_uppercase(value) {
                return Ok(Err(ValidationError::NotUppercase {
                    column: name.to_string(),
                    value: value.to_string(),
                }));
            }
        }
    }
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::NamedFrom;
    use crate::freelance::etl::io::parquet::to_frame;
    use crate::freelance::etl::model::{RawCell, WorkerRecord};
    use crate::freelance::etl::partition::snapshot;

    fn record(user_id: &str) -> WorkerRecord {
        WorkerRecord {
            user_id: user_id.to_string(),
            gender: "UNKNOWN".into(),
            earnings_in_thousands: Some(0.0),
            job_success_perc: Some(90.0),
            rating: "TOP RATED".into(),
            total_hours: Some(12),
            price_per_hour: Some(15.0),
            main_profession: "WRITER".into(),
            job_title: "COPY EDITOR".into(),
            country: "BOSNIA".into(),
            city: "MOSTAR".into(),
            completed_jobs: Some(1),
            country_code: "BA".into(),
            region: "EUROPE".into(),
            measure_code: "SOURCE".into(),
            pid: format!("{user_id}_SOURCE"),
        }
    }

    fn frame(records: &[WorkerRecord]) -> DataFrame {
        to_frame(&snapshot(records)).expect("frame")
    }

    fn violation(records: &[WorkerRecord]) -> ValidationError {
        violation_in(&frame(records))
    }

    fn violation_in(frame: &DataFrame) -> ValidationError {
        match check_transformed(frame) {
            Err(EtlError::Validation(violation)) => violation,
            other => panic!("expected a validation failure, got {other:?}"),
        }
    }

    fn staging_record(skip: Option<&str>) -> Record {
        Record::new(
            REQUIRED_INPUT_COLUMNS
                .iter()
                .filter(|name| Some(**name) != skip)
                .map(|name| (name.to_string(), RawCell::Missing))
                .collect(),
        )
    }

    #[test]
    fn complete_staging_columns_pass() {
        assert_eq!(check_staging_columns(&[staging_record(None)]), Ok(()));
    }

    #[test]
    fn missing_staging_column_is_a_membership_violation() {
        let error = check_staging_columns(&[staging_record(Some("Pol"))]).expect_err("violation");
        assert_eq!(error, ValidationError::MissingColumn("Pol".into()));
    }

    #[test]
    fn extra_staging_column_breaks_the_count() {
        let mut cells = staging_record(None).cells().to_vec();
        cells.push(("Gender".into(), RawCell::Missing));
        let error = check_staging_columns(&[Record::new(cells)]).expect_err("violation");
        assert_eq!(error, ValidationError::UnexpectedColumn("Gender".into()));
    }

    #[test]
    fn columns_are_collected_across_records() {
        let partial = staging_record(Some("Region"));
        let region_only = Record::new(vec![("Region".into(), RawCell::text("Europe"))]);
        assert_eq!(check_staging_columns(&[partial, region_only]), Ok(()));
    }

    #[test]
    fn duplicate_staging_column_is_rejected() {
        let mut cells = staging_record(None).cells().to_vec();
        cells.push(("Title".into(), RawCell::text("again")));
        let error = check_staging_columns(&[Record::new(cells)]).expect_err("violation");
        assert_eq!(error, ValidationError::DuplicateColumn("Title".into()));
    }

    #[test]
    fn clean_snapshot_passes() {
        check_transformed(&frame(&[record("A1"), record("B2")])).expect("valid");
    }

    #[test]
    fn residual_null_is_rejected() {
        let mut bad = record("A1");
        bad.price_per_hour = None;
        assert_eq!(
            violation(&[bad]),
            ValidationError::NullValues {
                column: "price_per_hour".into(),
                count: 1
            }
        );
    }

    #[test]
    fn missing_integer_is_a_residual_null() {
        let mut bad = record("A1");
        bad.completed_jobs = None;
        let frame = frame(&[bad]);
        assert_eq!(
            frame.column("completed_jobs").expect("column").dtype(),
            &DataType::Int64
        );
        assert_eq!(
            violation_in(&frame),
            ValidationError::NullValues {
                column: "completed_jobs".into(),
                count: 1
            }
        );
    }

    #[test]
    fn undecoded_gender_is_rejected() {
        let mut bad = record("A1");
        bad.gender = "7".into();
        assert!(matches!(
            violation(&[bad]),
            ValidationError::InvalidCategory { column, value } if column == "gender" && value == "7"
        ));
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let mut bad = record("A1");
        bad.completed_jobs = Some(-2);
        assert!(matches!(
            violation(&[bad]),
            ValidationError::NegativeValue { column, .. } if column == "completed_jobs"
        ));
    }

    #[test]
    fn unknown_rating_is_rejected() {
        let mut bad = record("A1");
        bad.rating = "RISING TALENT".into();
        assert!(matches!(
            violation(&[bad]),
            ValidationError::InvalidCategory { column, .. } if column == "rating"
        ));
    }

    #[test]
    fn duplicate_pid_is_rejected() {
        assert_eq!(
            violation(&[record("A1"), record("A1")]),
            ValidationError::DuplicatePid("A1_SOURCE".into())
        );
    }

    #[test]
    fn lowercase_value_is_rejected() {
        let mut bad = record("A1");
        bad.city = "Mostar".into();
        assert!(matches!(
            violation(&[bad]),
            ValidationError::NotUppercase { column, .. } if column == "city"
        ));
    }

    #[test]
    fn wrong_storage_type_is_a_schema_violation() {
        let mut frame = frame(&[record("A1")]);
        frame
            .with_column(Series::new("total_hours", &[12.0f64]))
            .expect("column replaced");
        assert!(matches!(
            check_transformed(&frame),
            Err(EtlError::Validation(ValidationError::ColumnType { column, .. })) if column == "total_hours"
        ));
    }

    #[test]
    fn numeric_identifiers_count_as_uppercase() {
        assert!(is_uppercase("12345_SOURCE"));
        assert!(!is_uppercase("12345_source"));
    }
}
