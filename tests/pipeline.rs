use std::path::Path;

use freelance_etl::io::parquet::read_frame;
use freelance_etl::io::staging::write_staging;
use freelance_etl::model::{RawCell, RawDataset};
use freelance_etl::orchestrator::{RunLock, run_pipeline};
use freelance_etl::partition::Relation;
use freelance_etl::schema::REQUIRED_INPUT_COLUMNS;
use freelance_etl::{EtlError, PipelineConfig, ValidationError, phases};
use polars::prelude::DataFrame;
use rust_xlsxwriter::Workbook;
use serde_json::{Value, json};
use tempfile::tempdir;

const HEADERS: [&str; 13] = [
    "User ID",
    "Pol",
    "Earnings",
    "Job_Success",
    "Ratings",
    "Total_Hours",
    "Price_per_hour",
    "Main profession",
    "Title",
    "Country",
    "City",
    "Completed_Jobs",
    "Region",
];

fn write_workbook(path: &Path, sheets: &[(&str, &[&str], Vec<Vec<Value>>)]) {
    let mut workbook = Workbook::new();
    for (name, headers, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("sheet named");
        for (col, header) in headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, *header).expect("header written");
        }
        for (row_idx, row) in rows.iter().enumerate() {
            let row_number = (row_idx + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                match cell {
                    Value::Number(number) => {
                        let value = number.as_f64().expect("finite number");
                        worksheet.write_number(row_number, col as u16, value).expect("number written");
                    }
                    Value::String(text) => {
                        worksheet.write_string(row_number, col as u16, text).expect("text written");
                    }
                    _ => {}
                }
            }
        }
    }
    workbook.save(path).expect("workbook saved");
}

fn survey_rows() -> Vec<Vec<Value>> {
    vec![
        vec![
            json!(42), json!(0), json!("$12k"), json!("95%"), json!("Top Rated"), json!(120),
            json!("$25.50"), json!("designer"), json!("ux lead"), json!("Serbia"), json!("Nis"),
            json!(7), json!("Europe"),
        ],
        // Same worker again: the later row loses to the first.
        vec![
            json!(42), json!(1), json!("$99k"), json!("10%"), json!(null), json!(1), json!("$1"),
            json!("writer"), json!("editor"), json!("Serbia"), json!("Nis"), json!(1),
            json!("Europe"),
        ],
        vec![
            json!(null), json!(1), json!("$5k"), json!("50%"), json!(null), json!(10), json!("$10"),
            json!("dev"), json!("backend"), json!("Serbia"), json!("Beograd"), json!(2),
            json!("Europe"),
        ],
        vec![
            json!("a7"), json!(1), json!(null), json!(null), json!(null), json!(null), json!(null),
            json!(null), json!(null), json!("Serbia"), json!(null), json!(null), json!("Europe"),
        ],
    ]
}

fn germany_rows() -> Vec<Vec<Value>> {
    vec![vec![
        json!(51), json!("UNKNOWN"), json!("+3k"), json!("88%"), json!("Top Rated"), json!(40),
        json!("$60"), json!("engineer"), json!("data"), json!("Germany"), json!("Berlin"),
        json!(12), json!("Europe"),
    ]]
}

fn setup(dir: &Path) -> PipelineConfig {
    let source = dir.join("survey.xlsx");
    write_workbook(
        &source,
        &[
            ("RS Serbia", &HEADERS[..], survey_rows()),
            ("DE Germany", &HEADERS[..], germany_rows()),
        ],
    );
    PipelineConfig {
        sources: vec![source],
        retry_delay_secs: 0,
        ..PipelineConfig::with_data_dir(dir.join("data"))
    }
}

fn text_column(frame: &DataFrame, name: &str) -> Vec<String> {
    frame
        .column(name)
        .expect("column present")
        .str()
        .expect("string column")
        .into_iter()
        .map(|value| value.expect("no nulls").to_string())
        .collect()
}

fn float_column(frame: &DataFrame, name: &str) -> Vec<f64> {
    frame
        .column(name)
        .expect("column present")
        .f64()
        .expect("float column")
        .into_iter()
        .map(|value| value.expect("no nulls"))
        .collect()
}

fn int_column(frame: &DataFrame, name: &str) -> Vec<i64> {
    frame
        .column(name)
        .expect("column present")
        .i64()
        .expect("integer column")
        .into_iter()
        .map(|value| value.expect("no nulls"))
        .collect()
}

#[test]
fn phases_carry_workbook_into_store() {
    let temp_dir = tempdir().expect("temporary directory");
    let config = setup(temp_dir.path());

    let extracted = phases::extract(&config).expect("extracted");
    assert_eq!(extracted.sheets, 2);
    assert_eq!(extracted.rows, 5);
    phases::validate_extraction(&config).expect("staging valid");

    let transformed = phases::transform(&config).expect("transformed");
    assert_eq!(transformed.rows_in, 5);
    assert_eq!(transformed.rows_out, 3);
    assert_eq!(transformed.dropped_without_user_id, 1);
    assert_eq!(transformed.dropped_duplicates, 1);
    assert_eq!(transformed.degraded_cells, 0);
    assert_eq!(transformed.stages.len(), 9);
    phases::validate_transformation(&config).expect("snapshot valid");

    let frame = read_frame(&config.transformed_path()).expect("snapshot read");
    assert_eq!(
        text_column(&frame, "pid"),
        ["42_SURVEY", "A7_SURVEY", "51_SURVEY"]
    );
    assert_eq!(text_column(&frame, "user_id"), ["42", "A7", "51"]);
    assert_eq!(text_column(&frame, "gender"), ["FEMALE", "MALE", "UNKNOWN"]);
    assert_eq!(
        float_column(&frame, "earnings_in_thousands"),
        [12000.0, 0.0, 3000.0]
    );
    assert_eq!(float_column(&frame, "job_success_perc"), [95.0, 0.0, 88.0]);
    assert_eq!(float_column(&frame, "price_per_hour"), [25.0, 0.0, 60.0]);
    assert_eq!(int_column(&frame, "total_hours"), [120, 0, 40]);
    assert_eq!(int_column(&frame, "completed_jobs"), [7, 0, 12]);
    assert_eq!(text_column(&frame, "rating"), ["TOP RATED", "UNKNOWN", "TOP RATED"]);
    assert_eq!(text_column(&frame, "country_code"), ["RS", "RS", "DE"]);
    assert_eq!(text_column(&frame, "city"), ["NIS", "UNKNOWN", "BERLIN"]);

    let geo = read_frame(&config.relation_path(Relation::Geo)).expect("geo read");
    let geo_columns: Vec<&str> = geo.get_column_names();
    assert_eq!(
        geo_columns,
        ["pid", "user_id", "country", "city", "region", "country_code"]
    );

    let summary = phases::load(&config).expect("loaded");
    assert_eq!(summary.rows.len(), 4);
    assert!(summary.rows.iter().all(|(_, rows)| *rows == 3));

    let connection = rusqlite::Connection::open(&config.database).expect("database opened");
    let earnings: f64 = connection
        .query_row(
            "SELECT earnings_in_thousands FROM earnings WHERE pid = ?1",
            ["42_SURVEY"],
            |row| row.get(0),
        )
        .expect("earnings row");
    assert_eq!(earnings, 12000.0);
}

#[test]
fn reloading_same_snapshots_leaves_store_unchanged() {
    let temp_dir = tempdir().expect("temporary directory");
    let config = setup(temp_dir.path());
    phases::extract(&config).expect("extracted");
    phases::transform(&config).expect("transformed");
    phases::load(&config).expect("first load");

    let err = phases::load(&config).expect_err("duplicate keys");
    assert!(matches!(err, EtlError::Database(_)));
    assert!(!err.is_retryable());

    let connection = rusqlite::Connection::open(&config.database).expect("database opened");
    for relation in Relation::ALL {
        let count: i64 = connection
            .query_row(
                &format!("SELECT COUNT(*) FROM \"{}\"", relation.table_name()),
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 3, "{relation}");
    }
}

#[test]
fn sheet_without_a_column_is_conformed() {
    let temp_dir = tempdir().expect("temporary directory");
    let source = temp_dir.path().join("partial.xlsx");
    let headers: Vec<&str> = HEADERS.iter().copied().filter(|name| *name != "Ratings").collect();
    let row = vec![
        json!(7), json!(1), json!("$2k"), json!("70%"), json!(30), json!("$15"), json!("tester"),
        json!("qa"), json!("Spain"), json!("Madrid"), json!(4), json!("Europe"),
    ];
    write_workbook(&source, &[("ES Spain", headers.as_slice(), vec![row])]);
    let config = PipelineConfig {
        sources: vec![source],
        ..PipelineConfig::with_data_dir(temp_dir.path())
    };

    phases::extract(&config).expect("extracted");
    phases::validate_extraction(&config).expect("staging valid");
    phases::transform(&config).expect("transformed");
    phases::validate_transformation(&config).expect("snapshot valid");

    let frame = read_frame(&config.transformed_path()).expect("snapshot read");
    assert_eq!(text_column(&frame, "rating"), ["UNKNOWN"]);
    assert_eq!(text_column(&frame, "pid"), ["7_PARTIAL"]);
}

#[test]
fn staging_without_gender_fails_membership_check() {
    let temp_dir = tempdir().expect("temporary directory");
    let config = PipelineConfig::with_data_dir(temp_dir.path());
    let columns: Vec<String> = REQUIRED_INPUT_COLUMNS
        .iter()
        .filter(|name| **name != "Pol")
        .map(|name| name.to_string())
        .collect();
    let mut dataset = RawDataset::new(columns.clone());
    dataset
        .push_row(columns.iter().map(|_| RawCell::text("x")).collect())
        .expect("row pushed");
    write_staging(&config.staging_path(), &dataset).expect("staging written");

    let err = phases::validate_extraction(&config).expect_err("column missing");
    assert!(matches!(
        err,
        EtlError::Validation(ValidationError::MissingColumn(ref column)) if column == "Pol"
    ));
}

#[test]
fn unknown_gender_code_is_rejected_by_gate() {
    let temp_dir = tempdir().expect("temporary directory");
    let source = temp_dir.path().join("codes.xlsx");
    let row = vec![
        json!(9), json!(2), json!("$1k"), json!("10%"), json!("Top Rated"), json!(5),
        json!("$5"), json!("tester"), json!("qa"), json!("Spain"), json!("Madrid"), json!(1),
        json!("Europe"),
    ];
    write_workbook(&source, &[("ES Spain", &HEADERS[..], vec![row])]);
    let config = PipelineConfig {
        sources: vec![source],
        ..PipelineConfig::with_data_dir(temp_dir.path())
    };

    phases::extract(&config).expect("extracted");
    phases::transform(&config).expect("transformed");
    let err = phases::validate_transformation(&config).expect_err("gender code 2");
    assert!(matches!(
        err,
        EtlError::Validation(ValidationError::InvalidCategory { ref column, ref value })
            if column == "gender" && value == "2"
    ));
}

#[test]
fn unreadable_integer_reaches_the_gate_as_null() {
    let temp_dir = tempdir().expect("temporary directory");
    let source = temp_dir.path().join("jobs.xlsx");
    let row = vec![
        json!(9), json!(1), json!("$1k"), json!("10%"), json!("Top Rated"), json!(5),
        json!("$5"), json!("tester"), json!("qa"), json!("Spain"), json!("Madrid"), json!("n/a"),
        json!("Europe"),
    ];
    write_workbook(&source, &[("ES Spain", &HEADERS[..], vec![row])]);
    let config = PipelineConfig {
        sources: vec![source],
        ..PipelineConfig::with_data_dir(temp_dir.path())
    };

    phases::extract(&config).expect("extracted");
    phases::validate_extraction(&config).expect("staging valid");
    let summary = phases::transform(&config).expect("transformed");
    assert_eq!(summary.degraded_cells, 1);
    assert!(config.transformed_path().exists());

    let err = phases::validate_transformation(&config).expect_err("null completed_jobs");
    assert!(matches!(
        err,
        EtlError::Validation(ValidationError::NullValues { ref column, count: 1 })
            if column == "completed_jobs"
    ));
    assert!(!err.is_retryable());
}

#[test]
fn full_run_releases_lock() {
    let temp_dir = tempdir().expect("temporary directory");
    let config = setup(temp_dir.path());

    run_pipeline(&config).expect("pipeline run");

    RunLock::acquire(&config.lock_path()).expect("lock free after the run");
    assert!(config.database.exists());
    for relation in Relation::ALL {
        assert!(config.relation_path(relation).exists());
    }
}
