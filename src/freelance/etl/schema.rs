//! The fixed column contract every stage of the pipeline is checked against.
//!
//! Two tables make up the contract: the columns an extracted sheet must carry
//! (spelled the way they appear in the source workbooks) and the typed,
//! snake_case columns the normalized dataset must expose.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical output column names.
pub mod column {
    pub const USER_ID: &str = "user_id";
    pub const GENDER: &str = "gender";
    pub const EARNINGS: &str = "earnings_in_thousands";
    pub const JOB_SUCCESS: &str = "job_success_perc";
    pub const RATING: &str = "rating";
    pub const TOTAL_HOURS: &str = "total_hours";
    pub const PRICE_PER_HOUR: &str = "price_per_hour";
    pub const MAIN_PROFESSION: &str = "main_profession";
    pub const JOB_TITLE: &str = "job_title";
    pub const COUNTRY: &str = "country";
    pub const CITY: &str = "city";
    pub const COMPLETED_JOBS: &str = "completed_jobs";
    pub const COUNTRY_CODE: &str = "country_code";
    pub const REGION: &str = "region";
    pub const MEASURE_CODE: &str = "measure_code";
    pub const PID: &str = "pid";
}

/// Columns every extracted sheet is conformed to, in staging order.
pub const REQUIRED_INPUT_COLUMNS: [&str; 15] = [
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
    "country_code",
    "Region",
    "measure_code",
];

/// Storage type a canonical column must hold after coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Float,
    Integer,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => write!(f, "string"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Integer => write!(f, "integer"),
        }
    }
}

/// A canonical column together with its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
}

const fn spec(name: &'static str, column_type: ColumnType) -> ColumnSpec {
    ColumnSpec { name, column_type }
}

/// The normalized dataset's columns, in snapshot order.
pub const CANONICAL_COLUMNS: [ColumnSpec; 16] = [
    spec(column::USER_ID, ColumnType::String),
    spec(column::GENDER, ColumnType::String),
    spec(column::EARNINGS, ColumnType::Float),
    spec(column::JOB_SUCCESS, ColumnType::Float),
    spec(column::RATING, ColumnType::String),
    spec(column::TOTAL_HOURS, ColumnType::Integer),
    spec(column::PRICE_PER_HOUR, ColumnType::Float),
    spec(column::MAIN_PROFESSION, ColumnType::String),
    spec(column::JOB_TITLE, ColumnType::String),
    spec(column::COUNTRY, ColumnType::String),
    spec(column::CITY, ColumnType::String),
    spec(column::COMPLETED_JOBS, ColumnType::Integer),
    spec(column::COUNTRY_CODE, ColumnType::String),
    spec(column::REGION, ColumnType::String),
    spec(column::MEASURE_CODE, ColumnType::String),
    spec(column::PID, ColumnType::String),
];

/// Columns shared by every output relation.
pub const KEY_COLUMNS: [&str; 2] = [column::PID, column::USER_ID];

/// Numeric columns, in the order the coercion engine parses them.
pub const NUMERIC_COLUMNS: [&str; 5] = [
    column::JOB_SUCCESS,
    column::EARNINGS,
    column::PRICE_PER_HOUR,
    column::COMPLETED_JOBS,
    column::TOTAL_HOURS,
];

/// Columns whose values are stored upper-cased.
pub const UPPERCASE_COLUMNS: [&str; 11] = [
    column::USER_ID,
    column::GENDER,
    column::RATING,
    column::MAIN_PROFESSION,
    column::JOB_TITLE,
    column::COUNTRY,
    column::CITY,
    column::COUNTRY_CODE,
    column::REGION,
    column::MEASURE_CODE,
    column::PID,
];

pub const UNKNOWN: &str = "UNKNOWN";
pub const FEMALE: &str = "FEMALE";
pub const MALE: &str = "MALE";
pub const TOP_RATED: &str = "TOP RATED";

pub const GENDER_VALUES: [&str; 3] = [MALE, FEMALE, UNKNOWN];
pub const RATING_VALUES: [&str; 2] = [TOP_RATED, UNKNOWN];

/// Looks up the declared type of a canonical column.
pub fn canonical_type(name: &str) -> Option<ColumnType> {
    CANONICAL_COLUMNS
        .iter()
        .find(|spec| spec.name == name)
        .map(|spec| spec.column_type)
}

/// Canonical column names in snapshot order.
pub fn canonical_names() -> impl Iterator<Item = &'static str> {
    CANONICAL_COLUMNS.iter().map(|spec| spec.name)
}
