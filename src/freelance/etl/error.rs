use std::path::PathBuf;

use thiserror::Error;

use crate::freelance::etl::schema::ColumnType;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Coarse classification of a failure, used by the orchestrator to decide
/// whether re-running a phase can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unreadable input, artifact I/O or database failures.
    Structural,
    /// The data no longer matches the shape the schema contract requires.
    SchemaContract,
    /// Well-shaped data that breaks a quality rule.
    DataQuality,
}

/// Error type covering the different failure cases that can occur while the
/// pipeline extracts, transforms, validates or loads worker records.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Wrapper for IO failures such as reading or writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when the staging artifact cannot be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors raised while building, writing or reading columnar snapshots.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] polars::error::PolarsError),

    /// Errors raised by the relational store.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Raised when a workbook does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a row does not carry one cell per dataset column.
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Raised when a stage cannot run because a column it depends on is absent.
    #[error("stage '{stage}' requires column '{column}'")]
    MissingColumn { stage: &'static str, column: String },

    /// Raised when a column cannot be cast to the type the schema declares.
    #[error("cannot coerce column '{column}' to {expected}: {reason}")]
    Coercion {
        column: String,
        expected: ColumnType,
        reason: String,
    },

    /// Raised when a snapshot column carries a type the store cannot hold.
    #[error("unsupported column type {dtype} in column {column}")]
    UnsupportedColumnType { column: String, dtype: String },

    /// Raised by the post-extraction and post-transformation gates.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when another pipeline run holds the run lock.
    #[error("another pipeline run is in progress (lock file {0})")]
    RunInProgress(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl EtlError {
    /// Classifies the error according to the pipeline's error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            EtlError::MissingColumn { .. } | EtlError::Coercion { .. } => ErrorClass::SchemaContract,
            EtlError::Validation(error) => error.class(),
            EtlError::Database(error) if is_constraint_violation(error) => ErrorClass::DataQuality,
            _ => ErrorClass::Structural,
        }
    }

    /// Only structural failures can succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Structural && !matches!(self, EtlError::RunInProgress(_))
    }
}

/// Key or `NOT NULL` conflicts reported by the store.
fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// A failed validation predicate. Each variant names exactly one check so a
/// failure can be traced back to the rule it broke.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The artifact a gate inspects was never written.
    #[error("artifact does not exist at {0}")]
    MissingArtifact(PathBuf),

    /// The artifact exists but holds no rows.
    #[error("artifact at {0} contains no records")]
    EmptyArtifact(PathBuf),

    /// A required column is absent.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// A column outside the expected set is present.
    #[error("unexpected column: {0}")]
    UnexpectedColumn(String),

    /// The same column name appears twice.
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    /// A snapshot column is stored with a type other than the declared one.
    #[error("column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: ColumnType,
        found: String,
    },

    /// Missing or NaN cells remain after transformation.
    #[error("{count} null values found in column {column}")]
    NullValues { column: String, count: usize },

    /// A categorical column holds a value outside its domain.
    #[error("invalid {column} value '{value}'")]
    InvalidCategory { column: String, value: String },

    /// A numeric column holds a negative value.
    #[error("negative value {value} found in {column}")]
    NegativeValue { column: String, value: f64 },

    /// Two rows share a pid.
    #[error("duplicate pid value found: {0}")]
    DuplicatePid(String),

    /// A designated column holds lower-case characters.
    #[error("non-uppercase value '{value}' found in {column}")]
    NotUppercase { column: String, value: String },
}

impl ValidationError {
    /// Column-set and type violations break the schema contract; every other
    /// predicate is a data-quality rule.
    pub fn class(&self) -> ErrorClass {
        match self {
            ValidationError::MissingColumn(_)
            | ValidationError::UnexpectedColumn(_)
            | ValidationError::DuplicateColumn(_)
            | ValidationError::ColumnType { .. } => ErrorClass::SchemaContract,
            _ => ErrorClass::DataQuality,
        }
    }
}
