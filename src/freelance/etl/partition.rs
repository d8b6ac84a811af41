//! Projections of the coerced records onto the four storage relations, plus
//! the full snapshot used by the post-transformation gate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::freelance::etl::model::WorkerRecord;
use crate::freelance::etl::schema::{canonical_names, column};

/// Storage relations, each keyed by `(pid, user_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    User,
    Earnings,
    Jobs,
    Geo,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Relation::User,
        Relation::Earnings,
        Relation::Jobs,
        Relation::Geo,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            Relation::User => "user",
            Relation::Earnings => "earnings",
            Relation::Jobs => "jobs",
            Relation::Geo => "geo",
        }
    }

    /// Columns of the relation, key columns first.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Relation::User => &[
                column::PID,
                column::USER_ID,
                column::GENDER,
                column::MEASURE_CODE,
                column::RATING,
            ],
            Relation::Earnings => &[
                column::PID,
                column::USER_ID,
                column::EARNINGS,
                column::PRICE_PER_HOUR,
            ],
            Relation::Jobs => &[
                column::PID,
                column::USER_ID,
                column::TOTAL_HOURS,
                column::JOB_SUCCESS,
                column::MAIN_PROFESSION,
                column::JOB_TITLE,
                column::COMPLETED_JOBS,
            ],
            Relation::Geo => &[
                column::PID,
                column::USER_ID,
                column::COUNTRY,
                column::CITY,
                column::REGION,
                column::COUNTRY_CODE,
            ],
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Typed values of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Text(Vec<String>),
    Float(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
}

/// A named set of equally long typed columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<(String, ColumnValues)>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Copies the listed columns, in the listed order. Unknown names are
    /// skipped.
    pub fn project(&self, name: &str, columns: &[&str]) -> Table {
        Table {
            name: name.to_string(),
            columns: columns
                .iter()
                .filter_map(|column| {
                    self.column(column)
                        .map(|values| (column.to_string(), values.clone()))
                })
                .collect(),
        }
    }
}

/// Everything the transformation phase writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSet {
    pub relations: Vec<(Relation, Table)>,
    pub transformed: Table,
}

pub const TRANSFORMED: &str = "transformed";

/// Builds the full canonical snapshot of `records`.
pub fn snapshot(records: &[WorkerRecord]) -> Table {
    Table {
        name: TRANSFORMED.to_string(),
        columns: canonical_names()
            .filter_map(|name| column_values(records, name).map(|values| (name.to_string(), values)))
            .collect(),
    }
}

/// Splits `records` into the four relation projections and the full snapshot.
pub fn partition(records: &[WorkerRecord]) -> PartitionSet {
    let transformed = snapshot(records);
    let relations = Relation::ALL
        .iter()
        .map(|relation| {
            (
                *relation,
                transformed.project(relation.table_name(), relation.columns()),
            )
        })
        .collect();
    PartitionSet {
        relations,
        transformed,
    }
}

fn text<F>(records: &[WorkerRecord], field: F) -> ColumnValues
where
    F: Fn(&WorkerRecord) -> &String,
{
    ColumnValues::Text(records.iter().map(|record| field(record).clone()).collect())
}

fn column_values(records: &[WorkerRecord], name: &str) -> Option<ColumnValues> {
    let values = match name {
        column::USER_ID => text(records, |record| &record.user_id),
        column::GENDER => text(records, |record| &record.gender),
        column::EARNINGS => {
            ColumnValues::Float(records.iter().map(|record| record.earnings_in_thousands).collect())
        }
        column::JOB_SUCCESS => {
            ColumnValues::Float(records.iter().map(|record| record.job_success_perc).collect())
        }
        column::RATING => text(records, |record| &record.rating),
        column::TOTAL_HOURS => {
            ColumnValues::Integer(records.iter().map(|record| record.total_hours).collect())
        }
        column::PRICE_PER_HOUR => {
            ColumnValues::Float(records.iter().map(|record| record.price_per_hour).collect())
        }
        column::MAIN_PROFESSION => text(records, |record| &record.main_profession),
        column::JOB_TITLE => text(records, |record| &record.job_title),
        column::COUNTRY => text(records, |record| &record.country),
        column::CITY => text(records, |record| &record.city),
        column::COMPLETED_JOBS => {
            ColumnValues::Integer(records.iter().map(|record| record.completed_jobs).collect())
        }
        column::COUNTRY_CODE => text(records, |record| &record.country_code),
        column::REGION => text(records, |record| &record.region),
        column::MEASURE_CODE => text(records, |record| &record.measure_code),
        column::PID => text(records, |record| &record.pid),
        _ => return None,
    };
    Some(values)
}
