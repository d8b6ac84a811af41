use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::debug;

use crate::freelance::etl::error::Result;
use crate::freelance::etl::io::temporary_path;
use crate::freelance::etl::partition::{ColumnValues, Table};

/// Converts a typed table into a data frame, one series per column.
pub fn to_frame(table: &Table) -> Result<DataFrame> {
    let series = table
        .columns
        .iter()
        .map(|(name, values)| match values {
            ColumnValues::Text(values) => Series::new(name, values.as_slice()),
            ColumnValues::Float(values) => Series::new(name, values.as_slice()),
            ColumnValues::Integer(values) => Series::new(name, values.as_slice()),
        })
        .collect::<Vec<_>>();
    Ok(DataFrame::new(series)?)
}

pub fn read_frame(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

fn write_frame(path: &Path, frame: &mut DataFrame) -> Result<()> {
    let file = File::create(path)?;
    ParquetWriter::new(file).finish(frame)?;
    Ok(())
}

fn discard<'a>(temporaries: impl IntoIterator<Item = &'a PathBuf>) {
    for temporary in temporaries {
        let _ = fs::remove_file(temporary);
    }
}

/// Writes every table to a temporary file first and renames them into place
/// only once all of them have been written, so a failed write leaves the
/// previous snapshots untouched. A failed rename can still leave the earlier
/// snapshots replaced; no temporary file survives either failure.
pub fn write_tables(tables: &[(&Table, PathBuf)]) -> Result<()> {
    let mut written: Vec<(PathBuf, &Path)> = Vec::with_capacity(tables.len());
    for (table, path) in tables {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temporary = temporary_path(path);
        let outcome = to_frame(table).and_then(|mut frame| write_frame(&temporary, &mut frame));
        if let Err(error) = outcome {
            discard(written.iter().map(|(pending, _)| pending).chain([&temporary]));
            return Err(error);
        }
        debug!(table = %table.name, path = %path.display(), "snapshot staged");
        written.push((temporary, path.as_path()));
    }

    for (index, (temporary, path)) in written.iter().enumerate() {
        if let Err(error) = fs::rename(temporary, path) {
            discard(written[index..].iter().map(|(pending, _)| pending));
            return Err(error.into());
        }
    }
    Ok(())
}
