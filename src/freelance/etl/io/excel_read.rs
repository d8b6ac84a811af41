use std::collections::HashMap;
use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use tracing::{debug, info};

use crate::freelance::etl::error::{EtlError, Result};
use crate::freelance::etl::model::{RawCell, RawDataset};
use crate::freelance::etl::schema::column;

/// Rows read from one worksheet, tagged with the sheet they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetExtract {
    pub sheet_name: String,
    pub dataset: RawDataset,
}

/// Country code carried by a sheet: the first two characters of its name,
/// lower-cased.
pub fn country_code(sheet_name: &str) -> String {
    sheet_name.chars().take(2).collect::<String>().to_lowercase()
}

/// Measurement identifier of a workbook: its file name without extension.
pub fn measure_code(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| EtlError::InvalidWorkbook(format!("no file name in {}", path.display())))
}

/// Reads every worksheet of the workbook at `path`, in workbook order. The
/// first row of a sheet is its header; each sheet gains the `country_code` and
/// `measure_code` columns.
pub fn read_sheets(path: &Path) -> Result<Vec<SheetExtract>> {
    if !path.exists() {
        return Err(EtlError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let measure = measure_code(path)?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_owned();

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for sheet_name in sheet_names {
        let range = workbook
            .worksheet_range(&sheet_name)
            .ok_or_else(|| EtlError::InvalidWorkbook(format!("missing sheet '{sheet_name}'")))?
            .map_err(EtlError::from)?;

        let mut dataset = read_range(&range)?;
        dataset.fill_constant(column::COUNTRY_CODE, RawCell::Text(country_code(&sheet_name)));
        dataset.fill_constant(column::MEASURE_CODE, RawCell::Text(measure.clone()));
        debug!(sheet = %sheet_name, rows = dataset.len(), "read worksheet");

        sheets.push(SheetExtract {
            sheet_name,
            dataset,
        });
    }

    info!(path = %path.display(), sheets = sheets.len(), "loaded workbook");
    Ok(sheets)
}

fn read_range(range: &calamine::Range<DataType>) -> Result<RawDataset> {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(first_row) => header_names(first_row),
        None => return Ok(RawDataset::default()),
    };

    let mut dataset = RawDataset::new(headers);
    for row in rows {
        let cells: Vec<RawCell> = row.iter().map(cell_to_raw).collect();
        if cells.iter().all(RawCell::is_missing) {
            continue;
        }
        dataset.push_row(cells)?;
    }
    Ok(dataset)
}

/// Header labels; blank headers get a positional name and repeated headers a
/// numeric suffix so every column stays addressable.
fn header_names(row: &[DataType]) -> Vec<String> {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    row.iter()
        .enumerate()
        .map(|(index, cell)| {
            let label = cell_to_string(Some(cell));
            let label = if label.trim().is_empty() {
                format!("Unnamed: {index}")
            } else {
                label
            };
            let seen = occurrences.entry(label.clone()).or_insert(0);
            *seen += 1;
            if *seen == 1 {
                label
            } else {
                format!("{label}.{}", *seen - 1)
            }
        })
        .collect()
}

fn cell_to_raw(cell: &DataType) -> RawCell {
    match cell {
        DataType::Empty | DataType::Error(_) => RawCell::Missing,
        DataType::Int(value) => RawCell::Number(*value as f64),
        DataType::Float(value) => RawCell::Number(*value),
        DataType::String(value) if value.trim().is_empty() => RawCell::Missing,
        DataType::String(value) => RawCell::Text(value.clone()),
        other => RawCell::Text(other.to_string()),
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
