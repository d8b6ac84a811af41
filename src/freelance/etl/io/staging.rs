use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::freelance::etl::error::{EtlError, Result};
use crate::freelance::etl::io::write_atomically;
use crate::freelance::etl::model::{RawDataset, Record};

/// Writes the dataset as newline-delimited JSON, one record per line.
pub fn write_staging(path: &Path, dataset: &RawDataset) -> Result<()> {
    write_atomically(path, |temporary| {
        let mut writer = BufWriter::new(File::create(temporary)?);
        for record in dataset.to_records() {
            serde_json::to_writer(&mut writer, &record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Reads every record of a staging artifact, preserving duplicate keys.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Err(EtlError::MissingInput(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<Record>()
        .map(|record| record.map_err(EtlError::from))
        .collect()
}

pub fn read_staging(path: &Path) -> Result<RawDataset> {
    let records = read_records(path)?;
    Ok(RawDataset::from_records(&records))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::freelance::etl::model::RawCell;
    use tempfile::tempdir;

    #[test]
    fn staging_artifact_is_one_object_per_line() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("staging_df.json");
        let dataset = RawDataset::from_rows(
            vec!["User ID".into(), "Earnings".into(), "Pol".into()],
            vec![
                vec![RawCell::text("a1"), RawCell::text("$12k+"), RawCell::Number(1.0)],
                vec![RawCell::text("b2"), RawCell::Missing, RawCell::Number(0.0)],
            ],
        )
        .expect("dataset");

        write_staging(&path, &dataset).expect("written");

        let written = fs::read_to_string(&path).expect("read back");
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"User ID":"b2","Earnings":null,"Pol":0.0}"#);

        let restored = read_staging(&path).expect("restored");
        assert_eq!(restored, dataset);
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("absent.json");
        assert!(matches!(read_records(&path), Err(EtlError::MissingInput(_))));
    }

    #[test]
    fn malformed_line_is_a_json_error() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("staging_df.json");
        fs::write(&path, "{\"User ID\": \"a1\"}\n{not json}\n").expect("written");
        assert!(matches!(read_records(&path), Err(EtlError::Json(_))));
    }
}
