use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::freelance::etl::error::Result;
use crate::freelance::etl::partition::{Relation, TRANSFORMED};

pub const STAGING_FILE: &str = "staging_df.json";
pub const LOCK_FILE: &str = "etl_pipeline.lock";

/// Locations and retry policy for one pipeline deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Source workbooks, read in order.
    pub sources: Vec<PathBuf>,
    /// Directory holding the staging artifact and the snapshots.
    pub data_dir: PathBuf,
    /// Directory receiving the per-phase log files.
    pub log_dir: PathBuf,
    /// SQLite database receiving the output relations.
    pub database: PathBuf,
    /// Extra attempts granted to a phase that fails structurally.
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_data_dir("data")
    }
}

impl PipelineConfig {
    /// Conventional layout rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            sources: vec![data_dir.join("source.xlsx")],
            log_dir: data_dir.clone(),
            database: data_dir.join("warehouse.db"),
            data_dir,
            retries: 1,
            retry_delay_secs: 300,
        }
    }

    /// Loads a JSON configuration file; absent keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(ConfigLayer::load(path)?.resolve())
    }

    pub fn staging_path(&self) -> PathBuf {
        self.data_dir.join(STAGING_FILE)
    }

    pub fn relation_path(&self, relation: Relation) -> PathBuf {
        self.data_dir.join(format!("{}.parquet", relation.table_name()))
    }

    pub fn transformed_path(&self) -> PathBuf {
        self.data_dir.join(format!("{TRANSFORMED}.parquet"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Explicitly set values from one configuration source. Unset paths are
/// derived from the data directory only once every layer has been merged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub sources: Option<Vec<PathBuf>>,
    pub data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

impl ConfigLayer {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Values set in `over` win.
    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            sources: over.sources.or(self.sources),
            data_dir: over.data_dir.or(self.data_dir),
            log_dir: over.log_dir.or(self.log_dir),
            database: over.database.or(self.database),
            retries: over.retries.or(self.retries),
            retry_delay_secs: over.retry_delay_secs.or(self.retry_delay_secs),
        }
    }

    pub fn resolve(self) -> PipelineConfig {
        let defaults = match self.data_dir {
            Some(data_dir) => PipelineConfig::with_data_dir(data_dir),
            None => PipelineConfig::default(),
        };
        PipelineConfig {
            sources: self.sources.unwrap_or(defaults.sources),
            log_dir: self.log_dir.unwrap_or(defaults.log_dir),
            database: self.database.unwrap_or(defaults.database),
            retries: self.retries.unwrap_or(defaults.retries),
            retry_delay_secs: self.retry_delay_secs.unwrap_or(defaults.retry_delay_secs),
            data_dir: defaults.data_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn artifact_paths_follow_data_dir() {
        let config = PipelineConfig::with_data_dir("/opt/etl");
        assert_eq!(config.staging_path(), Path::new("/opt/etl/staging_df.json"));
        assert_eq!(config.relation_path(Relation::Geo), Path::new("/opt/etl/geo.parquet"));
        assert_eq!(config.transformed_path(), Path::new("/opt/etl/transformed.parquet"));
        assert_eq!(config.sources, [PathBuf::from("/opt/etl/source.xlsx")]);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("etl.json");
        fs::write(&path, r#"{"data_dir": "/srv/etl", "retry_delay_secs": 0}"#).expect("written");

        let config = PipelineConfig::load(&path).expect("loaded");
        assert_eq!(config.data_dir, PathBuf::from("/srv/etl"));
        assert_eq!(config.retry_delay(), Duration::ZERO);
        assert_eq!(config.retries, 1);
        assert_eq!(config.database, PathBuf::from("/srv/etl/warehouse.db"));
        assert_eq!(config.log_dir, PathBuf::from("/srv/etl"));
        assert_eq!(config.sources, [PathBuf::from("/srv/etl/source.xlsx")]);
    }

    #[test]
    fn explicit_paths_survive_a_data_dir_override() {
        let file = ConfigLayer {
            data_dir: Some("/srv/etl".into()),
            database: Some("/var/lib/etl.db".into()),
            ..ConfigLayer::default()
        };
        let flags = ConfigLayer {
            data_dir: Some("/tmp/run".into()),
            ..ConfigLayer::default()
        };

        let config = file.merge(flags).resolve();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/run"));
        assert_eq!(config.database, PathBuf::from("/var/lib/etl.db"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/run"));
        assert_eq!(config.sources, [PathBuf::from("/tmp/run/source.xlsx")]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("etl.json");
        fs::write(&path, r#"{"datadir": "/srv/etl"}"#).expect("written");

        assert!(matches!(
            PipelineConfig::load(&path),
            Err(crate::freelance::etl::error::EtlError::Json(_))
        ));
    }
}
