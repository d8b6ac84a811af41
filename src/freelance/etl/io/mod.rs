pub mod excel_read;
pub mod parquet;
pub mod staging;
pub mod store;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::freelance::etl::error::Result;

/// Sibling path an artifact is written to before it is renamed into place.
pub(crate) fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `path` through a temporary sibling so a failed write never leaves a
/// truncated artifact behind.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temporary = temporary_path(path);
    if let Err(error) = write(&temporary) {
        let _ = fs::remove_file(&temporary);
        return Err(error);
    }
    fs::rename(&temporary, path)?;
    Ok(())
}
