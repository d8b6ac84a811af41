use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::freelance::etl::error::{EtlError, Result};

/// Installs the global subscriber: console output plus a per-phase log file
/// `<log_dir>/etl_<phase>.log`. Keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init_logging(log_dir: &Path, phase: &str) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, format!("etl_{phase}.log"));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("freelance_etl=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|error| EtlError::Logging(error.to_string()))?;

    Ok(guard)
}
