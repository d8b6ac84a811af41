//! Sequential execution of the pipeline phases.
//!
//! Phases run in a fixed order and any failure halts the run. A phase that
//! fails for a structural reason is retried after the configured delay;
//! schema-contract and data-quality failures are final.

use std::fmt;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::Path;
use std::thread;

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::freelance::etl::config::PipelineConfig;
use crate::freelance::etl::error::{EtlError, Result};
use crate::freelance::etl::phases;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extract,
    ValidateExtraction,
    Transform,
    ValidateTransformation,
    Load,
}

impl Phase {
    pub const ORDER: [Phase; 5] = [
        Phase::Extract,
        Phase::ValidateExtraction,
        Phase::Transform,
        Phase::ValidateTransformation,
        Phase::Load,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Extract => "extract",
            Phase::ValidateExtraction => "validate_extraction",
            Phase::Transform => "transform",
            Phase::ValidateTransformation => "validate_transformation",
            Phase::Load => "load",
        }
    }

    pub fn execute(self, config: &PipelineConfig) -> Result<()> {
        match self {
            Phase::Extract => phases::extract(config).map(drop),
            Phase::ValidateExtraction => phases::validate_extraction(config),
            Phase::Transform => phases::transform(config).map(drop),
            Phase::ValidateTransformation => phases::validate_transformation(config),
            Phase::Load => phases::load(config).map(drop),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exclusive advisory lock on the run lock file. The operating system drops
/// the lock when the holder exits, so a crashed run never blocks the next
/// one; the file itself stays and only records the last holder's pid.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(EtlError::RunInProgress(path.to_path_buf()));
            }
            Err(TryLockError::Error(err)) => return Err(err.into()),
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "run lock acquired");
        Ok(Self { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Runs every phase once, in order, under the run lock.
pub fn run_pipeline(config: &PipelineConfig) -> Result<()> {
    let run_id = Uuid::new_v4();
    let span = info_span!("pipeline_run", %run_id);
    let _entered = span.enter();

    let _lock = RunLock::acquire(&config.lock_path())?;
    info!(phases = Phase::ORDER.len(), "pipeline run started");
    for phase in Phase::ORDER {
        run_phase(phase, config)?;
    }
    info!("pipeline run finished");
    Ok(())
}

fn run_phase(phase: Phase, config: &PipelineConfig) -> Result<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match phase.execute(config) {
            Ok(()) => {
                info!(%phase, attempt, "phase succeeded");
                return Ok(());
            }
            Err(err) if err.is_retryable() && attempt <= config.retries => {
                warn!(%phase, attempt, error = %err, delay_secs = config.retry_delay_secs, "phase failed, retrying");
                thread::sleep(config.retry_delay());
            }
            Err(err) => {
                error!(%phase, attempt, class = ?err.class(), error = %err, "phase failed");
                return Err(err);
            }
        }
    }
}
