use std::path::PathBuf;

use clap::{Parser, Subcommand};
use freelance_etl::config::ConfigLayer;
use freelance_etl::logging::init_logging;
use freelance_etl::orchestrator::{self, Phase};
use freelance_etl::{EtlError, PipelineConfig, Result, phases};
use tracing::{Span, info, info_span};
use uuid::Uuid;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.options.resolve()?;
    let _guard = init_logging(&config.log_dir, cli.command.log_name())?;

    // `run` opens its own span per pipeline run.
    let span = match cli.command {
        Command::Run => Span::none(),
        command => info_span!("phase_run", run_id = %Uuid::new_v4(), phase = command.log_name()),
    };
    let _entered = span.enter();

    match cli.command {
        Command::Extract => {
            let summary = phases::extract(&config)?;
            info!(sheets = summary.sheets, rows = summary.rows, "extraction complete");
        }
        Command::ValidateExtraction => phases::validate_extraction(&config)?,
        Command::Transform => {
            let summary = serde_json::to_string(&phases::transform(&config)?)?;
            info!(%summary, "transformation complete");
        }
        Command::ValidateTransformation => phases::validate_transformation(&config)?,
        Command::Load => {
            let summary = serde_json::to_string(&phases::load(&config)?)?;
            info!(%summary, "load complete");
        }
        Command::Run => orchestrator::run_pipeline(&config)?,
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Extract, normalise and load freelance-worker spreadsheets."
)]
struct Cli {
    #[command(flatten)]
    options: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Read the source workbooks into the staging artifact.
    Extract,
    /// Check the staging artifact against the input column contract.
    ValidateExtraction,
    /// Normalise the staging artifact and write the relation snapshots.
    Transform,
    /// Check the transformed snapshot against the canonical schema.
    ValidateTransformation,
    /// Append the relation snapshots to the database.
    Load,
    /// Run every phase in order under the run lock.
    Run,
}

impl Command {
    fn log_name(self) -> &'static str {
        match self {
            Command::Extract => Phase::Extract.name(),
            Command::ValidateExtraction => Phase::ValidateExtraction.name(),
            Command::Transform => Phase::Transform.name(),
            Command::ValidateTransformation => Phase::ValidateTransformation.name(),
            Command::Load => Phase::Load.name(),
            Command::Run => "pipeline",
        }
    }
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// JSON configuration file; flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the staging artifact and the snapshots.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Source workbook; repeat to read several.
    #[arg(long = "source", global = true)]
    sources: Vec<PathBuf>,

    /// SQLite database receiving the relations.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Directory receiving the per-phase log files.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let file = match &self.config {
            Some(path) if !path.exists() => return Err(EtlError::MissingInput(path.clone())),
            Some(path) => ConfigLayer::load(path)?,
            None => ConfigLayer::default(),
        };
        let flags = ConfigLayer {
            sources: (!self.sources.is_empty()).then(|| self.sources.clone()),
            data_dir: self.data_dir.clone(),
            log_dir: self.log_dir.clone(),
            database: self.database.clone(),
            ..ConfigLayer::default()
        };
        Ok(file.merge(flags).resolve())
    }
}
