// Runner binary entry point
// Triggers remote jobs and manages saved jobs and output rules

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{jobs, rules, run};
use common::config::Settings;
use common::telemetry;
use std::path::PathBuf;
use tracing::{debug, error};

#[derive(Parser)]
#[command(
    name = "sfcc-job",
    version,
    about = "Trigger remote jobs and tail their logs"
)]
struct Cli {
    /// Instance credentials file
    #[arg(long, global = true, default_value = "dw.json")]
    dw_json: PathBuf,

    /// Directory holding default.toml and local.toml
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    /// Directory holding saved jobs and output rules
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job and tail its log
    Run(run::RunArgs),
    /// Saved job management
    Jobs(jobs::JobsArgs),
    /// Output transformation rule management
    Rules(rules::RulesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from_path(&cli.config_dir)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(store_dir) = &cli.store_dir {
        settings.store.directory = store_dir.to_string_lossy().into_owned();
    }

    telemetry::init_logging(&settings.observability.log_level, settings.observability.json)?;
    telemetry::describe_metrics();

    debug!(
        config_dir = %cli.config_dir.display(),
        store_dir = %settings.store.directory,
        "Configuration loaded successfully"
    );

    let outcome = match cli.command {
        Commands::Run(args) => run::run(args, &cli.dw_json, &settings).await,
        Commands::Jobs(args) => jobs::handle(args, &settings).await,
        Commands::Rules(args) => rules::handle(args, &settings).await,
    };

    if let Err(e) = &outcome {
        error!(error = %e, "Command failed");
    }

    outcome
}
