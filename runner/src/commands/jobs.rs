//! `sfcc-job jobs` - Saved job management

use super::print_items;
use anyhow::Result;
use clap::{Args, Subcommand};
use common::config::Settings;
use common::models::SavedJob;
use common::store::{job_store, Store};

#[derive(Args)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Subcommand)]
pub enum JobsCommand {
    /// List saved jobs
    List,
    /// Save a job, replacing any saved job with the same id
    Add {
        /// Job id
        id: String,
        /// Tail timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Clear the console before each run
        #[arg(long)]
        clear_log: bool,
        /// Sort position in listings
        #[arg(long, default_value_t = 0)]
        position: i64,
    },
    /// Remove a saved job
    Remove {
        /// Job id
        id: String,
    },
}

pub async fn handle(args: JobsArgs, settings: &Settings) -> Result<()> {
    let store = job_store(&settings.store.directory);

    match args.command {
        JobsCommand::List => {
            print_items(&store, "No saved jobs", |job: &SavedJob| {
                format!(
                    "{:<32} timeout={}ms clear_log={} position={}",
                    job.id, job.timeout, job.clear_log, job.position
                )
            })
            .await?;
        }
        JobsCommand::Add {
            id,
            timeout,
            clear_log,
            position,
        } => {
            store
                .add_item(SavedJob {
                    id: id.clone(),
                    timeout: timeout.unwrap_or(settings.tail.default_timeout_ms),
                    clear_log,
                    position,
                })
                .await?;
            println!("Saved job {}", id);
        }
        JobsCommand::Remove { id } => {
            if store.remove_item(&id).await? {
                println!("Removed job {}", id);
            } else {
                println!("No saved jobs");
            }
        }
    }

    Ok(())
}
