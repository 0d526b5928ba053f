//! `sfcc-job run [JOB_ID]` - Run a job and tail its log

use anyhow::{Context, Result};
use clap::Args;
use common::bootstrap;
use common::config::{InstanceConfig, Settings};
use common::models::{RunRequest, SavedJob};
use common::output::{ConsoleSink, OutputSink};
use common::store::{job_store, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct RunArgs {
    /// Job to run; defaults to the @sfccJobId annotation of --file
    pub job_id: Option<String>,

    /// Tail timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Clear the console before the run
    #[arg(long)]
    pub clear_log: bool,

    /// Document carrying @sfccJobId / @sfccJobTailLogTimeout / @sfccJobClearLog annotations
    #[arg(long)]
    pub file: Option<PathBuf>,
}

pub async fn run(args: RunArgs, dw_json: &Path, settings: &Settings) -> Result<()> {
    let instance = InstanceConfig::from_dw_json(dw_json)
        .and_then(|instance| instance.validate().map(|_| instance))
        .with_context(|| {
            format!(
                "Instance configuration is missing or invalid, please define it in {}",
                dw_json.display()
            )
        })?;

    let document = match &args.file {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let saved_jobs = job_store(&settings.store.directory).all_items().await?;
    let request = resolve_request(
        &args,
        document.as_deref(),
        &saved_jobs,
        settings.tail.default_timeout_ms,
    )?;

    let console: Arc<dyn OutputSink> = Arc::new(ConsoleSink);
    let sink = bootstrap::init_output(settings, console).await?;
    let mut runner = bootstrap::init_runner(settings, &instance, sink)?;

    let summary = runner.run(&request).await;
    info!(
        job_id = %request.job_id,
        initial_status = %summary.initial_status,
        tail = ?summary.tail,
        "Run finished"
    );

    Ok(())
}

/// Work out what to run.
///
/// The job id comes from the argument, else from the document. Settings start
/// from the saved job of that id (or the configured default timeout), then the
/// document annotations, then the command line flags.
pub(crate) fn resolve_request(
    args: &RunArgs,
    document: Option<&str>,
    saved_jobs: &[SavedJob],
    default_timeout_ms: u64,
) -> Result<RunRequest> {
    let annotated = document.map(RunRequest::from_document);

    let job_id = args
        .job_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| {
            annotated
                .as_ref()
                .map(|request| request.job_id.clone())
                .filter(|id| !id.is_empty())
        })
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No job ids were found in the current file. Please define one using \"@sfccJobId <job id>\""
            )
        })?;

    let mut request = match saved_jobs.iter().find(|job| job.id == job_id) {
        Some(saved) => saved.to_run_request(default_timeout_ms),
        None => RunRequest::new(job_id.clone()).with_timeout(default_timeout_ms),
    };

    if let Some(document) = document {
        request.apply_document(document);
        request.job_id = job_id;
    }

    if let Some(timeout) = args.timeout {
        request.timeout_millis = timeout;
    }
    if args.clear_log {
        request.clear_output_first = true;
    }

    Ok(request)
}
