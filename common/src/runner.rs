// Job runner: one run request from trigger to the end of its log

use crate::errors::StatusOutcome;
use crate::models::{ExecutionStatus, RunRequest};
use crate::ocapi::tail::TailOutcome;
use crate::ocapi::JobEngine;
use std::time::Duration;
use tracing::{info, instrument};

/// Result of a run, as far as the caller is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Status reported when the execution was created
    pub initial_status: ExecutionStatus,
    /// How tailing ended, `None` when the execution was already terminal
    pub tail: Option<TailOutcome>,
}

/// JobRunner drives a JobEngine for run requests and remembers the last job id
pub struct JobRunner {
    engine: JobEngine,
    configured: bool,
    last_job_id: String,
}

impl JobRunner {
    pub fn new(engine: JobEngine, configured: bool) -> Self {
        Self {
            engine,
            configured,
            last_job_id: String::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn last_job_id(&self) -> &str {
        &self.last_job_id
    }

    /// Run a job and follow its log. Failures are reported on the output
    /// console and surface only as the statuses in the summary.
    #[instrument(skip(self), fields(job_id = %request.job_id))]
    pub async fn run(&mut self, request: &RunRequest) -> RunSummary {
        self.last_job_id = request.job_id.clone();

        if request.clear_output_first {
            self.engine.sink().clear();
        }

        let initial_status = self.engine.execute_job(&request.job_id).await.into_status();

        let tail = if initial_status.is_terminal() {
            info!(status = %initial_status, "Execution not active, skipping tail");
            None
        } else {
            self.engine
                .tail_job_logs(
                    &request.job_id,
                    Duration::from_millis(request.timeout_millis),
                )
                .await
        };

        RunSummary {
            initial_status,
            tail,
        }
    }
}
