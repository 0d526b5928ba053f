// Job engine: trigger one execution and tail it

use crate::errors::LoggedFailure;
use crate::models::{ExecutionDescriptor, ExecutionStatus};
use crate::ocapi::tail::{tail_execution, TailOutcome, TailSchedule};
use crate::ocapi::JobsApi;
use crate::output::{announce, OutputSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// JobEngine holds the descriptor of the execution it is currently handling
pub struct JobEngine {
    api: Arc<dyn JobsApi>,
    sink: Arc<dyn OutputSink>,
    schedule: TailSchedule,
    descriptor: Option<ExecutionDescriptor>,
}

impl JobEngine {
    pub fn new(api: Arc<dyn JobsApi>, sink: Arc<dyn OutputSink>, schedule: TailSchedule) -> Self {
        Self {
            api,
            sink,
            schedule,
            descriptor: None,
        }
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    /// Descriptor of the execution started last, until it has been tailed
    pub fn descriptor(&self) -> Option<&ExecutionDescriptor> {
        self.descriptor.as_ref()
    }

    /// Start an execution of `job_id`.
    ///
    /// On failure the previous descriptor is dropped and the returned failure
    /// carries the terminal `finished` status.
    #[instrument(skip(self))]
    pub async fn execute_job(&mut self, job_id: &str) -> Result<ExecutionStatus, LoggedFailure> {
        self.descriptor = None;

        let descriptor = self.api.execute_job(job_id).await?;
        let status = descriptor.status.clone();
        self.descriptor = Some(descriptor);
        Ok(status)
    }

    /// Stream the log of the execution started for `job_id`.
    ///
    /// Returns `None` when no execution of that job is being tracked. The
    /// descriptor is discarded once tailing ends.
    #[instrument(skip(self))]
    pub async fn tail_job_logs(&mut self, job_id: &str, timeout: Duration) -> Option<TailOutcome> {
        let mut descriptor = match self.descriptor.take() {
            Some(descriptor) if descriptor.job_id == job_id => descriptor,
            other => {
                debug!("No execution tracked for job, nothing to tail");
                self.descriptor = other;
                return None;
            }
        };

        announce(
            self.sink.as_ref(),
            &format!(
                "Start tail logs monitoring from {} , timeout: {}ms",
                self.api.log_url(&descriptor.log_file_path),
                timeout.as_millis()
            ),
        );

        let outcome = tail_execution(
            self.api.as_ref(),
            self.sink.as_ref(),
            &self.schedule,
            &mut descriptor,
            timeout,
        )
        .await;

        Some(outcome)
    }
}
