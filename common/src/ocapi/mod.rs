// Remote job execution API and log tailing
// Provides the JobsApi trait, its HTTP implementation and the tailing engine

pub mod client;
pub mod engine;
pub mod tail;

use crate::errors::{LoggedFailure, OcapiError};
use crate::models::{ByteRange, ExecutionDescriptor, ExecutionStatus, LogChunk};
use async_trait::async_trait;

pub use client::OcapiClient;
pub use engine::JobEngine;
pub use tail::TailSchedule;

/// JobsApi defines the remote calls the engine needs.
///
/// Implementations write their own failures to the output console, so every
/// error returned here has already been shown to the operator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobsApi: Send + Sync {
    /// Start an execution of `job_id`
    async fn execute_job(&self, job_id: &str) -> Result<ExecutionDescriptor, LoggedFailure>;

    /// Current status of an execution
    async fn job_status(
        &self,
        job_id: &str,
        execution_id: i64,
    ) -> Result<ExecutionStatus, LoggedFailure>;

    /// Log content, either whole or restricted to `range`
    async fn log_content(
        &self,
        log_file_path: &str,
        range: Option<ByteRange>,
    ) -> Result<LogChunk, OcapiError>;

    /// Current size of the log file in bytes
    async fn log_size(&self, log_file_path: &str) -> Result<u64, OcapiError>;

    /// Public URL of a log file
    fn log_url(&self, log_file_path: &str) -> String;
}
