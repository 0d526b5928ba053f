use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default tail timeout when the caller does not provide one
pub const DEFAULT_TAIL_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// Execution Models
// ============================================================================

/// Execution status as reported by the remote job framework.
///
/// Only `pending` and `running` keep a tail alive. The remote vocabulary is
/// open-ended, so every other value (including ones this crate has never
/// seen) is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionStatus {
    Pending,
    Running,
    /// Sentinel reported when a remote call failed
    Finished,
    Other(String),
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Finished => "finished",
            ExecutionStatus::Other(value) => value,
        }
    }
}

impl From<String> for ExecutionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => ExecutionStatus::Pending,
            "running" => ExecutionStatus::Running,
            "finished" => ExecutionStatus::Finished,
            _ => ExecutionStatus::Other(value),
        }
    }
}

impl From<&str> for ExecutionStatus {
    fn from(value: &str) -> Self {
        ExecutionStatus::from(value.to_string())
    }
}

impl From<ExecutionStatus> for String {
    fn from(status: ExecutionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ExecutionDescriptor tracks one in-flight job execution while it is tailed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionDescriptor {
    pub job_id: String,
    pub execution_id: i64,
    pub log_file_path: String,
    pub status: ExecutionStatus,
    pub log_bytes_read: u64,
}

/// Body returned when an execution is created
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionResponse {
    #[serde(deserialize_with = "execution_id_from_number_or_string")]
    pub id: i64,
    pub execution_status: ExecutionStatus,
    #[serde(default)]
    pub log_file_path: String,
}

/// Execution ids arrive as JSON numbers or as numeric strings
fn execution_id_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(|_| {
            de::Error::invalid_value(de::Unexpected::Str(&text), &"a numeric execution id")
        }),
    }
}

/// Body returned by the execution status endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStatusResponse {
    pub execution_status: ExecutionStatus,
}

/// Half-open byte range `[start, end)` of a remote log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value for the HTTP `Range` header (inclusive last byte)
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A piece of log content together with the size reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogChunk {
    pub text: String,
    pub size: u64,
}

// ============================================================================
// Run Models
// ============================================================================

/// RunRequest is the caller's description of a single job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub job_id: String,
    pub timeout_millis: u64,
    pub clear_output_first: bool,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            job_id: String::new(),
            timeout_millis: DEFAULT_TAIL_TIMEOUT_MS,
            clear_output_first: false,
        }
    }
}

impl RunRequest {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout_millis: u64) -> Self {
        self.timeout_millis = timeout_millis;
        self
    }

    pub fn with_clear_output(mut self, clear: bool) -> Self {
        self.clear_output_first = clear;
        self
    }
}

// ============================================================================
// OAuth2 Models
// ============================================================================

/// Token endpoint response shared by both grants
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

// ============================================================================
// Saved Records
// ============================================================================

/// SavedJob is a named job with its preferred run settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedJob {
    pub id: String,
    pub timeout: u64,
    pub clear_log: bool,
    #[serde(default)]
    pub position: i64,
}

impl SavedJob {
    /// Build a run request from the saved settings; a zero timeout falls back to `default_timeout_ms`
    pub fn to_run_request(&self, default_timeout_ms: u64) -> RunRequest {
        let timeout = if self.timeout == 0 {
            default_timeout_ms
        } else {
            self.timeout
        };

        RunRequest::new(self.id.clone())
            .with_timeout(timeout)
            .with_clear_output(self.clear_log)
    }
}

/// SavedTransformation is a regex substitution applied to console output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTransformation {
    pub id: String,
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
