// Error handling framework

use crate::models::ExecutionStatus;
use thiserror::Error;

/// Configuration errors, reported before any run starts
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Missing configuration value: {0}")]
    MissingValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// OAuth2 token exchange errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    TokenRequestFailed(String),

    #[error("Token request rejected with status {status}: {body}")]
    TokenRejected { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),
}

impl AuthError {
    /// Text written to the output console for this failure
    pub fn console_message(&self) -> String {
        match self {
            AuthError::TokenRejected { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Remote API errors
#[derive(Error, Debug)]
pub enum OcapiError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP request failed: {0}")]
    HttpRequestFailed(String),

    #[error("Request to {url} failed with status {status}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl OcapiError {
    /// Text written to the output console for this failure
    pub fn console_message(&self) -> String {
        match self {
            OcapiError::Auth(err) => err.console_message(),
            OcapiError::UnexpectedStatus { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }

    /// Auth failures are reported by the token issuer itself
    pub fn already_reported(&self) -> bool {
        matches!(self, OcapiError::Auth(_))
    }
}

/// Store errors for saved jobs and transformation rules
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(String),

    #[error("Store serialization failed: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        ConfigurationError::LoadFailed(err.to_string())
    }
}

/// A remote failure that has already been written to the output console.
///
/// Carries the status the caller should act on, which is always terminal so
/// that polling and tailing wind down instead of looping on bad state.
#[derive(Error, Debug)]
#[error("{error} (reported status: {status})")]
pub struct LoggedFailure {
    pub status: ExecutionStatus,
    #[source]
    pub error: OcapiError,
}

impl LoggedFailure {
    pub fn finished(error: OcapiError) -> Self {
        Self {
            status: ExecutionStatus::Finished,
            error,
        }
    }
}

/// Collapse a status result into the status the caller acts on
pub trait StatusOutcome {
    fn into_status(self) -> ExecutionStatus;
}

impl StatusOutcome for Result<ExecutionStatus, LoggedFailure> {
    fn into_status(self) -> ExecutionStatus {
        match self {
            Ok(status) => status,
            Err(failure) => failure.status,
        }
    }
}
