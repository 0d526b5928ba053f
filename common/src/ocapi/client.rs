// OCAPI HTTP client implementation

use crate::auth::TokenIssuer;
use crate::config::{ApiConfig, InstanceConfig};
use crate::errors::{ConfigurationError, LoggedFailure, OcapiError};
use crate::models::{
    ByteRange, ExecutionDescriptor, ExecutionResponse, ExecutionStatus, ExecutionStatusResponse,
    LogChunk,
};
use crate::ocapi::JobsApi;
use crate::output::{announce, OutputSink};
use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// WebDAV mount serving instance files, including job logs
const WEBDAV_PREFIX: &str = "/on/demandware.servlet/webdav";

/// OcapiClient talks to the data API and the WebDAV log surface of one instance
pub struct OcapiClient {
    http: Client,
    instance: InstanceConfig,
    api_version: String,
    tokens: TokenIssuer,
    sink: Arc<dyn OutputSink>,
}

impl OcapiClient {
    /// Build the shared HTTP client used for both data API and token calls
    pub fn http_client(api: &ApiConfig) -> Result<Client, ConfigurationError> {
        Client::builder()
            .timeout(Duration::from_secs(api.request_timeout_seconds))
            .build()
            .map_err(|e| {
                ConfigurationError::Invalid(format!("Failed to create HTTP client: {}", e))
            })
    }

    pub fn new(
        http: Client,
        instance: InstanceConfig,
        api_version: impl Into<String>,
        tokens: TokenIssuer,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            http,
            instance,
            api_version: api_version.into(),
            tokens,
            sink,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    fn executions_url(&self, job_id: &str) -> String {
        format!(
            "{}/s/-/dw/data/{}/jobs/{}/executions",
            self.instance.base_url(),
            self.api_version,
            job_id
        )
    }

    /// Request builder carrying a fresh bearer token
    async fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder, OcapiError> {
        let token = self.tokens.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Send a request, turning transport errors and non-success statuses into errors
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, OcapiError> {
        counter!("ocapi_requests_total").increment(1);

        let response = request
            .send()
            .await
            .map_err(|e| OcapiError::HttpRequestFailed(e.to_string()))?;

        let status = response.status();
        debug!(url = url, status = status.as_u16(), "OCAPI response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcapiError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Write a failure to the console unless the token issuer already did
    fn report(&self, error: &OcapiError) {
        warn!(error = %error, "OCAPI call failed");
        counter!("ocapi_request_failures_total").increment(1);
        if !error.already_reported() {
            self.sink.append_line(&error.console_message());
        }
    }

    async fn create_execution(&self, job_id: &str) -> Result<ExecutionResponse, OcapiError> {
        let url = self.executions_url(job_id);
        let request = self.authorized(Method::POST, &url).await?;
        let response = self.send(request, &url).await?;

        response.json::<ExecutionResponse>().await.map_err(|e| {
            OcapiError::InvalidResponse(format!("Failed to parse execution response: {}", e))
        })
    }

    async fn fetch_status(
        &self,
        job_id: &str,
        execution_id: i64,
    ) -> Result<ExecutionStatus, OcapiError> {
        let url = format!("{}/{}", self.executions_url(job_id), execution_id);
        let request = self.authorized(Method::GET, &url).await?;
        let response = self.send(request, &url).await?;

        let body = response
            .json::<ExecutionStatusResponse>()
            .await
            .map_err(|e| {
                OcapiError::InvalidResponse(format!("Failed to parse status response: {}", e))
            })?;

        Ok(body.execution_status)
    }

    async fn fetch_log(
        &self,
        log_file_path: &str,
        range: Option<ByteRange>,
    ) -> Result<LogChunk, OcapiError> {
        let url = self.log_url(log_file_path);
        let mut request = self.authorized(Method::GET, &url).await?;
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = self.send(request, &url).await?;
        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let declared_size = content_length(&response);
        let body = response.bytes().await.map_err(|e| {
            OcapiError::HttpRequestFailed(format!("Failed to read log content: {}", e))
        })?;

        match range {
            Some(range) if !partial => {
                warn!(url = %url, range = %range, "Range ignored by server, slicing full log");
                let body = slice_range(&body, range);
                Ok(LogChunk {
                    size: body.len() as u64,
                    text: String::from_utf8_lossy(body).into_owned(),
                })
            }
            _ => Ok(LogChunk {
                size: declared_size.unwrap_or(body.len() as u64),
                text: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }

    async fn probe_log_size(&self, log_file_path: &str) -> Result<u64, OcapiError> {
        let url = self.log_url(log_file_path);
        let request = self.authorized(Method::HEAD, &url).await?;
        let response = self.send(request, &url).await?;

        Ok(content_length(&response).unwrap_or(0))
    }
}

/// The bytes of `range` within a complete log body
fn slice_range(body: &[u8], range: ByteRange) -> &[u8] {
    let len = body.len() as u64;
    let start = range.start.min(len) as usize;
    let end = range.end.min(len).max(range.start.min(len)) as usize;
    &body[start..end]
}

/// Size announced by the `Content-Length` header
fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[async_trait]
impl JobsApi for OcapiClient {
    #[instrument(skip(self))]
    async fn execute_job(&self, job_id: &str) -> Result<ExecutionDescriptor, LoggedFailure> {
        match self.create_execution(job_id).await {
            Ok(response) => {
                announce(
                    self.sink.as_ref(),
                    &format!(
                        "Job {} started, current status: {}",
                        job_id, response.execution_status
                    ),
                );

                Ok(ExecutionDescriptor {
                    job_id: job_id.to_string(),
                    execution_id: response.id,
                    log_file_path: response.log_file_path,
                    status: response.execution_status,
                    log_bytes_read: 0,
                })
            }
            Err(e) => {
                self.report(&e);
                Err(LoggedFailure::finished(e))
            }
        }
    }

    #[instrument(skip(self))]
    async fn job_status(
        &self,
        job_id: &str,
        execution_id: i64,
    ) -> Result<ExecutionStatus, LoggedFailure> {
        self.fetch_status(job_id, execution_id).await.map_err(|e| {
            self.report(&e);
            LoggedFailure::finished(e)
        })
    }

    #[instrument(skip(self))]
    async fn log_content(
        &self,
        log_file_path: &str,
        range: Option<ByteRange>,
    ) -> Result<LogChunk, OcapiError> {
        self.fetch_log(log_file_path, range).await.map_err(|e| {
            self.report(&e);
            e
        })
    }

    #[instrument(skip(self))]
    async fn log_size(&self, log_file_path: &str) -> Result<u64, OcapiError> {
        self.probe_log_size(log_file_path).await.map_err(|e| {
            self.report(&e);
            e
        })
    }

    fn log_url(&self, log_file_path: &str) -> String {
        let separator = if log_file_path.starts_with('/') { "" } else { "/" };
        format!(
            "{}{}{}{}",
            self.instance.base_url(),
            WEBDAV_PREFIX,
            separator,
            log_file_path
        )
    }
}
