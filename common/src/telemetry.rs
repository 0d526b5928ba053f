// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{describe_counter, Unit};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging on stderr.
///
/// Standard output belongs to the job console, so diagnostics never go there.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::debug!(log_level = log_level, json = json, "Logging initialized");

    Ok(())
}

/// Register descriptions for the counters recorded by the client and tailer
pub fn describe_metrics() {
    describe_counter!(
        "ocapi_requests_total",
        Unit::Count,
        "Data API and WebDAV requests sent"
    );
    describe_counter!(
        "ocapi_request_failures_total",
        Unit::Count,
        "Data API and WebDAV requests that failed"
    );
    describe_counter!(
        "ocapi_token_exchanges_total",
        Unit::Count,
        "OAuth2 token exchanges attempted, by grant"
    );
    describe_counter!(
        "log_bytes_tailed_total",
        Unit::Bytes,
        "Log bytes fetched while tailing executions"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_initialization_fails() {
        let _ = init_logging("debug", false);
        assert!(init_logging("debug", true).is_err());
    }

    #[test]
    fn test_describe_metrics_without_recorder() {
        describe_metrics();
    }
}
