// Bootstrap utilities for binary initialization
// Wires configuration, output console, token issuer and client into a runner

use crate::auth::{CredentialCache, SystemClock, TokenIssuer};
use crate::config::{InstanceConfig, Settings};
use crate::models::SavedTransformation;
use crate::ocapi::{JobEngine, JobsApi, OcapiClient, TailSchedule};
use crate::output::{FilteredSink, OutputSink};
use crate::runner::JobRunner;
use crate::store::{transformation_store, Store};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Tail schedule derived from the settings
pub fn tail_schedule(settings: &Settings) -> TailSchedule {
    TailSchedule {
        grace_period: settings.tail.grace_period(),
        poll_interval: settings.tail.poll_interval(),
    }
}

/// Build the console used for runs: `inner` filtered by the enabled transformation rules
///
/// # Errors
/// Returns error if the transformation store cannot be read
#[tracing::instrument(skip(settings, inner))]
pub async fn init_output(settings: &Settings, inner: Arc<dyn OutputSink>) -> Result<Arc<FilteredSink>> {
    let rules: Vec<SavedTransformation> = transformation_store(&settings.store.directory)
        .all_items()
        .await
        .context("Failed to read transformation rules")?;

    let sink = Arc::new(FilteredSink::new(inner));
    sink.set_rules(&rules);

    info!(rules = sink.rule_count(), "Output console initialized");
    Ok(sink)
}

/// Build an OCAPI client with its own token issuer
///
/// # Errors
/// Returns error if the HTTP client cannot be created
#[tracing::instrument(skip_all)]
pub fn init_client(
    settings: &Settings,
    instance: &InstanceConfig,
    cache: CredentialCache,
    sink: Arc<dyn OutputSink>,
) -> Result<OcapiClient> {
    let http = OcapiClient::http_client(&settings.api).context("Failed to build HTTP client")?;

    let tokens = TokenIssuer::new(
        http.clone(),
        instance.clone(),
        settings.api.auth_url.clone(),
        cache,
        Arc::new(SystemClock),
        sink.clone(),
    );

    info!(
        hostname = %instance.hostname,
        grant = tokens.grant().label(),
        api_version = %settings.api.version,
        "OCAPI client initialized"
    );

    Ok(OcapiClient::new(
        http,
        instance.clone(),
        settings.api.version.clone(),
        tokens,
        sink,
    ))
}

/// Build a job runner for `instance`
///
/// # Errors
/// Returns error if the client cannot be created
pub fn init_runner(
    settings: &Settings,
    instance: &InstanceConfig,
    sink: Arc<dyn OutputSink>,
) -> Result<JobRunner> {
    let client = init_client(settings, instance, CredentialCache::new(), sink.clone())?;
    let api: Arc<dyn JobsApi> = Arc::new(client);
    let engine = JobEngine::new(api, sink, tail_schedule(settings));

    Ok(JobRunner::new(engine, instance.is_defined()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SavedTransformation;
    use crate::output::MemorySink;

    #[tokio::test]
    async fn test_init_output_loads_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.store.directory = dir.path().to_string_lossy().into_owned();

        transformation_store(dir.path())
            .add_item(SavedTransformation {
                id: "mask".to_string(),
                pattern: "token=\\w+".to_string(),
                replacement: "token=***".to_string(),
                position: 0,
                enabled: true,
            })
            .await
            .unwrap();

        let memory = MemorySink::new();
        let sink = init_output(&settings, Arc::new(memory.clone())).await.unwrap();
        sink.append_line("token=abc123 ok");

        assert_eq!(memory.lines(), vec!["token=*** ok".to_string()]);
    }

    #[test]
    fn test_init_runner_reports_configuration() {
        let settings = Settings::default();
        let instance = InstanceConfig::default();
        let runner = init_runner(&settings, &instance, Arc::new(MemorySink::new())).unwrap();
        assert!(!runner.is_configured());
    }
}
