// Configuration management with layered configuration (file, env)

use crate::errors::ConfigurationError;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variables that override individual dw.json keys
const DW_JSON_ENV_OVERRIDES: [(&str, &str); 5] = [
    ("hostname", "SFCC_HOSTNAME"),
    ("client-id", "SFCC_CLIENT_ID"),
    ("client-secret", "SFCC_CLIENT_SECRET"),
    ("username", "SFCC_USERNAME"),
    ("password", "SFCC_PASSWORD"),
];

/// Instance credentials, read from a dw.json file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub hostname: String,
    #[serde(rename = "client-id", default)]
    pub client_id: String,
    #[serde(rename = "client-secret", default)]
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl InstanceConfig {
    /// Load a dw.json file; `SFCC_*` environment variables win over file values
    pub fn from_dw_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::LoadFailed(format!(
                "{} not found",
                path.display()
            )));
        }

        let mut builder =
            Config::builder().add_source(File::from(path).format(FileFormat::Json).required(true));

        for (key, variable) in DW_JSON_ENV_OVERRIDES {
            builder = builder.set_override_option(key, std::env::var(variable).ok())?;
        }

        let config = builder.build()?;
        let mut instance: InstanceConfig = config.try_deserialize()?;
        instance.hostname = instance.hostname.trim().trim_end_matches('/').to_string();
        Ok(instance)
    }

    /// True when hostname and client credentials are all present
    pub fn is_defined(&self) -> bool {
        !self.hostname.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Username and password, when both are configured
    pub fn user_credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some((username, password))
            }
            _ => None,
        }
    }

    /// Base URL of the instance. A hostname that already carries a scheme is used as-is.
    pub fn base_url(&self) -> String {
        if self.hostname.starts_with("http://") || self.hostname.starts_with("https://") {
            self.hostname.clone()
        } else {
            format!("https://{}", self.hostname)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.hostname.is_empty() {
            return Err(ConfigurationError::MissingValue("hostname".to_string()));
        }
        if self.client_id.is_empty() {
            return Err(ConfigurationError::MissingValue("client-id".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigurationError::MissingValue("client-secret".to_string()));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigurationError::Invalid(
                "username and password must be configured together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runner settings structure containing all tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub api: ApiConfig,
    pub tail: TailConfig,
    pub store: StoreConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Data API version path segment, e.g. `v22_6`
    pub version: String,
    /// Account manager token endpoint for the client-credentials grant
    pub auth_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailConfig {
    pub grace_period_ms: u64,
    pub poll_interval_ms: u64,
    pub default_timeout_ms: u64,
}

impl TailConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigurationError> {
        let config_dir = config_dir.as_ref();
        let defaults = Settings::default();

        let builder = Config::builder()
            // Start with built-in defaults
            .set_default("api.version", defaults.api.version)?
            .set_default("api.auth_url", defaults.api.auth_url)?
            .set_default(
                "api.request_timeout_seconds",
                defaults.api.request_timeout_seconds as i64,
            )?
            .set_default("tail.grace_period_ms", defaults.tail.grace_period_ms as i64)?
            .set_default("tail.poll_interval_ms", defaults.tail.poll_interval_ms as i64)?
            .set_default(
                "tail.default_timeout_ms",
                defaults.tail.default_timeout_ms as i64,
            )?
            .set_default("store.directory", defaults.store.directory)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.json", defaults.observability.json)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.api.version.is_empty() {
            return Err(ConfigurationError::MissingValue("api.version".to_string()));
        }
        if self.api.auth_url.is_empty() {
            return Err(ConfigurationError::MissingValue("api.auth_url".to_string()));
        }
        if self.api.request_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid(
                "api.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.tail.poll_interval_ms == 0 {
            return Err(ConfigurationError::Invalid(
                "tail.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.store.directory.is_empty() {
            return Err(ConfigurationError::MissingValue("store.directory".to_string()));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                version: "v22_6".to_string(),
                auth_url: "https://account.demandware.com/dwsso/oauth2/access_token".to_string(),
                request_timeout_seconds: 30,
            },
            tail: TailConfig {
                grace_period_ms: 1000,
                poll_interval_ms: 1500,
                default_timeout_ms: crate::models::DEFAULT_TAIL_TIMEOUT_MS,
            },
            store: StoreConfig {
                directory: ".sfcc-jobs".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json: false,
            },
        }
    }
}
