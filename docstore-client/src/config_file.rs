//! Declarative configuration loading from YAML, TOML, and environment variables.
//!
//! This module provides file-based configuration support through mirror structs
//! that can be deserialized with serde. These structs are then converted into the
//! programmatic [`ClientConfig`](crate::config::ClientConfig) using the builder API.
//!
//! # Supported Formats
//!
//! - **YAML** (requires `config-file` feature): `ClientConfig::from_yaml("docstore.yaml")`
//! - **TOML** (requires `config-file` feature): `ClientConfig::from_toml("docstore.toml")`
//! - **Environment Variables** (always available): `ClientConfig::from_env()`
//!
//! # Example YAML
//!
//! ```yaml
//! bootstrap:
//!   - "10.0.0.1:11210"
//!   - "10.0.0.2:11210"
//! username: app
//! password: secret
//! config-sources: [protocol, http-streaming]
//! timeouts:
//!   kv-timeout-ms: 2500
//!   bootstrap-timeout-ms: 10000
//! retry:
//!   initial-backoff-ms: 1
//!   max-backoff-ms: 500
//!   multiplier: 2.0
//!   max-retries: 10
//! stream-reconnect-delay-ms: 1000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::ConfigSourceKind;
use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError};

/// Top-level file-based configuration.
///
/// This struct mirrors [`ClientConfig`](crate::config::ClientConfig) with plain
/// serde types. It can be deserialized from YAML or TOML and then converted to
/// `ClientConfig` via [`TryFrom`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Seed addresses (`host:port`).
    pub bootstrap: Option<Vec<String>>,
    /// Username for bucket access.
    pub username: Option<String>,
    /// Password for bucket access.
    pub password: Option<String>,
    /// Config sources in priority order.
    pub config_sources: Option<Vec<ConfigSourceKind>>,
    /// Timeout configuration.
    pub timeouts: Option<FileTimeoutConfig>,
    /// Retry configuration.
    pub retry: Option<FileRetryConfig>,
    /// Delay before a dropped config stream is reopened, in milliseconds.
    pub stream_reconnect_delay_ms: Option<u64>,
}

/// File-based timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileTimeoutConfig {
    /// Key-value operation timeout in milliseconds.
    pub kv_timeout_ms: Option<u64>,
    /// Bucket bootstrap timeout in milliseconds.
    pub bootstrap_timeout_ms: Option<u64>,
}

/// File-based retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileRetryConfig {
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: Option<u64>,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: Option<u64>,
    /// Backoff multiplier.
    pub multiplier: Option<f64>,
    /// Maximum number of retry attempts.
    pub max_retries: Option<u32>,
}

impl TryFrom<FileConfig> for ClientConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = ClientConfigBuilder::new();

        if let Some(addresses) = file.bootstrap {
            builder = builder.addresses(addresses);
        }

        match (file.username, file.password) {
            (Some(username), Some(password)) => {
                builder = builder.credentials(username, password);
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::new(
                    "username and password must be configured together",
                ));
            }
        }

        if let Some(kinds) = file.config_sources {
            builder = builder.config_sources(kinds);
        }

        if let Some(timeouts) = file.timeouts {
            builder = builder.timeouts(|mut t| {
                if let Some(ms) = timeouts.kv_timeout_ms {
                    t = t.kv_timeout(Duration::from_millis(ms));
                }
                if let Some(ms) = timeouts.bootstrap_timeout_ms {
                    t = t.bootstrap_timeout(Duration::from_millis(ms));
                }
                t
            });
        }

        if let Some(retry) = file.retry {
            builder = builder.retry(|mut r| {
                if let Some(ms) = retry.initial_backoff_ms {
                    r = r.initial_backoff(Duration::from_millis(ms));
                }
                if let Some(ms) = retry.max_backoff_ms {
                    r = r.max_backoff(Duration::from_millis(ms));
                }
                if let Some(m) = retry.multiplier {
                    r = r.multiplier(m);
                }
                if let Some(n) = retry.max_retries {
                    r = r.max_retries(n);
                }
                r
            });
        }

        if let Some(ms) = file.stream_reconnect_delay_ms {
            builder = builder.stream_reconnect_delay(Duration::from_millis(ms));
        }

        builder.build()
    }
}

impl ClientConfig {
    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = ClientConfig::from_yaml("docstore.yaml")?;
    /// ```
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!("failed to read YAML config file: {e}"))
        })?;
        let file_config: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::new(format!("failed to parse YAML config: {e}"))
        })?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!("failed to read TOML config file: {e}"))
        })?;
        let file_config: FileConfig = toml_crate::from_str(&content).map_err(|e| {
            ConfigError::new(format!("failed to parse TOML config: {e}"))
        })?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// This method is always available (no feature flag required).
    ///
    /// # Supported Environment Variables
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `DOCSTORE_BOOTSTRAP` | Comma-separated seed addresses |
    /// | `DOCSTORE_USERNAME` | Username |
    /// | `DOCSTORE_PASSWORD` | Password |
    /// | `DOCSTORE_KV_TIMEOUT_MS` | Key-value timeout in milliseconds |
    /// | `DOCSTORE_BOOTSTRAP_TIMEOUT_MS` | Bootstrap timeout in milliseconds |
    /// | `DOCSTORE_CONFIG_SOURCES` | Comma-separated source kinds, e.g. `protocol,http-streaming` |
    /// | `DOCSTORE_MAX_RETRIES` | Maximum retry attempts |
    ///
    /// Unparseable numbers are ignored; an unknown source kind is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        from_vars(|name| std::env::var(name).ok())
    }
}

fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<ClientConfig, ConfigError> {
    let mut file_config = FileConfig::default();

    if let Some(val) = var("DOCSTORE_BOOTSTRAP") {
        file_config.bootstrap = Some(split_list(&val));
    }

    file_config.username = var("DOCSTORE_USERNAME");
    file_config.password = var("DOCSTORE_PASSWORD");

    if let Some(ms) = var("DOCSTORE_KV_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        file_config.timeouts.get_or_insert_with(Default::default).kv_timeout_ms = Some(ms);
    }

    if let Some(ms) = var("DOCSTORE_BOOTSTRAP_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        file_config
            .timeouts
            .get_or_insert_with(Default::default)
            .bootstrap_timeout_ms = Some(ms);
    }

    if let Some(val) = var("DOCSTORE_CONFIG_SOURCES") {
        let kinds = split_list(&val)
            .iter()
            .map(|s| s.parse::<ConfigSourceKind>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::new(e.to_string()))?;
        file_config.config_sources = Some(kinds);
    }

    if let Some(n) = var("DOCSTORE_MAX_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
        file_config.retry.get_or_insert_with(Default::default).max_retries = Some(n);
    }

    file_config.try_into()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convenience function to load a configuration file, auto-detecting format by extension.
///
/// Supports `.yaml`, `.yml`, and `.toml` extensions.
/// Requires the `config-file` feature.
///
/// # Example
///
/// ```ignore
/// let config = docstore_client::config_file::load_config("docstore.yaml")?;
/// ```
#[cfg(feature = "config-file")]
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ClientConfig::from_yaml(path),
        Some("toml") => ClientConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext} (expected .yaml, .yml, or .toml)"
        ))),
        None => Err(ConfigError::new(
            "config file has no extension; expected .yaml, .yml, or .toml",
        )),
    }
}
