//! Client configuration types and builders.

use std::fmt;
use std::time::Duration;

use crate::cluster::ConfigSourceKind;

/// Default key-value operation timeout.
const DEFAULT_KV_TIMEOUT: Duration = Duration::from_millis(2500);
/// Default bucket bootstrap timeout.
const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);
/// Default initial retry backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1);
/// Default maximum retry backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(500);
/// Default retry multiplier.
const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
/// Default maximum retry attempts.
const DEFAULT_MAX_RETRIES: u32 = 10;
/// Default delay before a dropped config stream is reopened.
const DEFAULT_STREAM_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Default bootstrap address.
const DEFAULT_BOOTSTRAP_ADDRESS: &str = "127.0.0.1:11210";

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ConfigError> for docstore_core::DocstoreError {
    fn from(err: ConfigError) -> Self {
        docstore_core::DocstoreError::Configuration(err.message)
    }
}

/// Username and password presented to config sources and servers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Retry policy for operations rejected because of a stale topology.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    max_retries: u32,
}

impl RetryConfig {
    /// Returns the initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the maximum number of retry attempts.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the backoff before retry number `attempt` (zero-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(64) as i32);
        let backoff = self.initial_backoff.as_secs_f64() * factor;
        if !backoff.is_finite() || backoff >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(backoff)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    max_retries: Option<u32>,
}

impl RetryConfigBuilder {
    /// Creates a new retry configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial backoff duration.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the maximum number of retry attempts.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Builds the retry configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `initial_backoff` exceeds `max_backoff`
    /// - `multiplier` is less than 1.0
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        let max_backoff = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF);
        let multiplier = self.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        let max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);

        if initial_backoff > max_backoff {
            return Err(ConfigError::new(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if multiplier < 1.0 {
            return Err(ConfigError::new("multiplier must be at least 1.0"));
        }

        Ok(RetryConfig {
            initial_backoff,
            max_backoff,
            multiplier,
            max_retries,
        })
    }
}

/// Timeouts applied to bootstrap and key-value operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    kv_timeout: Duration,
    bootstrap_timeout: Duration,
}

impl TimeoutConfig {
    /// Returns the key-value operation timeout.
    pub fn kv_timeout(&self) -> Duration {
        self.kv_timeout
    }

    /// Returns the per-source bootstrap timeout.
    pub fn bootstrap_timeout(&self) -> Duration {
        self.bootstrap_timeout
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            kv_timeout: DEFAULT_KV_TIMEOUT,
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
        }
    }
}

/// Builder for `TimeoutConfig`.
#[derive(Debug, Clone, Default)]
pub struct TimeoutConfigBuilder {
    kv_timeout: Option<Duration>,
    bootstrap_timeout: Option<Duration>,
}

impl TimeoutConfigBuilder {
    /// Creates a new timeout configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key-value operation timeout.
    pub fn kv_timeout(mut self, timeout: Duration) -> Self {
        self.kv_timeout = Some(timeout);
        self
    }

    /// Sets the per-source bootstrap timeout.
    pub fn bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = Some(timeout);
        self
    }

    /// Builds the timeout configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if either timeout is zero.
    pub fn build(self) -> Result<TimeoutConfig, ConfigError> {
        let kv_timeout = self.kv_timeout.unwrap_or(DEFAULT_KV_TIMEOUT);
        let bootstrap_timeout = self.bootstrap_timeout.unwrap_or(DEFAULT_BOOTSTRAP_TIMEOUT);

        if kv_timeout.is_zero() || bootstrap_timeout.is_zero() {
            return Err(ConfigError::new("timeouts must be greater than zero"));
        }

        Ok(TimeoutConfig {
            kv_timeout,
            bootstrap_timeout,
        })
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    bootstrap_addresses: Vec<String>,
    credentials: Option<Credentials>,
    config_sources: Vec<ConfigSourceKind>,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
    stream_reconnect_delay: Duration,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the seed addresses used to reach the cluster.
    pub fn bootstrap_addresses(&self) -> &[String] {
        &self.bootstrap_addresses
    }

    /// Returns the credentials, if configured.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Returns the config sources in the order they are tried.
    pub fn config_sources(&self) -> &[ConfigSourceKind] {
        &self.config_sources
    }

    /// Returns the timeout configuration.
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Returns the retry configuration.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the delay before a dropped config stream is reopened.
    pub fn stream_reconnect_delay(&self) -> Duration {
        self.stream_reconnect_delay
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootstrap_addresses: vec![DEFAULT_BOOTSTRAP_ADDRESS.to_string()],
            credentials: None,
            config_sources: ConfigSourceKind::DEFAULT_ORDER.to_vec(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            stream_reconnect_delay: DEFAULT_STREAM_RECONNECT_DELAY,
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    bootstrap_addresses: Vec<String>,
    credentials: Option<Credentials>,
    config_sources: Option<Vec<ConfigSourceKind>>,
    timeouts: TimeoutConfigBuilder,
    retry: RetryConfigBuilder,
    stream_reconnect_delay: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a seed address (`host:port`).
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.bootstrap_addresses.push(address.into());
        self
    }

    /// Replaces the seed addresses.
    pub fn addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bootstrap_addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Sets the config sources and their priority order.
    pub fn config_sources(mut self, kinds: impl Into<Vec<ConfigSourceKind>>) -> Self {
        self.config_sources = Some(kinds.into());
        self
    }

    /// Configures timeouts using a builder function.
    pub fn timeouts<F>(mut self, f: F) -> Self
    where
        F: FnOnce(TimeoutConfigBuilder) -> TimeoutConfigBuilder,
    {
        self.timeouts = f(self.timeouts);
        self
    }

    /// Sets the key-value operation timeout.
    pub fn kv_timeout(self, timeout: Duration) -> Self {
        self.timeouts(|t| t.kv_timeout(timeout))
    }

    /// Configures retry settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryConfigBuilder) -> RetryConfigBuilder,
    {
        self.retry = f(self.retry);
        self
    }

    /// Sets the delay before a dropped config stream is reopened.
    pub fn stream_reconnect_delay(mut self, delay: Duration) -> Self {
        self.stream_reconnect_delay = Some(delay);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - an address is not of the form `host:port`
    /// - the config source list is empty or repeats a kind
    /// - a nested timeout or retry configuration is invalid
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let bootstrap_addresses = if self.bootstrap_addresses.is_empty() {
            vec![DEFAULT_BOOTSTRAP_ADDRESS.to_string()]
        } else {
            self.bootstrap_addresses
        };
        for address in &bootstrap_addresses {
            validate_address(address)?;
        }

        let config_sources = self
            .config_sources
            .unwrap_or_else(|| ConfigSourceKind::DEFAULT_ORDER.to_vec());
        if config_sources.is_empty() {
            return Err(ConfigError::new("at least one config source is required"));
        }
        for (i, kind) in config_sources.iter().enumerate() {
            if config_sources[..i].contains(kind) {
                return Err(ConfigError::new(format!(
                    "config source {kind} listed more than once"
                )));
            }
        }

        Ok(ClientConfig {
            bootstrap_addresses,
            credentials: self.credentials,
            config_sources,
            timeouts: self.timeouts.build()?,
            retry: self.retry.build()?,
            stream_reconnect_delay: self
                .stream_reconnect_delay
                .unwrap_or(DEFAULT_STREAM_RECONNECT_DELAY),
        })
    }
}

fn validate_address(address: &str) -> Result<(), ConfigError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::new(format!("address {address} is missing a port")))?;
    if host.is_empty() {
        return Err(ConfigError::new(format!("address {address} is missing a host")));
    }
    port.parse::<u16>()
        .map_err(|_| ConfigError::new(format!("address {address} has an invalid port")))?;
    Ok(())
}
