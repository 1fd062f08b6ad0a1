//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Delivery configuration.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Number of drain-loop tasks in the worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Timeout for a single delivery request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// User-Agent sent with every delivery.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Attempt ceiling after which a transiently failing job is dropped.
    /// `None` retries until the remote answers with a final outcome.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Attempt count from which every further transient failure is logged
    /// at warn level.
    #[serde(default = "default_report_after_attempts")]
    pub report_after_attempts: u32,
    /// Appended to the actor id to build the signature `keyId`.
    #[serde(default = "default_key_id_suffix")]
    pub key_id_suffix: String,
    /// Interval at which idle workers re-check the queue, in seconds.
    /// Picks up work left behind by a pass that stopped on a store error.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// How long a claimed job stays hidden from other workers, in seconds.
    /// A job whose worker died is delivered again after this long, so it
    /// must exceed the request timeout.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl DeliveryConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Claim lease as a [`Duration`].
    #[must_use]
    pub const fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    /// Reject settings the delivery engine cannot run with.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "delivery.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(config::ConfigError::Message(
                "delivery.max_attempts must be at least 1; omit it to retry without limit"
                    .to_string(),
            ));
        }
        if self.claim_lease_secs <= self.request_timeout_secs {
            return Err(config::ConfigError::Message(format!(
                "delivery.claim_lease_secs ({}) must exceed delivery.request_timeout_secs ({})",
                self.claim_lease_secs, self.request_timeout_secs
            )));
        }
        Ok(())
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            max_attempts: None,
            report_after_attempts: default_report_after_attempts(),
            key_id_suffix: default_key_id_suffix(),
            sweep_interval_secs: default_sweep_interval_secs(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_workers() -> usize {
    4
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("courier/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_report_after_attempts() -> u32 {
    10
}

fn default_key_id_suffix() -> String {
    "#main-key".to_string()
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_claim_lease_secs() -> u64 {
    300
}

fn default_log_filter() -> String {
    "courier=info".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `COURIER_ENV`)
    /// 3. Environment variables with `COURIER_` prefix
    ///
    /// Fails if the result does not pass [`DeliveryConfig::validate`].
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("COURIER_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_source(config)
    }

    fn from_source(source: config::Config) -> Result<Self, config::ConfigError> {
        let config: Self = source.try_deserialize()?;
        config.delivery.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_source(config)
    }
}
