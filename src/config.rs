//! Configuration loading and management.
//!
//! Loads configuration from embedded config.toml with environment variable overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Cloud Identity REST base, e.g. `https://cloudidentity.googleapis.com/v1beta1`.
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from embedded config.toml with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config: Config =
            toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")?;

        if let Ok(endpoint) = env::var("CLOUD_IDENTITY_ENDPOINT") {
            config.api.endpoint = endpoint;
        }

        if let Ok(interval) = env::var("GROUPJIT_POLL_INTERVAL_SECS") {
            config.poll.interval_seconds = interval
                .parse()
                .context("GROUPJIT_POLL_INTERVAL_SECS must be a whole number of seconds")?;
        }

        if let Ok(timeout) = env::var("GROUPJIT_POLL_TIMEOUT_SECS") {
            config.poll.timeout_seconds = timeout
                .parse()
                .context("GROUPJIT_POLL_TIMEOUT_SECS must be a whole number of seconds")?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            config.logging.level = log_level;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate that required configuration is present.
    fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.api.endpoint)
            .with_context(|| format!("Invalid API endpoint: {}", self.api.endpoint))?;

        if !matches!(endpoint.scheme(), "https" | "http") {
            anyhow::bail!(
                "API endpoint must be an http(s) URL, got scheme '{}'",
                endpoint.scheme()
            );
        }

        if self.poll.interval_seconds == 0 {
            anyhow::bail!("poll.interval_seconds must be greater than 0");
        }

        if self.poll.timeout_seconds < self.poll.interval_seconds {
            anyhow::bail!(
                "poll.timeout_seconds ({}) must not be shorter than poll.interval_seconds ({})",
                self.poll.timeout_seconds,
                self.poll.interval_seconds
            );
        }

        Ok(())
    }

    /// API endpoint without a trailing slash, ready for path joins.
    pub fn endpoint(&self) -> &str {
        self.api.endpoint.trim_end_matches('/')
    }
}
