//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings.
//! Configuration is loaded from a TOML file; every section and key is
//! optional and falls back to its documented default.
//!
//! # Example
//!
//! ```no_run
//! use slotkeeper::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::logging::LoggingConfig;
use super::provider::{LiveProviderConfig, PollProviderConfig, ProviderConfig, SimulationConfig};
use super::reconnection::ReconnectionConfig;
use super::scheduler::{InboxConfig, ScannerConfig, SchedulerConfig};
use crate::error::{ConfigError, Result};

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Slot allocation and loop timing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Poll scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Push inbox sizing.
    #[serde(default)]
    pub inbox: InboxConfig,

    /// Live provider reconnection settings.
    ///
    /// Controls backoff delays and circuit breaker behavior.
    #[serde(default)]
    pub reconnection: ReconnectionConfig,

    /// Live and poll provider selection.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Simulated market parameters, used by simulated providers.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn invalid(field: &'static str, reason: &str) -> crate::error::Error {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
    .into()
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        if scheduler.max_live_slots == 0 {
            return Err(invalid("max_live_slots", "must be greater than 0"));
        }
        if scheduler.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be greater than 0"));
        }
        if !scheduler.qualify_threshold.is_finite() || !scheduler.retention_floor.is_finite() {
            return Err(invalid("qualify_threshold", "thresholds must be finite"));
        }
        if scheduler.retention_floor > scheduler.qualify_threshold {
            return Err(invalid("retention_floor", "must be <= qualify_threshold"));
        }
        if scheduler.actuation_concurrency == 0 {
            return Err(invalid("actuation_concurrency", "must be greater than 0"));
        }
        if scheduler.actuation_timeout_ms == 0 {
            return Err(invalid("actuation_timeout_ms", "must be greater than 0"));
        }
        if scheduler.retry_backoff_max_ms < scheduler.retry_backoff_initial_ms {
            return Err(invalid("retry_backoff_max_ms", "must be >= retry_backoff_initial_ms"));
        }
        if scheduler.max_pending_retries == 0 {
            return Err(invalid("max_pending_retries", "must be greater than 0"));
        }

        if self.scanner.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than 0"));
        }
        if self.scanner.fetch_timeout_ms == 0 {
            return Err(invalid("fetch_timeout_ms", "must be greater than 0"));
        }
        if self.inbox.capacity == 0 {
            return Err(invalid("capacity", "must be greater than 0"));
        }

        let reconnection = &self.reconnection;
        if reconnection.initial_delay_ms == 0 {
            return Err(invalid("initial_delay_ms", "must be greater than 0"));
        }
        if reconnection.max_delay_ms < reconnection.initial_delay_ms {
            return Err(invalid("max_delay_ms", "must be >= initial_delay_ms"));
        }
        if reconnection.backoff_multiplier < 1.0 {
            return Err(invalid("backoff_multiplier", "must be >= 1.0"));
        }
        if reconnection.max_consecutive_failures == 0 {
            return Err(invalid("max_consecutive_failures", "must be greater than 0"));
        }
        if reconnection.circuit_breaker_cooldown_ms == 0 {
            return Err(invalid("circuit_breaker_cooldown_ms", "must be greater than 0"));
        }
        if reconnection.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms", "must be greater than 0"));
        }

        if let LiveProviderConfig::Websocket(ws) = &self.provider.live {
            if ws.url.is_empty() {
                return Err(ConfigError::MissingField { field: "provider.live.url" }.into());
            }
        }
        if let PollProviderConfig::Http(http) = &self.provider.poll {
            if http.url.is_empty() {
                return Err(ConfigError::MissingField { field: "provider.poll.url" }.into());
            }
        }
        if self.simulation.universe_size == 0 {
            return Err(invalid("universe_size", "must be greater than 0"));
        }
        if !(self.simulation.volatility.is_finite() && self.simulation.volatility >= 0.0) {
            return Err(invalid("volatility", "must be a non-negative number"));
        }
        Ok(())
    }

    /// Force both providers to the simulated market.
    pub fn use_simulation(&mut self) {
        self.provider.live = LiveProviderConfig::Simulated;
        self.provider.poll = PollProviderConfig::Simulated;
    }

    /// Whether either provider is the simulated market.
    #[must_use]
    pub const fn use_simulated_providers(&self) -> bool {
        matches!(self.provider.live, LiveProviderConfig::Simulated)
            || matches!(self.provider.poll, PollProviderConfig::Simulated)
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
