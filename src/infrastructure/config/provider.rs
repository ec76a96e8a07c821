//! Market data provider selection.

use serde::Deserialize;

/// Both provider sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub live: LiveProviderConfig,
    #[serde(default)]
    pub poll: PollProviderConfig,
}

/// Live push provider variant, selected by `type`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveProviderConfig {
    /// JSON over WebSocket.
    Websocket(WebSocketConfig),
    /// In-process random-walk market.
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default)]
    pub url: String,
}

/// Poll provider variant, selected by `type`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PollProviderConfig {
    /// REST over HTTP.
    Http(HttpPollConfig),
    /// In-process random-walk market.
    #[default]
    Simulated,
}

/// HTTP poll client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpPollConfig {
    #[serde(default)]
    pub url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_http_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Maximum number of attempts for transient failures.
    #[serde(default = "default_http_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Backoff between retries in milliseconds.
    #[serde(default = "default_http_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

const fn default_http_timeout_ms() -> u64 {
    5000
}

const fn default_http_connect_timeout_ms() -> u64 {
    2000
}

const fn default_http_retry_max_attempts() -> u32 {
    3
}

const fn default_http_retry_backoff_ms() -> u64 {
    500
}

impl Default for HttpPollConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: default_http_timeout_ms(),
            connect_timeout_ms: default_http_connect_timeout_ms(),
            retry_max_attempts: default_http_retry_max_attempts(),
            retry_backoff_ms: default_http_retry_backoff_ms(),
        }
    }
}

/// Simulated market parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Number of synthetic symbols.
    #[serde(default = "default_universe_size")]
    pub universe_size: usize,
    /// Seed for the random walk. Unset means seeded from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Relative price volatility per one-second step.
    #[serde(default = "default_volatility")]
    pub volatility: f64,
}

const fn default_universe_size() -> usize {
    5000
}

const fn default_volatility() -> f64 {
    0.002
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            universe_size: default_universe_size(),
            seed: None,
            volatility: default_volatility(),
        }
    }
}
