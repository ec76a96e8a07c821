//! Scheduler, scanner and inbox configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::application::scanner::ScannerSettings;
use crate::application::subscription::{RetryBackoff, SubscriptionPolicy};
use crate::domain::score::ScoreMode;
use crate::domain::Symbol;

/// Slot allocation and loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Hard cap on concurrently held live subscriptions.
    #[serde(default = "default_max_live_slots")]
    pub max_live_slots: usize,
    /// How long the provider keeps a slot after an unsubscribe.
    #[serde(default = "default_unsubscribe_latency_secs")]
    pub unsubscribe_latency_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Slot holders below this score lose their slot.
    #[serde(default = "default_retention_floor")]
    pub retention_floor: f64,
    /// Symbols below this score never claim a slot.
    #[serde(default = "default_qualify_threshold")]
    pub qualify_threshold: f64,
    /// Zero disables debounce.
    #[serde(default)]
    pub debounce_window_ms: u64,
    #[serde(default = "default_max_pending_retries")]
    pub max_pending_retries: u32,
    /// Accepted subscribes are treated as live after this long.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Deadline for a single subscribe or unsubscribe call.
    #[serde(default = "default_actuation_timeout_ms")]
    pub actuation_timeout_ms: u64,
    /// Provider calls allowed in flight at once.
    #[serde(default = "default_actuation_concurrency")]
    pub actuation_concurrency: usize,
    #[serde(default = "default_retry_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
    /// Publish poll updates for symbols without a live slot.
    #[serde(default)]
    pub emit_poll_ticks: bool,
    /// How far back the live tracker's scoring anchor may lag.
    #[serde(default = "default_live_score_horizon_ms")]
    pub live_score_horizon_ms: u64,
    /// Stale scores lose half their value per half-life. Zero disables.
    #[serde(default = "default_stale_half_life_secs")]
    pub stale_half_life_secs: u64,
    /// Leaderboard rows older than this are flagged stale.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

const fn default_max_live_slots() -> usize {
    1000
}

const fn default_unsubscribe_latency_secs() -> u64 {
    60
}

const fn default_poll_interval_ms() -> u64 {
    5000
}

const fn default_retention_floor() -> f64 {
    0.25
}

const fn default_qualify_threshold() -> f64 {
    0.5
}

const fn default_max_pending_retries() -> u32 {
    5
}

const fn default_ack_timeout_ms() -> u64 {
    10_000
}

const fn default_actuation_timeout_ms() -> u64 {
    5_000
}

const fn default_actuation_concurrency() -> usize {
    16
}

const fn default_retry_backoff_initial_ms() -> u64 {
    1_000
}

const fn default_retry_backoff_max_ms() -> u64 {
    60_000
}

const fn default_live_score_horizon_ms() -> u64 {
    60_000
}

const fn default_stale_half_life_secs() -> u64 {
    60
}

const fn default_stale_after_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_live_slots: default_max_live_slots(),
            unsubscribe_latency_secs: default_unsubscribe_latency_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            retention_floor: default_retention_floor(),
            qualify_threshold: default_qualify_threshold(),
            debounce_window_ms: 0,
            max_pending_retries: default_max_pending_retries(),
            ack_timeout_ms: default_ack_timeout_ms(),
            actuation_timeout_ms: default_actuation_timeout_ms(),
            actuation_concurrency: default_actuation_concurrency(),
            retry_backoff_initial_ms: default_retry_backoff_initial_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            emit_poll_ticks: false,
            live_score_horizon_ms: default_live_score_horizon_ms(),
            stale_half_life_secs: default_stale_half_life_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn actuation_timeout(&self) -> Duration {
        Duration::from_millis(self.actuation_timeout_ms)
    }

    #[must_use]
    pub fn unsubscribe_latency(&self) -> chrono::Duration {
        span_secs(self.unsubscribe_latency_secs)
    }

    #[must_use]
    pub fn live_score_horizon(&self) -> chrono::Duration {
        span_ms(self.live_score_horizon_ms)
    }

    #[must_use]
    pub fn stale_after(&self) -> chrono::Duration {
        span_secs(self.stale_after_secs)
    }

    /// Selection and retry policy for the subscription manager.
    #[must_use]
    pub fn subscription_policy(&self) -> SubscriptionPolicy {
        SubscriptionPolicy {
            qualify_threshold: self.qualify_threshold,
            retention_floor: self.retention_floor,
            ack_timeout: span_ms(self.ack_timeout_ms),
            max_pending_retries: self.max_pending_retries,
            backoff: RetryBackoff::new(
                span_ms(self.retry_backoff_initial_ms),
                span_ms(self.retry_backoff_max_ms),
            ),
        }
    }
}

/// Longest span accepted from config; larger values are clamped.
const MAX_SPAN_MS: u64 = 10 * 365 * 24 * 3_600 * 1_000;

fn span_ms(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(ms.min(MAX_SPAN_MS) as i64)
}

fn span_secs(secs: u64) -> chrono::Duration {
    span_ms(secs.saturating_mul(1_000))
}

/// Poll scanner settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default)]
    pub score_mode: ScoreMode,
    /// Fixed universe. Empty means ask the poll provider.
    #[serde(default)]
    pub universe: Vec<Symbol>,
}

const fn default_batch_size() -> usize {
    200
}

const fn default_fetch_timeout_ms() -> u64 {
    10_000
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            score_mode: ScoreMode::default(),
            universe: Vec::new(),
        }
    }
}

impl ScannerConfig {
    /// Combine with the scheduler's band parameters.
    #[must_use]
    pub fn settings(&self, scheduler: &SchedulerConfig) -> ScannerSettings {
        ScannerSettings {
            batch_size: self.batch_size,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            score_mode: self.score_mode,
            universe: self.universe.clone(),
            max_live_slots: scheduler.max_live_slots,
            qualify_threshold: scheduler.qualify_threshold,
            debounce_window: Duration::from_millis(scheduler.debounce_window_ms),
            stale_half_life: Duration::from_secs(scheduler.stale_half_life_secs),
        }
    }
}

/// Push inbox settings.
#[derive(Debug, Clone, Deserialize)]
pub struct InboxConfig {
    /// Distinct symbols that may have a quote queued at once.
    #[serde(default = "default_inbox_capacity")]
    pub capacity: usize,
}

const fn default_inbox_capacity() -> usize {
    4096
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            capacity: default_inbox_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_live_slots, 1000);
        assert_eq!(config.unsubscribe_latency(), chrono::Duration::seconds(60));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.debounce_window_ms, 0);
        assert_eq!(config.max_pending_retries, 5);
    }

    #[test]
    fn subscription_policy_converts_units() {
        let config = SchedulerConfig {
            retry_backoff_initial_ms: 250,
            retry_backoff_max_ms: 1_000,
            ..SchedulerConfig::default()
        };
        let policy = config.subscription_policy();
        assert_eq!(policy.backoff.delay(1), chrono::Duration::milliseconds(250));
        assert_eq!(policy.backoff.delay(10), chrono::Duration::seconds(1));
        assert_eq!(policy.qualify_threshold, 0.5);
    }

    #[test]
    fn scanner_settings_take_band_from_scheduler() {
        let scheduler = SchedulerConfig {
            max_live_slots: 7,
            debounce_window_ms: 1_500,
            ..SchedulerConfig::default()
        };
        let settings = ScannerConfig::default().settings(&scheduler);
        assert_eq!(settings.max_live_slots, 7);
        assert_eq!(settings.debounce_window, Duration::from_millis(1_500));
        assert_eq!(settings.batch_size, 200);
    }
}
