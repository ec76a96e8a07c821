//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use crate::infrastructure::config::reconnection::ReconnectionConfig;
use crate::infrastructure::config::scheduler::SchedulerConfig;
use crate::infrastructure::config::Config;

/// Fast reconnection config: short delays, no real waiting under paused time.
pub fn reconnection() -> ReconnectionConfig {
    ReconnectionConfig {
        initial_delay_ms: 100,
        max_delay_ms: 1_000,
        backoff_multiplier: 2.0,
        max_consecutive_failures: 3,
        circuit_breaker_cooldown_ms: 5_000,
        connect_timeout_ms: 1_000,
    }
}

/// Scheduler config with `max_live_slots` slots and a one-second pass.
///
/// Debounce is off and the unsubscribe latency is ten seconds, so tests can
/// observe draining slots without long waits.
pub fn scheduler(max_live_slots: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_live_slots,
        unsubscribe_latency_secs: 10,
        poll_interval_ms: 1_000,
        retention_floor: 0.25,
        qualify_threshold: 0.5,
        debounce_window_ms: 0,
        actuation_timeout_ms: 500,
        retry_backoff_initial_ms: 1_000,
        retry_backoff_max_ms: 8_000,
        ..SchedulerConfig::default()
    }
}

/// Full config around [`scheduler`] and [`reconnection`].
pub fn config(max_live_slots: usize) -> Config {
    Config {
        scheduler: scheduler(max_live_slots),
        reconnection: reconnection(),
        ..Config::default()
    }
}
