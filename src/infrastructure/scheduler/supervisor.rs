//! Live provider connection supervision.
//!
//! Connect attempts back off exponentially with jitter. A circuit breaker
//! trips after too many consecutive failures and holds further attempts for
//! a cooldown. While the supervisor is not connected the scheduler runs in
//! poll-only mode.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};

use crate::error::ProviderError;
use crate::infrastructure::config::reconnection::ReconnectionConfig;
use crate::infrastructure::inbox::InboxSender;
use crate::port::LiveProvider;

/// Circuit breaker state for connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Normal operation; connections are allowed.
    Closed,
    /// Too many consecutive failures; connections blocked until cooldown expires.
    Open { until: Instant },
}

pub(crate) struct ConnectionSupervisor {
    live: Arc<dyn LiveProvider>,
    config: ReconnectionConfig,
    consecutive_failures: u32,
    /// Current backoff delay in milliseconds.
    current_delay_ms: u64,
    circuit_state: CircuitState,
}

impl ConnectionSupervisor {
    pub(crate) fn new(live: Arc<dyn LiveProvider>, config: ReconnectionConfig) -> Self {
        let initial_delay = config.initial_delay_ms;
        Self {
            live,
            config,
            consecutive_failures: 0,
            current_delay_ms: initial_delay,
            circuit_state: CircuitState::Closed,
        }
    }

    pub(crate) const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn circuit_open(&self) -> bool {
        matches!(self.circuit_state, CircuitState::Open { .. })
    }

    /// One connect attempt under the configured deadline.
    pub(crate) async fn connect(&mut self, events: InboxSender) -> Result<(), ProviderError> {
        let deadline = Duration::from_millis(self.config.connect_timeout_ms);
        let result = match timeout(deadline, self.live.connect(events)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                operation: "connect",
                after_ms: self.config.connect_timeout_ms,
            }),
        };

        match &result {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    info!(
                        provider = self.live.name(),
                        after_failures = self.consecutive_failures,
                        "Reconnected successfully"
                    );
                } else {
                    info!(provider = self.live.name(), "Live provider connected");
                }
                self.reset_backoff();
            }
            Err(err) => {
                error!(provider = self.live.name(), error = %err, "Connection attempt failed");
                self.record_failure();
            }
        }
        result
    }

    /// Count a failed attempt or a dropped connection.
    ///
    /// Trips the circuit breaker once the consecutive failure limit is hit.
    pub(crate) fn record_failure(&mut self) {
        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.config.max_consecutive_failures {
            let cooldown = Duration::from_millis(self.config.circuit_breaker_cooldown_ms);
            self.circuit_state = CircuitState::Open {
                until: Instant::now() + cooldown,
            };
            error!(
                failures = self.consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "Circuit breaker tripped, pausing reconnection attempts"
            );
        }
    }

    /// Wait before the next attempt.
    ///
    /// Includes any remaining circuit breaker cooldown. Advances the backoff
    /// for the attempt after.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let mut cooldown = Duration::ZERO;
        if let CircuitState::Open { until } = self.circuit_state {
            cooldown = until.saturating_duration_since(Instant::now());
            warn!(
                remaining_secs = cooldown.as_secs(),
                "Circuit breaker open, waiting for cooldown"
            );
            self.reset_backoff();
        }

        let base_delay = Duration::from_millis(self.current_delay_ms);
        let delay = base_delay + Duration::from_millis(jitter_ms(base_delay));

        let next_delay = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next_delay.min(self.config.max_delay_ms);

        info!(
            delay_ms = (cooldown + delay).as_millis() as u64,
            attempt = self.consecutive_failures + 1,
            "Reconnecting after delay"
        );
        cooldown + delay
    }

    fn reset_backoff(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
        self.circuit_state = CircuitState::Closed;
    }
}

/// Up to 20% random jitter, so many clients do not reconnect in lockstep.
fn jitter_ms(base_delay: Duration) -> u64 {
    let range = (base_delay.as_millis() as u64) / 5;
    if range == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::inbox::inbox;
    use crate::testkit::provider::ScriptedLiveProvider;

    fn config() -> ReconnectionConfig {
        ReconnectionConfig {
            initial_delay_ms: 100,
            max_delay_ms: 400,
            backoff_multiplier: 2.0,
            max_consecutive_failures: 3,
            circuit_breaker_cooldown_ms: 10_000,
            connect_timeout_ms: 1_000,
        }
    }

    fn within_jitter(delay: Duration, base_ms: u64) -> bool {
        let ms = delay.as_millis() as u64;
        ms >= base_ms && ms <= base_ms + base_ms / 5
    }

    #[test]
    fn delay_doubles_and_caps() {
        let live = Arc::new(ScriptedLiveProvider::new());
        let mut supervisor = ConnectionSupervisor::new(live, config());
        assert!(within_jitter(supervisor.next_delay(), 100));
        assert!(within_jitter(supervisor.next_delay(), 200));
        assert!(within_jitter(supervisor.next_delay(), 400));
        assert!(within_jitter(supervisor.next_delay(), 400));
    }

    #[tokio::test(start_paused = true)]
    async fn circuit_trips_and_cooldown_is_waited_out() {
        let live = Arc::new(ScriptedLiveProvider::new());
        for _ in 0..3 {
            live.push_connect(Err(ProviderError::Transient("refused".into())));
        }
        let mut supervisor = ConnectionSupervisor::new(live.clone(), config());
        let (tx, _rx) = inbox(4);

        for _ in 0..3 {
            assert!(supervisor.connect(tx.clone()).await.is_err());
        }
        assert!(supervisor.circuit_open());

        let delay = supervisor.next_delay();
        assert!(delay >= Duration::from_millis(10_100));
        assert!(!supervisor.circuit_open());
        assert_eq!(supervisor.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_connect_times_out_as_failure() {
        let live = Arc::new(ScriptedLiveProvider::new().with_call_delay(Duration::from_secs(5)));
        let mut supervisor = ConnectionSupervisor::new(live, config());
        let (tx, _rx) = inbox(4);

        let result = supervisor.connect(tx).await;
        assert_eq!(
            result,
            Err(ProviderError::Timeout {
                operation: "connect",
                after_ms: 1_000
            })
        );
        assert_eq!(supervisor.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn successful_connect_resets_failures() {
        let live = Arc::new(ScriptedLiveProvider::new());
        live.push_connect(Err(ProviderError::Transient("refused".into())));
        let mut supervisor = ConnectionSupervisor::new(live, config());
        let (tx, _rx) = inbox(4);

        assert!(supervisor.connect(tx.clone()).await.is_err());
        assert_eq!(supervisor.consecutive_failures(), 1);
        assert!(supervisor.connect(tx).await.is_ok());
        assert_eq!(supervisor.consecutive_failures(), 0);
    }
}
