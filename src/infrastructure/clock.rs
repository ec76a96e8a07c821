//! Clock implementations.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::port::Clock;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time anchored at creation and advanced by the tokio clock.
///
/// Under `tokio::time::pause` this clock only moves when the runtime's time
/// does, which makes latency windows testable without real waiting.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    origin: Instant,
    origin_wall: DateTime<Utc>,
}

impl RuntimeClock {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchor the clock at a fixed wall time.
    #[must_use]
    pub fn starting_at(origin_wall: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            origin_wall,
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_wall + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn runtime_clock_follows_paused_time() {
        let origin = Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap();
        let clock = RuntimeClock::starting_at(origin);
        assert_eq!(clock.now(), origin);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(clock.now(), origin + chrono::Duration::seconds(61));
    }
}
