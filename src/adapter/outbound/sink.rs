//! Tick sinks.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{info, trace};

use crate::domain::TickEvent;
use crate::error::Result;
use crate::port::TickSink;

/// Writes every tick to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl TickSink for TracingSink {
    async fn publish(&self, event: TickEvent) -> Result<()> {
        info!(
            target: "slotkeeper::tick",
            symbol = %event.symbol,
            source = %event.source,
            price = %event.sample.price,
            score = event.score,
            "tick"
        );
        Ok(())
    }
}

/// Fans ticks out to any number of subscribers.
///
/// Slow subscribers lag and lose the oldest ticks; publishing never waits.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<TickEvent>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl TickSink for BroadcastSink {
    async fn publish(&self, event: TickEvent) -> Result<()> {
        // No receivers is not an error; ticks are simply not observed.
        if self.sender.send(event).is_err() {
            trace!("Tick published with no subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QuoteSample, ScoreSource, Symbol};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tick(symbol: &str) -> TickEvent {
        let now = Utc::now();
        TickEvent::new(
            Symbol::from(symbol),
            1.5,
            QuoteSample::new(dec!(10), now),
            ScoreSource::Live,
            now,
        )
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let sink = BroadcastSink::new(8);
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();

        sink.publish(tick("A")).await.unwrap();

        assert_eq!(first.recv().await.unwrap().symbol, Symbol::from("A"));
        assert_eq!(second.recv().await.unwrap().symbol, Symbol::from("A"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let sink = BroadcastSink::new(8);
        assert!(sink.publish(tick("A")).await.is_ok());
        assert!(TracingSink.publish(tick("B")).await.is_ok());
    }
}
