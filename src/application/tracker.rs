//! Live tracker: consumes provider push events and keeps live scores current.
//!
//! Quotes are accepted only for `Live` symbols. The first quote for a
//! `PendingSubscribe` symbol confirms the subscription. Each accepted quote
//! is scored against a per-symbol anchor sample that rolls forward every
//! `horizon`, written to the ledger and published to the sink. Connection
//! lifecycle events are applied to the ledger and forwarded to the
//! scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::application::ledger::SharedLedger;
use crate::application::subscription::SubscriptionManager;
use crate::domain::score::{ScoreMode, COLD_START};
use crate::domain::{QuoteSample, ScoreSource, SlotState, Symbol, TickEvent};
use crate::infrastructure::inbox::InboxReceiver;
use crate::port::{Clock, ProviderEvent, TickSink};

/// Connection lifecycle changes forwarded to the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Disconnected {
        reason: String,
        /// Symbols force-dropped from `Live`.
        dropped: Vec<Symbol>,
    },
}

/// Push-path counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub accepted: u64,
    /// Quotes for symbols that were not live.
    pub stale_dropped: u64,
    pub confirmed_by_quote: u64,
    pub publish_failures: u64,
}

pub struct LiveTracker {
    ledger: SharedLedger,
    sink: Arc<dyn TickSink>,
    subscriptions: SubscriptionManager,
    lifecycle: mpsc::Sender<LifecycleEvent>,
    score_mode: ScoreMode,
    horizon: Duration,
    anchors: HashMap<Symbol, QuoteSample>,
    stats: TrackerStats,
}

impl LiveTracker {
    #[must_use]
    pub fn new(
        ledger: SharedLedger,
        sink: Arc<dyn TickSink>,
        subscriptions: SubscriptionManager,
        lifecycle: mpsc::Sender<LifecycleEvent>,
        score_mode: ScoreMode,
        horizon: Duration,
    ) -> Self {
        Self {
            ledger,
            sink,
            subscriptions,
            lifecycle,
            score_mode,
            horizon,
            anchors: HashMap::new(),
            stats: TrackerStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Drain the inbox until it is closed.
    pub async fn run(mut self, inbox: InboxReceiver, clock: Arc<dyn Clock>) -> TrackerStats {
        while let Some(event) = inbox.recv().await {
            self.handle(event, clock.now()).await;
        }
        debug!(accepted = self.stats.accepted, "Live tracker stopped");
        self.stats
    }

    /// Handle one event.
    pub async fn handle(&mut self, event: ProviderEvent, now: DateTime<Utc>) {
        match event {
            ProviderEvent::Quote { symbol, sample, .. } => {
                if let Some(tick) = self.accept_quote(&symbol, sample, now) {
                    if let Err(error) = self.sink.publish(tick).await {
                        self.stats.publish_failures += 1;
                        warn!(symbol = %symbol, error = %error, "Tick publish failed");
                    }
                }
            }
            ProviderEvent::SubscribeConfirmed { symbol } => {
                if let Err(error) = self.ledger.lock().confirm_pushed(&symbol, now) {
                    debug!(symbol = %symbol, error = %error, "Late subscribe confirmation ignored");
                }
            }
            ProviderEvent::SubscribeFailed { symbol, error } => {
                let mut ledger = self.ledger.lock();
                self.subscriptions
                    .apply_subscribe_failure(&mut ledger, &symbol, &error, now);
            }
            ProviderEvent::Connected => {
                info!("Live provider connected");
                self.forward(LifecycleEvent::Connected).await;
            }
            ProviderEvent::Disconnected { reason } => {
                let dropped = self.ledger.lock().disconnect();
                self.anchors.clear();
                warn!(reason = %reason, dropped = dropped.len(), "Live provider disconnected");
                self.forward(LifecycleEvent::Disconnected { reason, dropped }).await;
            }
        }
    }

    async fn forward(&self, event: LifecycleEvent) {
        if self.lifecycle.send(event).await.is_err() {
            debug!("Scheduler gone, lifecycle event dropped");
        }
    }

    /// Score a quote under the ledger lock. Returns the tick to publish.
    fn accept_quote(
        &mut self,
        symbol: &Symbol,
        sample: QuoteSample,
        now: DateTime<Utc>,
    ) -> Option<TickEvent> {
        let mut ledger = self.ledger.lock();
        match ledger.state_of(symbol) {
            SlotState::Live => {}
            SlotState::PendingSubscribe => {
                if ledger.confirm_pushed(symbol, now).is_ok() {
                    self.stats.confirmed_by_quote += 1;
                }
            }
            SlotState::Unsubscribed | SlotState::PendingUnsubscribe => {
                self.stats.stale_dropped += 1;
                self.anchors.remove(symbol);
                trace!(symbol = %symbol, "Quote for non-live symbol dropped");
                return None;
            }
        }

        let anchor = match self.anchors.get(symbol) {
            Some(anchor) => Some(anchor.clone()),
            None => ledger.get(symbol).and_then(|entry| entry.last_sample().cloned()),
        };
        let value = self.score_mode.apply(anchor.as_ref(), &sample);

        let roll = anchor
            .as_ref()
            .map_or(true, |anchor| sample.observed_at - anchor.observed_at >= self.horizon);
        if roll {
            self.anchors.insert(symbol.clone(), sample.clone());
        } else if let Some(anchor) = anchor {
            self.anchors.entry(symbol.clone()).or_insert(anchor);
        }

        let has_score = ledger.get(symbol).is_some_and(|entry| entry.score().is_some());
        if value != COLD_START || !has_score {
            ledger.observe_live(symbol, value, sample.clone());
        } else {
            ledger.ensure(symbol).record_sample(sample.clone());
        }
        let published = ledger.get(symbol).map_or(value, |entry| entry.effective_score());
        drop(ledger);

        self.stats.accepted += 1;
        Some(TickEvent::new(
            symbol.clone(),
            published,
            sample,
            ScoreSource::Live,
            now,
        ))
    }
}
