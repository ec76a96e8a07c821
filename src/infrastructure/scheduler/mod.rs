//! Scheduler loop: the composition of scanner, subscription manager, live
//! tracker and provider connection.
//!
//! Every poll interval the loop scans the universe, reconciles the ledger
//! against the snapshot, issues the resulting provider calls and folds
//! their results back in. The live tracker runs as its own task, draining
//! the push inbox. While the live provider is down the loop keeps scanning
//! in poll-only mode and reconnects with backoff.

mod actuation;
mod supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::leaderboard::{leaderboard, LeaderboardRow};
use crate::application::ledger::{SharedLedger, SlotCounts, SlotLedger};
use crate::application::scanner::CandidateScanner;
use crate::application::subscription::{PassMode, SubscriptionManager};
use crate::application::tracker::{LifecycleEvent, LiveTracker, TrackerStats};
use crate::domain::{CandidateSnapshot, ScoreSource, SlotState, Symbol, TickEvent};
use crate::error::Result;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::reconnection::ReconnectionConfig;
use crate::infrastructure::config::scheduler::SchedulerConfig;
use crate::infrastructure::config::Config;
use crate::infrastructure::inbox::{inbox, InboxStats};
use crate::port::{Clock, LiveProvider, PollProvider, TickSink};

use actuation::Actuator;
use supervisor::ConnectionSupervisor;

const LIFECYCLE_CAPACITY: usize = 64;

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: u64,
    pub tracker: TrackerStats,
    pub inbox: InboxStats,
}

/// Read-side handle to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    ledger: SharedLedger,
    connected: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    stale_after: chrono::Duration,
}

impl SchedulerHandle {
    /// Top `k` symbols by current score.
    #[must_use]
    pub fn leaderboard(&self, k: usize) -> Vec<LeaderboardRow> {
        let ledger = self.ledger.lock();
        leaderboard(&ledger, k, self.clock.now(), self.stale_after)
    }

    /// Make a rejected symbol selectable again.
    #[allow(clippy::result_large_err)]
    pub fn reset_ineligible(&self, symbol: &Symbol) -> Result<()> {
        self.ledger.lock().reset_ineligible(symbol)?;
        Ok(())
    }

    #[must_use]
    pub fn counts(&self) -> SlotCounts {
        self.ledger.lock().counts()
    }

    #[must_use]
    pub fn state_of(&self, symbol: &Symbol) -> SlotState {
        self.ledger.lock().state_of(symbol)
    }

    /// Whether the live provider is up. False means poll-only mode.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    reconnection: ReconnectionConfig,
    inbox_capacity: usize,
    ledger: SharedLedger,
    scanner: CandidateScanner,
    subscriptions: SubscriptionManager,
    live: Arc<dyn LiveProvider>,
    sink: Arc<dyn TickSink>,
    clock: Arc<dyn Clock>,
    connected: Arc<AtomicBool>,
    /// Ledger epoch of the current connection; `None` while disconnected.
    live_epoch: Option<u64>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: &Config,
        live: Arc<dyn LiveProvider>,
        poll: Arc<dyn PollProvider>,
        sink: Arc<dyn TickSink>,
    ) -> Self {
        let scheduler = &config.scheduler;
        let ledger = SlotLedger::new(scheduler.max_live_slots, scheduler.unsubscribe_latency())
            .with_live_score_ttl(scheduler.stale_after())
            .shared();
        Self {
            config: scheduler.clone(),
            reconnection: config.reconnection.clone(),
            inbox_capacity: config.inbox.capacity,
            ledger,
            scanner: CandidateScanner::new(poll, config.scanner.settings(scheduler)),
            subscriptions: SubscriptionManager::new(scheduler.subscription_policy()),
            live,
            sink,
            clock: Arc::new(SystemClock),
            connected: Arc::new(AtomicBool::new(false)),
            live_epoch: None,
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            ledger: Arc::clone(&self.ledger),
            connected: Arc::clone(&self.connected),
            clock: Arc::clone(&self.clock),
            stale_after: self.config.stale_after(),
        }
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    #[allow(clippy::result_large_err)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let (events, inbox_rx) = inbox(self.inbox_capacity);
        let (lifecycle_tx, mut lifecycle_rx) = mpsc::channel(LIFECYCLE_CAPACITY);
        let tracker = LiveTracker::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.sink),
            self.subscriptions,
            lifecycle_tx,
            self.scanner.settings().score_mode,
            self.config.live_score_horizon(),
        );
        let tracker_task = tokio::spawn(tracker.run(inbox_rx, Arc::clone(&self.clock)));

        let mut supervisor =
            ConnectionSupervisor::new(Arc::clone(&self.live), self.reconnection.clone());
        let actuator = Actuator::new(
            Arc::clone(&self.live),
            self.config.actuation_timeout(),
            self.config.actuation_concurrency,
        );
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reconnect_at = Some(Instant::now());
        let mut passes: u64 = 0;

        info!(
            live = self.live.name(),
            max_live_slots = self.config.max_live_slots,
            poll_interval_ms = self.config.poll_interval_ms,
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let connect_due = reconnect_at.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(event) = lifecycle_rx.recv() => {
                    if let Some(delay) = self.on_lifecycle(event, &mut supervisor) {
                        reconnect_at = Some(Instant::now() + delay);
                    }
                }
                () = sleep_until(connect_due), if reconnect_at.is_some() && self.live_epoch.is_none() => {
                    reconnect_at = None;
                    match supervisor.connect(events.clone()).await {
                        Ok(()) => {
                            let reissued = self.resync();
                            self.pass(&actuator, reissued).await;
                            passes += 1;
                            ticker.reset();
                        }
                        Err(_) => {
                            reconnect_at = Some(Instant::now() + supervisor.next_delay());
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.pass(&actuator, Vec::new()).await;
                    passes += 1;
                }
            }
        }

        info!(passes, "Scheduler stopping");
        if self.live_epoch.is_some() {
            self.close_live().await;
        }
        drop(lifecycle_rx);
        events.close();
        let tracker = match tracker_task.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "Live tracker task failed");
                TrackerStats::default()
            }
        };
        let summary = RunSummary {
            passes,
            tracker,
            inbox: events.stats(),
        };
        info!(
            passes,
            accepted = summary.tracker.accepted,
            dropped = summary.inbox.dropped,
            "Scheduler stopped"
        );
        Ok(summary)
    }

    /// Returns a reconnect delay when a connection drop needs one.
    fn on_lifecycle(
        &mut self,
        event: LifecycleEvent,
        supervisor: &mut ConnectionSupervisor,
    ) -> Option<std::time::Duration> {
        match event {
            LifecycleEvent::Connected => {
                debug!("Live connection confirmed by provider");
                None
            }
            LifecycleEvent::Disconnected { reason, dropped } => {
                if self.live_epoch.take().is_none() {
                    debug!(reason = %reason, "Disconnect for a connection already down");
                    return None;
                }
                self.connected.store(false, Ordering::Release);
                warn!(
                    reason = %reason,
                    dropped = dropped.len(),
                    "Live provider down, continuing in poll-only mode"
                );
                supervisor.record_failure();
                Some(supervisor.next_delay())
            }
        }
    }

    /// Bring the ledger in line with a fresh connection.
    ///
    /// Returns the pending subscribes that must be re-issued on it.
    fn resync(&mut self) -> Vec<Symbol> {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock();
        if ledger.in_state(SlotState::Live).next().is_some() {
            // Drop without a disconnect event; the new session holds nothing.
            ledger.disconnect();
        }
        let reissued = ledger.reissue_pending(now);
        self.live_epoch = Some(ledger.connection_epoch());
        drop(ledger);

        self.connected.store(true, Ordering::Release);
        if !reissued.is_empty() {
            info!(count = reissued.len(), "Re-issuing pending subscriptions");
        }
        reissued
    }

    /// One scan, reconcile, actuate cycle.
    async fn pass(&mut self, actuator: &Actuator, reissued: Vec<Symbol>) {
        let report = self.scanner.scan(self.clock.now()).await;
        let now = self.clock.now();

        let (mut plan, poll_ticks) = {
            let mut ledger = self.ledger.lock();
            let mode = if self.live_epoch == Some(ledger.connection_epoch()) {
                PassMode::Full
            } else {
                PassMode::PollOnly
            };
            let plan = self
                .subscriptions
                .reconcile(&mut ledger, &report.snapshot, now, mode);
            let poll_ticks = if self.config.emit_poll_ticks {
                poll_ticks(&ledger, &report.snapshot, now)
            } else {
                Vec::new()
            };
            (plan, poll_ticks)
        };

        if self.live_epoch == Some(plan.epoch) {
            plan.subscribe.splice(0..0, reissued);
        }

        for tick in poll_ticks {
            if let Err(err) = self.sink.publish(tick).await {
                warn!(error = %err, "Poll tick publish failed");
            }
        }

        let outcomes = actuator.execute(&plan).await;
        if !outcomes.is_empty() {
            let now = self.clock.now();
            let mut ledger = self.ledger.lock();
            for outcome in outcomes {
                self.subscriptions.apply_outcome(&mut ledger, outcome, now);
            }
        }

        let counts = self.ledger.lock().counts();
        debug!(
            candidates = report.snapshot.len(),
            fetched = report.fetched,
            degraded = report.is_degraded(),
            subscribed = plan.subscribe.len(),
            unsubscribed = plan.unsubscribe.len(),
            released = plan.released.len(),
            backlog = plan.backlog.len(),
            live = counts.live,
            occupied = counts.occupied(),
            "Pass complete"
        );
    }

    async fn close_live(&mut self) {
        let deadline = std::time::Duration::from_millis(self.reconnection.connect_timeout_ms);
        match timeout(deadline, self.live.close()).await {
            Ok(Ok(())) => debug!(provider = self.live.name(), "Live provider closed"),
            Ok(Err(err)) => warn!(error = %err, "Live provider close failed"),
            Err(_) => warn!("Live provider close timed out"),
        }
        self.live_epoch = None;
        self.connected.store(false, Ordering::Release);
    }
}

/// Poll updates for symbols without a live slot.
fn poll_ticks(
    ledger: &SlotLedger,
    snapshot: &CandidateSnapshot,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<TickEvent> {
    snapshot
        .iter()
        .filter(|candidate| !candidate.stale)
        .filter(|candidate| ledger.state_of(&candidate.symbol) != SlotState::Live)
        .filter_map(|candidate| {
            let sample = candidate.sample.clone()?;
            Some(TickEvent::new(
                candidate.symbol.clone(),
                candidate.score,
                sample,
                ScoreSource::Poll,
                now,
            ))
        })
        .collect()
}

/// Pair a scheduler with a sender that stops it.
#[must_use]
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
