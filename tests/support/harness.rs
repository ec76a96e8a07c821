//! A scheduler wired to scripted providers on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use slotkeeper::domain::Symbol;
use slotkeeper::error::Result;
use slotkeeper::infrastructure::clock::RuntimeClock;
use slotkeeper::infrastructure::config::Config;
use slotkeeper::infrastructure::scheduler::{
    shutdown_channel, RunSummary, Scheduler, SchedulerHandle,
};
use slotkeeper::port::Clock;
use slotkeeper::testkit;
use slotkeeper::testkit::provider::{ScriptedLiveProvider, TrendPollProvider};
use slotkeeper::testkit::sink::RecordingSink;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Harness {
    pub live: Arc<ScriptedLiveProvider>,
    pub poll: Arc<TrendPollProvider>,
    pub sink: Arc<RecordingSink>,
    pub handle: SchedulerHandle,
    pub clock: Arc<dyn Clock>,
    pub symbols: Vec<Symbol>,
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<RunSummary>>,
}

impl Harness {
    /// Start a scheduler over `universe` symbols with `max_live_slots` slots.
    ///
    /// Must be called inside a runtime with paused time. The live provider
    /// enforces the same slot cap and unsubscribe latency as the config.
    pub fn start(universe: usize, max_live_slots: usize) -> Self {
        Self::start_with(universe, testkit::config::config(max_live_slots))
    }

    pub fn start_with(universe: usize, config: Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(RuntimeClock::new());
        let symbols = testkit::domain::symbols(universe);
        let live = Arc::new(ScriptedLiveProvider::new().with_capacity(
            config.scheduler.max_live_slots,
            config.scheduler.unsubscribe_latency(),
            Arc::clone(&clock),
        ));
        let poll = Arc::new(TrendPollProvider::new(symbols.clone(), Arc::clone(&clock)));
        let sink = Arc::new(RecordingSink::new());

        let scheduler = Scheduler::new(&config, live.clone(), poll.clone(), sink.clone())
            .with_clock(Arc::clone(&clock));
        let handle = scheduler.handle();
        let (stop, shutdown) = shutdown_channel();
        let task = tokio::spawn(scheduler.run(shutdown));

        Self {
            live,
            poll,
            sink,
            handle,
            clock,
            symbols,
            stop,
            task,
        }
    }

    pub fn symbol(&self, index: usize) -> Symbol {
        self.symbols[index].clone()
    }

    /// Give symbol `index` a per-pass move of `percent`.
    pub fn trend(&self, index: usize, percent: f64) {
        self.poll.set_trend(&self.symbols[index], percent);
    }

    /// Live-subscribed symbols according to the provider, sorted.
    pub fn provider_live(&self) -> Vec<Symbol> {
        self.live.subscribed()
    }

    pub fn symbols_at(&self, indices: &[usize]) -> Vec<Symbol> {
        let mut symbols: Vec<_> = indices.iter().map(|i| self.symbol(*i)).collect();
        symbols.sort();
        symbols
    }

    pub async fn stop(self) -> RunSummary {
        let _ = self.stop.send(true);
        self.task
            .await
            .expect("scheduler task panicked")
            .expect("scheduler failed")
    }
}

/// Let the paused runtime run for `millis`.
pub async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
