//! In-process simulated market.
//!
//! A seeded random walk drives every symbol's price. Each symbol carries a
//! drift regime that occasionally flips, so a handful of symbols trend hard
//! at any time while the rest drift. The market advances lazily in
//! one-second steps whenever it is read.
//!
//! [`SimLiveProvider`] enforces a slot quota exactly like a real bounded
//! feed: at most `max_live_slots` subscriptions, and a cancelled
//! subscription keeps its slot for `unsubscribe_latency`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::{QuoteSample, Symbol};
use crate::error::ProviderError;
use crate::infrastructure::config::provider::SimulationConfig;
use crate::infrastructure::inbox::InboxSender;
use crate::port::{Clock, LiveProvider, PolledQuote, PollProvider, ProviderEvent, SubscribeAck};

const STEP_MS: i64 = 1_000;
/// Longest catch-up per read; older gaps are skipped.
const MAX_STEPS: i64 = 600;
/// Chance per step that a symbol switches drift regime.
const REGIME_SWITCH: f64 = 0.01;
const POLL_BATCH_LIMIT: usize = 400;
const PUSH_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// SlotQuota
// ---------------------------------------------------------------------------

/// Provider-side slot accounting.
#[derive(Debug)]
pub struct SlotQuota {
    max: usize,
    latency: chrono::Duration,
    active: BTreeSet<Symbol>,
    /// Cancelled subscriptions and when their slot frees.
    draining: Vec<(Symbol, DateTime<Utc>)>,
    peak: usize,
}

impl SlotQuota {
    #[must_use]
    pub fn new(max: usize, latency: chrono::Duration) -> Self {
        Self {
            max,
            latency,
            active: BTreeSet::new(),
            draining: Vec::new(),
            peak: 0,
        }
    }

    /// Slots in use at `now`, including draining ones.
    pub fn occupied(&mut self, now: DateTime<Utc>) -> usize {
        self.draining.retain(|(_, frees_at)| *frees_at > now);
        self.active.len() + self.draining.len()
    }

    /// Highest occupancy seen.
    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    #[must_use]
    pub fn is_active(&self, symbol: &Symbol) -> bool {
        self.active.contains(symbol)
    }

    #[must_use]
    pub fn active(&self) -> Vec<Symbol> {
        self.active.iter().cloned().collect()
    }

    /// Take a slot. Subscribing an active symbol again is a no-op.
    pub fn take(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Result<(), ProviderError> {
        if self.active.contains(symbol) {
            return Ok(());
        }
        let occupied = self.occupied(now);
        if occupied >= self.max {
            return Err(ProviderError::Capacity {
                symbol: symbol.to_string(),
            });
        }
        self.active.insert(symbol.clone());
        self.peak = self.peak.max(occupied + 1);
        Ok(())
    }

    /// Cancel a subscription. Its slot frees after the latency.
    pub fn release(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Result<(), ProviderError> {
        if !self.active.remove(symbol) {
            return Err(ProviderError::Rejected {
                symbol: symbol.to_string(),
                reason: "not subscribed".into(),
            });
        }
        self.draining.push((symbol.clone(), now + self.latency));
        Ok(())
    }

    /// Forget session-bound subscriptions after the connection ends.
    pub fn clear_active(&mut self) {
        self.active.clear();
    }
}

// ---------------------------------------------------------------------------
// SimMarket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Walk {
    price: f64,
    drift: f64,
    volume: u64,
}

struct MarketState {
    rng: StdRng,
    volatility: f64,
    walks: BTreeMap<Symbol, Walk>,
    stepped_to: DateTime<Utc>,
}

impl MarketState {
    fn advance(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.stepped_to).num_milliseconds();
        if elapsed < STEP_MS {
            return;
        }
        let steps = elapsed / STEP_MS;
        self.stepped_to += chrono::Duration::milliseconds(steps * STEP_MS);

        let volatility = self.volatility;
        for _ in 0..steps.min(MAX_STEPS) {
            for walk in self.walks.values_mut() {
                if self.rng.gen_bool(REGIME_SWITCH) {
                    walk.drift = self.rng.gen_range(-3.0..=3.0) * volatility;
                }
                let shock = self.rng.gen_range(-1.0..=1.0) * volatility;
                walk.price = (walk.price * (1.0 + walk.drift + shock)).max(0.01);
                walk.volume += self.rng.gen_range(0..1_000);
            }
        }
    }
}

/// Shared random-walk price source for both simulated providers.
pub struct SimMarket {
    state: Mutex<MarketState>,
    clock: Arc<dyn Clock>,
}

impl SimMarket {
    #[must_use]
    pub fn new(config: &SimulationConfig, clock: Arc<dyn Clock>) -> Self {
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let width = config.universe_size.to_string().len().max(4);
        let walks = (0..config.universe_size)
            .map(|i| {
                let symbol = Symbol::new(format!("SIM.{i:0width$}"));
                let walk = Walk {
                    price: rng.gen_range(1.0..500.0),
                    drift: 0.0,
                    volume: 0,
                };
                (symbol, walk)
            })
            .collect();
        let now = clock.now();
        Self {
            state: Mutex::new(MarketState {
                rng,
                volatility: config.volatility,
                walks,
                stepped_to: now,
            }),
            clock,
        }
    }

    #[must_use]
    pub fn universe(&self) -> Vec<Symbol> {
        self.state.lock().walks.keys().cloned().collect()
    }

    /// Current quotes for `symbols`, advancing the walk first. Unknown
    /// symbols are skipped.
    #[must_use]
    pub fn quotes(&self, symbols: &[Symbol]) -> Vec<PolledQuote> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.advance(now);
        symbols
            .iter()
            .filter_map(|symbol| {
                let walk = state.walks.get(symbol)?;
                let price = Decimal::from_f64(walk.price)?.round_dp(4);
                let sample = QuoteSample::new(price, now).with_volume(walk.volume);
                Some(PolledQuote::new(symbol.clone(), sample))
            })
            .collect()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

// ---------------------------------------------------------------------------
// SimPollProvider
// ---------------------------------------------------------------------------

pub struct SimPollProvider {
    market: Arc<SimMarket>,
}

impl SimPollProvider {
    #[must_use]
    pub const fn new(market: Arc<SimMarket>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl PollProvider for SimPollProvider {
    async fn universe(&self) -> Result<Vec<Symbol>, ProviderError> {
        Ok(self.market.universe())
    }

    async fn fetch_batch(&self, symbols: &[Symbol]) -> Result<Vec<PolledQuote>, ProviderError> {
        Ok(self.market.quotes(symbols))
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(POLL_BATCH_LIMIT)
    }

    fn name(&self) -> &'static str {
        "sim-poll"
    }
}

// ---------------------------------------------------------------------------
// SimLiveProvider
// ---------------------------------------------------------------------------

struct Session {
    events: InboxSender,
    pump: JoinHandle<()>,
}

pub struct SimLiveProvider {
    market: Arc<SimMarket>,
    quota: Arc<Mutex<SlotQuota>>,
    session: Mutex<Option<Session>>,
}

impl SimLiveProvider {
    #[must_use]
    pub fn new(market: Arc<SimMarket>, max_live_slots: usize, latency: chrono::Duration) -> Self {
        Self {
            market,
            quota: Arc::new(Mutex::new(SlotQuota::new(max_live_slots, latency))),
            session: Mutex::new(None),
        }
    }

    /// Highest slot occupancy the provider has seen.
    #[must_use]
    pub fn peak_occupied(&self) -> usize {
        self.quota.lock().peak()
    }

    fn connected(&self) -> Result<(), ProviderError> {
        match &*self.session.lock() {
            Some(session) if !session.events.is_closed() => Ok(()),
            _ => Err(ProviderError::Disconnected),
        }
    }
}

/// Push a quote for every active subscription on each interval.
async fn pump(market: Arc<SimMarket>, quota: Arc<Mutex<SlotQuota>>, events: InboxSender) {
    let mut ticker = tokio::time::interval(PUSH_INTERVAL);
    loop {
        ticker.tick().await;
        let active = quota.lock().active();
        if active.is_empty() {
            continue;
        }
        let server_time = market.now();
        for PolledQuote { symbol, sample } in market.quotes(&active) {
            let event = ProviderEvent::Quote {
                symbol,
                sample,
                server_time,
            };
            if !events.send(event) {
                debug!("Simulated push stopped, inbox closed");
                return;
            }
        }
    }
}

#[async_trait]
impl LiveProvider for SimLiveProvider {
    async fn connect(&self, events: InboxSender) -> Result<(), ProviderError> {
        let pump = tokio::spawn(pump(
            Arc::clone(&self.market),
            Arc::clone(&self.quota),
            events.clone(),
        ));
        let previous = self.session.lock().replace(Session {
            events: events.clone(),
            pump,
        });
        if let Some(previous) = previous {
            previous.pump.abort();
            self.quota.lock().clear_active();
        }
        info!("Simulated live feed connected");
        events.send(ProviderEvent::Connected);
        Ok(())
    }

    async fn subscribe(&self, symbol: &Symbol) -> Result<SubscribeAck, ProviderError> {
        self.connected()?;
        if self.market.quotes(std::slice::from_ref(symbol)).is_empty() {
            return Err(ProviderError::Rejected {
                symbol: symbol.to_string(),
                reason: "unknown symbol".into(),
            });
        }
        self.quota.lock().take(symbol, self.market.now())?;
        Ok(SubscribeAck::Confirmed)
    }

    async fn unsubscribe(&self, symbol: &Symbol) -> Result<(), ProviderError> {
        self.connected()?;
        self.quota.lock().release(symbol, self.market.now())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        if let Some(session) = self.session.lock().take() {
            session.pump.abort();
        }
        self.quota.lock().clear_active();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sim-live"
    }
}
