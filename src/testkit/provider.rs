//! Mock providers for testing.
//!
//! - [`ScriptedLiveProvider`] - Scripted connect/subscribe/unsubscribe
//!   results, a call log, and an optional provider-side slot quota.
//!   Best for: actuation, reconnection and capacity tests.
//!
//! - [`ScriptedPollProvider`] - Queue of batch responses.
//!   Best for: scanner and pass-level tests.
//!
//! - [`TrendPollProvider`] - Each symbol moves a fixed percentage per fetch,
//!   so its score is known exactly. Best for: scheduler runs over many passes.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::adapter::outbound::sim::SlotQuota;
use crate::domain::{QuoteSample, Symbol};
use crate::error::ProviderError;
use crate::infrastructure::inbox::InboxSender;
use crate::port::{Clock, LiveProvider, PolledQuote, PollProvider, ProviderEvent, SubscribeAck};

// ---------------------------------------------------------------------------
// ScriptedLiveProvider
// ---------------------------------------------------------------------------

/// One call made against a [`ScriptedLiveProvider`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveCall {
    Connect,
    Subscribe(Symbol),
    Unsubscribe(Symbol),
    Close,
}

struct Quota {
    slots: SlotQuota,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct LiveState {
    connect_results: VecDeque<Result<(), ProviderError>>,
    subscribe_results: HashMap<Symbol, VecDeque<Result<SubscribeAck, ProviderError>>>,
    unsubscribe_results: HashMap<Symbol, VecDeque<Result<(), ProviderError>>>,
    default_ack: Option<SubscribeAck>,
    calls: Vec<LiveCall>,
    events: Option<InboxSender>,
    /// Set by [`ScriptedLiveProvider::disconnect`], cleared by a successful connect.
    dropped: bool,
    subscribed: BTreeSet<Symbol>,
    double_actuations: usize,
}

/// A live provider whose answers are scripted per call.
///
/// Results not scripted default to `Ok`; subscribes answer
/// [`SubscribeAck::Confirmed`] unless [`set_default_ack`](Self::set_default_ack)
/// says otherwise. Subscribing a symbol that is already subscribed counts as a
/// double actuation.
pub struct ScriptedLiveProvider {
    state: Mutex<LiveState>,
    quota: Option<Mutex<Quota>>,
    call_delay: Option<Duration>,
}

impl ScriptedLiveProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LiveState::default()),
            quota: None,
            call_delay: None,
        }
    }

    /// Sleep this long inside every call.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Enforce a provider-side slot quota like a real bounded feed.
    pub fn with_capacity(
        mut self,
        max_slots: usize,
        unsubscribe_latency: chrono::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        self.quota = Some(Mutex::new(Quota {
            slots: SlotQuota::new(max_slots, unsubscribe_latency),
            clock,
        }));
        self
    }

    pub fn push_connect(&self, result: Result<(), ProviderError>) {
        self.state.lock().connect_results.push_back(result);
    }

    pub fn push_subscribe(&self, symbol: &Symbol, result: Result<SubscribeAck, ProviderError>) {
        self.state
            .lock()
            .subscribe_results
            .entry(symbol.clone())
            .or_default()
            .push_back(result);
    }

    pub fn push_unsubscribe(&self, symbol: &Symbol, result: Result<(), ProviderError>) {
        self.state
            .lock()
            .unsubscribe_results
            .entry(symbol.clone())
            .or_default()
            .push_back(result);
    }

    pub fn set_default_ack(&self, ack: SubscribeAck) {
        self.state.lock().default_ack = Some(ack);
    }

    pub fn calls(&self) -> Vec<LiveCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, LiveCall::Subscribe(_) | LiveCall::Unsubscribe(_)))
            .cloned()
            .collect()
    }

    pub fn all_calls(&self) -> Vec<LiveCall> {
        self.state.lock().calls.clone()
    }

    pub fn subscribes(&self) -> Vec<Symbol> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                LiveCall::Subscribe(symbol) => Some(symbol.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn unsubscribes(&self) -> Vec<Symbol> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                LiveCall::Unsubscribe(symbol) => Some(symbol.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| **call == LiveCall::Connect)
            .count()
    }

    pub fn double_actuations(&self) -> usize {
        self.state.lock().double_actuations
    }

    /// Symbols the provider currently considers subscribed.
    pub fn subscribed(&self) -> Vec<Symbol> {
        self.state.lock().subscribed.iter().cloned().collect()
    }

    /// Highest quota occupancy seen; zero without a quota.
    pub fn peak_occupied(&self) -> usize {
        self.quota.as_ref().map_or(0, |quota| quota.lock().slots.peak())
    }

    /// Push an event through the sender handed to the last connect.
    pub fn emit(&self, event: ProviderEvent) -> bool {
        let events = self.state.lock().events.clone();
        events.is_some_and(|events| events.send(event))
    }

    /// Drop the connection: every subscription is forgotten and calls fail
    /// with [`ProviderError::Disconnected`] until the next connect.
    pub fn disconnect(&self, reason: &str) -> bool {
        {
            let mut state = self.state.lock();
            state.dropped = true;
            state.subscribed.clear();
        }
        if let Some(quota) = &self.quota {
            quota.lock().slots.clear_active();
        }
        self.emit(ProviderEvent::Disconnected {
            reason: reason.to_string(),
        })
    }

    async fn delay(&self) {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for ScriptedLiveProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveProvider for ScriptedLiveProvider {
    async fn connect(&self, events: InboxSender) -> Result<(), ProviderError> {
        let result = {
            let mut state = self.state.lock();
            state.calls.push(LiveCall::Connect);
            state.connect_results.pop_front().unwrap_or(Ok(()))
        };
        self.delay().await;
        if result.is_ok() {
            {
                let mut state = self.state.lock();
                state.dropped = false;
                state.events = Some(events.clone());
            }
            events.send(ProviderEvent::Connected);
        }
        result
    }

    async fn subscribe(&self, symbol: &Symbol) -> Result<SubscribeAck, ProviderError> {
        let (result, dropped) = {
            let mut state = self.state.lock();
            state.calls.push(LiveCall::Subscribe(symbol.clone()));
            let default_ack = state.default_ack.unwrap_or(SubscribeAck::Confirmed);
            let result = state
                .subscribe_results
                .get_mut(symbol)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(default_ack));
            (result, state.dropped)
        };
        self.delay().await;
        if dropped {
            return Err(ProviderError::Disconnected);
        }
        let ack = result?;

        if let Some(quota) = &self.quota {
            let mut quota = quota.lock();
            let now = quota.clock.now();
            quota.slots.take(symbol, now)?;
        }
        let mut state = self.state.lock();
        if !state.subscribed.insert(symbol.clone()) {
            state.double_actuations += 1;
        }
        Ok(ack)
    }

    async fn unsubscribe(&self, symbol: &Symbol) -> Result<(), ProviderError> {
        let (result, dropped) = {
            let mut state = self.state.lock();
            state.calls.push(LiveCall::Unsubscribe(symbol.clone()));
            let result = state
                .unsubscribe_results
                .get_mut(symbol)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(()));
            (result, state.dropped)
        };
        self.delay().await;
        if dropped {
            return Err(ProviderError::Disconnected);
        }
        result?;

        if let Some(quota) = &self.quota {
            let mut quota = quota.lock();
            let now = quota.clock.now();
            quota.slots.release(symbol, now)?;
        }
        self.state.lock().subscribed.remove(symbol);
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(LiveCall::Close);
        state.events = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted-live"
    }
}

// ---------------------------------------------------------------------------
// ScriptedPollProvider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PollState {
    responses: VecDeque<Result<Vec<PolledQuote>, ProviderError>>,
    universe: Vec<Symbol>,
    fetch_calls: usize,
}

/// A poll provider answering each batch from a queue of scripted responses.
///
/// Every `fetch_batch` pops one response and keeps the rows for the
/// requested symbols. An empty queue answers with no rows.
pub struct ScriptedPollProvider {
    state: Mutex<PollState>,
    max_batch_size: Option<usize>,
}

impl ScriptedPollProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PollState::default()),
            max_batch_size: None,
        }
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    pub fn push_quotes(&self, quotes: Vec<PolledQuote>) {
        self.state.lock().responses.push_back(Ok(quotes));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.state.lock().responses.push_back(Err(error));
    }

    pub fn set_universe(&self, universe: Vec<Symbol>) {
        self.state.lock().universe = universe;
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }
}

impl Default for ScriptedPollProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PollProvider for ScriptedPollProvider {
    async fn universe(&self) -> Result<Vec<Symbol>, ProviderError> {
        Ok(self.state.lock().universe.clone())
    }

    async fn fetch_batch(&self, symbols: &[Symbol]) -> Result<Vec<PolledQuote>, ProviderError> {
        let mut state = self.state.lock();
        state.fetch_calls += 1;
        let quotes = state.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(quotes
            .into_iter()
            .filter(|quote| symbols.contains(&quote.symbol))
            .collect())
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    fn name(&self) -> &'static str {
        "scripted-poll"
    }
}

// ---------------------------------------------------------------------------
// TrendPollProvider
// ---------------------------------------------------------------------------

const TREND_START_PRICE: i64 = 100;

struct Trend {
    price: Decimal,
    step_percent: Decimal,
}

/// A poll provider where every fetch moves each symbol by its configured
/// percentage.
///
/// Under the `Change` score mode a symbol's score from the second fetch on
/// equals its configured percentage. Symbols start flat.
pub struct TrendPollProvider {
    universe: Vec<Symbol>,
    trends: Mutex<HashMap<Symbol, Trend>>,
    clock: Arc<dyn Clock>,
}

impl TrendPollProvider {
    pub fn new(universe: Vec<Symbol>, clock: Arc<dyn Clock>) -> Self {
        let trends = universe
            .iter()
            .map(|symbol| {
                (
                    symbol.clone(),
                    Trend {
                        price: Decimal::from(TREND_START_PRICE),
                        step_percent: Decimal::ZERO,
                    },
                )
            })
            .collect();
        Self {
            universe,
            trends: Mutex::new(trends),
            clock,
        }
    }

    /// Set the per-fetch move of `symbol`, in percent.
    pub fn set_trend(&self, symbol: &Symbol, percent: f64) {
        if let Some(trend) = self.trends.lock().get_mut(symbol) {
            trend.step_percent = Decimal::from_f64(percent).unwrap_or(Decimal::ZERO);
        }
    }

    /// Set every symbol flat.
    pub fn flatten(&self) {
        for trend in self.trends.lock().values_mut() {
            trend.step_percent = Decimal::ZERO;
        }
    }
}

#[async_trait]
impl PollProvider for TrendPollProvider {
    async fn universe(&self) -> Result<Vec<Symbol>, ProviderError> {
        Ok(self.universe.clone())
    }

    async fn fetch_batch(&self, symbols: &[Symbol]) -> Result<Vec<PolledQuote>, ProviderError> {
        let now = self.clock.now();
        let mut trends = self.trends.lock();
        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                let trend = trends.get_mut(symbol)?;
                trend.price *= Decimal::ONE + trend.step_percent / Decimal::ONE_HUNDRED;
                Some(PolledQuote::new(
                    symbol.clone(),
                    QuoteSample::new(trend.price, now),
                ))
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "trend-poll"
    }
}
