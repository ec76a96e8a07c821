//! The slot ledger: every known symbol's subscription state plus capacity
//! accounting.
//!
//! The ledger is the only shared mutable resource in the scheduler. It is
//! held behind a single [`parking_lot::Mutex`] ([`SharedLedger`]); a
//! reconciliation pass takes the lock once, and the tracker takes it once
//! per event. No method here awaits.
//!
//! Capacity counts `PendingSubscribe`, `Live` and `PendingUnsubscribe`
//! entries and never exceeds `max_live_slots`: the only transition that
//! takes a slot is [`SlotLedger::begin_subscribe`], which refuses when none
//! is free.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    LedgerError, QuoteSample, ScoreSource, SlotEntry, SlotScore, SlotState, Symbol,
};

/// Ledger shared between the scheduler loop and the live tracker.
pub type SharedLedger = Arc<Mutex<SlotLedger>>;

/// Per-state entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    pub unsubscribed: usize,
    pub pending_subscribe: usize,
    pub live: usize,
    pub pending_unsubscribe: usize,
}

impl SlotCounts {
    /// Entries counted against capacity.
    #[must_use]
    pub const fn occupied(&self) -> usize {
        self.pending_subscribe + self.live + self.pending_unsubscribe
    }
}

/// Container of [`SlotEntry`] values keyed by symbol.
///
/// Iteration is in symbol order so every pass over the ledger is
/// deterministic.
#[derive(Debug)]
pub struct SlotLedger {
    entries: BTreeMap<Symbol, SlotEntry>,
    max_live_slots: usize,
    unsubscribe_latency: Duration,
    live_score_ttl: Duration,
    connection_epoch: u64,
}

/// Age after which a live score stops outranking poll scores.
const DEFAULT_LIVE_SCORE_TTL_SECS: i64 = 30;

impl SlotLedger {
    #[must_use]
    pub fn new(max_live_slots: usize, unsubscribe_latency: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_live_slots,
            unsubscribe_latency,
            live_score_ttl: Duration::seconds(DEFAULT_LIVE_SCORE_TTL_SECS),
            connection_epoch: 0,
        }
    }

    /// Set how long a live score keeps precedence over poll scores.
    #[must_use]
    pub fn with_live_score_ttl(mut self, ttl: Duration) -> Self {
        self.live_score_ttl = ttl;
        self
    }

    /// Wrap the ledger for sharing between tasks.
    #[must_use]
    pub fn shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub const fn max_live_slots(&self) -> usize {
        self.max_live_slots
    }

    #[must_use]
    pub const fn unsubscribe_latency(&self) -> Duration {
        self.unsubscribe_latency
    }

    /// Incremented on every disconnect. Actuation results tagged with an
    /// older epoch belong to a dead connection.
    #[must_use]
    pub const fn connection_epoch(&self) -> u64 {
        self.connection_epoch
    }

    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<&SlotEntry> {
        self.entries.get(symbol)
    }

    #[must_use]
    pub fn state_of(&self, symbol: &Symbol) -> SlotState {
        self.entries
            .get(symbol)
            .map_or(SlotState::Unsubscribed, SlotEntry::state)
    }

    /// All entries in symbol order.
    pub fn entries(&self) -> impl Iterator<Item = &SlotEntry> {
        self.entries.values()
    }

    /// Entries in the given state, in symbol order.
    pub fn in_state(&self, state: SlotState) -> impl Iterator<Item = &SlotEntry> {
        self.entries.values().filter(move |entry| entry.state() == state)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn counts(&self) -> SlotCounts {
        let mut counts = SlotCounts::default();
        for entry in self.entries.values() {
            match entry.state() {
                SlotState::Unsubscribed => counts.unsubscribed += 1,
                SlotState::PendingSubscribe => counts.pending_subscribe += 1,
                SlotState::Live => counts.live += 1,
                SlotState::PendingUnsubscribe => counts.pending_unsubscribe += 1,
            }
        }
        counts
    }

    /// Slots counted against capacity.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.state().occupies_slot())
            .count()
    }

    /// Slots free for a new subscribe.
    #[must_use]
    pub fn available(&self) -> usize {
        self.max_live_slots.saturating_sub(self.occupied())
    }

    /// Get or lazily create the entry for `symbol`.
    pub fn ensure(&mut self, symbol: &Symbol) -> &mut SlotEntry {
        self.entries
            .entry(symbol.clone())
            .or_insert_with(|| SlotEntry::new(symbol.clone()))
    }

    fn entry_mut(&mut self, symbol: &Symbol) -> Result<&mut SlotEntry, LedgerError> {
        self.entries
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::UnknownSymbol {
                symbol: symbol.to_string(),
            })
    }

    /// Record a poll-derived score. Returns whether it was stored; a poll
    /// score does not replace a `Live` entry's live score until that score
    /// is older than the live score TTL.
    pub fn observe_poll(
        &mut self,
        symbol: &Symbol,
        value: f64,
        sample: Option<QuoteSample>,
        at: DateTime<Utc>,
        stale: bool,
    ) -> bool {
        let ttl = self.live_score_ttl;
        let entry = self.ensure(symbol);
        let stored = entry.record_score(
            SlotScore {
                value,
                source: ScoreSource::Poll,
                at,
                stale,
            },
            ttl,
        );
        if let Some(sample) = sample {
            entry.record_sample(sample);
        }
        stored
    }

    /// Record a live-derived score and the sample it came from.
    pub fn observe_live(&mut self, symbol: &Symbol, value: f64, sample: QuoteSample) {
        let at = sample.observed_at;
        let ttl = self.live_score_ttl;
        let entry = self.ensure(symbol);
        entry.record_score(
            SlotScore {
                value,
                source: ScoreSource::Live,
                at,
                stale: false,
            },
            ttl,
        );
        entry.record_sample(sample);
    }

    /// `Unsubscribed -> PendingSubscribe`, taking a slot.
    pub fn begin_subscribe(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let occupied = self.occupied();
        if occupied >= self.max_live_slots {
            return Err(LedgerError::CapacityExhausted {
                occupied,
                max: self.max_live_slots,
            });
        }
        self.ensure(symbol).begin_subscribe(now)
    }

    /// The subscribe call returned. `confirmed` is false for an accepted
    /// request awaiting asynchronous confirmation.
    pub fn subscribe_returned(
        &mut self,
        symbol: &Symbol,
        confirmed: bool,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.subscribe_returned(confirmed, now)
    }

    /// `PendingSubscribe -> Live` on a pushed confirmation or first quote.
    pub fn confirm_pushed(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.confirm_pushed(now)?;
        debug!(symbol = %symbol, "Subscription confirmed by push");
        Ok(())
    }

    /// `PendingSubscribe -> Live`.
    pub fn confirm_subscribe(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.confirm_subscribe(now)?;
        debug!(symbol = %symbol, "Subscription live");
        Ok(())
    }

    /// `PendingSubscribe -> Unsubscribed`, freeing the slot.
    pub fn fail_subscribe(&mut self, symbol: &Symbol) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.fail_subscribe()
    }

    /// `Live -> PendingUnsubscribe`. The slot stays held.
    pub fn begin_unsubscribe(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.begin_unsubscribe(now)
    }

    /// The unsubscribe call returned; start draining.
    pub fn unsubscribe_sent(&mut self, symbol: &Symbol) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.unsubscribe_sent()
    }

    /// `PendingUnsubscribe -> Live` after a failed unsubscribe call.
    pub fn fail_unsubscribe(&mut self, symbol: &Symbol) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.fail_unsubscribe()
    }

    /// Release every `PendingUnsubscribe` entry whose latency has elapsed.
    pub fn release_expired(&mut self, now: DateTime<Utc>) -> Vec<Symbol> {
        let latency = self.unsubscribe_latency;
        let mut released = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.release_due(now, latency) && entry.release(now, latency).is_ok() {
                debug!(symbol = %entry.symbol(), "Slot released");
                released.push(entry.symbol().clone());
            }
        }
        released
    }

    /// Promote `PendingSubscribe` entries that were accepted but never
    /// confirmed within `ack_timeout`.
    pub fn promote_overdue(&mut self, now: DateTime<Utc>, ack_timeout: Duration) -> Vec<Symbol> {
        let mut promoted = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.ack_overdue(now, ack_timeout) && entry.confirm_subscribe(now).is_ok() {
                debug!(symbol = %entry.symbol(), "Subscription promoted after ack timeout");
                promoted.push(entry.symbol().clone());
            }
        }
        promoted
    }

    /// Apply a connection drop.
    ///
    /// Every `Live` entry is forced to `Unsubscribed` and flagged as
    /// recovering. Outstanding calls are abandoned. `PendingUnsubscribe`
    /// entries keep their slot until the latency elapses. Returns the
    /// dropped symbols.
    pub fn disconnect(&mut self) -> Vec<Symbol> {
        self.connection_epoch += 1;
        let mut dropped = Vec::new();
        for entry in self.entries.values_mut() {
            entry.abandon_in_flight();
            if entry.state() == SlotState::Live && entry.force_drop().is_ok() {
                dropped.push(entry.symbol().clone());
            }
        }
        if !dropped.is_empty() {
            info!(count = dropped.len(), "Live subscriptions dropped by disconnect");
        }
        dropped
    }

    /// Re-issue every `PendingSubscribe` entry with no call outstanding.
    ///
    /// Used after a reconnect: the new connection knows nothing of the old
    /// subscriptions. Marks each returned entry in flight.
    pub fn reissue_pending(&mut self, now: DateTime<Utc>) -> Vec<Symbol> {
        let mut reissued = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.state() == SlotState::PendingSubscribe
                && !entry.in_flight()
                && entry.reissue_subscribe(now).is_ok()
            {
                reissued.push(entry.symbol().clone());
            }
        }
        reissued
    }

    /// Count a failed actuation and park the symbol until `retry_after`.
    pub fn record_failure(
        &mut self,
        symbol: &Symbol,
        retry_after: DateTime<Utc>,
    ) -> Result<u32, LedgerError> {
        Ok(self.entry_mut(symbol)?.record_failure(retry_after))
    }

    /// Clear the consecutive failure count.
    pub fn reset_failures(&mut self, symbol: &Symbol) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.reset_failures();
        Ok(())
    }

    /// Exclude a rejected symbol from selection.
    pub fn mark_ineligible(&mut self, symbol: &Symbol) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.mark_ineligible();
        warn!(symbol = %symbol, "Symbol marked ineligible");
        Ok(())
    }

    /// Manual reset of a rejected symbol.
    pub fn reset_ineligible(&mut self, symbol: &Symbol) -> Result<(), LedgerError> {
        self.entry_mut(symbol)?.reset_eligibility();
        info!(symbol = %symbol, "Symbol eligibility reset");
        Ok(())
    }

    /// Overwrite the ephemeral rank of every entry. Unranked entries get `None`.
    pub(crate) fn assign_ranks(&mut self, ranked: &[Symbol]) {
        for entry in self.entries.values_mut() {
            entry.priority_rank = None;
        }
        for (rank, symbol) in ranked.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(symbol) {
                entry.priority_rank = Some(rank);
            }
        }
    }
}

#[cfg(test)]
mod tests;
