//! Per-symbol subscription state machine.
//!
//! ```text
//! Unsubscribed --begin_subscribe--> PendingSubscribe
//! PendingSubscribe --confirm_subscribe--> Live
//! PendingSubscribe --fail_subscribe--> Unsubscribed
//! Live --begin_unsubscribe--> PendingUnsubscribe
//! PendingUnsubscribe --release (latency elapsed)--> Unsubscribed
//! PendingUnsubscribe --fail_unsubscribe--> Live
//! Live --force_drop--> Unsubscribed
//! ```
//!
//! Capacity is not known here; the application ledger
//! checks it before calling [`SlotEntry::begin_subscribe`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::error::LedgerError;
use super::id::Symbol;
use super::sample::{QuoteSample, ScoreSource};
use super::score::COLD_START;

/// Subscription state of a single symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Not subscribed and not holding a slot.
    Unsubscribed,
    /// Subscribe issued, awaiting confirmation. Holds a slot.
    PendingSubscribe,
    /// Receiving pushes. Holds a slot.
    Live,
    /// Unsubscribe issued; the provider keeps the slot until the latency elapses.
    PendingUnsubscribe,
}

impl SlotState {
    /// Whether this state is counted against `max_live_slots`.
    #[must_use]
    pub const fn occupies_slot(self) -> bool {
        !matches!(self, Self::Unsubscribed)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsubscribed => "unsubscribed",
            Self::PendingSubscribe => "pending_subscribe",
            Self::Live => "live",
            Self::PendingUnsubscribe => "pending_unsubscribe",
        };
        f.write_str(name)
    }
}

/// Last known urgency value for a symbol, tagged with its origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotScore {
    pub value: f64,
    pub source: ScoreSource,
    pub at: DateTime<Utc>,
    /// Reused from an earlier pass because the latest fetch failed.
    pub stale: bool,
}

/// The ledger's record for one symbol.
///
/// Entries are created on first sight and never removed.
#[derive(Debug, Clone)]
pub struct SlotEntry {
    symbol: Symbol,
    state: SlotState,
    score: Option<SlotScore>,
    last_sample: Option<QuoteSample>,
    subscribe_requested_at: Option<DateTime<Utc>>,
    subscribed_at: Option<DateTime<Utc>>,
    unsubscribe_requested_at: Option<DateTime<Utc>>,
    /// Recomputed by every reconciliation pass.
    pub(crate) priority_rank: Option<usize>,
    in_flight: bool,
    failures: u32,
    retry_after: Option<DateTime<Utc>>,
    ineligible: bool,
    recovering: bool,
}

impl SlotEntry {
    /// Create an unsubscribed entry with no score.
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: SlotState::Unsubscribed,
            score: None,
            last_sample: None,
            subscribe_requested_at: None,
            subscribed_at: None,
            unsubscribe_requested_at: None,
            priority_rank: None,
            in_flight: false,
            failures: 0,
            retry_after: None,
            ineligible: false,
            recovering: false,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub const fn state(&self) -> SlotState {
        self.state
    }

    #[must_use]
    pub const fn score(&self) -> Option<&SlotScore> {
        self.score.as_ref()
    }

    /// Score used for ranking; [`COLD_START`] when nothing is known.
    #[must_use]
    pub fn effective_score(&self) -> f64 {
        self.score.map_or(COLD_START, |score| score.value)
    }

    #[must_use]
    pub const fn last_sample(&self) -> Option<&QuoteSample> {
        self.last_sample.as_ref()
    }

    #[must_use]
    pub const fn subscribed_at(&self) -> Option<DateTime<Utc>> {
        self.subscribed_at
    }

    #[must_use]
    pub const fn subscribe_requested_at(&self) -> Option<DateTime<Utc>> {
        self.subscribe_requested_at
    }

    #[must_use]
    pub const fn unsubscribe_requested_at(&self) -> Option<DateTime<Utc>> {
        self.unsubscribe_requested_at
    }

    #[must_use]
    pub const fn priority_rank(&self) -> Option<usize> {
        self.priority_rank
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    #[must_use]
    pub const fn is_ineligible(&self) -> bool {
        self.ineligible
    }

    #[must_use]
    pub const fn is_recovering(&self) -> bool {
        self.recovering
    }

    /// Whether a failed actuation is still cooling down at `now`.
    #[must_use]
    pub fn in_backoff(&self, now: DateTime<Utc>) -> bool {
        self.retry_after.is_some_and(|after| now < after)
    }

    /// Record a new score, honouring live-over-poll precedence.
    ///
    /// A poll score is ignored for a `Live` entry whose live score is younger
    /// than `live_ttl`. An older live score counts as unavailable, so a feed
    /// that stopped pushing cannot pin its last value. Returns whether the
    /// score was stored.
    pub fn record_score(&mut self, score: SlotScore, live_ttl: Duration) -> bool {
        let live_held = self.state == SlotState::Live
            && self.score.is_some_and(|current| {
                current.source == ScoreSource::Live && score.at - current.at < live_ttl
            });
        if live_held && score.source == ScoreSource::Poll {
            return false;
        }
        self.score = Some(score);
        true
    }

    /// Remember the most recent sample from either source.
    pub fn record_sample(&mut self, sample: QuoteSample) {
        self.last_sample = Some(sample);
    }

    fn transition_error(&self, to: SlotState) -> LedgerError {
        LedgerError::InvalidTransition {
            symbol: self.symbol.to_string(),
            from: self.state,
            to,
        }
    }

    fn ensure_idle(&self) -> Result<(), LedgerError> {
        if self.in_flight {
            return Err(LedgerError::ActuationInFlight {
                symbol: self.symbol.to_string(),
            });
        }
        Ok(())
    }

    /// `Unsubscribed -> PendingSubscribe`, marking the actuation in flight.
    pub fn begin_subscribe(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.state != SlotState::Unsubscribed {
            return Err(self.transition_error(SlotState::PendingSubscribe));
        }
        self.ensure_idle()?;
        if self.ineligible {
            return Err(LedgerError::Ineligible {
                symbol: self.symbol.to_string(),
            });
        }
        self.state = SlotState::PendingSubscribe;
        self.subscribe_requested_at = Some(now);
        self.in_flight = true;
        self.recovering = false;
        Ok(())
    }

    /// Re-issue a subscribe for an entry still pending after a reconnect.
    pub fn reissue_subscribe(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.state != SlotState::PendingSubscribe {
            return Err(self.transition_error(SlotState::PendingSubscribe));
        }
        self.ensure_idle()?;
        self.subscribe_requested_at = Some(now);
        self.in_flight = true;
        Ok(())
    }

    /// The subscribe call returned successfully.
    ///
    /// `confirmed` is false when the provider only accepted the request and
    /// will confirm later. The entry may already be `Live` if a push arrived
    /// before the call returned.
    pub fn subscribe_returned(&mut self, confirmed: bool, now: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.state {
            SlotState::PendingSubscribe if confirmed => self.confirm_subscribe(now),
            SlotState::PendingSubscribe | SlotState::Live => {
                self.in_flight = false;
                Ok(())
            }
            _ => Err(self.transition_error(SlotState::Live)),
        }
    }

    /// `PendingSubscribe -> Live` from a push, while the call may still be
    /// outstanding.
    pub fn confirm_pushed(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let in_flight = self.in_flight;
        self.confirm_subscribe(now)?;
        self.in_flight = in_flight;
        Ok(())
    }

    /// `PendingSubscribe -> Live`.
    pub fn confirm_subscribe(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.state != SlotState::PendingSubscribe {
            return Err(self.transition_error(SlotState::Live));
        }
        self.state = SlotState::Live;
        self.subscribed_at = Some(now);
        self.in_flight = false;
        self.failures = 0;
        self.retry_after = None;
        Ok(())
    }

    /// `PendingSubscribe -> Unsubscribed` after a provider failure.
    pub fn fail_subscribe(&mut self) -> Result<(), LedgerError> {
        if self.state != SlotState::PendingSubscribe {
            return Err(self.transition_error(SlotState::Unsubscribed));
        }
        self.state = SlotState::Unsubscribed;
        self.subscribe_requested_at = None;
        self.in_flight = false;
        Ok(())
    }

    /// `Live -> PendingUnsubscribe`, stamping `unsubscribe_requested_at`.
    pub fn begin_unsubscribe(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.state != SlotState::Live {
            return Err(self.transition_error(SlotState::PendingUnsubscribe));
        }
        self.ensure_idle()?;
        self.state = SlotState::PendingUnsubscribe;
        self.unsubscribe_requested_at = Some(now);
        self.in_flight = true;
        Ok(())
    }

    /// The unsubscribe call returned; the slot stays held until released.
    pub fn unsubscribe_sent(&mut self) -> Result<(), LedgerError> {
        if self.state != SlotState::PendingUnsubscribe {
            return Err(self.transition_error(SlotState::PendingUnsubscribe));
        }
        self.in_flight = false;
        Ok(())
    }

    /// `PendingUnsubscribe -> Live` when the unsubscribe call failed.
    pub fn fail_unsubscribe(&mut self) -> Result<(), LedgerError> {
        if self.state != SlotState::PendingUnsubscribe {
            return Err(self.transition_error(SlotState::Live));
        }
        self.state = SlotState::Live;
        self.unsubscribe_requested_at = None;
        self.in_flight = false;
        Ok(())
    }

    /// Whether the unsubscribe latency has fully elapsed at `now`.
    #[must_use]
    pub fn release_due(&self, now: DateTime<Utc>, latency: Duration) -> bool {
        self.state == SlotState::PendingUnsubscribe
            && !self.in_flight
            && self
                .unsubscribe_requested_at
                .is_some_and(|requested| now - requested >= latency)
    }

    /// `PendingUnsubscribe -> Unsubscribed`; only valid once [`release_due`](Self::release_due).
    pub fn release(&mut self, now: DateTime<Utc>, latency: Duration) -> Result<(), LedgerError> {
        if !self.release_due(now, latency) {
            return Err(self.transition_error(SlotState::Unsubscribed));
        }
        self.state = SlotState::Unsubscribed;
        self.unsubscribe_requested_at = None;
        self.subscribed_at = None;
        self.subscribe_requested_at = None;
        Ok(())
    }

    /// Whether a pending subscribe has waited past the ack timeout.
    #[must_use]
    pub fn ack_overdue(&self, now: DateTime<Utc>, ack_timeout: Duration) -> bool {
        self.state == SlotState::PendingSubscribe
            && !self.in_flight
            && self
                .subscribe_requested_at
                .is_some_and(|requested| now - requested >= ack_timeout)
    }

    /// `Live -> Unsubscribed` after the connection dropped.
    ///
    /// The entry is flagged as recovering so the next pass prefers it.
    pub fn force_drop(&mut self) -> Result<(), LedgerError> {
        if self.state != SlotState::Live {
            return Err(self.transition_error(SlotState::Unsubscribed));
        }
        self.state = SlotState::Unsubscribed;
        self.subscribed_at = None;
        self.subscribe_requested_at = None;
        self.in_flight = false;
        self.recovering = true;
        Ok(())
    }

    /// The connection dropped while a call was outstanding; the call is lost.
    pub fn abandon_in_flight(&mut self) {
        self.in_flight = false;
    }

    /// Count a failed actuation and park the entry until `retry_after`.
    ///
    /// Returns the consecutive failure count including this one.
    pub fn record_failure(&mut self, retry_after: DateTime<Utc>) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.retry_after = Some(retry_after);
        self.failures
    }

    /// Clear the failure count after a demotion, keeping the parked deadline.
    pub fn reset_failures(&mut self) {
        self.failures = 0;
    }

    /// Permanently exclude the symbol until [`reset_eligibility`](Self::reset_eligibility).
    pub fn mark_ineligible(&mut self) {
        self.ineligible = true;
        self.recovering = false;
    }

    /// Manual reset after a rejection.
    pub fn reset_eligibility(&mut self) {
        self.ineligible = false;
        self.failures = 0;
        self.retry_after = None;
    }
}
