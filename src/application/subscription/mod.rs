//! Subscription manager: turns a ranked candidate snapshot into slot
//! transitions.
//!
//! A pass runs entirely under the ledger lock and returns a
//! [`ReconcilePlan`] listing the provider calls the scheduler must make.
//! Entries in the plan are already marked in flight, so a later pass cannot
//! issue a second call for the same symbol.
//!
//! # Selection
//!
//! Symbols are ranked by their ledger score. The top `max_live_slots`
//! symbols at or above `qualify_threshold` form the strict set. Symbols that
//! already hold a slot are retained while their score stays at or above
//! `retention_floor`, but only in slots the strict set leaves free. Live
//! symbols outside the resulting target are unsubscribed; unsubscribed
//! target symbols are subscribed while capacity lasts and backlogged
//! otherwise.

mod backoff;
mod outcome;

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::application::ledger::SlotLedger;
use crate::domain::score::rank_order;
use crate::domain::{CandidateSnapshot, SlotState, Symbol};

pub use backoff::RetryBackoff;
pub use outcome::{ActuationOutcome, OutcomeKind};

/// Tunables for selection and retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionPolicy {
    /// Minimum score for a symbol to claim a slot.
    pub qualify_threshold: f64,
    /// Minimum score for a slot holder to keep its slot.
    pub retention_floor: f64,
    /// Accepted subscribes are promoted to `Live` after this long.
    pub ack_timeout: Duration,
    /// Consecutive failures before a symbol is demoted.
    pub max_pending_retries: u32,
    pub backoff: RetryBackoff,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            qualify_threshold: 0.5,
            retention_floor: 0.25,
            ack_timeout: Duration::seconds(10),
            max_pending_retries: 5,
            backoff: RetryBackoff::new(Duration::seconds(1), Duration::seconds(60)),
        }
    }
}

/// Whether a pass may issue provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Connected: subscribe and unsubscribe as needed.
    Full,
    /// Disconnected: rank and sweep only.
    PollOnly,
}

/// Provider calls and ledger changes produced by one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Symbols moved to `PendingSubscribe`; a subscribe call is owed for each.
    pub subscribe: Vec<Symbol>,
    /// Symbols moved to `PendingUnsubscribe`; an unsubscribe call is owed for each.
    pub unsubscribe: Vec<Symbol>,
    /// `PendingUnsubscribe` entries released this pass.
    pub released: Vec<Symbol>,
    /// `PendingSubscribe` entries promoted after the ack timeout.
    pub promoted: Vec<Symbol>,
    /// Target symbols that found no free slot.
    pub backlog: Vec<Symbol>,
    /// Connection epoch the calls belong to.
    pub epoch: u64,
}

impl ReconcilePlan {
    /// True when the pass owes no provider calls.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

struct Ranked {
    symbol: Symbol,
    score: f64,
    state: SlotState,
    recovering: bool,
    blocked: bool,
}

impl Ranked {
    /// Holds a slot it can keep. Draining entries cannot be kept.
    fn holds_slot(&self) -> bool {
        matches!(self.state, SlotState::Live | SlotState::PendingSubscribe)
    }
}

/// Stateless reconciler; all state lives in the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionManager {
    policy: SubscriptionPolicy,
}

impl SubscriptionManager {
    #[must_use]
    pub const fn new(policy: SubscriptionPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &SubscriptionPolicy {
        &self.policy
    }

    /// Run one reconciliation pass.
    ///
    /// The caller must hold the ledger lock for the whole call.
    pub fn reconcile(
        &self,
        ledger: &mut SlotLedger,
        snapshot: &CandidateSnapshot,
        now: DateTime<Utc>,
        mode: PassMode,
    ) -> ReconcilePlan {
        let mut plan = ReconcilePlan {
            epoch: ledger.connection_epoch(),
            ..ReconcilePlan::default()
        };

        let unstable = ingest(ledger, snapshot);
        let ranked = self.rank(ledger, &unstable, now);
        ledger.assign_ranks(&ranked.iter().map(|r| r.symbol.clone()).collect::<Vec<_>>());
        let target = self.select_target(ledger.max_live_slots(), &ranked);

        if mode == PassMode::Full {
            self.plan_unsubscribes(ledger, &ranked, &target, now, &mut plan);
            self.plan_subscribes(ledger, &ranked, &target, now, &mut plan);
        }

        // Capacity freed here is only used by the next pass.
        plan.released = ledger.release_expired(now);
        // Without a connection there is nothing to have accepted the subscribe.
        if mode == PassMode::Full {
            plan.promoted = ledger.promote_overdue(now, self.policy.ack_timeout);
        }

        if !plan.is_idle() || !plan.released.is_empty() {
            info!(
                subscribe = plan.subscribe.len(),
                unsubscribe = plan.unsubscribe.len(),
                released = plan.released.len(),
                backlog = plan.backlog.len(),
                occupied = ledger.occupied(),
                max = ledger.max_live_slots(),
                "Reconciliation pass"
            );
        }
        plan
    }

    /// Eligible symbols in canonical rank order.
    fn rank(
        &self,
        ledger: &SlotLedger,
        unstable: &HashSet<Symbol>,
        now: DateTime<Utc>,
    ) -> Vec<Ranked> {
        let mut ranked: Vec<Ranked> = ledger
            .entries()
            .filter(|entry| !entry.is_ineligible())
            .map(|entry| Ranked {
                symbol: entry.symbol().clone(),
                score: entry.effective_score(),
                state: entry.state(),
                recovering: entry.is_recovering(),
                blocked: unstable.contains(entry.symbol()) || entry.in_backoff(now),
            })
            .collect();
        ranked.sort_by(|a, b| rank_order(a.score, &a.symbol, b.score, &b.symbol));
        ranked
    }

    /// The set of symbols that should hold a slot after this pass.
    fn select_target(&self, max_live_slots: usize, ranked: &[Ranked]) -> BTreeSet<Symbol> {
        let mut target = BTreeSet::new();

        for candidate in ranked {
            if target.len() >= max_live_slots {
                break;
            }
            if candidate.score < self.policy.qualify_threshold {
                break;
            }
            let exempt = candidate.holds_slot() || candidate.recovering;
            if candidate.blocked && !exempt {
                continue;
            }
            target.insert(candidate.symbol.clone());
        }

        for candidate in ranked {
            if target.len() >= max_live_slots {
                break;
            }
            if candidate.holds_slot()
                && candidate.score >= self.policy.retention_floor
                && !target.contains(&candidate.symbol)
            {
                target.insert(candidate.symbol.clone());
            }
        }

        target
    }

    fn plan_unsubscribes(
        &self,
        ledger: &mut SlotLedger,
        ranked: &[Ranked],
        target: &BTreeSet<Symbol>,
        now: DateTime<Utc>,
        plan: &mut ReconcilePlan,
    ) {
        for candidate in ranked.iter().rev() {
            if candidate.state != SlotState::Live || target.contains(&candidate.symbol) {
                continue;
            }
            let Some(entry) = ledger.get(&candidate.symbol) else {
                continue;
            };
            if entry.in_flight() || entry.in_backoff(now) {
                continue;
            }
            match ledger.begin_unsubscribe(&candidate.symbol, now) {
                Ok(()) => {
                    debug!(symbol = %candidate.symbol, score = candidate.score, "Deselected");
                    plan.unsubscribe.push(candidate.symbol.clone());
                }
                Err(error) => warn!(symbol = %candidate.symbol, error = %error, "Unsubscribe skipped"),
            }
        }
    }

    fn plan_subscribes(
        &self,
        ledger: &mut SlotLedger,
        ranked: &[Ranked],
        target: &BTreeSet<Symbol>,
        now: DateTime<Utc>,
        plan: &mut ReconcilePlan,
    ) {
        let mut entrants: Vec<&Ranked> = ranked
            .iter()
            .filter(|c| c.state == SlotState::Unsubscribed && target.contains(&c.symbol))
            .collect();
        // Symbols dropped by a disconnect come back before new entrants.
        entrants.sort_by(|a, b| {
            b.recovering
                .cmp(&a.recovering)
                .then_with(|| rank_order(a.score, &a.symbol, b.score, &b.symbol))
        });

        for candidate in entrants {
            if ledger.available() == 0 {
                plan.backlog.push(candidate.symbol.clone());
                continue;
            }
            match ledger.begin_subscribe(&candidate.symbol, now) {
                Ok(()) => {
                    debug!(
                        symbol = %candidate.symbol,
                        score = candidate.score,
                        recovering = candidate.recovering,
                        "Selected"
                    );
                    plan.subscribe.push(candidate.symbol.clone());
                }
                Err(error) => warn!(symbol = %candidate.symbol, error = %error, "Subscribe skipped"),
            }
        }
    }
}

/// Copy snapshot scores into the ledger and collect debounced symbols.
fn ingest(ledger: &mut SlotLedger, snapshot: &CandidateSnapshot) -> HashSet<Symbol> {
    let taken_at = snapshot.taken_at();
    let mut unstable = HashSet::new();
    for candidate in snapshot.iter() {
        ledger.observe_poll(
            &candidate.symbol,
            candidate.score,
            candidate.sample.clone(),
            taken_at,
            candidate.stale,
        );
        if candidate.unstable {
            unstable.insert(candidate.symbol.clone());
        }
    }
    unstable
}

#[cfg(test)]
mod tests;
