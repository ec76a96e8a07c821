//! Applying provider call results back to the ledger.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::application::ledger::SlotLedger;
use crate::domain::Symbol;
use crate::error::ProviderError;
use crate::port::SubscribeAck;

use super::SubscriptionManager;

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Subscribe(Result<SubscribeAck, ProviderError>),
    Unsubscribe(Result<(), ProviderError>),
}

/// A finished actuation, tagged with the connection it was issued on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationOutcome {
    pub symbol: Symbol,
    pub kind: OutcomeKind,
    pub epoch: u64,
}

impl SubscriptionManager {
    /// Fold a finished call into the ledger.
    ///
    /// Results from a connection that has since dropped are discarded; the
    /// disconnect already reset the entry.
    pub fn apply_outcome(&self, ledger: &mut SlotLedger, outcome: ActuationOutcome, now: DateTime<Utc>) {
        if outcome.epoch != ledger.connection_epoch() {
            debug!(symbol = %outcome.symbol, "Discarding result from previous connection");
            return;
        }
        let symbol = &outcome.symbol;
        let result = match outcome.kind {
            OutcomeKind::Subscribe(Ok(ack)) => {
                ledger.subscribe_returned(symbol, ack == SubscribeAck::Confirmed, now)
            }
            OutcomeKind::Subscribe(Err(error)) => {
                self.apply_subscribe_failure(ledger, symbol, &error, now);
                Ok(())
            }
            OutcomeKind::Unsubscribe(Ok(())) => ledger.unsubscribe_sent(symbol),
            OutcomeKind::Unsubscribe(Err(error)) => {
                self.apply_unsubscribe_failure(ledger, symbol, &error, now);
                Ok(())
            }
        };
        if let Err(error) = result {
            warn!(symbol = %symbol, error = %error, "Actuation result did not apply");
        }
    }

    /// Handle a failed subscribe, whether returned by the call or pushed later.
    pub fn apply_subscribe_failure(
        &self,
        ledger: &mut SlotLedger,
        symbol: &Symbol,
        failure: &ProviderError,
        now: DateTime<Utc>,
    ) {
        if let Err(error) = ledger.fail_subscribe(symbol) {
            warn!(symbol = %symbol, error = %error, "Subscribe failure for entry not pending");
            return;
        }
        match failure {
            ProviderError::Rejected { reason, .. } => {
                warn!(symbol = %symbol, reason = %reason, "Subscribe rejected");
                if let Err(error) = ledger.mark_ineligible(symbol) {
                    warn!(symbol = %symbol, error = %error, "Rejection did not apply");
                }
            }
            ProviderError::Capacity { .. } => {
                error!(
                    symbol = %symbol,
                    occupied = ledger.occupied(),
                    max = ledger.max_live_slots(),
                    "Provider reports no capacity while ledger had a free slot"
                );
                self.park(ledger, symbol, now);
            }
            ProviderError::Disconnected => {
                debug!(symbol = %symbol, "Subscribe lost to disconnect");
            }
            ProviderError::Transient(_) | ProviderError::Timeout { .. } => {
                warn!(symbol = %symbol, error = %failure, "Subscribe failed");
                self.park(ledger, symbol, now);
            }
        }
    }

    fn apply_unsubscribe_failure(
        &self,
        ledger: &mut SlotLedger,
        symbol: &Symbol,
        failure: &ProviderError,
        now: DateTime<Utc>,
    ) {
        match failure {
            // Nothing left to cancel upstream; drain as if the call succeeded.
            ProviderError::Rejected { .. } | ProviderError::Disconnected => {
                if let Err(error) = ledger.unsubscribe_sent(symbol) {
                    warn!(symbol = %symbol, error = %error, "Unsubscribe result did not apply");
                }
            }
            _ => {
                warn!(symbol = %symbol, error = %failure, "Unsubscribe failed, keeping slot");
                if let Err(error) = ledger.fail_unsubscribe(symbol) {
                    warn!(symbol = %symbol, error = %error, "Unsubscribe result did not apply");
                    return;
                }
                self.park(ledger, symbol, now);
            }
        }
    }

    /// Back off after a failure, demoting after too many in a row.
    fn park(&self, ledger: &mut SlotLedger, symbol: &Symbol, now: DateTime<Utc>) {
        let failures = ledger
            .get(symbol)
            .map_or(0, |entry| entry.failures())
            .saturating_add(1);
        let backoff = &self.policy.backoff;

        let parked = if failures >= self.policy.max_pending_retries {
            ledger
                .record_failure(symbol, now + backoff.max())
                .and_then(|_| ledger.reset_failures(symbol))
                .map(|()| {
                    info!(
                        symbol = %symbol,
                        failures,
                        parked_for_ms = backoff.max().num_milliseconds(),
                        "Demoted after repeated failures"
                    );
                })
        } else {
            ledger
                .record_failure(symbol, now + backoff.delay(failures))
                .map(|_| ())
        };
        if let Err(error) = parked {
            warn!(symbol = %symbol, error = %error, "Backoff did not apply");
        }
    }
}
