//! Ledger errors for slot state transitions.
//!
//! These errors are returned when a requested transition would violate one
//! of the ledger's invariants. The ledger leaves the entry untouched when it
//! returns one of them.
//!
//! # Examples
//!
//! ```
//! use slotkeeper::domain::error::LedgerError;
//! use slotkeeper::domain::slot::{SlotEntry, SlotState};
//! use slotkeeper::domain::id::Symbol;
//! use chrono::Utc;
//!
//! let mut entry = SlotEntry::new(Symbol::from("HK.00700"));
//!
//! // An unsubscribed symbol cannot be unsubscribed again.
//! let result = entry.begin_unsubscribe(Utc::now());
//! assert!(matches!(
//!     result,
//!     Err(LedgerError::InvalidTransition { from: SlotState::Unsubscribed, .. })
//! ));
//! ```

use thiserror::Error;

use super::slot::SlotState;

/// Errors that occur when a slot transition violates a ledger invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The entry is not in a state that permits the requested transition.
    #[error("{symbol}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Symbol whose entry was asked to transition.
        symbol: String,
        /// Current state.
        from: SlotState,
        /// Requested state.
        to: SlotState,
    },

    /// Every slot is occupied or still draining.
    #[error("no free live slot ({occupied}/{max} occupied)")]
    CapacityExhausted {
        /// Slots counted against capacity.
        occupied: usize,
        /// Configured maximum.
        max: usize,
    },

    /// An actuation for the symbol has not completed yet.
    #[error("{symbol}: actuation already in flight")]
    ActuationInFlight {
        /// Symbol with the outstanding call.
        symbol: String,
    },

    /// The symbol was rejected by the provider and awaits a manual reset.
    #[error("{symbol}: marked ineligible")]
    Ineligible {
        /// Rejected symbol.
        symbol: String,
    },

    /// The ledger has never seen the symbol.
    #[error("{symbol}: unknown symbol")]
    UnknownSymbol {
        /// Unknown symbol.
        symbol: String,
    },
}
