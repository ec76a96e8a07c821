//! Time source port.

use chrono::{DateTime, Utc};

/// Source of the current time for ledger transitions.
///
/// Lets the scheduler run against wall time in production and against the
/// runtime's (possibly paused) clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
