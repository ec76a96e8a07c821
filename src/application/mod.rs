//! Application services (use cases).
//!
//! These services orchestrate domain logic against the provider ports:
//! scanning, reconciliation, live tracking and the leaderboard query.

pub mod leaderboard;
pub mod ledger;
pub mod scanner;
pub mod subscription;
pub mod tracker;

pub use leaderboard::{leaderboard, LeaderboardRow};
pub use ledger::{SharedLedger, SlotCounts, SlotLedger};
pub use scanner::{CandidateScanner, ScanReport, ScannerSettings};
pub use subscription::{
    ActuationOutcome, OutcomeKind, PassMode, ReconcilePlan, RetryBackoff, SubscriptionManager,
    SubscriptionPolicy,
};
pub use tracker::{LifecycleEvent, LiveTracker, TrackerStats};
