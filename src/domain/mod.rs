//! Provider-agnostic domain logic: symbols, samples, scores and slot states.

pub mod error;
pub mod id;
pub mod sample;
pub mod score;
pub mod slot;
pub mod snapshot;
pub mod tick;

pub use error::LedgerError;
pub use id::Symbol;
pub use sample::{BookLevel, QuoteSample, ScoreSource};
pub use score::{ScoreMode, COLD_START};
pub use slot::{SlotEntry, SlotScore, SlotState};
pub use snapshot::{Candidate, CandidateSnapshot, StaleDataWarning};
pub use tick::TickEvent;
