//! Ranked output of one scanner pass.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::Symbol;
use super::sample::QuoteSample;
use super::score::rank_order;

/// One scored symbol in a [`CandidateSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub symbol: Symbol,
    pub score: f64,
    /// Score reused from an earlier pass after a failed fetch.
    pub stale: bool,
    /// Entered the qualifying band less than the debounce window ago.
    pub unstable: bool,
    /// Sample the score was computed from. `None` for stale candidates.
    #[serde(skip)]
    pub sample: Option<QuoteSample>,
}

impl Candidate {
    #[must_use]
    pub fn new(symbol: Symbol, score: f64) -> Self {
        Self {
            symbol,
            score,
            stale: false,
            unstable: false,
            sample: None,
        }
    }

    #[must_use]
    pub fn with_sample(mut self, sample: QuoteSample) -> Self {
        self.sample = Some(sample);
        self
    }

    #[must_use]
    pub const fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    #[must_use]
    pub const fn unstable(mut self) -> Self {
        self.unstable = true;
        self
    }
}

/// Immutable, timestamped, ranked candidate list.
///
/// Candidates are sorted by score descending with a lexical tie-break at
/// construction; the order cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSnapshot {
    taken_at: DateTime<Utc>,
    candidates: Vec<Candidate>,
}

impl CandidateSnapshot {
    #[must_use]
    pub fn new(taken_at: DateTime<Utc>, mut candidates: Vec<Candidate>) -> Self {
        candidates.sort_by(|a, b| rank_order(a.score, &a.symbol, b.score, &b.symbol));
        Self {
            taken_at,
            candidates,
        }
    }

    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// Consume the snapshot, yielding candidates in rank order.
    #[must_use]
    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }
}

/// Non-fatal report that a poll batch could not be refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleDataWarning {
    /// Symbols whose scores were reused.
    pub symbols: Vec<Symbol>,
    /// Provider error text.
    pub reason: String,
}
