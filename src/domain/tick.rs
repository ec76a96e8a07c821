//! Events emitted to the tick sink.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::Symbol;
use super::sample::{QuoteSample, ScoreSource};

/// A scored quote update published downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickEvent {
    pub symbol: Symbol,
    /// Urgency score at publication; `None` while the symbol is cold.
    pub score: Option<f64>,
    pub sample: QuoteSample,
    pub source: ScoreSource,
    pub timestamp: DateTime<Utc>,
}

impl TickEvent {
    /// Build an event, mapping the cold-start sentinel to `None` so the
    /// event stays JSON-serializable.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        score: f64,
        sample: QuoteSample,
        source: ScoreSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            score: score.is_finite().then_some(score),
            sample,
            source,
            timestamp,
        }
    }
}
