//! Top-K query over ledger scores.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::application::ledger::SlotLedger;
use crate::domain::score::rank_order;
use crate::domain::{ScoreSource, SlotState, Symbol};

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub symbol: Symbol,
    /// `None` while the symbol is cold.
    pub score: Option<f64>,
    pub source: ScoreSource,
    pub state: SlotState,
    /// Milliseconds since the score was computed.
    pub age_ms: i64,
    pub stale: bool,
    pub ineligible: bool,
}

/// Rank every scored entry and return the top `k`.
///
/// A score is stale if it was reused after a failed fetch or is older than
/// `stale_after`.
#[must_use]
pub fn leaderboard(
    ledger: &SlotLedger,
    k: usize,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<LeaderboardRow> {
    let mut scored: Vec<_> = ledger
        .entries()
        .filter_map(|entry| entry.score().map(|score| (entry, *score)))
        .collect();
    scored.sort_by(|(a, a_score), (b, b_score)| {
        rank_order(a_score.value, a.symbol(), b_score.value, b.symbol())
    });

    scored
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(rank, (entry, score))| {
            let age = now - score.at;
            LeaderboardRow {
                rank: rank + 1,
                symbol: entry.symbol().clone(),
                score: score.value.is_finite().then_some(score.value),
                source: score.source,
                state: entry.state(),
                age_ms: age.num_milliseconds().max(0),
                stale: score.stale || age > stale_after,
                ineligible: entry.is_ineligible(),
            }
        })
        .collect()
}
