//! Builders for domain primitives used across tests.
//!
//! Concise factory functions for [`Symbol`], [`QuoteSample`] and
//! [`CandidateSnapshot`] so tests focus on assertions rather than
//! construction boilerplate.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::{Candidate, CandidateSnapshot, QuoteSample, Symbol};
use crate::port::PolledQuote;

/// Fixed test epoch: 2024-03-01T01:30:00Z.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap()
}

/// [`epoch`] plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    epoch() + Duration::seconds(secs)
}

pub fn sym(name: &str) -> Symbol {
    Symbol::from(name)
}

/// Generate `n` symbols named `S000`, `S001`, ...
pub fn symbols(n: usize) -> Vec<Symbol> {
    (0..n).map(|i| Symbol::new(format!("S{i:03}"))).collect()
}

pub fn sample(price: i64, observed_at: DateTime<Utc>) -> QuoteSample {
    QuoteSample::new(Decimal::from(price), observed_at)
}

pub fn polled(name: &str, price: i64, observed_at: DateTime<Utc>) -> PolledQuote {
    PolledQuote::new(sym(name), sample(price, observed_at))
}

/// Snapshot from `(symbol, score)` pairs.
pub fn snapshot(taken_at: DateTime<Utc>, scores: &[(&str, f64)]) -> CandidateSnapshot {
    CandidateSnapshot::new(
        taken_at,
        scores
            .iter()
            .map(|(name, score)| Candidate::new(sym(name), *score))
            .collect(),
    )
}
