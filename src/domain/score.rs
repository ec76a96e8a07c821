//! Urgency scoring for subscription prioritization.
//!
//! Scores are plain `f64` values where larger means "moving faster" and
//! therefore more deserving of a live slot. All functions here are pure.
//!
//! # Cold start
//!
//! A symbol without a usable previous sample scores [`COLD_START`]
//! (negative infinity), so first sight of a symbol never outranks a known
//! mover.
//!
//! # Examples
//!
//! ```
//! use chrono::{Duration, Utc};
//! use rust_decimal_macros::dec;
//! use slotkeeper::domain::sample::QuoteSample;
//! use slotkeeper::domain::score::{score, COLD_START};
//!
//! let t0 = Utc::now();
//! let before = QuoteSample::new(dec!(100), t0);
//! let after = QuoteSample::new(dec!(103), t0 + Duration::seconds(5));
//!
//! assert_eq!(score(None, &after), COLD_START);
//! assert!((score(Some(&before), &after) - 3.0).abs() < 1e-9);
//! ```

use std::cmp::Ordering;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::id::Symbol;
use super::sample::QuoteSample;

/// Sentinel score for a symbol with no usable previous sample.
pub const COLD_START: f64 = f64::NEG_INFINITY;

/// Which scoring function the scanner and tracker apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    /// Absolute percent change between samples.
    #[default]
    Change,
    /// Absolute percent change per second between samples.
    Velocity,
}

impl ScoreMode {
    /// Apply the selected scoring function.
    #[must_use]
    pub fn apply(self, previous: Option<&QuoteSample>, current: &QuoteSample) -> f64 {
        match self {
            Self::Change => score(previous, current),
            Self::Velocity => velocity(previous, current),
        }
    }
}

/// Signed percent change from `previous` to `current`.
///
/// Returns `None` when there is no previous sample, its price is not
/// strictly positive, or the ratio overflows `Decimal`.
#[must_use]
pub fn percent_change(previous: Option<&QuoteSample>, current: &QuoteSample) -> Option<f64> {
    let previous = previous?;
    if previous.price <= Decimal::ZERO {
        return None;
    }
    let change = current
        .price
        .checked_sub(previous.price)?
        .checked_div(previous.price)?
        .checked_mul(Decimal::ONE_HUNDRED)?;
    change.to_f64().filter(|value| value.is_finite())
}

/// Urgency score: magnitude of the short-horizon percent move.
#[must_use]
pub fn score(previous: Option<&QuoteSample>, current: &QuoteSample) -> f64 {
    percent_change(previous, current).map_or(COLD_START, f64::abs)
}

/// Urgency score normalized by elapsed time (percent per second).
///
/// Samples with zero or negative elapsed time fall back to [`score`] so that
/// identical timestamps still produce a finite, stable value.
#[must_use]
pub fn velocity(previous: Option<&QuoteSample>, current: &QuoteSample) -> f64 {
    let Some(prev) = previous else {
        return COLD_START;
    };
    let magnitude = score(previous, current);
    if magnitude == COLD_START {
        return COLD_START;
    }
    let elapsed_ms = (current.observed_at - prev.observed_at).num_milliseconds();
    if elapsed_ms <= 0 {
        return magnitude;
    }
    magnitude / (elapsed_ms as f64 / 1000.0)
}

/// Decay a score by half for every `half_life` of age.
///
/// Used when a poll batch fails and the previous score is reused. Cold-start
/// scores stay cold; a zero half-life disables the penalty.
#[must_use]
pub fn age_penalized(score: f64, age: Duration, half_life: Duration) -> f64 {
    if score == COLD_START || half_life.is_zero() {
        return score;
    }
    let halvings = age.as_secs_f64() / half_life.as_secs_f64();
    score * 0.5_f64.powf(halvings)
}

/// Canonical ranking order: higher score first, then symbol ascending.
///
/// Uses `total_cmp` so the order is total even for infinities.
#[must_use]
pub fn rank_order(a_score: f64, a_symbol: &Symbol, b_score: f64, b_symbol: &Symbol) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| a_symbol.cmp(b_symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(secs: i64, price: Decimal) -> QuoteSample {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap();
        QuoteSample::new(price, base + chrono::Duration::seconds(secs))
    }

    #[test]
    fn missing_previous_is_cold_start() {
        assert_eq!(score(None, &at(0, dec!(10))), COLD_START);
        assert_eq!(velocity(None, &at(0, dec!(10))), COLD_START);
    }

    #[test]
    fn non_positive_previous_price_is_cold_start() {
        assert_eq!(score(Some(&at(0, dec!(0))), &at(5, dec!(10))), COLD_START);
    }

    #[test]
    fn overflowing_ratio_is_cold_start() {
        let tiny = Decimal::from_scientific("1e-20").unwrap();
        let huge = Decimal::from_scientific("1e10").unwrap();
        assert_eq!(percent_change(Some(&at(0, tiny)), &at(5, huge)), None);
        assert_eq!(score(Some(&at(0, tiny)), &at(5, huge)), COLD_START);
        assert_eq!(velocity(Some(&at(0, tiny)), &at(5, huge)), COLD_START);
        assert_eq!(score(Some(&at(0, tiny)), &at(5, Decimal::MAX)), COLD_START);
    }

    #[test]
    fn larger_move_scores_higher() {
        let base = at(0, dec!(100));
        let small = score(Some(&base), &at(5, dec!(101)));
        let large = score(Some(&base), &at(5, dec!(95)));
        assert!(large > small);
        assert!((large - 5.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_idempotent() {
        let prev = at(0, dec!(42.10));
        let cur = at(3, dec!(43.37));
        assert_eq!(score(Some(&prev), &cur), score(Some(&prev), &cur));
    }

    #[test]
    fn signed_change_keeps_direction() {
        let change = percent_change(Some(&at(0, dec!(200))), &at(1, dec!(190))).unwrap();
        assert!((change + 5.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_divides_by_elapsed_seconds() {
        let v = velocity(Some(&at(0, dec!(100))), &at(4, dec!(102)));
        assert!((v - 0.5).abs() < 1e-9);
    }

    #[test]
    fn velocity_with_equal_timestamps_falls_back_to_change() {
        let v = velocity(Some(&at(0, dec!(100))), &at(0, dec!(102)));
        assert!((v - 2.0).abs() < 1e-9);
    }

    #[test]
    fn age_penalty_halves_per_half_life() {
        let penalized = age_penalized(8.0, Duration::from_secs(120), Duration::from_secs(60));
        assert!((penalized - 2.0).abs() < 1e-9);
        assert_eq!(
            age_penalized(COLD_START, Duration::from_secs(1), Duration::from_secs(1)),
            COLD_START
        );
        assert_eq!(age_penalized(3.0, Duration::from_secs(100), Duration::ZERO), 3.0);
    }

    #[test]
    fn rank_order_breaks_ties_by_symbol() {
        let a = Symbol::from("A");
        let b = Symbol::from("B");
        assert_eq!(rank_order(1.0, &a, 1.0, &b), Ordering::Less);
        assert_eq!(rank_order(1.0, &b, 2.0, &a), Ordering::Greater);
        assert_eq!(rank_order(COLD_START, &a, 0.0, &b), Ordering::Greater);
    }
}
