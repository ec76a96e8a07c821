//! Quote samples delivered by the live and poll providers.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a score or sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    /// Unbounded polling provider.
    Poll,
    /// Bounded live-push provider.
    Live,
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll => write!(f, "poll"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// A single price level of an order book side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Resting volume at this level.
    pub volume: u64,
    /// Number of orders at this level.
    #[serde(default)]
    pub order_count: u32,
}

impl BookLevel {
    #[must_use]
    pub const fn new(price: Decimal, volume: u64, order_count: u32) -> Self {
        Self {
            price,
            volume,
            order_count,
        }
    }
}

/// A normalized quote observation.
///
/// Both providers reduce their payloads to this shape. Book sides are
/// optional; poll snapshots usually carry only the last price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSample {
    /// Last traded (or reference) price.
    pub price: Decimal,
    /// Cumulative session volume, when reported.
    #[serde(default)]
    pub volume: Option<u64>,
    /// Bid side, best first.
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    /// Ask side, best first.
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    /// Server-side observation time.
    pub observed_at: DateTime<Utc>,
}

impl QuoteSample {
    /// Create a price-only sample.
    #[must_use]
    pub fn new(price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            price,
            volume: None,
            bids: Vec::new(),
            asks: Vec::new(),
            observed_at,
        }
    }

    /// Attach book sides to the sample.
    #[must_use]
    pub fn with_book(mut self, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        self.bids = bids;
        self.asks = asks;
        self
    }

    /// Attach a volume figure to the sample.
    #[must_use]
    pub fn with_volume(mut self, volume: u64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Best bid price, if the sample carries a book.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|level| level.price)
    }

    /// Best ask price, if the sample carries a book.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|level| level.price)
    }

    /// Midpoint of the top of book, if both sides are present.
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mid_requires_both_sides() {
        let now = Utc::now();
        let sample = QuoteSample::new(dec!(10), now);
        assert_eq!(sample.mid(), None);

        let sample = sample.with_book(
            vec![BookLevel::new(dec!(9.9), 100, 3)],
            vec![BookLevel::new(dec!(10.1), 200, 1)],
        );
        assert_eq!(sample.best_bid(), Some(dec!(9.9)));
        assert_eq!(sample.best_ask(), Some(dec!(10.1)));
        assert_eq!(sample.mid(), Some(dec!(10.0)));
    }

    #[test]
    fn score_source_display() {
        assert_eq!(ScoreSource::Poll.to_string(), "poll");
        assert_eq!(ScoreSource::Live.to_string(), "live");
    }

    #[test]
    fn sample_deserializes_without_book() {
        let json = r#"{"price":"12.5","observed_at":"2024-03-01T01:30:00Z"}"#;
        let sample: QuoteSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.price, dec!(12.5));
        assert!(sample.bids.is_empty());
        assert_eq!(sample.volume, None);
    }
}
