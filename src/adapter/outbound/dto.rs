//! Wire types shared by the HTTP and WebSocket providers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BookLevel, QuoteSample, Symbol};
use crate::error::ProviderError;
use crate::port::PolledQuote;

#[derive(Debug, Deserialize)]
pub(crate) struct LevelDto {
    pub price: Decimal,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub orders: u32,
}

/// One quote as both providers send it.
#[derive(Debug, Deserialize)]
pub(crate) struct QuoteDto {
    pub symbol: Symbol,
    pub price: Decimal,
    #[serde(default)]
    pub volume: Option<u64>,
    #[serde(default)]
    pub bids: Vec<LevelDto>,
    #[serde(default)]
    pub asks: Vec<LevelDto>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl QuoteDto {
    /// Convert, stamping quotes without a server time with `received_at`.
    pub(crate) fn into_polled(self, received_at: DateTime<Utc>) -> PolledQuote {
        let levels = |levels: Vec<LevelDto>| {
            levels
                .into_iter()
                .map(|l| BookLevel::new(l.price, l.volume, l.orders))
                .collect()
        };
        let mut sample = QuoteSample::new(self.price, self.timestamp.unwrap_or(received_at))
            .with_book(levels(self.bids), levels(self.asks));
        if let Some(volume) = self.volume {
            sample = sample.with_volume(volume);
        }
        PolledQuote::new(self.symbol, sample)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SymbolsResponse {
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuotesResponse {
    pub quotes: Vec<QuoteDto>,
}

/// Client request on the push socket.
#[derive(Debug, Serialize)]
pub(crate) struct WsRequest<'a> {
    pub op: &'a str,
    pub symbol: &'a str,
}

/// Server frame on the push socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WsFrame {
    Quote(QuoteDto),
    /// Reply to a subscribe or unsubscribe request.
    Ack {
        op: String,
        symbol: Symbol,
        ok: bool,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Deferred result of an accepted subscribe.
    Subscribed { symbol: Symbol },
    SubscribeFailed {
        symbol: Symbol,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Map a refusal code to the provider error taxonomy.
pub(crate) fn refusal(symbol: &Symbol, code: Option<&str>, reason: Option<String>) -> ProviderError {
    let reason = reason.unwrap_or_else(|| code.unwrap_or("refused").to_string());
    match code {
        Some("capacity") => ProviderError::Capacity {
            symbol: symbol.to_string(),
        },
        Some("rejected" | "unknown_symbol" | "delisted") => ProviderError::Rejected {
            symbol: symbol.to_string(),
            reason,
        },
        _ => ProviderError::Transient(reason),
    }
}
