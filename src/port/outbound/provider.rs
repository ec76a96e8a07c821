//! Market data provider ports.
//!
//! Two providers feed the scheduler. The live provider pushes quotes for a
//! bounded set of subscribed symbols; the poll provider answers batch
//! requests for any symbol but is slower.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{QuoteSample, Symbol};
use crate::error::ProviderError;
use crate::infrastructure::inbox::InboxSender;

/// How the live provider answered a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeAck {
    /// The subscription is active.
    Confirmed,
    /// The request was accepted; confirmation follows as a
    /// [`ProviderEvent::SubscribeConfirmed`] or [`ProviderEvent::SubscribeFailed`].
    Accepted,
}

/// Events pushed by a live provider into the inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A quote update for a subscribed symbol.
    Quote {
        symbol: Symbol,
        sample: QuoteSample,
        server_time: DateTime<Utc>,
    },
    /// The push connection is up.
    Connected,
    /// The push connection dropped; every live subscription is gone.
    Disconnected { reason: String },
    /// Deferred confirmation of an accepted subscribe.
    SubscribeConfirmed { symbol: Symbol },
    /// Deferred failure of an accepted subscribe.
    SubscribeFailed { symbol: Symbol, error: ProviderError },
}

impl ProviderEvent {
    /// Symbol the event concerns, if any.
    #[must_use]
    pub const fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Quote { symbol, .. }
            | Self::SubscribeConfirmed { symbol }
            | Self::SubscribeFailed { symbol, .. } => Some(symbol),
            Self::Connected | Self::Disconnected { .. } => None,
        }
    }

    /// Quotes may be coalesced or dropped under pressure; nothing else may.
    #[must_use]
    pub const fn is_quote(&self) -> bool {
        matches!(self, Self::Quote { .. })
    }
}

/// One row of a poll batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PolledQuote {
    pub symbol: Symbol,
    pub sample: QuoteSample,
}

impl PolledQuote {
    #[must_use]
    pub const fn new(symbol: Symbol, sample: QuoteSample) -> Self {
        Self { symbol, sample }
    }
}

/// Bounded live-push provider.
///
/// Implementations push [`ProviderEvent`]s into the sender handed to
/// [`connect`](Self::connect) and must never block on it.
#[async_trait]
pub trait LiveProvider: Send + Sync {
    /// Open the push connection. Emits [`ProviderEvent::Connected`] once up.
    async fn connect(&self, events: InboxSender) -> Result<(), ProviderError>;

    /// Request a live subscription for `symbol`.
    async fn subscribe(&self, symbol: &Symbol) -> Result<SubscribeAck, ProviderError>;

    /// Cancel the live subscription for `symbol`.
    ///
    /// The provider keeps the slot occupied until its unsubscribe latency
    /// elapses.
    async fn unsubscribe(&self, symbol: &Symbol) -> Result<(), ProviderError>;

    /// Close the push connection.
    async fn close(&self) -> Result<(), ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Unbounded polling provider.
#[async_trait]
pub trait PollProvider: Send + Sync {
    /// Every symbol the provider can quote.
    async fn universe(&self) -> Result<Vec<Symbol>, ProviderError>;

    /// Fetch the latest quote for each symbol. Unknown symbols are omitted.
    async fn fetch_batch(&self, symbols: &[Symbol]) -> Result<Vec<PolledQuote>, ProviderError>;

    /// Largest batch the provider accepts, if limited.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
