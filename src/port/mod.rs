//! Trait definitions (hexagonal ports).
//!
//! ```text
//!   ┌──────────────┐      ┌───────────────────────┐      ┌───────────┐
//!   │ LiveProvider │─────▶│                       │─────▶│ TickSink  │
//!   └──────────────┘      │ Application + Domain  │      └───────────┘
//!   ┌──────────────┐      │                       │
//!   │ PollProvider │─────▶│                       │
//!   └──────────────┘      └───────────────────────┘
//! ```

pub mod outbound;

pub use outbound::{
    Clock, LiveProvider, PolledQuote, PollProvider, ProviderEvent, SubscribeAck, TickSink,
};
