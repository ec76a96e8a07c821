//! Outbound ports: provider, sink and clock traits implemented by adapters.

pub mod clock;
pub mod provider;
pub mod sink;

pub use clock::Clock;
pub use provider::{LiveProvider, PolledQuote, PollProvider, ProviderEvent, SubscribeAck};
pub use sink::TickSink;
