//! Slotkeeper - bounded live-subscription scheduling for market data.
//!
//! A live-push feed can hold only a fixed number of subscriptions, and a
//! cancelled subscription keeps its slot for a while. Slotkeeper polls the
//! whole universe through an unbounded provider, ranks every symbol by how
//! urgently it needs live updates, and keeps the live slots on the top of
//! that ranking without ever exceeding the cap.
//!
//! # Architecture
//!
//! ```text
//!   PollProvider ──▶ CandidateScanner ──▶ SubscriptionManager ──▶ LiveProvider
//!                                              │    ▲                  │
//!                                              ▼    │                  ▼
//!                                           SlotLedger ◀──── LiveTracker ──▶ TickSink
//! ```
//!
//! # Modules
//!
//! - [`domain`] - Symbols, quote samples, scores and slot states
//! - [`port`] - Provider, sink and clock traits
//! - [`application`] - Scanner, ledger, subscription manager, live tracker
//! - [`infrastructure`] - Configuration, inbox, scheduler loop, provider factory
//! - [`adapter`] - WebSocket, HTTP and simulated providers; sinks; CLI
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use slotkeeper::adapter::outbound::sink::TracingSink;
//! use slotkeeper::infrastructure::clock::SystemClock;
//! use slotkeeper::infrastructure::config::Config;
//! use slotkeeper::infrastructure::factory::ProviderFactory;
//! use slotkeeper::infrastructure::scheduler::{shutdown_channel, Scheduler};
//!
//! # async fn example() -> slotkeeper::error::Result<()> {
//! let config = Config::default();
//! let providers = ProviderFactory::build(&config, Arc::new(SystemClock))?;
//! let scheduler = Scheduler::new(&config, providers.live, providers.poll, Arc::new(TracingSink));
//! let (_stop, shutdown) = shutdown_channel();
//! let summary = scheduler.run(shutdown).await?;
//! println!("{} passes", summary.passes);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
