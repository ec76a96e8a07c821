//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`provider`] - Scripted [`LiveProvider`](crate::port::LiveProvider) and
//!   [`PollProvider`](crate::port::PollProvider) implementations.
//! - [`sink`] - Recording [`TickSink`](crate::port::TickSink).
//! - [`domain`] - Builders for symbols, samples and snapshots.
//! - [`config`] - Canonical test configurations.

pub mod config;
pub mod domain;
pub mod provider;
pub mod sink;
