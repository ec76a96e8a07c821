//! Outbound adapters (driven side).
//!
//! - [`ws`] - Live provider over WebSocket
//! - [`http`] - Poll provider over REST
//! - [`sim`] - Simulated market with live and poll providers
//! - [`sink`] - Tick sinks

pub(crate) mod dto;
pub mod http;
pub mod sim;
pub mod sink;
pub mod ws;
