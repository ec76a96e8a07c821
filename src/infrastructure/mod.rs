//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! business logic: configuration, the push inbox, clocks and the scheduler
//! loop that wires everything together.
//!
//! # Submodules
//!
//! - [`clock`] - Wall and runtime clocks
//! - [`config`] - Configuration loading and validation
//! - [`factory`] - Provider construction from configuration
//! - [`inbox`] - Bounded coalescing queue for provider push events
//! - [`scheduler`] - Scan, reconcile and actuate loop with connection supervision

pub mod clock;
pub mod config;
pub mod factory;
pub mod inbox;
pub mod scheduler;
