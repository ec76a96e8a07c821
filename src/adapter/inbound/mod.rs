//! Inbound adapters: the ways a user drives the scheduler.

pub mod cli;
