//! Infrastructure configuration modules.

pub mod logging;
pub mod provider;
pub mod reconnection;
pub mod scheduler;
pub mod settings;

pub use settings::Config;
