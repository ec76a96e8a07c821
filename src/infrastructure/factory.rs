//! Provider factory.
//!
//! Builds the live and poll providers named in configuration. Simulated
//! providers share one market so live and poll prices agree.

use std::sync::Arc;

use crate::adapter::outbound::http::HttpPollProvider;
use crate::adapter::outbound::sim::{SimLiveProvider, SimMarket, SimPollProvider};
use crate::adapter::outbound::ws::WsLiveProvider;
use crate::error::Result;
use crate::infrastructure::config::provider::{LiveProviderConfig, PollProviderConfig};
use crate::infrastructure::config::Config;
use crate::port::{Clock, LiveProvider, PollProvider};

/// The provider pair a scheduler runs against.
pub struct Providers {
    pub live: Arc<dyn LiveProvider>,
    pub poll: Arc<dyn PollProvider>,
}

/// Factory for provider adapters.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Build both providers from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP base URL does not parse.
    #[allow(clippy::result_large_err)]
    pub fn build(config: &Config, clock: Arc<dyn Clock>) -> Result<Providers> {
        let mut market: Option<Arc<SimMarket>> = None;
        let mut shared_market = || {
            Arc::clone(market.get_or_insert_with(|| {
                Arc::new(SimMarket::new(&config.simulation, Arc::clone(&clock)))
            }))
        };

        let live: Arc<dyn LiveProvider> = match &config.provider.live {
            LiveProviderConfig::Websocket(ws) => Arc::new(WsLiveProvider::new(ws.url.clone())),
            LiveProviderConfig::Simulated => Arc::new(SimLiveProvider::new(
                shared_market(),
                config.scheduler.max_live_slots,
                config.scheduler.unsubscribe_latency(),
            )),
        };

        let poll: Arc<dyn PollProvider> = match &config.provider.poll {
            PollProviderConfig::Http(http) => Arc::new(HttpPollProvider::from_config(http)?),
            PollProviderConfig::Simulated => Arc::new(SimPollProvider::new(shared_market())),
        };

        Ok(Providers { live, poll })
    }
}
