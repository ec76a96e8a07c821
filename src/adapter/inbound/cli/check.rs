//! Handler for `slotkeeper check config`.

use std::path::Path;

use serde_json::json;

use super::config::{self, ConfigSource};
use super::output;
use crate::error::Result;
use crate::infrastructure::config::provider::{LiveProviderConfig, PollProviderConfig};
use crate::infrastructure::config::Config;

/// Validate the configuration without starting the scheduler.
#[allow(clippy::result_large_err)]
pub fn execute_config(path: Option<&Path>) -> Result<()> {
    let (config, source) = config::load(path)?;
    let live = live_label(&config.provider.live);
    let poll = poll_label(&config.provider.poll);

    if output::is_json() {
        output::json_output(json!({
            "command": "check.config",
            "valid": true,
            "source": source.to_string(),
            "live_provider": live,
            "poll_provider": poll,
            "max_live_slots": config.scheduler.max_live_slots,
            "unsubscribe_latency_secs": config.scheduler.unsubscribe_latency_secs,
            "poll_interval_ms": config.scheduler.poll_interval_ms,
            "qualify_threshold": config.scheduler.qualify_threshold,
            "retention_floor": config.scheduler.retention_floor,
            "universe": universe_label(&config),
        }));
        return Ok(());
    }

    output::section("Configuration Check");
    output::field("Config", &source);
    output::success("Configuration is valid");

    output::section("Summary");
    output::field("Live provider", &live);
    output::field("Poll provider", &poll);
    output::field("Max live slots", config.scheduler.max_live_slots);
    output::field(
        "Unsub latency",
        format!("{}s", config.scheduler.unsubscribe_latency_secs),
    );
    output::field(
        "Poll interval",
        format!("{}ms", config.scheduler.poll_interval_ms),
    );
    output::field(
        "Band",
        format!(
            "qualify >= {}, retain >= {}",
            config.scheduler.qualify_threshold, config.scheduler.retention_floor
        ),
    );
    output::field("Universe", universe_label(&config));

    if source == ConfigSource::Defaults {
        output::note(&format!(
            "no {} found, using built-in defaults",
            config::DEFAULT_CONFIG_PATH
        ));
    }
    if config.use_simulated_providers() {
        output::warning("Simulated providers configured; no real market data will be used");
    }

    Ok(())
}

fn live_label(live: &LiveProviderConfig) -> String {
    match live {
        LiveProviderConfig::Websocket(ws) => format!("websocket ({})", ws.url),
        LiveProviderConfig::Simulated => "simulated".to_string(),
    }
}

fn poll_label(poll: &PollProviderConfig) -> String {
    match poll {
        PollProviderConfig::Http(http) => format!("http ({})", http.url),
        PollProviderConfig::Simulated => "simulated".to_string(),
    }
}

fn universe_label(config: &Config) -> String {
    if config.scanner.universe.is_empty() {
        "from poll provider".to_string()
    } else {
        format!("{} configured symbols", config.scanner.universe.len())
    }
}
