//! Handler for the `run` command.

use std::sync::Arc;

use tokio::signal;
use tracing::info;

use super::command::RunArgs;
use super::config::{self, ConfigSource};
use super::output;
use crate::adapter::outbound::sink::TracingSink;
use crate::error::Result;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::Config;
use crate::infrastructure::factory::ProviderFactory;
use crate::infrastructure::scheduler::{shutdown_channel, RunSummary, Scheduler};
use crate::port::{Clock, TickSink};

/// Execute the run command.
pub async fn execute(args: &RunArgs) -> Result<()> {
    let (config, source) = config::load(args.config.config.as_deref())?;
    let config = apply_overrides(config, args)?;

    if !output::is_quiet() && !args.json_logs {
        print_startup(&config, &source);
    }
    config.init_logging();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let providers = ProviderFactory::build(&config, Arc::clone(&clock))?;
    let sink: Arc<dyn TickSink> = Arc::new(TracingSink);
    let scheduler = Scheduler::new(&config, providers.live, providers.poll, sink).with_clock(clock);

    info!(
        max_live_slots = config.scheduler.max_live_slots,
        poll_interval_ms = config.scheduler.poll_interval_ms,
        "slotkeeper starting"
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut task = tokio::spawn(scheduler.run(shutdown_rx));

    let summary = tokio::select! {
        result = &mut task => result??,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received (Ctrl+C)");
            let _ = shutdown_tx.send(true);
            task.await??
        }
    };

    info!("slotkeeper stopped");
    print_summary(&summary);
    Ok(())
}

#[allow(clippy::result_large_err)]
fn apply_overrides(mut config: Config, args: &RunArgs) -> Result<Config> {
    if args.simulate {
        config.use_simulation();
    }
    config.logging = config.logging.with_overrides(
        args.log_level.as_deref(),
        args.json_logs || output::is_json(),
    );
    if let Some(max_live_slots) = args.max_live_slots {
        config.scheduler.max_live_slots = max_live_slots;
    }
    config.validate()?;
    Ok(config)
}

fn print_startup(config: &Config, source: &ConfigSource) {
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Config", source);
    output::field("Max live slots", config.scheduler.max_live_slots);
    output::field(
        "Poll interval",
        format!("{}ms", config.scheduler.poll_interval_ms),
    );
    if config.use_simulated_providers() {
        output::field("Market", output::highlight("simulated"));
    }
    output::note("press Ctrl+C to stop");
}

fn print_summary(summary: &RunSummary) {
    output::section("Summary");
    output::field("Passes", summary.passes);
    output::field("Live quotes", summary.tracker.accepted);
    output::field("Stale dropped", summary.tracker.stale_dropped);
    output::field("Coalesced", summary.inbox.coalesced);
    output::field("Inbox dropped", summary.inbox.dropped);
}
