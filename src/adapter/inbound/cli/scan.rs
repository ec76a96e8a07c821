//! Handler for the `scan` command.
//!
//! Runs the candidate scanner against the poll provider without touching the
//! live provider, then prints the top of the leaderboard. The first pass
//! only records a baseline sample, so scores need at least two passes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tabled::{Table, Tabled};
use tokio::time::sleep;

use super::command::ScanArgs;
use super::config;
use super::output;
use crate::application::ledger::SlotLedger;
use crate::application::subscription::{PassMode, SubscriptionManager};
use crate::application::{leaderboard, CandidateScanner, LeaderboardRow, ScanReport};
use crate::error::Result;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::factory::ProviderFactory;
use crate::port::Clock;

/// A leaderboard row formatted for display.
#[derive(Tabled)]
struct LeaderboardLine {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Flags")]
    flags: String,
}

impl From<&LeaderboardRow> for LeaderboardLine {
    fn from(row: &LeaderboardRow) -> Self {
        let mut flags = Vec::new();
        if row.stale {
            flags.push("stale");
        }
        if row.ineligible {
            flags.push("ineligible");
        }
        Self {
            rank: row.rank,
            symbol: row.symbol.to_string(),
            score: row
                .score
                .map_or_else(|| "cold".to_string(), |score| format!("{score:.3}")),
            source: row.source.to_string(),
            age: format!("{:.1}s", row.age_ms as f64 / 1_000.0),
            flags: flags.join(","),
        }
    }
}

/// Execute the scan command.
pub async fn execute(args: &ScanArgs) -> Result<()> {
    let (mut config, _) = config::load(args.config.config.as_deref())?;
    if args.simulate {
        config.use_simulation();
    }
    config
        .logging
        .clone()
        .with_overrides(Some(scan_log_level(output::verbosity())), false)
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let providers = ProviderFactory::build(&config, Arc::clone(&clock))?;
    let scheduler = &config.scheduler;
    let mut scanner = CandidateScanner::new(providers.poll, config.scanner.settings(scheduler));
    let manager = SubscriptionManager::new(scheduler.subscription_policy());
    let mut ledger = SlotLedger::new(scheduler.max_live_slots, scheduler.unsubscribe_latency());
    let interval =
        Duration::from_millis(args.interval_ms.unwrap_or(scheduler.poll_interval_ms));

    let mut report: Option<ScanReport> = None;
    for pass in 0..args.passes.max(1) {
        if pass > 0 {
            sleep(interval).await;
        }
        let scanned = scanner.scan(clock.now()).await;
        manager.reconcile(&mut ledger, &scanned.snapshot, clock.now(), PassMode::PollOnly);
        report = Some(scanned);
    }

    let rows = leaderboard(&ledger, args.top, clock.now(), scheduler.stale_after());
    let warnings = report.map(|report| report.warnings).unwrap_or_default();

    if output::is_json() {
        output::json_output(json!({
            "command": "scan",
            "universe": scanner.universe().len(),
            "rows": rows,
            "warnings": warnings,
        }));
        return Ok(());
    }

    output::section("Leaderboard");
    output::field("Universe", scanner.universe().len());
    output::field("Passes", args.passes.max(1));
    if rows.is_empty() {
        output::note("no scored symbols");
    } else {
        let lines: Vec<LeaderboardLine> = rows.iter().map(LeaderboardLine::from).collect();
        output::lines(&Table::new(lines).to_string());
    }
    for warning in &warnings {
        output::warning(&format!(
            "{} symbols reused stale scores: {}",
            warning.symbols.len(),
            warning.reason
        ));
    }
    if args.passes <= 1 {
        output::note(&format!(
            "a single pass only sets the baseline; use {} for scores",
            output::highlight("--passes 2")
        ));
    }

    Ok(())
}

const fn scan_log_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScoreSource, SlotState, Symbol};

    fn row(score: Option<f64>, stale: bool) -> LeaderboardRow {
        LeaderboardRow {
            rank: 1,
            symbol: Symbol::from("SIM.0001"),
            score,
            source: ScoreSource::Poll,
            state: SlotState::Unsubscribed,
            age_ms: 1_500,
            stale,
            ineligible: false,
        }
    }

    #[test]
    fn line_formats_score_and_flags() {
        let line = LeaderboardLine::from(&row(Some(2.34567), true));
        assert_eq!(line.score, "2.346");
        assert_eq!(line.age, "1.5s");
        assert_eq!(line.flags, "stale");
        assert_eq!(line.source, "poll");
    }

    #[test]
    fn cold_rows_say_so() {
        let line = LeaderboardLine::from(&row(None, false));
        assert_eq!(line.score, "cold");
        assert!(line.flags.is_empty());
    }
}
