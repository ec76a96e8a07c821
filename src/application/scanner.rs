//! Candidate scanner: polls the unbounded provider and ranks the universe.
//!
//! Each pass fetches the universe in batches, scores every symbol against
//! its previous poll sample and produces a [`CandidateSnapshot`]. A failed
//! batch never fails the pass: its symbols reuse their last score with an
//! age penalty and are flagged stale, and the pass reports a
//! [`StaleDataWarning`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::domain::score::{age_penalized, rank_order, ScoreMode, COLD_START};
use crate::domain::{Candidate, CandidateSnapshot, QuoteSample, StaleDataWarning, Symbol};
use crate::error::ProviderError;
use crate::port::{PollProvider, PolledQuote};

/// Scanner tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerSettings {
    pub batch_size: usize,
    pub fetch_timeout: Duration,
    pub score_mode: ScoreMode,
    /// Fixed universe. When empty the provider's universe is used.
    pub universe: Vec<Symbol>,
    /// Size of the qualifying band used for debounce.
    pub max_live_slots: usize,
    pub qualify_threshold: f64,
    /// Zero disables debounce.
    pub debounce_window: Duration,
    /// Zero disables the age penalty on stale scores.
    pub stale_half_life: Duration,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            fetch_timeout: Duration::from_secs(10),
            score_mode: ScoreMode::default(),
            universe: Vec::new(),
            max_live_slots: 1000,
            qualify_threshold: 0.5,
            debounce_window: Duration::ZERO,
            stale_half_life: Duration::from_secs(60),
        }
    }
}

/// Result of one scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub snapshot: CandidateSnapshot,
    pub warnings: Vec<StaleDataWarning>,
    /// Symbols refreshed from a successful batch.
    pub fetched: usize,
}

impl ScanReport {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct LastScore {
    value: f64,
    at: DateTime<Utc>,
}

/// Stateful poller. Owned by one task at a time.
pub struct CandidateScanner {
    provider: Arc<dyn PollProvider>,
    settings: ScannerSettings,
    universe: Vec<Symbol>,
    previous: HashMap<Symbol, QuoteSample>,
    last_scores: HashMap<Symbol, LastScore>,
    band_entered: HashMap<Symbol, DateTime<Utc>>,
}

impl CandidateScanner {
    #[must_use]
    pub fn new(provider: Arc<dyn PollProvider>, settings: ScannerSettings) -> Self {
        let universe = settings.universe.clone();
        Self {
            provider,
            settings,
            universe,
            previous: HashMap::new(),
            last_scores: HashMap::new(),
            band_entered: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    /// Symbols covered by the most recent scan.
    #[must_use]
    pub fn universe(&self) -> &[Symbol] {
        &self.universe
    }

    fn batch_size(&self) -> usize {
        let configured = self.settings.batch_size.max(1);
        self.provider
            .max_batch_size()
            .map_or(configured, |limit| configured.min(limit.max(1)))
    }

    async fn refresh_universe(&mut self) -> Option<StaleDataWarning> {
        if !self.settings.universe.is_empty() {
            return None;
        }
        let timeout = self.settings.fetch_timeout;
        let result = tokio::time::timeout(timeout, self.provider.universe())
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout {
                    operation: "universe",
                    after_ms: duration_ms(timeout),
                })
            });
        match result {
            Ok(mut symbols) => {
                symbols.sort();
                symbols.dedup();
                self.universe = symbols;
                None
            }
            Err(error) => {
                warn!(
                    provider = self.provider.name(),
                    error = %error,
                    cached = self.universe.len(),
                    "Universe refresh failed, using cached universe"
                );
                Some(StaleDataWarning {
                    symbols: Vec::new(),
                    reason: format!("universe: {error}"),
                })
            }
        }
    }

    /// Run one scan at `now`.
    pub async fn scan(&mut self, now: DateTime<Utc>) -> ScanReport {
        let mut warnings = Vec::new();
        if let Some(warning) = self.refresh_universe().await {
            warnings.push(warning);
        }

        let batch_size = self.batch_size();
        let timeout = self.settings.fetch_timeout;
        let provider = Arc::clone(&self.provider);
        let batches: Vec<&[Symbol]> = self.universe.chunks(batch_size).collect();
        let results = join_all(batches.iter().map(|batch| {
            let provider = Arc::clone(&provider);
            async move {
                tokio::time::timeout(timeout, provider.fetch_batch(batch))
                    .await
                    .unwrap_or_else(|_| {
                        Err(ProviderError::Timeout {
                            operation: "fetch_batch",
                            after_ms: duration_ms(timeout),
                        })
                    })
            }
        }))
        .await;

        let mut fresh: HashMap<Symbol, QuoteSample> = HashMap::new();
        for (batch, result) in batches.iter().zip(results) {
            match result {
                Ok(quotes) => {
                    for PolledQuote { symbol, sample } in quotes {
                        fresh.insert(symbol, sample);
                    }
                }
                Err(error) => {
                    warn!(
                        provider = provider.name(),
                        error = %error,
                        symbols = batch.len(),
                        "Poll batch failed, reusing last scores"
                    );
                    warnings.push(StaleDataWarning {
                        symbols: batch.to_vec(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        let fetched = fresh.len();
        let mut candidates = Vec::with_capacity(self.universe.len());
        for symbol in &self.universe {
            let candidate = match fresh.remove(symbol) {
                Some(sample) => {
                    let value = self
                        .settings
                        .score_mode
                        .apply(self.previous.get(symbol), &sample);
                    self.previous.insert(symbol.clone(), sample.clone());
                    if value != COLD_START {
                        self.last_scores
                            .insert(symbol.clone(), LastScore { value, at: now });
                    }
                    Candidate::new(symbol.clone(), value).with_sample(sample)
                }
                None => self.stale_candidate(symbol, now),
            };
            candidates.push(candidate);
        }

        self.apply_debounce(&mut candidates, now);
        debug!(
            universe = self.universe.len(),
            fetched,
            warnings = warnings.len(),
            "Scan complete"
        );

        ScanReport {
            snapshot: CandidateSnapshot::new(now, candidates),
            warnings,
            fetched,
        }
    }

    fn stale_candidate(&self, symbol: &Symbol, now: DateTime<Utc>) -> Candidate {
        let value = self.last_scores.get(symbol).map_or(COLD_START, |last| {
            let age = (now - last.at).to_std().unwrap_or_default();
            age_penalized(last.value, age, self.settings.stale_half_life)
        });
        Candidate::new(symbol.clone(), value).stale()
    }

    /// Flag symbols that entered the qualifying band too recently.
    fn apply_debounce(&mut self, candidates: &mut [Candidate], now: DateTime<Utc>) {
        candidates.sort_by(|a, b| rank_order(a.score, &a.symbol, b.score, &b.symbol));
        let window = chrono::Duration::from_std(self.settings.debounce_window)
            .unwrap_or_else(|_| chrono::Duration::zero());

        for (rank, candidate) in candidates.iter_mut().enumerate() {
            let in_band = rank < self.settings.max_live_slots
                && candidate.score >= self.settings.qualify_threshold;
            if !in_band {
                self.band_entered.remove(&candidate.symbol);
                continue;
            }
            let entered = *self
                .band_entered
                .entry(candidate.symbol.clone())
                .or_insert(now);
            candidate.unstable = now - entered < window;
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
