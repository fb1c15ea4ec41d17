//! Quote polling engine
//!
//! Owns at most one background loop. The loop ticks at the configured
//! interval and runs the same fetch-all pass as `run_once`.

use async_trait::async_trait;
use chrono::{DurationRound, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert_scorer::AlertScorer;
use crate::config::PollingConfig;
use crate::db::{QuoteRepository, SymbolRepository};
use crate::error::StoreError;
use crate::metrics::{derive_sample, EmaPeriods};
use crate::notify::ConnectionRegistry;
use crate::session::SamplerControl;
use crate::source::QuoteSource;
use crate::types::QuoteSample;

/// Outcome of one fetch-all pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub symbols: usize,
    pub stored: usize,
    pub skipped: usize,
}

#[derive(Serialize)]
struct LiveQuote<'a> {
    quote: &'a QuoteSample,
}

struct ActiveLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Sampler {
    symbols: Arc<dyn SymbolRepository>,
    quotes: Arc<dyn QuoteRepository>,
    source: Arc<dyn QuoteSource>,
    scorer: Option<Arc<AlertScorer>>,
    live_quotes: Option<Arc<ConnectionRegistry>>,
    periods: EmaPeriods,
}

impl Sampler {
    async fn fetch_all(&self, token: &CancellationToken) -> TickReport {
        let mut report = TickReport::default();

        let symbols = match self.symbols.list_symbols() {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("Failed to list tracked symbols: {}", e);
                return report;
            }
        };

        for symbol in symbols {
            if token.is_cancelled() {
                debug!("Fetch-all cancelled after {} symbols", report.symbols);
                break;
            }
            let symbol = symbol.trim();
            if symbol.is_empty() {
                continue;
            }
            report.symbols += 1;

            match self.sample_symbol(symbol).await {
                Some(sample) => {
                    report.stored += 1;
                    if let Some(live) = &self.live_quotes {
                        live.broadcast(&LiveQuote { quote: &sample });
                    }
                    if let Some(scorer) = &self.scorer {
                        if let Err(e) = scorer.score_for_symbol(symbol, Utc::now()).await {
                            warn!("Alert scoring failed for {}: {}", symbol, e);
                        }
                    }
                }
                None => report.skipped += 1,
            }
        }

        debug!(
            "📈 Tick: {} symbols, {} stored, {} skipped",
            report.symbols, report.stored, report.skipped
        );
        report
    }

    /// Fetches, folds and stores one symbol. `None` means the symbol was skipped this tick.
    async fn sample_symbol(&self, symbol: &str) -> Option<QuoteSample> {
        let quote = match self.source.fetch_quote(symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                debug!("Skipping {}: {}", symbol, e);
                return None;
            }
        };

        let previous = match self.quotes.latest_sample(symbol) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Skipping {}: failed to load previous sample: {}", symbol, e);
                return None;
            }
        };

        let now = Utc::now();
        let sampled_at = now.duration_trunc(chrono::Duration::minutes(1)).unwrap_or(now);
        let sample = derive_sample(symbol, &quote, previous.as_ref(), self.periods, sampled_at);

        if let Err(e) = self.quotes.insert_sample(&sample) {
            warn!("Skipping {}: failed to store sample: {}", symbol, e);
            return None;
        }
        Some(sample)
    }
}

pub struct QuotePoller {
    sampler: Arc<Sampler>,
    interval: Duration,
    active: Mutex<Option<ActiveLoop>>,
}

impl QuotePoller {
    pub fn new(
        symbols: Arc<dyn SymbolRepository>,
        quotes: Arc<dyn QuoteRepository>,
        source: Arc<dyn QuoteSource>,
        scorer: Option<Arc<AlertScorer>>,
        live_quotes: Option<Arc<ConnectionRegistry>>,
        config: &PollingConfig,
    ) -> Self {
        Self {
            sampler: Arc::new(Sampler {
                symbols,
                quotes,
                source,
                scorer,
                live_quotes,
                periods: config.periods(),
            }),
            interval: config.interval(),
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveLoop>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns the polling loop unless one is already running. Returns whether a loop was spawned.
    pub fn start(&self, parent: &CancellationToken) -> bool {
        let mut active = self.active();
        if let Some(current) = active.as_ref() {
            if !current.handle.is_finished() {
                debug!("Quote poller already running");
                return false;
            }
        }

        let token = parent.child_token();
        let loop_token = token.clone();
        let sampler = Arc::clone(&self.sampler);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        sampler.fetch_all(&loop_token).await;
                    }
                }
            }
            debug!("Quote poller loop exited");
        });

        *active = Some(ActiveLoop { token, handle });
        info!("▶️  Quote poller started (interval {:?})", period);
        true
    }

    /// Cancels the loop and waits for it to exit. Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let taken = self.active().take();
        let Some(current) = taken else {
            return false;
        };

        current.token.cancel();
        if let Err(e) = current.handle.await {
            warn!("Quote poller loop ended abnormally: {}", e);
        }
        info!("⏹️  Quote poller stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.active()
            .as_ref()
            .map_or(false, |current| !current.handle.is_finished())
    }

    pub async fn run_once(&self, token: &CancellationToken) -> TickReport {
        self.sampler.fetch_all(token).await
    }

    /// Stored samples, newest first. A blank filter lists every symbol.
    pub fn list(&self, symbol_filter: Option<&str>) -> Result<Vec<QuoteSample>, StoreError> {
        let filter = symbol_filter.map(str::trim).filter(|s| !s.is_empty());
        self.sampler.quotes.list_samples(filter)
    }
}

#[async_trait]
impl SamplerControl for QuotePoller {
    fn start(&self, parent: &CancellationToken) -> bool {
        QuotePoller::start(self, parent)
    }

    async fn stop(&self) -> bool {
        QuotePoller::stop(self).await
    }

    async fn run_once(&self, token: &CancellationToken) -> TickReport {
        QuotePoller::run_once(self, token).await
    }

    fn is_running(&self) -> bool {
        QuotePoller::is_running(self)
    }
}
