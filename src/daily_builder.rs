use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DailyConfig;
use crate::db::{DailyMetricRepository, QuoteRepository, SymbolRepository};
use crate::error::{PipelineError, Result, StoreError};
use crate::metrics::{ema, trend_direction, EmaPeriods};
use crate::session::DailyBuild;
use crate::types::{DailyMetric, QuoteSample};

/// Price statistics of one symbol's window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySummary {
    pub average: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    /// Last sampled price of the window
    pub prev_close: f64,
    pub range: f64,
    pub change_abs: f64,
    pub change_pct: f64,
}

/// Samples must be oldest first
pub fn summarize(samples: &[QuoteSample]) -> Option<DailySummary> {
    let first = samples.first()?;
    let last = samples.last()?;

    let (sum, high, low) = samples.iter().fold(
        (0.0, first.price, first.price),
        |(sum, high, low), s| (sum + s.price, high.max(s.price), low.min(s.price)),
    );

    Some(DailySummary {
        average: sum / samples.len() as f64,
        high,
        low,
        open: first.price,
        prev_close: last.price,
        range: high - low,
        change_abs: last.change_abs,
        change_pct: last.change_pct,
    })
}

/// Labels a window with the session that ended before it: the day before `end`, local
pub fn trade_date_from_end(end: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    (end.with_timezone(&offset) - Duration::days(1)).date_naive()
}

pub struct DailyMetricsBuilder {
    symbols: Arc<dyn SymbolRepository>,
    quotes: Arc<dyn QuoteRepository>,
    metrics: Arc<dyn DailyMetricRepository>,
    periods: EmaPeriods,
    utc_offset: FixedOffset,
}

impl DailyMetricsBuilder {
    pub fn new(
        symbols: Arc<dyn SymbolRepository>,
        quotes: Arc<dyn QuoteRepository>,
        metrics: Arc<dyn DailyMetricRepository>,
        config: &DailyConfig,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            symbols,
            quotes,
            metrics,
            periods: config.periods(),
            utc_offset,
        }
    }

    /// Builds one metric per symbol with samples in `[start, end]`. A write
    /// failure aborts the remaining symbols.
    pub async fn build_for_window(
        &self,
        token: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize> {
        let symbols = self.symbols.list_symbols()?;
        let trade_date = trade_date_from_end(end, self.utc_offset);
        info!(
            "📅 Building daily metrics for {} ({} symbols, {} → {})",
            trade_date,
            symbols.len(),
            start,
            end
        );

        let mut written = 0;
        for symbol in symbols {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let samples = match self.quotes.samples_between(&symbol, start, end) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Skipping daily metric for {}: {}", symbol, e);
                    continue;
                }
            };
            let Some(summary) = summarize(&samples) else {
                debug!("No samples for {} in window", symbol);
                continue;
            };

            let previous = self.metrics.latest_metric_before(&symbol, trade_date)?;
            let ema_short = ema(
                summary.prev_close,
                self.periods.short,
                previous.as_ref().map(|m| m.ema_short),
            );
            let ema_long = ema(
                summary.prev_close,
                self.periods.long,
                previous.as_ref().map(|m| m.ema_long),
            );

            let metric = DailyMetric {
                symbol: symbol.clone(),
                price_average: summary.average,
                price_high: summary.high,
                price_low: summary.low,
                price_open: summary.open,
                price_prev_close: summary.prev_close,
                change_abs: summary.change_abs,
                change_pct: summary.change_pct,
                price_range: summary.range,
                ema_short,
                ema_long,
                trend_direction: trend_direction(ema_short, ema_long),
                trade_date,
            };
            self.metrics.insert_metric(&metric)?;
            written += 1;
        }

        info!("✅ Daily metrics for {}: {} written", trade_date, written);
        Ok(written)
    }

    /// Stored metrics for a symbol, newest trade date first
    pub fn list_for_symbol(
        &self,
        symbol: &str,
    ) -> std::result::Result<Vec<DailyMetric>, StoreError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(StoreError::Invalid("symbol is empty".to_string()));
        }
        self.metrics.list_metrics(symbol)
    }
}

#[async_trait]
impl DailyBuild for DailyMetricsBuilder {
    async fn build_for_window(
        &self,
        token: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize> {
        DailyMetricsBuilder::build_for_window(self, token, start, end).await
    }
}
