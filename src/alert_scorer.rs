//! Alert scoring over a symbol's recent sample window
//!
//! The score combines how consistently the short EMA has been moving
//! (`trend_sum`, the sum of delta signs across the window) with the direction
//! of the latest smoothed-signal move. Both the lookup table and the message
//! bands are configuration.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AlertsConfig;
use crate::db::{AlertEventRepository, QuoteRepository};
use crate::error::Result;
use crate::metrics::sign;
use crate::notify::Notifier;
use crate::session::clock;
use crate::types::{AlertEvent, QuoteSample};

pub const MAX_SCORE: i32 = 4;

/// One row of the score table. Open bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_trend: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_trend: Option<i32>,
    pub latest_signs: Vec<i8>,
    pub score: i32,
}

impl ScoreRule {
    fn new(
        min_trend: Option<i32>,
        max_trend: Option<i32>,
        latest_signs: &[i8],
        score: i32,
    ) -> Self {
        Self {
            min_trend,
            max_trend,
            latest_signs: latest_signs.to_vec(),
            score,
        }
    }

    fn matches(&self, trend: i32, latest: i8) -> bool {
        self.min_trend.map_or(true, |min| trend >= min)
            && self.max_trend.map_or(true, |max| trend <= max)
            && self.latest_signs.contains(&latest)
    }
}

/// Ordered rules; the first match wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreTable {
    pub rules: Vec<ScoreRule>,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            rules: vec![
                ScoreRule::new(None, Some(-2), &[-1], -4),
                ScoreRule::new(None, Some(-2), &[0, 1], -3),
                ScoreRule::new(Some(2), None, &[1], 4),
                ScoreRule::new(Some(2), None, &[0, -1], 3),
                ScoreRule::new(Some(-1), Some(-1), &[-1], -2),
                ScoreRule::new(Some(-1), Some(-1), &[0, 1], -1),
                ScoreRule::new(Some(1), Some(1), &[1], 2),
                ScoreRule::new(Some(1), Some(1), &[0, -1], 1),
            ],
        }
    }
}

impl ScoreTable {
    pub fn lookup(&self, trend: i32, latest: i8) -> Option<i32> {
        self.rules
            .iter()
            .find(|rule| rule.matches(trend, latest))
            .map(|rule| rule.score.clamp(-MAX_SCORE, MAX_SCORE))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBand {
    pub min_score: i32,
    pub max_score: i32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTable {
    pub bands: Vec<MessageBand>,
}

impl Default for MessageTable {
    fn default() -> Self {
        let band = |min_score, max_score, text: &str| MessageBand {
            min_score,
            max_score,
            text: text.to_string(),
        };
        Self {
            bands: vec![
                band(3, MAX_SCORE, "Strong buy signal"),
                band(1, 2, "Buy signal, watch closely"),
                band(-MAX_SCORE, -3, "Strong sell signal"),
                band(-2, -1, "Sell signal, watch closely"),
            ],
        }
    }
}

impl MessageTable {
    pub fn message_for(&self, score: i32) -> String {
        self.bands
            .iter()
            .find(|b| score >= b.min_score && score <= b.max_score)
            .map(|b| b.text.clone())
            .unwrap_or_else(|| format!("Score: {score}"))
    }
}

pub struct AlertScorer {
    quotes: Arc<dyn QuoteRepository>,
    events: Arc<dyn AlertEventRepository>,
    notifier: Option<Arc<dyn Notifier>>,
    window_size: usize,
    alert_threshold: i32,
    crossover_tolerance: f64,
    table: ScoreTable,
    messages: MessageTable,
    utc_offset: FixedOffset,
    cutoff_hour: u32,
}

impl AlertScorer {
    pub fn new(
        quotes: Arc<dyn QuoteRepository>,
        events: Arc<dyn AlertEventRepository>,
        notifier: Option<Arc<dyn Notifier>>,
        config: &AlertsConfig,
        utc_offset: FixedOffset,
        cutoff_hour: u32,
    ) -> Self {
        Self {
            quotes,
            events,
            notifier,
            window_size: config.window_size.max(1),
            alert_threshold: config.alert_threshold,
            crossover_tolerance: config.crossover_tolerance,
            table: ScoreTable {
                rules: config.score_table.clone(),
            },
            messages: MessageTable {
                bands: config.messages.clone(),
            },
            utc_offset,
            cutoff_hour,
        }
    }

    /// Scores a newest-first window. `None` when the window is short or no rule matches.
    pub fn evaluate(
        &self,
        symbol: &str,
        window: &[QuoteSample],
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        if window.len() < self.window_size {
            return None;
        }
        let window = &window[..self.window_size];
        let latest = &window[0];

        let trend_sum: i32 = window.iter().map(|s| i32::from(sign(s.ema_delta_short))).sum();
        let latest_sign = sign(latest.ema_delta_signal);
        let score = self.table.lookup(trend_sum, latest_sign)?;

        Some(AlertEvent {
            symbol: symbol.to_string(),
            trend_sum,
            latest_sign_trend: latest_sign,
            ema_score: score,
            crossover_flag: (latest.price - latest.ema_long).abs() <= self.crossover_tolerance,
            created_at: now,
        })
    }

    /// Creates and announces an alert when today's window scores past the threshold
    pub async fn score_for_symbol(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertEvent>> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Ok(None);
        }

        let trade_date = clock::trade_date_for(now, self.utc_offset, self.cutoff_hour);
        let (start, end) = clock::trade_date_bounds(trade_date, self.utc_offset, self.cutoff_hour);
        let window = self
            .quotes
            .latest_samples_between(symbol, start, end, self.window_size)?;

        let Some(event) = self.evaluate(symbol, &window, now) else {
            debug!("{}: no score ({} samples in window)", symbol, window.len());
            return Ok(None);
        };

        info!(
            "🎯 {} score={} trend_sum={} latest_sign={} crossover={}",
            symbol, event.ema_score, event.trend_sum, event.latest_sign_trend, event.crossover_flag
        );

        if event.ema_score.abs() < self.alert_threshold {
            return Ok(None);
        }

        self.events.insert_event(&event)?;

        if let Some(notifier) = &self.notifier {
            let message = self.messages.message_for(event.ema_score);
            notifier.notify(&event, &message).await;
        }

        Ok(Some(event))
    }
}
