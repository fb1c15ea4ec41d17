use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time quote as returned by the quote source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub change_abs: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub prev_close: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionLabel {
    PreMarket,
    Regular,
    PostMarket,
    Other(String),
}

impl SessionLabel {
    pub fn parse(raw: Option<&str>) -> Self {
        let label = raw.map(|s| s.trim().to_lowercase()).unwrap_or_default();
        match label.as_str() {
            "pre-market" => SessionLabel::PreMarket,
            "regular" => SessionLabel::Regular,
            "post-market" => SessionLabel::PostMarket,
            _ => SessionLabel::Other(label),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SessionLabel::PreMarket => "pre-market",
            SessionLabel::Regular => "regular",
            SessionLabel::PostMarket => "post-market",
            SessionLabel::Other(label) => label,
        }
    }
}

/// Classified exchange status polled by the session orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub exchange: String,
    pub is_open: bool,
    pub label: SessionLabel,
    /// `None` when the feed did not report a usable timestamp
    pub timestamp: Option<DateTime<Utc>>,
    pub timezone: String,
    pub holiday: Option<String>,
}

/// One row per trade date, opened on the first regular-session poll and closed once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWindowRecord {
    pub trade_date: NaiveDate,
    pub is_trading_day: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Intraday sample. EMA fields derive from the previous sample of the same symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSample {
    pub symbol: String,
    pub price: f64,
    pub change_abs: f64,
    pub change_pct: f64,
    /// Short-period EMA (20 by default)
    pub ema_short: f64,
    /// Long-period EMA (100 by default)
    pub ema_long: f64,
    pub smoothed_signal: f64,
    pub ema_delta_short: f64,
    pub ema_delta_signal: f64,
    pub trend_direction: i8,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub symbol: String,
    pub price_average: f64,
    pub price_high: f64,
    pub price_low: f64,
    pub price_open: f64,
    /// Last sampled price of the window
    pub price_prev_close: f64,
    pub change_abs: f64,
    pub change_pct: f64,
    pub price_range: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub trend_direction: i8,
    pub trade_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub symbol: String,
    pub trend_sum: i32,
    pub latest_sign_trend: i8,
    pub ema_score: i32,
    pub crossover_flag: bool,
    pub created_at: DateTime<Utc>,
}

/// Push delivery endpoint. Owned by the subscription store, read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryChannel {
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub is_active: bool,
}
