//! Incremental EMA and trend signals
//!
//! Every value here is a pure function of the new raw input and the previous
//! same-symbol state. Nothing is cached between calls: the caller fetches the
//! previous sample once per computation and folds the new quote into it.

use chrono::{DateTime, Utc};

use crate::types::{Quote, QuoteSample};

/// EMA period pair used for one lineage (intraday or daily)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmaPeriods {
    pub short: u32,
    pub long: u32,
}

impl Default for EmaPeriods {
    fn default() -> Self {
        Self { short: 20, long: 100 }
    }
}

/// `alpha = 2 / (period - 1)`; seeds from `current` when there is no history
pub fn ema(current: f64, period: u32, previous: Option<f64>) -> f64 {
    let Some(prev) = previous else {
        return current;
    };
    if period <= 1 {
        return current;
    }
    let alpha = 2.0 / f64::from(period - 1);
    alpha * current + (1.0 - alpha) * prev
}

pub fn trend_direction(short: f64, long: f64) -> i8 {
    if short > long {
        1
    } else if short < long {
        -1
    } else {
        0
    }
}

pub fn smoothed_signal(short: f64, long: f64) -> f64 {
    (short - long).tanh() / 5.0
}

pub fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Fold one quote into the symbol's previous sample
pub fn derive_sample(
    symbol: &str,
    quote: &Quote,
    previous: Option<&QuoteSample>,
    periods: EmaPeriods,
    sampled_at: DateTime<Utc>,
) -> QuoteSample {
    let ema_short = ema(quote.price, periods.short, previous.map(|p| p.ema_short));
    let ema_long = ema(quote.price, periods.long, previous.map(|p| p.ema_long));
    let signal = smoothed_signal(ema_short, ema_long);

    let (ema_delta_short, ema_delta_signal) = match previous {
        Some(prev) => (ema_short - prev.ema_short, signal - prev.smoothed_signal),
        None => (0.0, 0.0),
    };

    QuoteSample {
        symbol: symbol.to_string(),
        price: quote.price,
        change_abs: quote.change_abs,
        change_pct: quote.change_pct,
        ema_short,
        ema_long,
        smoothed_signal: signal,
        ema_delta_short,
        ema_delta_signal,
        trend_direction: trend_direction(ema_short, ema_long),
        sampled_at,
    }
}
