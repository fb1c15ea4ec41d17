use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

use crate::alert_scorer::{MessageBand, MessageTable, ScoreRule, ScoreTable};
use crate::error::ConfigError;
use crate::metrics::EmaPeriods;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub session: SessionConfig,
    pub polling: PollingConfig,
    pub daily: DailyConfig,
    pub alerts: AlertsConfig,
    pub push: PushConfig,
    pub database: DatabaseConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub exchange: String,
    pub token: String,
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://finnhub.io/api/v1".to_string(),
            exchange: "US".to_string(),
            token: String::new(),
            request_timeout_secs: 10,
        }
    }
}

/// Daily scheduler, status polling and exchange-local calendar settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Offset of the exchange-local context from UTC
    pub utc_offset_secs: i32,
    pub poll_interval_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub scheduler_hour: u32,
    pub scheduler_minute: u32,
    pub stop_hour: u32,
    pub stop_minute: u32,
    /// Activity before this local hour belongs to the previous trade date
    pub trade_date_cutoff_hour: u32,
    /// Daily window opens at this hour on the previous day
    pub daily_window_start_hour: u32,
    pub daily_window_end_hour: u32,
    pub daily_window_end_minute: u32,
    pub open_message: String,
    pub close_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: 7 * 3600,
            poll_interval_secs: 60,
            retry_attempts: 3,
            retry_backoff_ms: 2000,
            scheduler_hour: 0,
            scheduler_minute: 16,
            stop_hour: 4,
            stop_minute: 30,
            trade_date_cutoff_hour: 4,
            daily_window_start_hour: 20,
            daily_window_end_hour: 4,
            daily_window_end_minute: 30,
            open_message: "The market is open. Prices are being updated.".to_string(),
            close_message: "The market is closed.".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub ema_short_period: u32,
    pub ema_long_period: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            ema_short_period: 20,
            ema_long_period: 100,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn periods(&self) -> EmaPeriods {
        EmaPeriods {
            short: self.ema_short_period,
            long: self.ema_long_period,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DailyConfig {
    pub ema_short_period: u32,
    pub ema_long_period: u32,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            ema_short_period: 20,
            ema_long_period: 100,
        }
    }
}

impl DailyConfig {
    pub fn periods(&self) -> EmaPeriods {
        EmaPeriods {
            short: self.ema_short_period,
            long: self.ema_long_period,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Number of most recent samples scored per symbol
    pub window_size: usize,
    /// Minimum |score| that creates an alert event
    pub alert_threshold: i32,
    /// `0.0` keeps the exact price == long EMA comparison
    pub crossover_tolerance: f64,
    pub score_table: Vec<ScoreRule>,
    pub messages: Vec<MessageBand>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            alert_threshold: 3,
            crossover_tolerance: 0.0,
            score_table: ScoreTable::default().rules,
            messages: MessageTable::default().bands,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PushConfig {
    pub subject: String,
    pub vapid_public_key: String,
    pub vapid_private_key: String,
    /// Only alert scores of exactly +/- this value are pushed
    pub trigger_score: i32,
    pub delivery_timeout_secs: u64,
    pub max_concurrent_deliveries: usize,
    pub ttl_secs: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            subject: "admin@example.com".to_string(),
            vapid_public_key: String::new(),
            vapid_private_key: String::new(),
            trigger_score: 4,
            delivery_timeout_secs: 10,
            max_concurrent_deliveries: 8,
            ttl_secs: 30,
        }
    }
}

impl PushConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub wal_mode: bool,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/pipeline.db".to_string(),
            wal_mode: true,
            pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    pub fn load_or_default() -> Result<Self> {
        // Try config.toml first, then config.example.toml
        Self::load("config.toml")
            .or_else(|_| Self::load("config.example.toml"))
            .context("Failed to load configuration")
    }

    /// Secrets are usually kept out of the TOML file
    pub fn apply_env_overrides(&mut self) {
        let lookup = |key: &str| {
            env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(token) = lookup("FINNHUB_TOKEN") {
            self.source.token = token;
        }
        if let Some(key) = lookup("PUSH_VAPID_PUBLIC_KEY") {
            self.push.vapid_public_key = key;
        }
        if let Some(key) = lookup("PUSH_VAPID_PRIVATE_KEY") {
            self.push.vapid_private_key = key;
        }
        if let Some(subject) = lookup("PUSH_SUBJECT") {
            self.push.subject = subject;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.token.trim().is_empty() {
            return Err(ConfigError::Missing("source.token"));
        }
        if self.push.vapid_public_key.trim().is_empty() {
            return Err(ConfigError::Missing("push.vapid_public_key"));
        }
        if self.push.vapid_private_key.trim().is_empty() {
            return Err(ConfigError::Missing("push.vapid_private_key"));
        }

        for (name, period) in [
            ("polling.ema_short_period", self.polling.ema_short_period),
            ("polling.ema_long_period", self.polling.ema_long_period),
            ("daily.ema_short_period", self.daily.ema_short_period),
            ("daily.ema_long_period", self.daily.ema_long_period),
        ] {
            // period 2 gives alpha = 2 and extrapolates past the new value
            if period == 0 || period == 2 {
                return Err(ConfigError::Invalid(format!("{name} must be 1 or >= 3, got {period}")));
            }
        }

        if self.alerts.window_size == 0 {
            return Err(ConfigError::Invalid("alerts.window_size must be >= 1".to_string()));
        }
        if self.alerts.crossover_tolerance < 0.0 {
            return Err(ConfigError::Invalid("alerts.crossover_tolerance must be >= 0".to_string()));
        }

        for (name, value) in [
            ("session.poll_interval_secs", self.session.poll_interval_secs),
            ("polling.interval_secs", self.polling.interval_secs),
            ("source.request_timeout_secs", self.source.request_timeout_secs),
            ("push.delivery_timeout_secs", self.push.delivery_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        if self.session.retry_attempts == 0 {
            return Err(ConfigError::Invalid("session.retry_attempts must be >= 1".to_string()));
        }
        if self.push.max_concurrent_deliveries == 0 {
            return Err(ConfigError::Invalid(
                "push.max_concurrent_deliveries must be >= 1".to_string(),
            ));
        }

        let s = &self.session;
        for (name, hour) in [
            ("session.scheduler_hour", s.scheduler_hour),
            ("session.stop_hour", s.stop_hour),
            ("session.trade_date_cutoff_hour", s.trade_date_cutoff_hour),
            ("session.daily_window_start_hour", s.daily_window_start_hour),
            ("session.daily_window_end_hour", s.daily_window_end_hour),
        ] {
            if hour >= 24 {
                return Err(ConfigError::Invalid(format!("{name} must be < 24")));
            }
        }
        for (name, minute) in [
            ("session.scheduler_minute", s.scheduler_minute),
            ("session.stop_minute", s.stop_minute),
            ("session.daily_window_end_minute", s.daily_window_end_minute),
        ] {
            if minute >= 60 {
                return Err(ConfigError::Invalid(format!("{name} must be < 60")));
            }
        }
        if FixedOffset::east_opt(s.utc_offset_secs).is_none() {
            return Err(ConfigError::Invalid(format!(
                "session.utc_offset_secs out of range: {}",
                s.utc_offset_secs
            )));
        }

        Ok(())
    }
}
