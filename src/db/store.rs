use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

use super::initialize_schema;
use super::repository::{
    AlertEventRepository, ChannelRepository, DailyMetricRepository, QuoteRepository,
    SessionWindowRepository, SymbolRepository,
};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::types::{AlertEvent, DailyMetric, DeliveryChannel, QuoteSample, SessionWindowRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SAMPLE_COLUMNS: &str = "symbol, price, change_abs, change_pct, ema_short, ema_long, \
    smoothed_signal, ema_delta_short, ema_delta_signal, trend_direction, sampled_at";

const METRIC_COLUMNS: &str = "symbol, price_average, price_high, price_low, price_open, \
    price_prev_close, change_abs, change_pct, price_range, ema_short, ema_long, trend_direction, trade_date";

/// SQLite-backed implementation of every repository contract
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let path = Path::new(&config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| {
                    StoreError::Invalid(format!("failed to create database directory: {e}"))
                })?;
        }

        let wal_mode = config.wal_mode;
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            }
            conn.execute_batch("PRAGMA busy_timeout=5000;")
        });

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .build(manager)?;

        let store = Self { pool };
        initialize_schema(&*store.conn()?)?;

        info!("✅ Database initialized at {}", config.path);
        Ok(store)
    }

    /// Single-connection in-memory store. Every pooled connection to `:memory:`
    /// is a separate database, so the pool never grows past one.
    pub fn in_memory() -> Result<Self, StoreError> {
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(SqliteConnectionManager::memory())?;

        let store = Self { pool };
        initialize_schema(&*store.conn()?)?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }
}

fn to_utc(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<QuoteSample> {
    Ok(QuoteSample {
        symbol: row.get(0)?,
        price: row.get(1)?,
        change_abs: row.get(2)?,
        change_pct: row.get(3)?,
        ema_short: row.get(4)?,
        ema_long: row.get(5)?,
        smoothed_signal: row.get(6)?,
        ema_delta_short: row.get(7)?,
        ema_delta_signal: row.get(8)?,
        trend_direction: row.get(9)?,
        sampled_at: to_utc(row.get(10)?),
    })
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<DailyMetric> {
    Ok(DailyMetric {
        symbol: row.get(0)?,
        price_average: row.get(1)?,
        price_high: row.get(2)?,
        price_low: row.get(3)?,
        price_open: row.get(4)?,
        price_prev_close: row.get(5)?,
        change_abs: row.get(6)?,
        change_pct: row.get(7)?,
        price_range: row.get(8)?,
        ema_short: row.get(9)?,
        ema_long: row.get(10)?,
        trend_direction: row.get(11)?,
        trade_date: date_column(row, 12)?,
    })
}

impl SymbolRepository for SqliteStore {
    fn list_symbols(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT symbol FROM symbols WHERE active = 1 ORDER BY symbol ASC")?;
        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(symbols)
    }

    fn add_symbol(&self, symbol: &str) -> Result<(), StoreError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(StoreError::Invalid("symbol is required".to_string()));
        }
        self.conn()?.execute(
            "INSERT INTO symbols (symbol, active) VALUES (?1, 1)
             ON CONFLICT(symbol) DO UPDATE SET active = 1",
            params![symbol.to_uppercase()],
        )?;
        Ok(())
    }
}

impl QuoteRepository for SqliteStore {
    fn insert_sample(&self, sample: &QuoteSample) -> Result<(), StoreError> {
        self.conn()?.execute(
            &format!("INSERT INTO quote_samples ({SAMPLE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                sample.symbol,
                sample.price,
                sample.change_abs,
                sample.change_pct,
                sample.ema_short,
                sample.ema_long,
                sample.smoothed_signal,
                sample.ema_delta_short,
                sample.ema_delta_signal,
                sample.trend_direction,
                sample.sampled_at.timestamp(),
            ],
        )?;
        debug!("Stored sample for {} at {}", sample.symbol, sample.sampled_at);
        Ok(())
    }

    fn latest_sample(&self, symbol: &str) -> Result<Option<QuoteSample>, StoreError> {
        let sample = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {SAMPLE_COLUMNS} FROM quote_samples
                     WHERE symbol = ?1 ORDER BY sampled_at DESC, id DESC LIMIT 1"
                ),
                params![symbol],
                sample_from_row,
            )
            .optional()?;
        Ok(sample)
    }

    fn latest_samples_between(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QuoteSample>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM quote_samples
             WHERE symbol = ?1 AND sampled_at >= ?2 AND sampled_at <= ?3
             ORDER BY sampled_at DESC, id DESC LIMIT ?4"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let samples = stmt
            .query_map(params![symbol, start.timestamp(), end.timestamp(), limit], sample_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    fn samples_between(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<QuoteSample>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM quote_samples
             WHERE symbol = ?1 AND sampled_at >= ?2 AND sampled_at <= ?3
             ORDER BY sampled_at ASC, id ASC"
        ))?;
        let samples = stmt
            .query_map(params![symbol, start.timestamp(), end.timestamp()], sample_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    fn list_samples(&self, symbol: Option<&str>) -> Result<Vec<QuoteSample>, StoreError> {
        let conn = self.conn()?;
        let samples = match symbol {
            Some(symbol) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SAMPLE_COLUMNS} FROM quote_samples
                     WHERE symbol = ?1 ORDER BY sampled_at DESC, id DESC"
                ))?;
                let rows = stmt.query_map(params![symbol], sample_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SAMPLE_COLUMNS} FROM quote_samples ORDER BY sampled_at DESC, id DESC"
                ))?;
                let rows = stmt.query_map([], sample_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(samples)
    }
}

impl DailyMetricRepository for SqliteStore {
    fn insert_metric(&self, metric: &DailyMetric) -> Result<(), StoreError> {
        self.conn()?.execute(
            &format!(
                "INSERT INTO daily_metrics ({METRIC_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(symbol, trade_date) DO UPDATE SET
                    price_average = excluded.price_average,
                    price_high = excluded.price_high,
                    price_low = excluded.price_low,
                    price_open = excluded.price_open,
                    price_prev_close = excluded.price_prev_close,
                    change_abs = excluded.change_abs,
                    change_pct = excluded.change_pct,
                    price_range = excluded.price_range,
                    ema_short = excluded.ema_short,
                    ema_long = excluded.ema_long,
                    trend_direction = excluded.trend_direction"
            ),
            params![
                metric.symbol,
                metric.price_average,
                metric.price_high,
                metric.price_low,
                metric.price_open,
                metric.price_prev_close,
                metric.change_abs,
                metric.change_pct,
                metric.price_range,
                metric.ema_short,
                metric.ema_long,
                metric.trend_direction,
                metric.trade_date.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    fn latest_metric_before(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
    ) -> Result<Option<DailyMetric>, StoreError> {
        let metric = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {METRIC_COLUMNS} FROM daily_metrics
                     WHERE symbol = ?1 AND trade_date < ?2
                     ORDER BY trade_date DESC LIMIT 1"
                ),
                params![symbol, trade_date.format(DATE_FORMAT).to_string()],
                metric_from_row,
            )
            .optional()?;
        Ok(metric)
    }

    fn list_metrics(&self, symbol: &str) -> Result<Vec<DailyMetric>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {METRIC_COLUMNS} FROM daily_metrics WHERE symbol = ?1 ORDER BY trade_date DESC"
        ))?;
        let metrics = stmt
            .query_map(params![symbol], metric_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(metrics)
    }
}

impl AlertEventRepository for SqliteStore {
    fn insert_event(&self, event: &AlertEvent) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO alert_events
                (symbol, trend_sum, latest_sign_trend, ema_score, crossover_flag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.symbol,
                event.trend_sum,
                event.latest_sign_trend,
                event.ema_score,
                event.crossover_flag,
                event.created_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn list_events(&self, symbol: Option<&str>) -> Result<Vec<AlertEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, trend_sum, latest_sign_trend, ema_score, crossover_flag, created_at
             FROM alert_events
             WHERE ?1 IS NULL OR symbol = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let events = stmt
            .query_map(params![symbol], |row| {
                Ok(AlertEvent {
                    symbol: row.get(0)?,
                    trend_sum: row.get(1)?,
                    latest_sign_trend: row.get(2)?,
                    ema_score: row.get(3)?,
                    crossover_flag: row.get(4)?,
                    created_at: to_utc(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

impl SessionWindowRepository for SqliteStore {
    fn find_by_trade_date(
        &self,
        trade_date: NaiveDate,
    ) -> Result<Option<SessionWindowRecord>, StoreError> {
        let record = self
            .conn()?
            .query_row(
                "SELECT trade_date, is_trading_day, opened_at, closed_at
                 FROM session_windows WHERE trade_date = ?1",
                params![trade_date.format(DATE_FORMAT).to_string()],
                |row| {
                    Ok(SessionWindowRecord {
                        trade_date: date_column(row, 0)?,
                        is_trading_day: row.get(1)?,
                        opened_at: row.get::<_, Option<i64>>(2)?.map(to_utc),
                        closed_at: row.get::<_, Option<i64>>(3)?.map(to_utc),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn create_if_absent(&self, record: &SessionWindowRecord) -> Result<bool, StoreError> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO session_windows (trade_date, is_trading_day, opened_at, closed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.trade_date.format(DATE_FORMAT).to_string(),
                record.is_trading_day,
                record.opened_at.map(|t| t.timestamp()),
                record.closed_at.map(|t| t.timestamp()),
            ],
        )?;
        Ok(inserted == 1)
    }

    fn update_close(
        &self,
        trade_date: NaiveDate,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let updated = self.conn()?.execute(
            "UPDATE session_windows SET closed_at = ?1 WHERE trade_date = ?2 AND closed_at IS NULL",
            params![closed_at.timestamp(), trade_date.format(DATE_FORMAT).to_string()],
        )?;
        Ok(updated > 0)
    }
}

impl ChannelRepository for SqliteStore {
    fn list_active(&self) -> Result<Vec<DeliveryChannel>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT endpoint, p256dh_key, auth_key, is_active
             FROM delivery_channels WHERE is_active = 1 ORDER BY endpoint ASC",
        )?;
        let channels = stmt
            .query_map([], |row| {
                Ok(DeliveryChannel {
                    endpoint: row.get(0)?,
                    p256dh_key: row.get(1)?,
                    auth_key: row.get(2)?,
                    is_active: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(channels)
    }

    fn delete_by_endpoint(&self, endpoint: &str) -> Result<bool, StoreError> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM delivery_channels WHERE endpoint = ?1", params![endpoint])?;
        Ok(deleted > 0)
    }

    fn upsert_channel(&self, channel: &DeliveryChannel) -> Result<(), StoreError> {
        if channel.endpoint.trim().is_empty() {
            return Err(StoreError::Invalid("channel endpoint is required".to_string()));
        }
        self.conn()?.execute(
            "INSERT INTO delivery_channels (endpoint, p256dh_key, auth_key, is_active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(endpoint) DO UPDATE SET
                p256dh_key = excluded.p256dh_key,
                auth_key = excluded.auth_key,
                is_active = excluded.is_active",
            params![channel.endpoint, channel.p256dh_key, channel.auth_key, channel.is_active],
        )?;
        Ok(())
    }
}
