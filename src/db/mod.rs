pub mod repository;
pub mod store;

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

pub use repository::{
    AlertEventRepository, ChannelRepository, DailyMetricRepository, QuoteRepository,
    SessionWindowRepository, SymbolRepository,
};
pub use store::SqliteStore;

pub(crate) fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        -- Tracked symbols
        CREATE TABLE IF NOT EXISTS symbols (
            symbol TEXT PRIMARY KEY,
            active INTEGER NOT NULL DEFAULT 1
        );

        -- Intraday samples (append-only)
        CREATE TABLE IF NOT EXISTS quote_samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            price REAL NOT NULL,
            change_abs REAL NOT NULL,
            change_pct REAL NOT NULL,
            ema_short REAL NOT NULL,
            ema_long REAL NOT NULL,
            smoothed_signal REAL NOT NULL,
            ema_delta_short REAL NOT NULL,
            ema_delta_signal REAL NOT NULL,
            trend_direction INTEGER NOT NULL,
            sampled_at INTEGER NOT NULL
        );

        -- One row per symbol per trade date
        CREATE TABLE IF NOT EXISTS daily_metrics (
            symbol TEXT NOT NULL,
            trade_date TEXT NOT NULL,
            price_average REAL NOT NULL,
            price_high REAL NOT NULL,
            price_low REAL NOT NULL,
            price_open REAL NOT NULL,
            price_prev_close REAL NOT NULL,
            change_abs REAL NOT NULL,
            change_pct REAL NOT NULL,
            price_range REAL NOT NULL,
            ema_short REAL NOT NULL,
            ema_long REAL NOT NULL,
            trend_direction INTEGER NOT NULL,
            PRIMARY KEY(symbol, trade_date)
        );

        CREATE TABLE IF NOT EXISTS alert_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            trend_sum INTEGER NOT NULL,
            latest_sign_trend INTEGER NOT NULL,
            ema_score INTEGER NOT NULL,
            crossover_flag INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_windows (
            trade_date TEXT PRIMARY KEY,
            is_trading_day INTEGER NOT NULL DEFAULT 1,
            opened_at INTEGER,
            closed_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS delivery_channels (
            endpoint TEXT PRIMARY KEY,
            p256dh_key TEXT NOT NULL,
            auth_key TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_quote_samples_symbol_time ON quote_samples(symbol, sampled_at, id);
        CREATE INDEX IF NOT EXISTS idx_alert_events_symbol_time ON alert_events(symbol, created_at);
        CREATE INDEX IF NOT EXISTS idx_delivery_channels_active ON delivery_channels(is_active);
        "#,
    )?;

    info!("📊 Database schema initialized");
    Ok(())
}
