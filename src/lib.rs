// Quote Pipeline
// Market session orchestration, intraday quote metrics, alert scoring and
// notification fanout over a single SQLite store

pub mod alert_scorer;
pub mod config;
pub mod daily_builder;
pub mod db;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod quote_poller;
pub mod session;
pub mod source;
pub mod types;

pub use db::SqliteStore;
pub use error::{PipelineError, Result};
