//! Error taxonomy for the pipeline
//!
//! - `SourceError`: transient-external, retried or skipped by callers
//! - `StoreError`: persistence failures, isolated per item except in the daily build
//! - `ConfigError`: precondition failures, raised before any loop starts
//! - `PushError`: transport failures for a single delivery channel

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("quote source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote source returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode quote source response: {0}")]
    Decode(String),

    #[error("quote source returned no data for {0}")]
    Empty(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("invalid store request: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push delivery timed out after {0}s")]
    Timeout(u64),

    #[error("failed to build push message: {0}")]
    Message(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
