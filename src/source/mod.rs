//! Quote source adapter
//!
//! Fetches point-in-time quotes and the exchange session status. Adapters do
//! not retry; the poller skips failed symbols and the orchestrator retries
//! status fetches itself.

pub mod finnhub;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{Quote, SessionStatus};

pub use finnhub::FinnhubSource;

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, SourceError>;

    async fn fetch_session_status(&self) -> Result<SessionStatus, SourceError>;
}
