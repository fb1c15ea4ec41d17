//! Persistence contracts consumed by the pipeline
//!
//! Implementations must be safe to call from several tasks at once. The
//! pipeline does no locking of its own around the store.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::types::{AlertEvent, DailyMetric, DeliveryChannel, QuoteSample, SessionWindowRecord};

pub trait SymbolRepository: Send + Sync {
    fn list_symbols(&self) -> Result<Vec<String>, StoreError>;
    fn add_symbol(&self, symbol: &str) -> Result<(), StoreError>;
}

pub trait QuoteRepository: Send + Sync {
    fn insert_sample(&self, sample: &QuoteSample) -> Result<(), StoreError>;

    /// Most recent sample for the symbol, if any
    fn latest_sample(&self, symbol: &str) -> Result<Option<QuoteSample>, StoreError>;

    /// Up to `limit` samples with `start <= sampled_at <= end`, newest first
    fn latest_samples_between(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QuoteSample>, StoreError>;

    /// All samples with `start <= sampled_at <= end`, oldest first
    fn samples_between(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<QuoteSample>, StoreError>;

    fn list_samples(&self, symbol: Option<&str>) -> Result<Vec<QuoteSample>, StoreError>;
}

pub trait DailyMetricRepository: Send + Sync {
    /// Replaces an existing row for the same symbol and trade date
    fn insert_metric(&self, metric: &DailyMetric) -> Result<(), StoreError>;

    fn latest_metric_before(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
    ) -> Result<Option<DailyMetric>, StoreError>;

    /// Newest trade date first
    fn list_metrics(&self, symbol: &str) -> Result<Vec<DailyMetric>, StoreError>;
}

pub trait AlertEventRepository: Send + Sync {
    fn insert_event(&self, event: &AlertEvent) -> Result<(), StoreError>;
    fn list_events(&self, symbol: Option<&str>) -> Result<Vec<AlertEvent>, StoreError>;
}

pub trait SessionWindowRepository: Send + Sync {
    fn find_by_trade_date(
        &self,
        trade_date: NaiveDate,
    ) -> Result<Option<SessionWindowRecord>, StoreError>;

    /// Returns `false` when a record for the trade date already exists
    fn create_if_absent(&self, record: &SessionWindowRecord) -> Result<bool, StoreError>;

    /// Sets the close time once. Returns `false` if the record is missing or already closed.
    fn update_close(
        &self,
        trade_date: NaiveDate,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

pub trait ChannelRepository: Send + Sync {
    fn list_active(&self) -> Result<Vec<DeliveryChannel>, StoreError>;
    fn delete_by_endpoint(&self, endpoint: &str) -> Result<bool, StoreError>;
    fn upsert_channel(&self, channel: &DeliveryChannel) -> Result<(), StoreError>;
}
