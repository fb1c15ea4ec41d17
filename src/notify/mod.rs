//! Notification fanout
//!
//! Alerts and market open/close notices go to two targets: the live alert
//! registry (best-effort, never blocks) and every active push channel. Push
//! rounds run channels concurrently, each under its own timeout, and prune
//! channels the endpoint reports as gone.

pub mod live;
pub mod push;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::db::ChannelRepository;
use crate::error::{ConfigError, PushError};
use crate::types::{AlertEvent, DeliveryChannel};

pub use live::{ConnectionId, ConnectionRegistry};
pub use push::{HttpPushTransport, PushResponse, PushTransport, VapidIdentity};

pub const ALERT_TITLE: &str = "Stock Alert";
pub const MARKET_OPEN_TITLE: &str = "Market Open";
pub const MARKET_CLOSE_TITLE: &str = "Market Close";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Scoring-triggered alert
    async fn notify(&self, event: &AlertEvent, message: &str);

    /// Titled notice without an event (market open/close)
    async fn notify_generic(&self, title: &str, message: &str);
}

#[derive(Debug, Clone, Serialize)]
pub struct PopupPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub event: Option<AlertEvent>,
    pub message: String,
}

impl PopupPayload {
    pub fn new(title: &str, event: Option<AlertEvent>, message: &str) -> Self {
        Self {
            kind: "popup",
            title: title.to_string(),
            event,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LiveAlert<'a> {
    event: &'a AlertEvent,
    message: &'a str,
}

/// Per-round delivery counters. `removed` and `forbidden` are also counted in `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub removed: usize,
    pub forbidden: usize,
}

enum Outcome {
    Delivered,
    Gone,
    Forbidden(PushResponse),
    Rejected(PushResponse),
    Error(PushError),
}

pub struct NotificationFanout {
    channels: Arc<dyn ChannelRepository>,
    transport: Arc<dyn PushTransport>,
    alerts: Option<Arc<ConnectionRegistry>>,
    trigger_score: i32,
    ttl_secs: u32,
    delivery_timeout: Duration,
    max_concurrent: usize,
}

impl NotificationFanout {
    /// Fails when the VAPID credentials are missing or malformed
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        transport: Arc<dyn PushTransport>,
        alerts: Option<Arc<ConnectionRegistry>>,
        config: &PushConfig,
    ) -> Result<Self, ConfigError> {
        let identity = VapidIdentity::from_config(config)?;
        info!(
            "📣 Notification fanout ready (subject={}, trigger=±{}, concurrency={})",
            identity.subject, config.trigger_score, config.max_concurrent_deliveries
        );

        Ok(Self {
            channels,
            transport,
            alerts,
            trigger_score: config.trigger_score,
            ttl_secs: config.ttl_secs,
            delivery_timeout: config.delivery_timeout(),
            max_concurrent: config.max_concurrent_deliveries.max(1),
        })
    }

    fn should_push(&self, score: i32) -> bool {
        score == self.trigger_score || score == -self.trigger_score
    }

    pub async fn deliver_all(&self, title: &str, payload: &PopupPayload) -> FanoutReport {
        let mut report = FanoutReport::default();

        let channels = match self.channels.list_active() {
            Ok(channels) => channels,
            Err(e) => {
                warn!("Push round title={} aborted: failed to list channels: {}", title, e);
                return report;
            }
        };
        if channels.is_empty() {
            info!("Push round title={} total=0 (no active channels)", title);
            return report;
        }

        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!("Push round title={} aborted: failed to encode payload: {}", title, e);
                return report;
            }
        };

        report.total = channels.len();
        let transport = &self.transport;
        let body = body.as_str();
        let ttl = self.ttl_secs;
        let limit = self.delivery_timeout;

        let outcomes: Vec<(DeliveryChannel, Outcome)> = stream::iter(channels)
            .map(|channel| async move {
                let outcome = match timeout(limit, transport.deliver(&channel, body, ttl)).await {
                    Ok(Ok(response)) if response.is_success() => Outcome::Delivered,
                    Ok(Ok(response)) if response.is_gone() => Outcome::Gone,
                    Ok(Ok(response)) if response.is_forbidden() => Outcome::Forbidden(response),
                    Ok(Ok(response)) => Outcome::Rejected(response),
                    Ok(Err(e)) => Outcome::Error(e),
                    Err(_) => Outcome::Error(PushError::Timeout(limit.as_secs())),
                };
                (channel, outcome)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for (channel, outcome) in outcomes {
            match outcome {
                Outcome::Delivered => report.success += 1,
                Outcome::Gone => {
                    report.failed += 1;
                    match self.channels.delete_by_endpoint(&channel.endpoint) {
                        Ok(_) => {
                            report.removed += 1;
                            debug!("🗑️  Removed expired push channel {}", channel.endpoint);
                        }
                        Err(e) => {
                            warn!("Failed to remove push channel {}: {}", channel.endpoint, e)
                        }
                    }
                }
                Outcome::Forbidden(response) => {
                    report.failed += 1;
                    report.forbidden += 1;
                    warn!(
                        "Push forbidden endpoint={} reason={:?}",
                        channel.endpoint, response.body
                    );
                }
                Outcome::Rejected(response) => {
                    report.failed += 1;
                    warn!(
                        "Push non-2xx endpoint={} status={} reason={:?}",
                        channel.endpoint, response.status, response.body
                    );
                }
                Outcome::Error(e) => {
                    report.failed += 1;
                    warn!("Push failed endpoint={}: {}", channel.endpoint, e);
                }
            }
        }

        info!(
            "📣 Push round title={} total={} success={} failed={} removed={} forbidden={}",
            title, report.total, report.success, report.failed, report.removed, report.forbidden
        );
        report
    }
}

#[async_trait]
impl Notifier for NotificationFanout {
    async fn notify(&self, event: &AlertEvent, message: &str) {
        if let Some(alerts) = &self.alerts {
            alerts.broadcast(&LiveAlert { event, message });
        }

        if !self.should_push(event.ema_score) {
            debug!("{} score {} below push trigger", event.symbol, event.ema_score);
            return;
        }
        let payload = PopupPayload::new(ALERT_TITLE, Some(event.clone()), message);
        self.deliver_all(ALERT_TITLE, &payload).await;
    }

    async fn notify_generic(&self, title: &str, message: &str) {
        let payload = PopupPayload::new(title, None, message);
        if let Some(alerts) = &self.alerts {
            alerts.broadcast(&payload);
        }
        self.deliver_all(title, &payload).await;
    }
}
