//! Finnhub REST adapter (`/quote` and `/stock/market-status`)

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::QuoteSource;
use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::types::{Quote, SessionLabel, SessionStatus};

const TOKEN_HEADER: &str = "X-Finnhub-Token";

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    c: f64,
    d: Option<f64>,
    dp: Option<f64>,
    #[serde(default)]
    h: f64,
    #[serde(default)]
    l: f64,
    #[serde(default)]
    o: f64,
    #[serde(default)]
    pc: f64,
    #[serde(default)]
    t: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketStatusResponse {
    #[serde(default)]
    exchange: String,
    holiday: Option<String>,
    #[serde(default)]
    is_open: bool,
    session: Option<String>,
    #[serde(default)]
    t: i64,
    #[serde(default)]
    timezone: String,
}

impl From<QuoteResponse> for Quote {
    fn from(r: QuoteResponse) -> Self {
        Quote {
            price: r.c,
            change_abs: r.d.unwrap_or_default(),
            change_pct: r.dp.unwrap_or_default(),
            high: r.h,
            low: r.l,
            open: r.o,
            prev_close: r.pc,
            timestamp: r.t,
        }
    }
}

impl From<MarketStatusResponse> for SessionStatus {
    fn from(r: MarketStatusResponse) -> Self {
        SessionStatus {
            exchange: r.exchange,
            is_open: r.is_open,
            label: SessionLabel::parse(r.session.as_deref()),
            timestamp: (r.t > 0).then(|| DateTime::from_timestamp(r.t, 0)).flatten(),
            timezone: r.timezone,
            holiday: r.holiday.filter(|h| !h.trim().is_empty()),
        }
    }
}

pub struct FinnhubSource {
    client: reqwest::Client,
    base_url: String,
    exchange: String,
    token: String,
}

impl FinnhubSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            exchange: config.exchange.clone(),
            token: config.token.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, &self.token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

fn status_error(status: StatusCode, body: &str) -> SourceError {
    SourceError::Status {
        status: status.as_u16(),
        body: body.trim().to_string(),
    }
}

#[async_trait]
impl QuoteSource for FinnhubSource {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, SourceError> {
        let response: QuoteResponse = self.get_json("/quote", &[("symbol", symbol)]).await?;

        // Unknown symbols come back as an all-zero payload
        if response.t == 0 && response.c == 0.0 {
            return Err(SourceError::Empty(symbol.to_string()));
        }

        debug!("📈 {} quote: c={} d={:?} dp={:?}", symbol, response.c, response.d, response.dp);
        Ok(response.into())
    }

    async fn fetch_session_status(&self) -> Result<SessionStatus, SourceError> {
        let response: MarketStatusResponse = self
            .get_json("/stock/market-status", &[("exchange", self.exchange.as_str())])
            .await?;
        Ok(response.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_decoding_tolerates_null_changes() {
        let raw = r#"{"c":187.5,"d":null,"dp":null,"h":189.0,"l":185.2,"o":186.0,"pc":186.9,"t":1709568000}"#;
        let quote: Quote = serde_json::from_str::<QuoteResponse>(raw).unwrap().into();
        assert_eq!(quote.price, 187.5);
        assert_eq!(quote.change_abs, 0.0);
        assert_eq!(quote.change_pct, 0.0);
        assert_eq!(quote.prev_close, 186.9);
        assert_eq!(quote.timestamp, 1709568000);
    }

    #[test]
    fn test_market_status_decoding() {
        let raw = r#"{"exchange":"US","holiday":null,"isOpen":true,"session":"Regular","t":1709568000,"timezone":"America/New_York"}"#;
        let status: SessionStatus = serde_json::from_str::<MarketStatusResponse>(raw)
            .unwrap()
            .into();
        assert!(status.is_open);
        assert_eq!(status.label, SessionLabel::Regular);
        assert_eq!(status.timestamp.map(|t| t.timestamp()), Some(1709568000));
        assert_eq!(status.holiday, None);

        let raw = r#"{"exchange":"US","isOpen":false,"session":null,"t":0,"timezone":""}"#;
        let status: SessionStatus = serde_json::from_str::<MarketStatusResponse>(raw)
            .unwrap()
            .into();
        assert_eq!(status.label, SessionLabel::Other(String::new()));
        assert_eq!(status.timestamp, None);
    }

    #[test]
    fn test_status_error_trims_body() {
        match status_error(StatusCode::TOO_MANY_REQUESTS, "  rate limited \n") {
            SourceError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
