//! Push delivery transport

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushError, WebPushMessage,
    WebPushMessageBuilder,
};

use crate::config::PushConfig;
use crate::error::{ConfigError, PushError};
use crate::types::DeliveryChannel;

pub const DEFAULT_SUBJECT: &str = "admin@example.com";

/// Status and trimmed body returned by the push endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub status: u16,
    pub body: String,
}

impl PushResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 404 and 410 mean the subscription is gone for good
    pub fn is_gone(&self) -> bool {
        self.status == 404 || self.status == 410
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        channel: &DeliveryChannel,
        payload: &str,
        ttl_secs: u32,
    ) -> Result<PushResponse, PushError>;
}

/// Validated VAPID identity. The private key is kept URL-safe base64 without padding.
#[derive(Clone)]
pub struct VapidIdentity {
    pub public_key: String,
    pub subject: String,
    private_key: String,
}

impl fmt::Debug for VapidIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapidIdentity")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidIdentity {
    /// Both keys are required; the public key must be an uncompressed P-256 point
    /// and the private key a 32-byte scalar, either base64 flavour.
    pub fn from_config(config: &PushConfig) -> Result<Self, ConfigError> {
        let public_key = config.vapid_public_key.trim();
        let private_key = config.vapid_private_key.trim();
        if public_key.is_empty() {
            return Err(ConfigError::Missing("push.vapid_public_key"));
        }
        if private_key.is_empty() {
            return Err(ConfigError::Missing("push.vapid_private_key"));
        }

        match decode_key(public_key) {
            Some(bytes) if bytes.len() == 65 && bytes[0] == 0x04 => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "push.vapid_public_key is not a base64 P-256 public key".to_string(),
                ))
            }
        }
        let private_key = match decode_key(private_key) {
            Some(bytes) if bytes.len() == 32 => URL_SAFE_NO_PAD.encode(bytes),
            _ => {
                return Err(ConfigError::Invalid(
                    "push.vapid_private_key is not a base64 32-byte key".to_string(),
                ))
            }
        };

        Ok(Self {
            public_key: public_key.to_string(),
            subject: normalize_subject(&config.subject),
            private_key,
        })
    }
}

fn decode_key(raw: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(raw.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(raw))
        .ok()
}

pub fn normalize_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let trimmed = trimmed.strip_prefix("mailto:").unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        DEFAULT_SUBJECT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn message_error(e: WebPushError) -> PushError {
    PushError::Message(e.to_string())
}

/// Web Push delivery straight to the subscription endpoint. Each message is
/// VAPID-signed and its payload encrypted with `aes128gcm` for the
/// subscriber's keys.
pub struct HttpPushTransport {
    client: Client,
    identity: VapidIdentity,
}

impl HttpPushTransport {
    pub fn new(identity: VapidIdentity, timeout: Duration) -> Result<Self, PushError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, identity })
    }

    fn build_message(
        &self,
        subscription: &SubscriptionInfo,
        content: &[u8],
        ttl_secs: u32,
    ) -> Result<WebPushMessage, PushError> {
        let mut signature =
            VapidSignatureBuilder::from_base64(&self.identity.private_key, web_push::URL_SAFE_NO_PAD, subscription)
            .map_err(message_error)?;
        signature.add_claim("sub", format!("mailto:{}", self.identity.subject));
        let signature = signature.build().map_err(message_error)?;

        let mut builder = WebPushMessageBuilder::new(subscription);
        builder.set_ttl(ttl_secs);
        builder.set_payload(ContentEncoding::Aes128Gcm, content);
        builder.set_vapid_signature(signature);
        builder.build().map_err(message_error)
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver(
        &self,
        channel: &DeliveryChannel,
        payload: &str,
        ttl_secs: u32,
    ) -> Result<PushResponse, PushError> {
        let subscription =
            SubscriptionInfo::new(&channel.endpoint, &channel.p256dh_key, &channel.auth_key);
        let message = self.build_message(&subscription, payload.as_bytes(), ttl_secs)?;

        let mut request = self
            .client
            .post(&channel.endpoint)
            .header("TTL", ttl_secs.to_string());
        if let Some(encrypted) = message.payload {
            request = request
                .header("Content-Encoding", "aes128gcm")
                .header("Content-Type", "application/octet-stream");
            // carries the VAPID Authorization header
            for (name, value) in encrypted.crypto_headers {
                request = request.header(name, value);
            }
            request = request.body(encrypted.content);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(PushResponse {
            status,
            body: body.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// P-256 keypair with private scalar 1, whose public key is the curve generator
    const VAPID_PUBLIC: &str =
        "BGsX0fLhLEJH-Lzm5WOkQPJ3A32BLeszoPShOUXYmMKWT-NC4v4af5uO5-tKfA-eFivOM1drMV7Oy7ZAaDe_UfU";
    const VAPID_PRIVATE: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAE=";
    const SUBSCRIBER_AUTH: &str = "AAECAwQFBgcICQoLDA0ODw";

    fn push_config(public: String, private: String) -> PushConfig {
        PushConfig {
            vapid_public_key: public,
            vapid_private_key: private,
            subject: "mailto: ops@example.com ".to_string(),
            ..PushConfig::default()
        }
    }

    fn public_key() -> String {
        let mut bytes = [7u8; 65];
        bytes[0] = 0x04;
        URL_SAFE_NO_PAD.encode(bytes)
    }

    #[test]
    fn test_subject_normalization() {
        assert_eq!(normalize_subject("mailto:me@example.com"), "me@example.com");
        assert_eq!(normalize_subject("  "), DEFAULT_SUBJECT);
        assert_eq!(normalize_subject("mailto:"), DEFAULT_SUBJECT);
    }

    #[test]
    fn test_identity_validates_keys() {
        let private = STANDARD.encode([9u8; 32]);
        let identity =
            VapidIdentity::from_config(&push_config(public_key(), private.clone())).unwrap();
        assert_eq!(identity.subject, "ops@example.com");

        let missing = VapidIdentity::from_config(&push_config(String::new(), private.clone()));
        assert!(matches!(missing, Err(ConfigError::Missing("push.vapid_public_key"))));

        let short =
            VapidIdentity::from_config(&push_config(URL_SAFE_NO_PAD.encode([4u8; 10]), private));
        assert!(matches!(short, Err(ConfigError::Invalid(_))));

        let bad_private =
            VapidIdentity::from_config(&push_config(public_key(), "not-base64!".to_string()));
        assert!(matches!(bad_private, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_response_classification() {
        let gone = PushResponse { status: 410, body: String::new() };
        assert!(gone.is_gone() && !gone.is_success());
        let forbidden = PushResponse { status: 403, body: String::new() };
        assert!(forbidden.is_forbidden() && !forbidden.is_gone());
        assert!(PushResponse { status: 201, body: String::new() }.is_success());
    }

    fn transport() -> HttpPushTransport {
        let identity = VapidIdentity::from_config(&push_config(
            VAPID_PUBLIC.to_string(),
            VAPID_PRIVATE.to_string(),
        ))
        .unwrap();
        HttpPushTransport::new(identity, Duration::from_secs(5)).unwrap()
    }

    fn channel(endpoint: String, p256dh: &str) -> DeliveryChannel {
        DeliveryChannel {
            endpoint,
            p256dh_key: p256dh.to_string(),
            auth_key: SUBSCRIBER_AUTH.to_string(),
            is_active: true,
        }
    }

    /// Accepts one request, answers with `status_line`, returns the lowercased head and the body
    async fn answer_once(listener: TcpListener, status_line: &'static str) -> (String, Vec<u8>) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        let (head, body_start, body_len) = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the request completed");
            raw.extend_from_slice(&buf[..n]);

            let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= end + 4 + len {
                break (head, end + 4, len);
            }
        };

        let reply = format!("{status_line}\r\ncontent-length: 4\r\nconnection: close\r\n\r\ngone");
        socket.write_all(reply.as_bytes()).await.unwrap();
        (head, raw[body_start..body_start + body_len].to_vec())
    }

    #[tokio::test]
    async fn test_deliver_sends_signed_encrypted_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/push/abc", listener.local_addr().unwrap());
        let server = tokio::spawn(answer_once(listener, "HTTP/1.1 201 Created"));

        let response = transport()
            .deliver(
                &channel(endpoint, VAPID_PUBLIC),
                r#"{"type":"popup","message":"secret"}"#,
                30,
            )
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert!(response.is_success());

        let (head, body) = server.await.unwrap();
        assert!(head.starts_with("post /push/abc "));
        assert!(head.contains("authorization: vapid t="));
        assert!(head.contains(&format!(", k={}", VAPID_PUBLIC.to_lowercase())));
        assert!(head.contains("content-encoding: aes128gcm"));
        assert!(head.contains("ttl: 30"));
        assert!(!head.contains("x-push-"));
        assert!(!body.is_empty());
        assert!(!String::from_utf8_lossy(&body).contains("secret"));
    }

    #[tokio::test]
    async fn test_deliver_reports_gone_subscription() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/push/expired", listener.local_addr().unwrap());
        let server = tokio::spawn(answer_once(listener, "HTTP/1.1 410 Gone"));

        let response = transport()
            .deliver(&channel(endpoint, VAPID_PUBLIC), "{}", 30)
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(response, PushResponse { status: 410, body: "gone".to_string() });
        assert!(response.is_gone());
    }

    #[tokio::test]
    async fn test_malformed_subscription_key_fails_before_sending() {
        let result = transport()
            .deliver(&channel("http://127.0.0.1:9/push".to_string(), "BKey"), "{}", 30)
            .await;
        assert!(matches!(result, Err(PushError::Message(_))));
    }
}
