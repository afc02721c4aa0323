//! Webhook transport
//!
//! POSTs the rendered payload to the channel's URL. When the channel carries
//! a signing secret, the exact request body is signed with HMAC-SHA256 and
//! the hex digest sent in `X-Notifry-Signature` so receivers can verify
//! authenticity.

use super::{ChannelTransport, DeliveryRequest};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use nf_common::{ChannelConfig, DeliveryOutcome};
use nf_store::Channel;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

pub const IDEMPOTENCY_HEADER: &str = "X-Notifry-Idempotency-Key";
pub const SIGNATURE_HEADER: &str = "X-Notifry-Signature";

/// Response bodies are truncated to this length in failure reasons
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct WebhookTransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for WebhookTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct WebhookTransport {
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(config: WebhookTransportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn post(
        &self,
        url: &str,
        secret: Option<&str>,
        request: &DeliveryRequest,
    ) -> DeliveryOutcome {
        let body = match serde_json::to_vec(&request.payload) {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::failure(None, format!("payload serialization: {}", e)),
        };

        let mut http = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key);

        if let Some(secret) = secret {
            http = http.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        debug!(
            notification_id = request.notification_id,
            attempt = request.attempt,
            "Posting webhook"
        );

        match http.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    DeliveryOutcome::success(Some(status.as_u16()))
                } else {
                    let mut body = response.text().await.unwrap_or_default();
                    body.truncate(MAX_ERROR_BODY);
                    DeliveryOutcome::failure(
                        Some(status.as_u16()),
                        format!("HTTP {}: {}", status.as_u16(), body),
                    )
                }
            }
            Err(e) => DeliveryOutcome::failure(None, e.to_string()),
        }
    }
}

/// Hex HMAC-SHA256 digest of the request body
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl ChannelTransport for WebhookTransport {
    async fn send(&self, channel: &Channel, request: &DeliveryRequest) -> DeliveryOutcome {
        match &channel.config {
            ChannelConfig::Webhook { url, secret } => {
                self.post(url, secret.as_deref(), request).await
            }
            // Config/type mismatch is validated away at creation; reaching
            // this arm means a corrupted row, reported as a plain failure.
            other => DeliveryOutcome::failure(
                None,
                format!(
                    "channel {} has {} config, expected webhook",
                    channel.id,
                    other.channel_type()
                ),
            ),
        }
    }
}
