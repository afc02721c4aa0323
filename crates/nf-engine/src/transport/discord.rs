//! Discord transport
//!
//! Discord channels are plain incoming webhooks: POST a `content` message to
//! the configured webhook URL. Discord caps message content at 2000
//! characters, longer payloads are truncated rather than rejected.

use super::{ChannelTransport, DeliveryRequest};
use async_trait::async_trait;
use nf_common::{ChannelConfig, DeliveryOutcome};
use nf_store::Channel;
use std::time::Duration;

const DISCORD_CONTENT_LIMIT: usize = 2000;

pub struct DiscordTransport {
    client: reqwest::Client,
}

impl DiscordTransport {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChannelTransport for DiscordTransport {
    async fn send(&self, channel: &Channel, request: &DeliveryRequest) -> DeliveryOutcome {
        let webhook_url = match &channel.config {
            ChannelConfig::Discord { webhook_url } => webhook_url,
            other => {
                return DeliveryOutcome::failure(
                    None,
                    format!(
                        "channel {} has {} config, expected discord",
                        channel.id,
                        other.channel_type()
                    ),
                )
            }
        };

        let mut content = request
            .payload
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| request.payload.to_string());
        content.truncate(DISCORD_CONTENT_LIMIT);

        let body = serde_json::json!({ "content": content });
        match self
            .client
            .post(webhook_url)
            .header(super::webhook::IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    DeliveryOutcome::success(Some(status.as_u16()))
                } else {
                    DeliveryOutcome::failure(
                        Some(status.as_u16()),
                        format!("discord webhook returned HTTP {}", status.as_u16()),
                    )
                }
            }
            Err(e) => DeliveryOutcome::failure(None, e.to_string()),
        }
    }
}
