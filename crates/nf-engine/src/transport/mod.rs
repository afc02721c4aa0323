//! Channel transport contract
//!
//! One sender per channel type. Transports are synchronous from the state
//! machine's viewpoint and never raise for ordinary transport failures;
//! those come back as a failure `DeliveryOutcome`. Delivery is at-least-once,
//! so every request carries an idempotency key derived from the unit id and
//! attempt number.

pub mod discord;
pub mod webhook;

use async_trait::async_trait;
use nf_common::{ChannelType, DeliveryOutcome};
use nf_store::{Channel, Notification};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// What a transport is asked to deliver for one attempt
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub notification_id: i64,
    pub attempt: u32,
    pub idempotency_key: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send(&self, channel: &Channel, request: &DeliveryRequest) -> DeliveryOutcome;
}

/// Render the transport-specific delivery payload for a unit. Stored on the
/// unit at first attempt and reused verbatim for retries.
pub fn render_delivery_payload(channel: &Channel, notification: &Notification) -> serde_json::Value {
    match channel.channel_type {
        ChannelType::Webhook => serde_json::json!({
            "notification_id": notification.id,
            "subscription_id": notification.subscription_id,
            "event": notification.event_payload,
        }),
        ChannelType::Discord => serde_json::json!({
            "content": notification.event_payload.to_string(),
        }),
        ChannelType::Email => serde_json::json!({
            "subject": format!("Notification #{}", notification.id),
            "body": notification.event_payload.to_string(),
        }),
        ChannelType::Telegram => serde_json::json!({
            "text": notification.event_payload.to_string(),
        }),
    }
}

/// Maps channel types to their senders. Built once at startup; channel types
/// with no registered transport fail their attempts through the normal retry
/// path instead of crashing the scheduler.
#[derive(Default)]
pub struct TransportRegistry {
    transports: HashMap<ChannelType, Arc<dyn ChannelTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(
        mut self,
        channel_type: ChannelType,
        transport: Arc<dyn ChannelTransport>,
    ) -> Self {
        self.transports.insert(channel_type, transport);
        self
    }

    pub fn get(&self, channel_type: ChannelType) -> Option<Arc<dyn ChannelTransport>> {
        self.transports.get(&channel_type).cloned()
    }
}

/// Test transport that replays scripted outcomes and records every request
/// it receives
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DeliveryOutcome>>,
    default: DeliveryOutcome,
    sent: Mutex<Vec<DeliveryRequest>>,
}

impl ScriptedTransport {
    /// Always returns `default` once the script runs out
    pub fn new(default: DeliveryOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn always_succeeding() -> Self {
        Self::new(DeliveryOutcome::success(Some(200)))
    }

    pub fn always_failing(reason: &str) -> Self {
        Self::new(DeliveryOutcome::failure(Some(500), reason))
    }

    pub fn push_outcome(&self, outcome: DeliveryOutcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn sent(&self) -> Vec<DeliveryRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChannelTransport for ScriptedTransport {
    async fn send(&self, _channel: &Channel, request: &DeliveryRequest) -> DeliveryOutcome {
        self.sent.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}
