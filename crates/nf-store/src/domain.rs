//! Domain entities
//!
//! Entities carry both `user_id` and an optional `team_id`; a resource is
//! team-scoped iff `team_id` is set, personal otherwise. Ids are assigned by
//! the store on insert (0 until then), delivery logs use UUID string ids.

use chrono::{DateTime, Utc};
use nf_common::{
    ChannelConfig, ChannelType, DeliveryOutcome, NotificationStatus, Ownership, Result, TeamRole,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub event_type: String,
    pub team_id: Option<i64>,
    pub user_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        event_type: impl Into<String>,
        user_id: i64,
        team_id: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            description: description.into(),
            event_type: event_type.into(),
            team_id,
            user_id,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Ownership descriptor for this subscription, gated on `required_roles`
    /// when team-scoped
    pub fn ownership(&self, required_roles: &[TeamRole]) -> Ownership {
        match self.team_id {
            Some(team_id) => Ownership::team_scoped(team_id, required_roles),
            None => Ownership::personal(self.user_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub channel_type: ChannelType,
    pub config: ChannelConfig,
    pub team_id: Option<i64>,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Channel {
    /// Create a channel. The declared type is derived from the config variant,
    /// so a type/config mismatch cannot be constructed here; `validate`
    /// rejects empty required fields.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        config: ChannelConfig,
        user_id: i64,
        team_id: Option<i64>,
    ) -> Result<Self> {
        config.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: 0,
            name: name.into(),
            description: description.into(),
            channel_type: config.channel_type(),
            config,
            team_id,
            user_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn ownership(&self, required_roles: &[TeamRole]) -> Ownership {
        match self.team_id {
            Some(team_id) => Ownership::team_scoped(team_id, required_roles),
            None => Ownership::personal(self.user_id),
        }
    }
}

/// Junction row binding a channel to a subscription. Created and destroyed
/// only through the binder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionChannel {
    pub id: i64,
    pub subscription_id: i64,
    pub channel_id: i64,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionChannel {
    pub fn new(subscription_id: i64, channel_id: i64) -> Self {
        Self {
            id: 0,
            subscription_id,
            channel_id,
            created_at: Utc::now(),
        }
    }
}

/// Membership is the sole authorization signal for team-scoped resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMembership {
    pub id: i64,
    pub team_id: i64,
    pub user_id: i64,
    pub role: TeamRole,
    pub created_at: DateTime<Utc>,
}

impl TeamMembership {
    pub fn new(team_id: i64, user_id: i64, role: TeamRole) -> Self {
        Self {
            id: 0,
            team_id,
            user_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// A delivery unit: one per (event occurrence x bound channel).
///
/// `status`, `delivery_attempts`, `delivered_at` and `next_retry` are written
/// only by the delivery state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub subscription_id: i64,
    pub channel_id: i64,
    /// Immutable snapshot of the event as dispatched
    pub event_payload: serde_json::Value,
    /// Transport-specific rendering, set on first attempt
    pub delivery_payload: Option<serde_json::Value>,
    pub status: NotificationStatus,
    pub delivery_attempts: u32,
    pub error_message: Option<String>,
    /// When the unit next becomes due; `None` means due immediately
    pub next_retry: Option<DateTime<Utc>>,
    /// Claim lease; the unit is invisible to other workers until this passes
    pub in_flight_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(subscription_id: i64, channel_id: i64, event_payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            subscription_id,
            channel_id,
            event_payload,
            delivery_payload: None,
            status: NotificationStatus::Pending,
            delivery_attempts: 0,
            error_message: None,
            next_retry: None,
            in_flight_until: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        }
    }

    /// Deduplication key handed to transports for a given attempt
    pub fn idempotency_key(&self, attempt: u32) -> String {
        format!("ntf-{}-{}", self.id, attempt)
    }
}

/// Append-only record of a single delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub id: String,
    pub notification_id: i64,
    pub attempt: u32,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub response_code: Option<u16>,
    pub error: Option<String>,
    /// Absent once the unit is terminal
    pub next_retry: Option<DateTime<Utc>>,
}

impl DeliveryLog {
    pub fn record(
        notification_id: i64,
        attempt: u32,
        outcome: &DeliveryOutcome,
        next_retry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            notification_id,
            attempt,
            attempted_at: Utc::now(),
            success: outcome.success,
            response_code: outcome.response_code,
            error: outcome.reason.clone(),
            next_retry,
        }
    }
}
