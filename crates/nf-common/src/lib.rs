use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Channel Types
// ============================================================================

/// Supported notification channel kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Webhook,
    Email,
    Telegram,
    Discord,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Webhook => "webhook",
            ChannelType::Email => "email",
            ChannelType::Telegram => "telegram",
            ChannelType::Discord => "discord",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "webhook" => Some(ChannelType::Webhook),
            "email" => Some(ChannelType::Email),
            "telegram" => Some(ChannelType::Telegram),
            "discord" => Some(ChannelType::Discord),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type channel configuration. Each variant carries exactly the fields
/// its transport needs, so adding a channel type is a localized change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Webhook {
        url: String,
        /// Optional HMAC-SHA256 signing secret for outbound payloads
        #[serde(skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },
    Email {
        address: String,
    },
    Telegram {
        chat_id: String,
    },
    Discord {
        webhook_url: String,
    },
}

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Webhook { .. } => ChannelType::Webhook,
            ChannelConfig::Email { .. } => ChannelType::Email,
            ChannelConfig::Telegram { .. } => ChannelType::Telegram,
            ChannelConfig::Discord { .. } => ChannelType::Discord,
        }
    }

    /// Check that the required field for this variant is present and non-empty
    pub fn validate(&self) -> Result<()> {
        let missing = match self {
            ChannelConfig::Webhook { url, .. } if url.trim().is_empty() => {
                Some("webhook URL is required for webhook channels")
            }
            ChannelConfig::Email { address } if address.trim().is_empty() => {
                Some("email address is required for email channels")
            }
            ChannelConfig::Telegram { chat_id } if chat_id.trim().is_empty() => {
                Some("chat ID is required for telegram channels")
            }
            ChannelConfig::Discord { webhook_url } if webhook_url.trim().is_empty() => {
                Some("webhook URL is required for discord channels")
            }
            _ => None,
        };

        match missing {
            Some(message) => Err(NotifryError::validation(message)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Teams & Ownership
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Owner,
    Admin,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(TeamRole::Owner),
            "admin" => Some(TeamRole::Admin),
            "member" => Some(TeamRole::Member),
            _ => None,
        }
    }
}

/// Roles allowed to mutate a team-scoped resource
pub const MANAGE_ROLES: &[TeamRole] = &[TeamRole::Owner, TeamRole::Admin];

/// Any membership at all
pub const MEMBER_ROLES: &[TeamRole] = &[TeamRole::Owner, TeamRole::Admin, TeamRole::Member];

/// Ownership descriptor for an authorizable resource.
///
/// Personal resources admit exactly their owning user. Team-scoped resources
/// admit any member of the team whose role appears in `required_roles`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    Personal { user_id: i64 },
    TeamScoped { team_id: i64, required_roles: Vec<TeamRole> },
}

impl Ownership {
    pub fn personal(user_id: i64) -> Self {
        Ownership::Personal { user_id }
    }

    pub fn team_scoped(team_id: i64, required_roles: &[TeamRole]) -> Self {
        Ownership::TeamScoped {
            team_id,
            required_roles: required_roles.to_vec(),
        }
    }
}

// ============================================================================
// Delivery Types
// ============================================================================

/// Lifecycle state of a delivery unit. `Delivered` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Delivered,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NotificationStatus::Pending),
            "delivered" => Some(NotificationStatus::Delivered),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Delivered | NotificationStatus::Failed)
    }
}

/// Result of a single transport attempt. Ordinary transport failures are
/// represented here, never raised as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub response_code: Option<u16>,
    pub reason: Option<String>,
}

impl DeliveryOutcome {
    pub fn success(response_code: Option<u16>) -> Self {
        Self {
            success: true,
            response_code,
            reason: None,
        }
    }

    pub fn failure(response_code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            response_code,
            reason: Some(reason.into()),
        }
    }
}

// ============================================================================
// Retry Policy & Scheduler Configuration
// ============================================================================

/// Bounded-retry policy with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added as random jitter (0.0 disables)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30 * 60),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt number `attempt` (1-based):
    /// `base * 2^(attempt-1)` capped at `max_delay`, plus a random jitter fraction
    /// so that units scheduled together do not retry in lockstep.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self
            .base_delay
            .checked_mul(2u32.saturating_pow(exponent))
            .unwrap_or(self.max_delay);
        let capped = scaled.min(self.max_delay);

        if self.jitter <= 0.0 {
            return capped;
        }

        let jitter = capped.mul_f64(self.jitter * rand::random::<f64>());
        capped + jitter
    }
}

/// Configuration for the retry scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to poll for due units
    pub poll_interval: Duration,
    /// Maximum units claimed per pass
    pub batch_size: u32,
    /// How long a claimed unit stays invisible to other workers
    pub claim_lease: Duration,
    /// Per-attempt transport timeout; expiry is recorded as a failure
    pub attempt_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            claim_lease: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NotifryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{message}")]
    Denied { message: String },

    #[error("channel {channel_id} is already bound to subscription {subscription_id}")]
    AlreadyBound { subscription_id: i64, channel_id: i64 },

    #[error("subscription belongs to team {subscription_team} but channel belongs to team {channel_team}")]
    CrossTenantBinding {
        subscription_team: i64,
        channel_team: i64,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("concurrent update conflict on notification {0}")]
    Conflict(i64),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl NotifryError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::Denied {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NotifryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_type_mapping() {
        let config = ChannelConfig::Webhook {
            url: "https://example.com/hook".to_string(),
            secret: None,
        };
        assert_eq!(config.channel_type(), ChannelType::Webhook);

        let config = ChannelConfig::Telegram {
            chat_id: "12345".to_string(),
        };
        assert_eq!(config.channel_type(), ChannelType::Telegram);
    }

    #[test]
    fn test_channel_config_validation() {
        let ok = ChannelConfig::Email {
            address: "ops@example.com".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty = ChannelConfig::Email {
            address: "  ".to_string(),
        };
        assert!(matches!(
            empty.validate(),
            Err(NotifryError::Validation { .. })
        ));
    }

    #[test]
    fn test_channel_config_tagged_serialization() {
        let config = ChannelConfig::Discord {
            webhook_url: "https://discord.com/api/webhooks/1/x".to_string(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "discord");
        assert_eq!(json["webhook_url"], "https://discord.com/api/webhooks/1/x");

        let back: ChannelConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(NotificationStatus::Delivered.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        };

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(20));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(40));
        // Capped from here on
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(30), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = RetryPolicy {
            jitter: 0.25,
            ..RetryPolicy::default()
        };

        for attempt in 1..=5 {
            let base = RetryPolicy {
                jitter: 0.0,
                ..policy.clone()
            }
            .backoff_delay(attempt);
            let delay = policy.backoff_delay(attempt);
            assert!(delay >= base);
            assert!(delay <= base.mul_f64(1.25));
        }
    }
}
