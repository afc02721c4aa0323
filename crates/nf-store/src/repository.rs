//! Store traits the engine components are written against

use crate::domain::{
    Channel, DeliveryLog, Notification, Subscription, SubscriptionChannel, TeamMembership,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert and return the entity with its assigned id
    async fn insert(&self, subscription: Subscription) -> Result<Subscription>;
    /// Soft-deleted subscriptions are not returned
    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>>;
    async fn update(&self, subscription: &Subscription) -> Result<()>;
    async fn soft_delete(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn insert(&self, channel: Channel) -> Result<Channel>;
    /// Soft-deleted channels are not returned
    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>>;
    async fn update(&self, channel: &Channel) -> Result<()>;
    async fn soft_delete(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn insert(&self, binding: SubscriptionChannel) -> Result<SubscriptionChannel>;
    async fn exists(&self, subscription_id: i64, channel_id: i64) -> Result<bool>;
    /// Returns false when no binding existed for the pair
    async fn delete(&self, subscription_id: i64, channel_id: i64) -> Result<bool>;
    /// Remove every binding referencing a channel; used when the channel is deleted
    async fn delete_for_channel(&self, channel_id: i64) -> Result<u64>;
    /// Bound channels in binding-creation order, excluding soft-deleted channels
    async fn channels_for_subscription(&self, subscription_id: i64) -> Result<Vec<Channel>>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn insert(&self, membership: TeamMembership) -> Result<TeamMembership>;
    async fn find(&self, team_id: i64, user_id: i64) -> Result<Option<TeamMembership>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<Notification>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>>;
    async fn find_by_subscription(&self, subscription_id: i64) -> Result<Vec<Notification>>;

    /// Atomically claim up to `limit` due units: pending, `next_retry` absent
    /// or elapsed, and not already leased. Claimed units get
    /// `in_flight_until = now + lease` so no other worker can claim them
    /// until the lease expires.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<Notification>>;

    /// Persist the state-machine fields of `notification` (status, attempts,
    /// payload rendering, error, retry schedule, delivered_at) and release its
    /// claim, but only if the stored attempt count still equals
    /// `expected_attempts`. Returns false on a lost race.
    async fn update_attempt(
        &self,
        notification: &Notification,
        expected_attempts: u32,
    ) -> Result<bool>;

    /// Append-only attempt history
    async fn append_log(&self, log: DeliveryLog) -> Result<DeliveryLog>;
    async fn logs_for(&self, notification_id: i64) -> Result<Vec<DeliveryLog>>;
}
