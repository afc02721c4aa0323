//! In-memory store
//!
//! Backs the engine tests and small embedders. All tables live behind one
//! lock so `claim_due` is atomic with respect to concurrent claimers.

use crate::domain::{
    Channel, DeliveryLog, Notification, Subscription, SubscriptionChannel, TeamMembership,
};
use crate::repository::{
    BindingStore, ChannelStore, MembershipStore, NotificationStore, SubscriptionStore,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct State {
    subscriptions: Vec<Subscription>,
    channels: Vec<Channel>,
    bindings: Vec<SubscriptionChannel>,
    memberships: Vec<TeamMembership>,
    notifications: Vec<Notification>,
    delivery_logs: Vec<DeliveryLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert(&self, mut subscription: Subscription) -> Result<Subscription> {
        subscription.id = self.assign_id();
        self.state.write().subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>> {
        Ok(self
            .state
            .read()
            .subscriptions
            .iter()
            .find(|s| s.id == id && s.deleted_at.is_none())
            .cloned())
    }

    async fn update(&self, subscription: &Subscription) -> Result<()> {
        let mut state = self.state.write();
        if let Some(existing) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
        {
            *existing = subscription.clone();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write();
        match state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id && s.deleted_at.is_none())
        {
            Some(subscription) => {
                subscription.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn insert(&self, mut channel: Channel) -> Result<Channel> {
        channel.id = self.assign_id();
        self.state.write().channels.push(channel.clone());
        Ok(channel)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>> {
        Ok(self
            .state
            .read()
            .channels
            .iter()
            .find(|c| c.id == id && c.deleted_at.is_none())
            .cloned())
    }

    async fn update(&self, channel: &Channel) -> Result<()> {
        let mut state = self.state.write();
        if let Some(existing) = state.channels.iter_mut().find(|c| c.id == channel.id) {
            *existing = channel.clone();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write();
        match state
            .channels
            .iter_mut()
            .find(|c| c.id == id && c.deleted_at.is_none())
        {
            Some(channel) => {
                channel.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl BindingStore for MemoryStore {
    async fn insert(&self, mut binding: SubscriptionChannel) -> Result<SubscriptionChannel> {
        binding.id = self.assign_id();
        self.state.write().bindings.push(binding.clone());
        Ok(binding)
    }

    async fn exists(&self, subscription_id: i64, channel_id: i64) -> Result<bool> {
        Ok(self
            .state
            .read()
            .bindings
            .iter()
            .any(|b| b.subscription_id == subscription_id && b.channel_id == channel_id))
    }

    async fn delete(&self, subscription_id: i64, channel_id: i64) -> Result<bool> {
        let mut state = self.state.write();
        let before = state.bindings.len();
        state
            .bindings
            .retain(|b| !(b.subscription_id == subscription_id && b.channel_id == channel_id));
        Ok(state.bindings.len() < before)
    }

    async fn delete_for_channel(&self, channel_id: i64) -> Result<u64> {
        let mut state = self.state.write();
        let before = state.bindings.len();
        state.bindings.retain(|b| b.channel_id != channel_id);
        Ok((before - state.bindings.len()) as u64)
    }

    async fn channels_for_subscription(&self, subscription_id: i64) -> Result<Vec<Channel>> {
        let state = self.state.read();
        // Bindings are appended in creation order, which preserves the
        // insertion ordering the binder contract promises.
        let channels = state
            .bindings
            .iter()
            .filter(|b| b.subscription_id == subscription_id)
            .filter_map(|b| {
                state
                    .channels
                    .iter()
                    .find(|c| c.id == b.channel_id && c.deleted_at.is_none())
                    .cloned()
            })
            .collect();
        Ok(channels)
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn insert(&self, mut membership: TeamMembership) -> Result<TeamMembership> {
        membership.id = self.assign_id();
        self.state.write().memberships.push(membership.clone());
        Ok(membership)
    }

    async fn find(&self, team_id: i64, user_id: i64) -> Result<Option<TeamMembership>> {
        Ok(self
            .state
            .read()
            .memberships
            .iter()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, mut notification: Notification) -> Result<Notification> {
        notification.id = self.assign_id();
        self.state.write().notifications.push(notification.clone());
        Ok(notification)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>> {
        Ok(self
            .state
            .read()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn find_by_subscription(&self, subscription_id: i64) -> Result<Vec<Notification>> {
        Ok(self
            .state
            .read()
            .notifications
            .iter()
            .filter(|n| n.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let mut state = self.state.write();
        let lease_until = now + chrono::Duration::from_std(lease)?;
        let mut claimed = Vec::new();

        for notification in state.notifications.iter_mut() {
            if claimed.len() as u32 >= limit {
                break;
            }
            let due = notification.status == nf_common::NotificationStatus::Pending
                && notification.next_retry.map_or(true, |t| t <= now)
                && notification.in_flight_until.map_or(true, |t| t <= now);
            if due {
                notification.in_flight_until = Some(lease_until);
                claimed.push(notification.clone());
            }
        }

        Ok(claimed)
    }

    async fn update_attempt(
        &self,
        notification: &Notification,
        expected_attempts: u32,
    ) -> Result<bool> {
        let mut state = self.state.write();
        match state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification.id && n.delivery_attempts == expected_attempts)
        {
            Some(existing) => {
                existing.status = notification.status;
                existing.delivery_attempts = notification.delivery_attempts;
                existing.delivery_payload = notification.delivery_payload.clone();
                existing.error_message = notification.error_message.clone();
                existing.next_retry = notification.next_retry;
                existing.delivered_at = notification.delivered_at;
                existing.in_flight_until = None;
                existing.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_log(&self, log: DeliveryLog) -> Result<DeliveryLog> {
        self.state.write().delivery_logs.push(log.clone());
        Ok(log)
    }

    async fn logs_for(&self, notification_id: i64) -> Result<Vec<DeliveryLog>> {
        Ok(self
            .state
            .read()
            .delivery_logs
            .iter()
            .filter(|l| l.notification_id == notification_id)
            .cloned()
            .collect())
    }
}
