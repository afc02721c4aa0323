//! Subscription and channel catalogs
//!
//! CRUD over the two resource types with the same role gates everywhere:
//! creating on behalf of a team, updating and deleting all require owner or
//! admin; personal resources admit only their owner.

use crate::authz::AuthorizationResolver;
use nf_common::{ChannelConfig, NotifryError, Ownership, Result, MANAGE_ROLES};
use nf_store::{BindingStore, Channel, ChannelStore, Subscription, SubscriptionStore};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub name: String,
    pub description: String,
    pub event_type: String,
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSubscription {
    pub name: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<String>,
    pub is_active: Option<bool>,
}

pub struct SubscriptionCatalog {
    subscriptions: Arc<dyn SubscriptionStore>,
    resolver: Arc<AuthorizationResolver>,
}

impl SubscriptionCatalog {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        resolver: Arc<AuthorizationResolver>,
    ) -> Self {
        Self {
            subscriptions,
            resolver,
        }
    }

    pub async fn create(
        &self,
        input: CreateSubscription,
        actor_user_id: i64,
    ) -> Result<Subscription> {
        if let Some(team_id) = input.team_id {
            self.resolver
                .require(
                    actor_user_id,
                    &Ownership::team_scoped(team_id, MANAGE_ROLES),
                    "you don't have permission to create subscriptions for this team",
                )
                .await?;
        }
        if input.event_type.trim().is_empty() {
            return Err(NotifryError::validation("event type is required"));
        }

        let subscription = self
            .subscriptions
            .insert(Subscription::new(
                input.name,
                input.description,
                input.event_type,
                actor_user_id,
                input.team_id,
            ))
            .await?;
        info!(
            subscription_id = subscription.id,
            event_type = %subscription.event_type,
            "Subscription created"
        );
        Ok(subscription)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateSubscription,
        actor_user_id: i64,
    ) -> Result<Subscription> {
        let mut subscription = self
            .subscriptions
            .find_by_id(id)
            .await?
            .ok_or(NotifryError::not_found("subscription", id))?;

        self.resolver
            .require(
                actor_user_id,
                &subscription.ownership(MANAGE_ROLES),
                "you don't have permission to update this subscription",
            )
            .await?;

        if let Some(name) = input.name {
            subscription.name = name;
        }
        if let Some(description) = input.description {
            subscription.description = description;
        }
        if let Some(event_type) = input.event_type {
            if event_type.trim().is_empty() {
                return Err(NotifryError::validation("event type is required"));
            }
            subscription.event_type = event_type;
        }
        if let Some(is_active) = input.is_active {
            subscription.is_active = is_active;
        }

        self.subscriptions.update(&subscription).await?;
        Ok(subscription)
    }

    pub async fn delete(&self, id: i64, actor_user_id: i64) -> Result<()> {
        let subscription = self
            .subscriptions
            .find_by_id(id)
            .await?
            .ok_or(NotifryError::not_found("subscription", id))?;

        self.resolver
            .require(
                actor_user_id,
                &subscription.ownership(MANAGE_ROLES),
                "you don't have permission to delete this subscription",
            )
            .await?;

        self.subscriptions.soft_delete(id).await?;
        info!(subscription_id = id, "Subscription deleted");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateChannel {
    pub name: String,
    pub description: String,
    pub config: ChannelConfig,
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateChannel {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<ChannelConfig>,
}

pub struct ChannelCatalog {
    channels: Arc<dyn ChannelStore>,
    bindings: Arc<dyn BindingStore>,
    resolver: Arc<AuthorizationResolver>,
}

impl ChannelCatalog {
    pub fn new(
        channels: Arc<dyn ChannelStore>,
        bindings: Arc<dyn BindingStore>,
        resolver: Arc<AuthorizationResolver>,
    ) -> Self {
        Self {
            channels,
            bindings,
            resolver,
        }
    }

    pub async fn create(&self, input: CreateChannel, actor_user_id: i64) -> Result<Channel> {
        if let Some(team_id) = input.team_id {
            self.resolver
                .require(
                    actor_user_id,
                    &Ownership::team_scoped(team_id, MANAGE_ROLES),
                    "you don't have permission to create channels for this team",
                )
                .await?;
        }

        let channel = Channel::new(
            input.name,
            input.description,
            input.config,
            actor_user_id,
            input.team_id,
        )?;
        let channel = self.channels.insert(channel).await?;
        info!(
            channel_id = channel.id,
            channel_type = %channel.channel_type,
            "Channel created"
        );
        Ok(channel)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateChannel,
        actor_user_id: i64,
    ) -> Result<Channel> {
        let mut channel = self
            .channels
            .find_by_id(id)
            .await?
            .ok_or(NotifryError::not_found("channel", id))?;

        self.resolver
            .require(
                actor_user_id,
                &channel.ownership(MANAGE_ROLES),
                "you don't have permission to update this channel",
            )
            .await?;

        if let Some(name) = input.name {
            channel.name = name;
        }
        if let Some(description) = input.description {
            channel.description = description;
        }
        if let Some(config) = input.config {
            // The channel keeps its declared type for life; a config for a
            // different type is a validation error, not a type change.
            if config.channel_type() != channel.channel_type {
                return Err(NotifryError::validation(format!(
                    "config for {} channel does not match channel type {}",
                    config.channel_type(),
                    channel.channel_type
                )));
            }
            config.validate()?;
            channel.config = config;
        }

        self.channels.update(&channel).await?;
        Ok(channel)
    }

    /// Soft-delete a channel and remove its bindings. In-flight delivery
    /// units referencing the channel are not cancelled; they run to terminal
    /// state through the scheduler.
    pub async fn delete(&self, id: i64, actor_user_id: i64) -> Result<()> {
        let channel = self
            .channels
            .find_by_id(id)
            .await?
            .ok_or(NotifryError::not_found("channel", id))?;

        self.resolver
            .require(
                actor_user_id,
                &channel.ownership(MANAGE_ROLES),
                "you don't have permission to delete this channel",
            )
            .await?;

        let removed = self.bindings.delete_for_channel(id).await?;
        self.channels.soft_delete(id).await?;
        info!(
            channel_id = id,
            bindings_removed = removed,
            "Channel deleted"
        );
        Ok(())
    }
}
