//! Subscription<->Channel binding
//!
//! The binder is the only creator and destroyer of junction rows. It enforces
//! the same-tenant invariant for team-scoped pairs and surfaces duplicate
//! bind attempts as errors so client-side bugs stay visible.

use crate::authz::AuthorizationResolver;
use nf_common::{NotifryError, Result, MANAGE_ROLES};
use nf_store::{
    BindingStore, Channel, ChannelStore, SubscriptionChannel, SubscriptionStore,
};
use std::sync::Arc;
use tracing::debug;

pub struct SubscriptionChannelBinder {
    subscriptions: Arc<dyn SubscriptionStore>,
    channels: Arc<dyn ChannelStore>,
    bindings: Arc<dyn BindingStore>,
    resolver: Arc<AuthorizationResolver>,
}

impl SubscriptionChannelBinder {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        channels: Arc<dyn ChannelStore>,
        bindings: Arc<dyn BindingStore>,
        resolver: Arc<AuthorizationResolver>,
    ) -> Self {
        Self {
            subscriptions,
            channels,
            bindings,
            resolver,
        }
    }

    /// Bind a channel to a subscription on behalf of `actor_user_id`.
    ///
    /// The actor must be allowed to manage both sides. When both resources
    /// are team-scoped they must belong to the same team; mixed
    /// personal/team pairs are allowed.
    pub async fn bind(
        &self,
        subscription_id: i64,
        channel_id: i64,
        actor_user_id: i64,
    ) -> Result<SubscriptionChannel> {
        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or(NotifryError::not_found("subscription", subscription_id))?;
        let channel = self
            .channels
            .find_by_id(channel_id)
            .await?
            .ok_or(NotifryError::not_found("channel", channel_id))?;

        self.resolver
            .require(
                actor_user_id,
                &subscription.ownership(MANAGE_ROLES),
                "you don't have permission to modify this subscription",
            )
            .await?;
        self.resolver
            .require(
                actor_user_id,
                &channel.ownership(MANAGE_ROLES),
                "you don't have permission to use this channel",
            )
            .await?;

        if let (Some(subscription_team), Some(channel_team)) =
            (subscription.team_id, channel.team_id)
        {
            if subscription_team != channel_team {
                return Err(NotifryError::CrossTenantBinding {
                    subscription_team,
                    channel_team,
                });
            }
        }

        if self.bindings.exists(subscription_id, channel_id).await? {
            return Err(NotifryError::AlreadyBound {
                subscription_id,
                channel_id,
            });
        }

        let binding = self
            .bindings
            .insert(SubscriptionChannel::new(subscription_id, channel_id))
            .await?;
        debug!(
            subscription_id = subscription_id,
            channel_id = channel_id,
            "Channel bound to subscription"
        );
        Ok(binding)
    }

    /// Unbind a channel. This is a subscription-management action, so only
    /// the subscription side is authorized. Deleting a binding that does not
    /// exist is reported as NotFound, not silently ignored.
    pub async fn unbind(
        &self,
        subscription_id: i64,
        channel_id: i64,
        actor_user_id: i64,
    ) -> Result<()> {
        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or(NotifryError::not_found("subscription", subscription_id))?;

        self.resolver
            .require(
                actor_user_id,
                &subscription.ownership(MANAGE_ROLES),
                "you don't have permission to modify this subscription",
            )
            .await?;

        if !self.bindings.delete(subscription_id, channel_id).await? {
            return Err(NotifryError::not_found("binding", channel_id));
        }
        debug!(
            subscription_id = subscription_id,
            channel_id = channel_id,
            "Channel unbound from subscription"
        );
        Ok(())
    }

    /// All channels currently bound, in binding-creation order. The ordering
    /// matters for deterministic fixtures, not delivery priority.
    pub async fn resolve_channels(&self, subscription_id: i64) -> Result<Vec<Channel>> {
        Ok(self
            .bindings
            .channels_for_subscription(subscription_id)
            .await?)
    }
}
