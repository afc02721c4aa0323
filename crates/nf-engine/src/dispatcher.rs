//! Notification fan-out
//!
//! One pending delivery unit per bound channel. Unit creation is not atomic
//! across channels; each unit is independently retried and observed, so a
//! partial fan-out is recoverable rather than rolled back.

use crate::binder::SubscriptionChannelBinder;
use nf_common::{NotifryError, Result};
use nf_store::{Notification, NotificationStore, SubscriptionStore};
use std::sync::Arc;
use tracing::{debug, info};

pub struct NotificationDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    notifications: Arc<dyn NotificationStore>,
    binder: Arc<SubscriptionChannelBinder>,
}

impl NotificationDispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        notifications: Arc<dyn NotificationStore>,
        binder: Arc<SubscriptionChannelBinder>,
    ) -> Self {
        Self {
            subscriptions,
            notifications,
            binder,
        }
    }

    /// Fan an event out to every channel bound to the subscription.
    ///
    /// Inactive subscriptions are suppressed (zero units, not an error), and
    /// a subscription with no bound channels legitimately produces zero
    /// units. Created units start pending with zero attempts and are due
    /// immediately.
    pub async fn dispatch(
        &self,
        subscription_id: i64,
        event_payload: &serde_json::Value,
    ) -> Result<Vec<Notification>> {
        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or(NotifryError::not_found("subscription", subscription_id))?;

        if !subscription.is_active {
            debug!(
                subscription_id = subscription_id,
                "Subscription inactive, suppressing dispatch"
            );
            return Ok(Vec::new());
        }

        let channels = self.binder.resolve_channels(subscription_id).await?;
        if channels.is_empty() {
            debug!(
                subscription_id = subscription_id,
                "No channels bound, nothing to dispatch"
            );
            return Ok(Vec::new());
        }

        let mut created = Vec::with_capacity(channels.len());
        for channel in &channels {
            let unit = self
                .notifications
                .insert(Notification::new(
                    subscription_id,
                    channel.id,
                    event_payload.clone(),
                ))
                .await?;
            created.push(unit);
        }

        info!(
            subscription_id = subscription_id,
            event_type = %subscription.event_type,
            units = created.len(),
            "Event fanned out"
        );
        Ok(created)
    }
}
