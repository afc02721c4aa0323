//! Retry scheduler
//!
//! Time-driven driver of the delivery pipeline: claim due units under a
//! lease, run the transport with a per-attempt timeout, and hand the outcome
//! to the state machine. Multiple scheduler instances may drain the same
//! store; the claim lease guarantees a unit is never attempted concurrently,
//! and an expired lease (worker crash) makes the unit eligible again.

use crate::state_machine::DeliveryStateMachine;
use crate::transport::{render_delivery_payload, DeliveryRequest, TransportRegistry};
use chrono::Utc;
use nf_common::{DeliveryOutcome, Result, SchedulerConfig};
use nf_store::{ChannelStore, Notification, NotificationStore};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub struct RetryScheduler {
    notifications: Arc<dyn NotificationStore>,
    channels: Arc<dyn ChannelStore>,
    transports: Arc<TransportRegistry>,
    state_machine: Arc<DeliveryStateMachine>,
    config: SchedulerConfig,
}

impl RetryScheduler {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        channels: Arc<dyn ChannelStore>,
        transports: Arc<TransportRegistry>,
        state_machine: Arc<DeliveryStateMachine>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            notifications,
            channels,
            transports,
            state_machine,
            config,
        }
    }

    /// Poll loop. One unit's failure never aborts the pass or the loop.
    pub async fn start(&self) {
        info!(
            poll_interval = ?self.config.poll_interval,
            batch_size = self.config.batch_size,
            "Starting retry scheduler"
        );
        loop {
            match self.run_once().await {
                Ok(0) => {}
                Ok(attempted) => debug!(attempted = attempted, "Scheduler pass complete"),
                Err(e) => error!(error = %e, "Scheduler pass failed"),
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Claim and attempt one batch of due units. Returns how many were
    /// claimed.
    pub async fn run_once(&self) -> Result<u32> {
        let due = self
            .notifications
            .claim_due(Utc::now(), self.config.claim_lease, self.config.batch_size)
            .await?;
        let claimed = due.len() as u32;

        for unit in due {
            let unit_id = unit.id;
            if let Err(e) = self.attempt(unit).await {
                error!(
                    notification_id = unit_id,
                    error = %e,
                    "Failed to record delivery attempt"
                );
            }
        }
        Ok(claimed)
    }

    async fn attempt(&self, unit: Notification) -> Result<()> {
        let attempt = unit.delivery_attempts + 1;

        // A channel deleted after binding does not cancel the unit; its
        // attempts fail through the normal path until exhaustion so the
        // history stays auditable.
        let channel = match self.channels.find_by_id(unit.channel_id).await? {
            Some(channel) => channel,
            None => {
                warn!(
                    notification_id = unit.id,
                    channel_id = unit.channel_id,
                    "Channel no longer available"
                );
                let outcome = DeliveryOutcome::failure(None, "channel no longer available");
                self.state_machine.record_attempt(unit.id, &outcome).await?;
                return Ok(());
            }
        };

        let rendered = unit
            .delivery_payload
            .clone()
            .unwrap_or_else(|| render_delivery_payload(&channel, &unit));
        let request = DeliveryRequest {
            notification_id: unit.id,
            attempt,
            idempotency_key: unit.idempotency_key(attempt),
            payload: rendered.clone(),
        };

        let outcome = match self.transports.get(channel.channel_type) {
            Some(transport) => {
                match tokio::time::timeout(
                    self.config.attempt_timeout,
                    transport.send(&channel, &request),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => DeliveryOutcome::failure(
                        None,
                        format!(
                            "attempt timed out after {:?}",
                            self.config.attempt_timeout
                        ),
                    ),
                }
            }
            None => DeliveryOutcome::failure(
                None,
                format!(
                    "no transport registered for {} channels",
                    channel.channel_type
                ),
            ),
        };

        self.state_machine
            .record_attempt_rendered(unit.id, Some(rendered), &outcome)
            .await?;
        Ok(())
    }

    /// Convenience for callers that dispatch and want the first attempt to
    /// happen immediately instead of waiting for the next poll.
    pub async fn drain_now(&self) -> Result<u32> {
        let mut total = 0;
        loop {
            let attempted = self.run_once().await?;
            if attempted == 0 {
                return Ok(total);
            }
            total += attempted;
        }
    }
}
