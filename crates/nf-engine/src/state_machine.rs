//! Delivery state machine
//!
//! Sole writer of a unit's `status`, `delivery_attempts`, `next_retry` and
//! `delivered_at`. Every write is conditioned on the attempt count read
//! beforehand, so a lost race is detected and re-evaluated rather than
//! overwritten.

use chrono::Utc;
use nf_common::{DeliveryOutcome, NotificationStatus, NotifryError, Result, RetryPolicy};
use nf_store::{DeliveryLog, Notification, NotificationStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_CONFLICT_RETRIES: u32 = 3;

pub struct DeliveryStateMachine {
    notifications: Arc<dyn NotificationStore>,
    policy: RetryPolicy,
}

impl DeliveryStateMachine {
    pub fn new(notifications: Arc<dyn NotificationStore>, policy: RetryPolicy) -> Self {
        Self {
            notifications,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record the outcome of a transport attempt for `unit_id`.
    ///
    /// Success is terminal. Failure schedules a backoff retry until the
    /// attempt budget is exhausted, then marks the unit failed. Invoking this
    /// on an already-terminal unit is a warned no-op: the scheduler wakes
    /// at-least-once and must tolerate duplicate wake-ups.
    pub async fn record_attempt(
        &self,
        unit_id: i64,
        outcome: &DeliveryOutcome,
    ) -> Result<Notification> {
        self.record_attempt_rendered(unit_id, None, outcome).await
    }

    /// Like `record_attempt`, additionally persisting the transport-specific
    /// rendering produced just before the send.
    pub async fn record_attempt_rendered(
        &self,
        unit_id: i64,
        rendered_payload: Option<serde_json::Value>,
        outcome: &DeliveryOutcome,
    ) -> Result<Notification> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut unit = self
                .notifications
                .find_by_id(unit_id)
                .await?
                .ok_or(NotifryError::not_found("notification", unit_id))?;

            if unit.status.is_terminal() {
                warn!(
                    notification_id = unit_id,
                    status = unit.status.as_str(),
                    "Attempt recorded against terminal unit, ignoring"
                );
                return Ok(unit);
            }

            let expected = unit.delivery_attempts;
            let attempt = expected + 1;
            let now = Utc::now();

            unit.delivery_attempts = attempt;
            if let Some(rendered) = &rendered_payload {
                unit.delivery_payload.get_or_insert_with(|| rendered.clone());
            }

            let next_retry = if outcome.success {
                unit.status = NotificationStatus::Delivered;
                unit.delivered_at = Some(now);
                unit.error_message = None;
                unit.next_retry = None;
                None
            } else if attempt >= self.policy.max_attempts {
                unit.status = NotificationStatus::Failed;
                unit.error_message = outcome.reason.clone();
                unit.next_retry = None;
                None
            } else {
                let delay = self.policy.backoff_delay(attempt);
                let at = now + chrono::Duration::from_std(delay).map_err(anyhow::Error::from)?;
                unit.status = NotificationStatus::Pending;
                unit.error_message = outcome.reason.clone();
                unit.next_retry = Some(at);
                Some(at)
            };

            // The conditional update decides ownership of attempt number
            // `attempt`; only the winner appends the log row.
            if self.notifications.update_attempt(&unit, expected).await? {
                self.notifications
                    .append_log(DeliveryLog::record(unit_id, attempt, outcome, next_retry))
                    .await?;

                match unit.status {
                    NotificationStatus::Delivered => info!(
                        notification_id = unit_id,
                        attempt = attempt,
                        "Delivered"
                    ),
                    NotificationStatus::Failed => warn!(
                        notification_id = unit_id,
                        attempts = attempt,
                        error = ?unit.error_message,
                        "Delivery failed permanently, attempts exhausted"
                    ),
                    NotificationStatus::Pending => debug!(
                        notification_id = unit_id,
                        attempt = attempt,
                        next_retry = ?unit.next_retry,
                        "Delivery failed, retry scheduled"
                    ),
                }
                return Ok(unit);
            }

            debug!(
                notification_id = unit_id,
                expected_attempts = expected,
                "Lost update race, re-reading unit"
            );
        }

        Err(NotifryError::Conflict(unit_id))
    }
}
