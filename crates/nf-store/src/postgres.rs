//! Postgres store
//!
//! sqlx-backed implementation of the store traits. `claim_due` uses
//! `FOR UPDATE SKIP LOCKED` so parallel schedulers never claim the same unit,
//! and `update_attempt` is conditioned on the attempt count read by the
//! caller (optimistic concurrency).

use crate::domain::{
    Channel, DeliveryLog, Notification, Subscription, SubscriptionChannel, TeamMembership,
};
use crate::repository::{
    BindingStore, ChannelStore, MembershipStore, NotificationStore, SubscriptionStore,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nf_common::{ChannelType, NotificationStatus, TeamRole};
use sqlx::postgres::PgRow;
use sqlx::{Executor, PgPool, Row};
use std::time::Duration;
use tracing::info;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist. Statements run over
    /// the simple protocol, so the whole script executes in one round trip.
    pub async fn init_schema(&self) -> Result<()> {
        self.pool
            .execute(
                r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                event_type TEXT NOT NULL,
                team_id BIGINT,
                user_id BIGINT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS channels (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                channel_type TEXT NOT NULL,
                config TEXT NOT NULL,
                team_id BIGINT,
                user_id BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS subscription_channels (
                id BIGSERIAL PRIMARY KEY,
                subscription_id BIGINT NOT NULL REFERENCES subscriptions(id),
                channel_id BIGINT NOT NULL REFERENCES channels(id),
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (subscription_id, channel_id)
            );
            CREATE TABLE IF NOT EXISTS team_memberships (
                id BIGSERIAL PRIMARY KEY,
                team_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                role TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (team_id, user_id)
            );
            CREATE TABLE IF NOT EXISTS notifications (
                id BIGSERIAL PRIMARY KEY,
                subscription_id BIGINT NOT NULL,
                channel_id BIGINT NOT NULL,
                event_payload TEXT NOT NULL,
                delivery_payload TEXT,
                status TEXT NOT NULL,
                delivery_attempts INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                next_retry TIMESTAMPTZ,
                in_flight_until TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                delivered_at TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_due
                ON notifications(status, next_retry, in_flight_until);
            CREATE TABLE IF NOT EXISTS delivery_logs (
                id TEXT PRIMARY KEY,
                notification_id BIGINT NOT NULL REFERENCES notifications(id),
                attempt INTEGER NOT NULL,
                attempted_at TIMESTAMPTZ NOT NULL,
                success BOOLEAN NOT NULL,
                response_code INTEGER,
                error TEXT,
                next_retry TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_delivery_logs_notification
                ON delivery_logs(notification_id);
            "#,
            )
            .await?;
        info!("Notification schema ready");
        Ok(())
    }
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    Ok(Subscription {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        event_type: row.get("event_type"),
        team_id: row.get("team_id"),
        user_id: row.get("user_id"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

fn channel_from_row(row: &PgRow) -> Result<Channel> {
    let type_str: String = row.get("channel_type");
    let channel_type = ChannelType::parse(&type_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown channel type: {}", type_str))?;
    Ok(Channel {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        channel_type,
        config: serde_json::from_str(row.get("config"))?,
        team_id: row.get("team_id"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let status_str: String = row.get("status");
    let status = NotificationStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown notification status: {}", status_str))?;
    let delivery_payload: Option<String> = row.get("delivery_payload");
    Ok(Notification {
        id: row.get("id"),
        subscription_id: row.get("subscription_id"),
        channel_id: row.get("channel_id"),
        event_payload: serde_json::from_str(row.get("event_payload"))?,
        delivery_payload: delivery_payload
            .map(|p| serde_json::from_str(&p))
            .transpose()?,
        status,
        delivery_attempts: row.get::<i32, _>("delivery_attempts") as u32,
        error_message: row.get("error_message"),
        next_retry: row.get("next_retry"),
        in_flight_until: row.get("in_flight_until"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        delivered_at: row.get("delivered_at"),
    })
}

fn delivery_log_from_row(row: &PgRow) -> Result<DeliveryLog> {
    Ok(DeliveryLog {
        id: row.get("id"),
        notification_id: row.get("notification_id"),
        attempt: row.get::<i32, _>("attempt") as u32,
        attempted_at: row.get("attempted_at"),
        success: row.get("success"),
        response_code: row.get::<Option<i32>, _>("response_code").map(|c| c as u16),
        error: row.get("error"),
        next_retry: row.get("next_retry"),
    })
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn insert(&self, mut subscription: Subscription) -> Result<Subscription> {
        let row = sqlx::query(
            r#"
            INSERT INTO subscriptions
                (name, description, event_type, team_id, user_id, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&subscription.name)
        .bind(&subscription.description)
        .bind(&subscription.event_type)
        .bind(subscription.team_id)
        .bind(subscription.user_id)
        .bind(subscription.is_active)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .fetch_one(&self.pool)
        .await?;

        subscription.id = row.get("id");
        Ok(subscription)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn update(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET name = $1, description = $2, event_type = $3, is_active = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&subscription.name)
        .bind(&subscription.description)
        .bind(&subscription.event_type)
        .bind(subscription.is_active)
        .bind(Utc::now())
        .bind(subscription.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChannelStore for PgStore {
    async fn insert(&self, mut channel: Channel) -> Result<Channel> {
        let row = sqlx::query(
            r#"
            INSERT INTO channels
                (name, description, channel_type, config, team_id, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&channel.name)
        .bind(&channel.description)
        .bind(channel.channel_type.as_str())
        .bind(serde_json::to_string(&channel.config)?)
        .bind(channel.team_id)
        .bind(channel.user_id)
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .fetch_one(&self.pool)
        .await?;

        channel.id = row.get("id");
        Ok(channel)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>> {
        let row = sqlx::query("SELECT * FROM channels WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(channel_from_row).transpose()
    }

    async fn update(&self, channel: &Channel) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE channels
            SET name = $1, description = $2, config = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(&channel.name)
        .bind(&channel.description)
        .bind(serde_json::to_string(&channel.config)?)
        .bind(Utc::now())
        .bind(channel.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE channels SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BindingStore for PgStore {
    async fn insert(&self, mut binding: SubscriptionChannel) -> Result<SubscriptionChannel> {
        let row = sqlx::query(
            r#"
            INSERT INTO subscription_channels (subscription_id, channel_id, created_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(binding.subscription_id)
        .bind(binding.channel_id)
        .bind(binding.created_at)
        .fetch_one(&self.pool)
        .await?;

        binding.id = row.get("id");
        Ok(binding)
    }

    async fn exists(&self, subscription_id: i64, channel_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM subscription_channels WHERE subscription_id = $1 AND channel_id = $2",
        )
        .bind(subscription_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn delete(&self, subscription_id: i64, channel_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM subscription_channels WHERE subscription_id = $1 AND channel_id = $2",
        )
        .bind(subscription_id)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_channel(&self, channel_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM subscription_channels WHERE channel_id = $1")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn channels_for_subscription(&self, subscription_id: i64) -> Result<Vec<Channel>> {
        let rows = sqlx::query(
            r#"
            SELECT c.*
            FROM subscription_channels sc
            JOIN channels c ON c.id = sc.channel_id
            WHERE sc.subscription_id = $1 AND c.deleted_at IS NULL
            ORDER BY sc.created_at, sc.id
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(channel_from_row).collect()
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn insert(&self, mut membership: TeamMembership) -> Result<TeamMembership> {
        let row = sqlx::query(
            r#"
            INSERT INTO team_memberships (team_id, user_id, role, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(membership.team_id)
        .bind(membership.user_id)
        .bind(membership.role.as_str())
        .bind(membership.created_at)
        .fetch_one(&self.pool)
        .await?;

        membership.id = row.get("id");
        Ok(membership)
    }

    async fn find(&self, team_id: i64, user_id: i64) -> Result<Option<TeamMembership>> {
        let row =
            sqlx::query("SELECT * FROM team_memberships WHERE team_id = $1 AND user_id = $2")
                .bind(team_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|row| {
            let role_str: String = row.get("role");
            let role = TeamRole::parse(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Unknown team role: {}", role_str))?;
            Ok(TeamMembership {
                id: row.get("id"),
                team_id: row.get("team_id"),
                user_id: row.get("user_id"),
                role,
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, mut notification: Notification) -> Result<Notification> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications
                (subscription_id, channel_id, event_payload, status, delivery_attempts,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(notification.subscription_id)
        .bind(notification.channel_id)
        .bind(serde_json::to_string(&notification.event_payload)?)
        .bind(notification.status.as_str())
        .bind(notification.delivery_attempts as i32)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .fetch_one(&self.pool)
        .await?;

        notification.id = row.get("id");
        Ok(notification)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn find_by_subscription(&self, subscription_id: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE subscription_id = $1 ORDER BY created_at",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let lease_until = now + chrono::Duration::from_std(lease)?;

        let rows = sqlx::query(
            r#"
            UPDATE notifications
            SET in_flight_until = $1
            WHERE id IN (
                SELECT id FROM notifications
                WHERE status = 'pending'
                  AND (next_retry IS NULL OR next_retry <= $2)
                  AND (in_flight_until IS NULL OR in_flight_until <= $2)
                ORDER BY created_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(lease_until)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn update_attempt(
        &self,
        notification: &Notification,
        expected_attempts: u32,
    ) -> Result<bool> {
        let delivery_payload = notification
            .delivery_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1,
                delivery_attempts = $2,
                delivery_payload = $3,
                error_message = $4,
                next_retry = $5,
                delivered_at = $6,
                in_flight_until = NULL,
                updated_at = $7
            WHERE id = $8 AND delivery_attempts = $9
            "#,
        )
        .bind(notification.status.as_str())
        .bind(notification.delivery_attempts as i32)
        .bind(delivery_payload)
        .bind(&notification.error_message)
        .bind(notification.next_retry)
        .bind(notification.delivered_at)
        .bind(Utc::now())
        .bind(notification.id)
        .bind(expected_attempts as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_log(&self, log: DeliveryLog) -> Result<DeliveryLog> {
        sqlx::query(
            r#"
            INSERT INTO delivery_logs
                (id, notification_id, attempt, attempted_at, success, response_code, error, next_retry)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&log.id)
        .bind(log.notification_id)
        .bind(log.attempt as i32)
        .bind(log.attempted_at)
        .bind(log.success)
        .bind(log.response_code.map(|c| c as i32))
        .bind(&log.error)
        .bind(log.next_retry)
        .execute(&self.pool)
        .await?;
        Ok(log)
    }

    async fn logs_for(&self, notification_id: i64) -> Result<Vec<DeliveryLog>> {
        let rows = sqlx::query(
            "SELECT * FROM delivery_logs WHERE notification_id = $1 ORDER BY attempt",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(delivery_log_from_row).collect()
    }
}
