//! Engine integration tests
//!
//! Exercises the full pipeline over the in-memory store: authorization,
//! binding invariants, fan-out, the delivery state machine and the retry
//! scheduler.

use std::sync::Arc;
use std::time::Duration;

use nf_common::{
    ChannelConfig, ChannelType, DeliveryOutcome, NotificationStatus, NotifryError, RetryPolicy,
    SchedulerConfig, TeamRole,
};
use nf_engine::{
    AuthorizationResolver, ChannelCatalog, ChannelTransport, CreateChannel, CreateSubscription,
    DeliveryRequest, DeliveryStateMachine, NotificationDispatcher, RetryScheduler, ScriptedTransport,
    SubscriptionCatalog, SubscriptionChannelBinder, TransportRegistry, UpdateChannel,
    UpdateSubscription,
};
use nf_store::{
    Channel, MembershipStore, MemoryStore, NotificationStore, Subscription, SubscriptionStore,
    TeamMembership,
};

struct Harness {
    store: Arc<MemoryStore>,
    binder: Arc<SubscriptionChannelBinder>,
    dispatcher: NotificationDispatcher,
    subscriptions: SubscriptionCatalog,
    channels: ChannelCatalog,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(AuthorizationResolver::new(store.clone()));
        let binder = Arc::new(SubscriptionChannelBinder::new(
            store.clone(),
            store.clone(),
            store.clone(),
            resolver.clone(),
        ));
        let dispatcher =
            NotificationDispatcher::new(store.clone(), store.clone(), binder.clone());
        let subscriptions = SubscriptionCatalog::new(store.clone(), resolver.clone());
        let channels = ChannelCatalog::new(store.clone(), store.clone(), resolver);
        Self {
            store,
            binder,
            dispatcher,
            subscriptions,
            channels,
        }
    }

    async fn add_member(&self, team_id: i64, user_id: i64, role: TeamRole) {
        MembershipStore::insert(
            self.store.as_ref(),
            TeamMembership::new(team_id, user_id, role),
        )
        .await
        .unwrap();
    }

    async fn personal_subscription(&self, user_id: i64) -> Subscription {
        SubscriptionStore::insert(
            self.store.as_ref(),
            Subscription::new("deploys", "", "deploy.finished", user_id, None),
        )
        .await
        .unwrap()
    }

    async fn team_subscription(&self, user_id: i64, team_id: i64) -> Subscription {
        SubscriptionStore::insert(
            self.store.as_ref(),
            Subscription::new("deploys", "", "deploy.finished", user_id, Some(team_id)),
        )
        .await
        .unwrap()
    }

    async fn webhook_channel(&self, user_id: i64, team_id: Option<i64>) -> Channel {
        nf_store::ChannelStore::insert(
            self.store.as_ref(),
            Channel::new(
                "hook",
                "",
                ChannelConfig::Webhook {
                    url: "https://example.com/hook".to_string(),
                    secret: None,
                },
                user_id,
                team_id,
            )
            .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn email_channel(&self, user_id: i64, team_id: Option<i64>) -> Channel {
        nf_store::ChannelStore::insert(
            self.store.as_ref(),
            Channel::new(
                "mail",
                "",
                ChannelConfig::Email {
                    address: "ops@example.com".to_string(),
                },
                user_id,
                team_id,
            )
            .unwrap(),
        )
        .await
        .unwrap()
    }

    fn scheduler(
        &self,
        transport: Arc<ScriptedTransport>,
        policy: RetryPolicy,
        config: SchedulerConfig,
    ) -> RetryScheduler {
        let registry = Arc::new(
            TransportRegistry::new()
                .with_transport(ChannelType::Webhook, transport.clone())
                .with_transport(ChannelType::Email, transport),
        );
        let state_machine = Arc::new(DeliveryStateMachine::new(self.store.clone(), policy));
        RetryScheduler::new(
            self.store.clone(),
            self.store.clone(),
            registry,
            state_machine,
            config,
        )
    }
}

fn immediate_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: 0.0,
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(10),
        batch_size: 10,
        claim_lease: Duration::from_secs(60),
        attempt_timeout: Duration::from_millis(200),
    }
}

mod binder_tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_resolves_in_insertion_order_exactly_once() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let c1 = h.webhook_channel(1, None).await;
        let c2 = h.email_channel(1, None).await;
        let c3 = h.webhook_channel(1, None).await;

        h.binder.bind(sub.id, c2.id, 1).await.unwrap();
        h.binder.bind(sub.id, c1.id, 1).await.unwrap();
        h.binder.bind(sub.id, c3.id, 1).await.unwrap();

        let channels = h.binder.resolve_channels(sub.id).await.unwrap();
        let ids: Vec<i64> = channels.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c2.id, c1.id, c3.id]);
    }

    #[tokio::test]
    async fn test_duplicate_bind_is_an_error_without_duplicate_row() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;

        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        let err = h.binder.bind(sub.id, channel.id, 1).await.unwrap_err();
        assert!(matches!(err, NotifryError::AlreadyBound { .. }));
        assert_eq!(h.binder.resolve_channels(sub.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_team_pair_binds() {
        let h = Harness::new();
        h.add_member(10, 1, TeamRole::Admin).await;
        let sub = h.team_subscription(1, 10).await;
        let channel = h.webhook_channel(1, Some(10)).await;

        assert!(h.binder.bind(sub.id, channel.id, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_cross_team_pair_is_rejected() {
        let h = Harness::new();
        h.add_member(10, 1, TeamRole::Admin).await;
        h.add_member(11, 1, TeamRole::Admin).await;
        let sub = h.team_subscription(1, 10).await;
        let channel = h.webhook_channel(1, Some(11)).await;

        let err = h.binder.bind(sub.id, channel.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            NotifryError::CrossTenantBinding {
                subscription_team: 10,
                channel_team: 11,
            }
        ));
    }

    #[tokio::test]
    async fn test_mixed_personal_team_pair_is_allowed() {
        let h = Harness::new();
        h.add_member(10, 1, TeamRole::Owner).await;
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(2, Some(10)).await;

        // Personal subscription of user 1, team channel managed by user 1
        assert!(h.binder.bind(sub.id, channel.id, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_personal_channel_admits_only_its_owner() {
        // Team role on the subscription never substitutes for ownership of
        // a personal channel.
        let h = Harness::new();
        h.add_member(1, 100, TeamRole::Admin).await;
        h.add_member(1, 9, TeamRole::Admin).await;
        let s1 = h.team_subscription(100, 1).await;
        let c2 = h.email_channel(9, None).await;

        let err = h.binder.bind(s1.id, c2.id, 100).await.unwrap_err();
        assert!(matches!(err, NotifryError::Denied { .. }));

        // U9 manages both sides (admin of T1, owner of C2)
        assert!(h.binder.bind(s1.id, c2.id, 9).await.is_ok());
    }

    #[tokio::test]
    async fn test_team_member_cannot_bind() {
        let h = Harness::new();
        h.add_member(1, 5, TeamRole::Member).await;
        let sub = h.team_subscription(100, 1).await;
        let channel = h.webhook_channel(5, None).await;

        let err = h.binder.bind(sub.id, channel.id, 5).await.unwrap_err();
        assert!(matches!(err, NotifryError::Denied { .. }));
    }

    #[tokio::test]
    async fn test_bind_missing_resources_are_not_found() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;

        let err = h.binder.bind(sub.id, 999, 1).await.unwrap_err();
        assert!(matches!(err, NotifryError::NotFound { entity: "channel", .. }));

        let err = h.binder.bind(999, sub.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            NotifryError::NotFound {
                entity: "subscription",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unbind_authorizes_subscription_side_only() {
        let h = Harness::new();
        h.add_member(1, 9, TeamRole::Admin).await;
        h.add_member(1, 100, TeamRole::Admin).await;
        let sub = h.team_subscription(100, 1).await;
        let channel = h.email_channel(9, None).await;
        h.binder.bind(sub.id, channel.id, 9).await.unwrap();

        // User 100 cannot use the personal channel, but unbinding is a
        // subscription-management action, so it succeeds.
        h.binder.unbind(sub.id, channel.id, 100).await.unwrap();
        assert!(h.binder.resolve_channels(sub.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unbind_missing_binding_is_not_found() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;

        let err = h.binder.unbind(sub.id, channel.id, 1).await.unwrap_err();
        assert!(matches!(err, NotifryError::NotFound { .. }));
    }
}

mod dispatcher_tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_creates_one_pending_unit_per_channel() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        for _ in 0..3 {
            let channel = h.webhook_channel(1, None).await;
            h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        }

        let payload = serde_json::json!({"event": "deploy.finished", "sha": "abc123"});
        let units = h.dispatcher.dispatch(sub.id, &payload).await.unwrap();

        assert_eq!(units.len(), 3);
        for unit in &units {
            assert_eq!(unit.status, NotificationStatus::Pending);
            assert_eq!(unit.delivery_attempts, 0);
            assert_eq!(unit.event_payload, payload);
            assert!(unit.delivery_payload.is_none());
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_inactive_subscription_is_suppressed() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();

        h.subscriptions
            .update(
                sub.id,
                UpdateSubscription {
                    is_active: Some(false),
                    ..Default::default()
                },
                1,
            )
            .await
            .unwrap();

        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();
        assert!(units.is_empty());
        assert!(h
            .store
            .find_by_subscription(sub.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_with_no_channels_creates_nothing() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();
        assert!(units.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_to_unknown_subscription_is_not_found() {
        let h = Harness::new();
        let err = h
            .dispatcher
            .dispatch(404, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifryError::NotFound { .. }));
    }
}

mod scheduler_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_attempt_delivers_and_renders_payload() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::always_succeeding());
        let scheduler = h.scheduler(transport.clone(), immediate_policy(5), fast_config());

        assert_eq!(scheduler.run_once().await.unwrap(), 1);
        assert_eq!(transport.sent_count(), 1);

        let sent = transport.sent();
        assert_eq!(sent[0].attempt, 1);
        assert_eq!(sent[0].idempotency_key, format!("ntf-{}-1", units[0].id));

        let unit = NotificationStore::find_by_id(h.store.as_ref(), units[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.status, NotificationStatus::Delivered);
        assert!(unit.delivery_payload.is_some());
    }

    #[tokio::test]
    async fn test_failed_unit_waits_for_backoff() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        h.dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::always_failing("boom"));
        // Real backoff: the retry is scheduled in the future
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
            jitter: 0.0,
        };
        let scheduler = h.scheduler(transport.clone(), policy, fast_config());

        assert_eq!(scheduler.run_once().await.unwrap(), 1);
        // Not due again yet
        assert_eq!(scheduler.run_once().await.unwrap(), 0);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_through_scheduler() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::always_failing("still down"));
        let scheduler = h.scheduler(transport.clone(), immediate_policy(3), fast_config());

        scheduler.drain_now().await.unwrap();

        let unit = NotificationStore::find_by_id(h.store.as_ref(), units[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.status, NotificationStatus::Failed);
        assert_eq!(unit.delivery_attempts, 3);
        assert_eq!(unit.error_message.as_deref(), Some("still down"));
        assert_eq!(transport.sent_count(), 3);

        let logs = h.store.logs_for(unit.id).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| !l.success));
    }

    #[tokio::test]
    async fn test_recovery_before_exhaustion_delivers() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::always_succeeding());
        for _ in 0..4 {
            transport.push_outcome(DeliveryOutcome::failure(Some(502), "bad gateway"));
        }
        let scheduler = h.scheduler(transport.clone(), immediate_policy(5), fast_config());

        scheduler.drain_now().await.unwrap();

        let unit = NotificationStore::find_by_id(h.store.as_ref(), units[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.status, NotificationStatus::Delivered);
        assert_eq!(unit.delivery_attempts, 5);
        assert_eq!(transport.sent_count(), 5);
    }

    #[tokio::test]
    async fn test_racing_workers_attempt_a_unit_once() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        h.dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::always_succeeding());
        let worker_a = h.scheduler(transport.clone(), immediate_policy(5), fast_config());
        let worker_b = h.scheduler(transport.clone(), immediate_policy(5), fast_config());

        let (a, b) = tokio::join!(worker_a.run_once(), worker_b.run_once());
        assert_eq!(a.unwrap() + b.unwrap(), 1);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated_per_channel() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let good = h.webhook_channel(1, None).await;
        let bad = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, good.id, 1).await.unwrap();
        h.binder.bind(sub.id, bad.id, 1).await.unwrap();
        h.dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::always_failing("down"));
        transport.push_outcome(DeliveryOutcome::success(Some(200)));
        let scheduler = h.scheduler(transport.clone(), immediate_policy(2), fast_config());

        scheduler.drain_now().await.unwrap();

        let units = h.store.find_by_subscription(sub.id).await.unwrap();
        let statuses: Vec<NotificationStatus> = units.iter().map(|u| u.status).collect();
        assert!(statuses.contains(&NotificationStatus::Delivered));
        assert!(statuses.contains(&NotificationStatus::Failed));
    }

    #[tokio::test]
    async fn test_missing_transport_fails_the_attempt() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        // Discord has no registered transport in the harness registry
        let channel = nf_store::ChannelStore::insert(
            h.store.as_ref(),
            Channel::new(
                "disc",
                "",
                ChannelConfig::Discord {
                    webhook_url: "https://discord.com/api/webhooks/1/x".to_string(),
                },
                1,
                None,
            )
            .unwrap(),
        )
        .await
        .unwrap();
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::always_succeeding());
        let scheduler = h.scheduler(transport.clone(), immediate_policy(2), fast_config());
        scheduler.run_once().await.unwrap();

        let unit = NotificationStore::find_by_id(h.store.as_ref(), units[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.delivery_attempts, 1);
        assert!(unit
            .error_message
            .as_deref()
            .unwrap()
            .contains("no transport registered"));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_deleted_channel_exhausts_through_normal_path() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        h.channels.delete(channel.id, 1).await.unwrap();

        let transport = Arc::new(ScriptedTransport::always_succeeding());
        let scheduler = h.scheduler(transport.clone(), immediate_policy(2), fast_config());
        scheduler.drain_now().await.unwrap();

        let unit = NotificationStore::find_by_id(h.store.as_ref(), units[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.status, NotificationStatus::Failed);
        assert!(unit
            .error_message
            .as_deref()
            .unwrap()
            .contains("channel no longer available"));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_transport_times_out_as_failure() {
        struct SlowTransport;

        #[async_trait::async_trait]
        impl ChannelTransport for SlowTransport {
            async fn send(&self, _channel: &Channel, _request: &DeliveryRequest) -> DeliveryOutcome {
                tokio::time::sleep(Duration::from_secs(5)).await;
                DeliveryOutcome::success(Some(200))
            }
        }

        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();
        let units = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap();

        let registry = Arc::new(
            TransportRegistry::new()
                .with_transport(ChannelType::Webhook, Arc::new(SlowTransport)),
        );
        let state_machine = Arc::new(DeliveryStateMachine::new(
            h.store.clone(),
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(60),
                jitter: 0.0,
            },
        ));
        let scheduler = RetryScheduler::new(
            h.store.clone(),
            h.store.clone(),
            registry,
            state_machine,
            SchedulerConfig {
                attempt_timeout: Duration::from_millis(50),
                ..fast_config()
            },
        );

        scheduler.run_once().await.unwrap();

        let unit = NotificationStore::find_by_id(h.store.as_ref(), units[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.status, NotificationStatus::Pending);
        assert_eq!(unit.delivery_attempts, 1);
        assert!(unit.error_message.as_deref().unwrap().contains("timed out"));
    }
}

mod catalog_tests {
    use super::*;

    #[tokio::test]
    async fn test_team_channel_creation_requires_manage_role() {
        let h = Harness::new();
        h.add_member(1, 5, TeamRole::Member).await;
        h.add_member(1, 6, TeamRole::Admin).await;

        let input = CreateChannel {
            name: "ops".to_string(),
            description: String::new(),
            config: ChannelConfig::Webhook {
                url: "https://example.com".to_string(),
                secret: None,
            },
            team_id: Some(1),
        };

        let err = h.channels.create(input.clone(), 5).await.unwrap_err();
        assert!(matches!(err, NotifryError::Denied { .. }));
        assert!(h.channels.create(input, 6).await.is_ok());
    }

    #[tokio::test]
    async fn test_team_subscription_creation_requires_manage_role() {
        let h = Harness::new();
        h.add_member(1, 5, TeamRole::Member).await;

        let err = h
            .subscriptions
            .create(
                CreateSubscription {
                    name: "deploys".to_string(),
                    description: String::new(),
                    event_type: "deploy.finished".to_string(),
                    team_id: Some(1),
                },
                5,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifryError::Denied { .. }));
    }

    #[tokio::test]
    async fn test_channel_create_rejects_empty_config_field() {
        let h = Harness::new();
        let err = h
            .channels
            .create(
                CreateChannel {
                    name: "bad".to_string(),
                    description: String::new(),
                    config: ChannelConfig::Telegram {
                        chat_id: String::new(),
                    },
                    team_id: None,
                },
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifryError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_channel_update_cannot_change_type() {
        let h = Harness::new();
        let channel = h.webhook_channel(1, None).await;

        let err = h
            .channels
            .update(
                channel.id,
                UpdateChannel {
                    config: Some(ChannelConfig::Email {
                        address: "ops@example.com".to_string(),
                    }),
                    ..Default::default()
                },
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifryError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_channel_update_requires_permission() {
        let h = Harness::new();
        let channel = h.webhook_channel(1, None).await;

        let err = h
            .channels
            .update(
                channel.id,
                UpdateChannel {
                    name: Some("renamed".to_string()),
                    ..Default::default()
                },
                2,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifryError::Denied { .. }));
    }

    #[tokio::test]
    async fn test_channel_delete_removes_bindings() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        let channel = h.webhook_channel(1, None).await;
        h.binder.bind(sub.id, channel.id, 1).await.unwrap();

        h.channels.delete(channel.id, 1).await.unwrap();
        assert!(h.binder.resolve_channels(sub.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_subscription_no_longer_dispatches() {
        let h = Harness::new();
        let sub = h.personal_subscription(1).await;
        h.subscriptions.delete(sub.id, 1).await.unwrap();

        let err = h
            .dispatcher
            .dispatch(sub.id, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifryError::NotFound { .. }));
    }
}
