//! Notifry fan-out and delivery engine
//!
//! This crate provides the core notification pipeline:
//! - AuthorizationResolver: allow/deny over personal vs. team-scoped ownership
//! - SubscriptionChannelBinder: the Subscription<->Channel junction with
//!   same-tenant and no-duplicate invariants
//! - Catalog services: subscription/channel CRUD with role gates
//! - NotificationDispatcher: one pending delivery unit per bound channel
//! - DeliveryStateMachine: pending -> delivered | failed with bounded retries
//! - RetryScheduler: claims due units under a lease and drives transports
//! - transport: the ChannelTransport contract plus webhook/discord senders

pub mod authz;
pub mod binder;
pub mod catalog;
pub mod dispatcher;
pub mod scheduler;
pub mod state_machine;
pub mod transport;

pub use authz::{AuthorizationResolver, Decision};
pub use binder::SubscriptionChannelBinder;
pub use catalog::{
    ChannelCatalog, CreateChannel, CreateSubscription, SubscriptionCatalog, UpdateChannel,
    UpdateSubscription,
};
pub use dispatcher::NotificationDispatcher;
pub use scheduler::RetryScheduler;
pub use state_machine::DeliveryStateMachine;
pub use transport::{
    ChannelTransport, DeliveryRequest, ScriptedTransport, TransportRegistry,
    render_delivery_payload,
};
pub use transport::webhook::{WebhookTransport, WebhookTransportConfig};
pub use transport::discord::DiscordTransport;

pub use nf_common::{NotifryError, Result};
