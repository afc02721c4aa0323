//! Notifry persistence layer
//!
//! Domain entities plus the store traits the engine is written against:
//! - `domain`: subscriptions, channels, bindings, memberships, delivery units
//! - `repository`: async store traits
//! - `memory`: in-memory implementation for tests and embedders
//! - `postgres` (feature `postgres`): sqlx-backed implementation

pub mod domain;
pub mod memory;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use domain::{
    Channel, DeliveryLog, Notification, Subscription, SubscriptionChannel, TeamMembership,
};
pub use memory::MemoryStore;
pub use repository::{
    BindingStore, ChannelStore, MembershipStore, NotificationStore, SubscriptionStore,
};
