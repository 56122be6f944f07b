//! Topic subscriptions and publishing.

pub mod publisher;
pub mod registry;
pub mod service;

pub use publisher::{BackpressurePolicy, PublishReport, Publisher};
pub use registry::SubscriptionRegistry;
pub use service::{BuiltinMethod, RESERVED_PREFIX, SubscriptionRequest, SubscriptionService};
