//! `System.Subscribe` and `System.Unsubscribe`.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use weft_rpc::{Params, RpcError};

use super::registry::SubscriptionRegistry;
use crate::websocket::connection::Connection;

/// Method name namespace reserved for built-in methods.
pub const RESERVED_PREFIX: &str = "System.";

/// Subscription methods handled by the server itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinMethod {
    /// `System.Subscribe`.
    Subscribe,
    /// `System.Unsubscribe`.
    Unsubscribe,
}

impl BuiltinMethod {
    /// Resolve a wire method name.
    pub fn from_name(method: &str) -> Option<Self> {
        match method {
            "System.Subscribe" => Some(Self::Subscribe),
            "System.Unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }

    /// Wire method name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Subscribe => "System.Subscribe",
            Self::Unsubscribe => "System.Unsubscribe",
        }
    }
}

/// Decoded subscription call. The connection always comes from the
/// dispatching session, never from the wire.
#[derive(Debug)]
pub struct SubscriptionRequest<'a> {
    /// Topic name (non-empty).
    pub topic: String,
    /// Calling connection.
    pub connection: &'a mut Connection,
}

impl<'a> SubscriptionRequest<'a> {
    /// Decode `params` as a bare JSON string topic.
    pub fn from_params(params: &Params, connection: &'a mut Connection) -> Result<Self, RpcError> {
        let topic: String = params.require()?;
        if topic.is_empty() {
            return Err(RpcError::invalid_params("topic must not be empty"));
        }
        Ok(Self { topic, connection })
    }
}

/// Applies subscription changes to both the registry and the caller's
/// local topic set.
#[derive(Clone)]
pub struct SubscriptionService {
    registry: Arc<SubscriptionRegistry>,
}

impl SubscriptionService {
    /// Service over `registry`.
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Registry mutated by this service.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Run a built-in method.
    pub fn call(&self, method: BuiltinMethod, request: SubscriptionRequest<'_>) -> Value {
        match method {
            BuiltinMethod::Subscribe => self.subscribe(request),
            BuiltinMethod::Unsubscribe => self.unsubscribe(request),
        }
    }

    /// Add the caller to `topic`. Result `"ok"`.
    pub fn subscribe(&self, request: SubscriptionRequest<'_>) -> Value {
        let SubscriptionRequest { topic, connection } = request;
        let added = self.registry.add(&topic, connection.handle());
        debug!(conn_id = %connection.id(), topic = %topic, added, "subscribed");
        connection.insert_topic(topic);
        Value::from("ok")
    }

    /// Remove the caller from `topic`. Result `"ok"`, even if the caller
    /// was never subscribed.
    pub fn unsubscribe(&self, request: SubscriptionRequest<'_>) -> Value {
        let SubscriptionRequest { topic, connection } = request;
        let removed = self.registry.remove(&topic, connection.id());
        debug!(conn_id = %connection.id(), topic = %topic, removed, "unsubscribed");
        connection.remove_topic(&topic);
        Value::from("ok")
    }
}
