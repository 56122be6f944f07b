//! Outbound wire-format types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RpcError;

/// Protocol version stamped on every response.
pub const JSONRPC_VERSION: &str = "2.0";

/// Discriminator carried by every push notification.
pub const PUBLISH_TYPE: &str = "publish";

/// Response to a call that carried an identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed request identifier (`null` when the sent id was unreadable).
    pub id: Option<u64>,
    /// Exactly one of `result` / `error`.
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result-or-error half of a response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Method return value.
    Result(Value),
    /// Human-readable error message.
    Error(String),
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    /// Build an error response.
    pub fn error(id: Option<u64>, err: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            outcome: Outcome::Error(err.to_string()),
        }
    }

    /// Whether this response carries a result.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    /// Encode as a text frame.
    pub fn to_frame(&self) -> Result<String, RpcError> {
        serde_json::to_string(self).map_err(|e| RpcError::serialization(&e))
    }
}

/// Borrowed push notification, serialized once per publish.
#[derive(Serialize)]
pub struct PublishEnvelope<'a, T: Serialize + ?Sized> {
    #[serde(rename = "type")]
    kind: &'static str,
    topic: &'a str,
    data: &'a T,
}

impl<'a, T: Serialize + ?Sized> PublishEnvelope<'a, T> {
    /// Wrap a payload for `topic`.
    pub fn new(topic: &'a str, data: &'a T) -> Self {
        Self {
            kind: PUBLISH_TYPE,
            topic,
            data,
        }
    }

    /// Encode as a text frame.
    pub fn to_frame(&self) -> Result<String, RpcError> {
        serde_json::to_string(self).map_err(|e| RpcError::serialization(&e))
    }
}

/// Owned push notification, as read by clients.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PublishNotification {
    /// Always `"publish"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Topic the payload was published to.
    pub topic: String,
    /// Opaque payload.
    pub data: Value,
}
