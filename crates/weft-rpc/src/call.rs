//! Inbound call decoding.
//!
//! Only the stable envelope fields (`method`, `id`) are interpreted here.
//! `params` is captured as raw JSON and handed to the target method, which
//! decodes it into its own type.

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::errors::RpcError;
use crate::params::Params;

/// A decoded call envelope.
#[derive(Clone, Debug)]
pub struct RpcCall {
    /// Method name (e.g. `System.Subscribe`).
    pub method: String,
    /// Request identifier; `None` marks a notification.
    pub id: Option<u64>,
    /// Undecoded params.
    pub params: Params,
}

impl RpcCall {
    /// Whether the peer expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Where the error reply for a rejected frame should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyTarget {
    /// No usable identifier: log and drop.
    Drop,
    /// The frame's own identifier.
    Id(u64),
    /// An identifier was sent but could not be read; reply with `"id": null`.
    NullId,
}

/// A frame that could not be turned into an [`RpcCall`].
#[derive(Clone, Debug)]
pub struct DecodeError {
    /// Reply addressing for the error response.
    pub reply: ReplyTarget,
    /// What went wrong.
    pub error: RpcError,
}

impl DecodeError {
    fn malformed(reply: ReplyTarget, message: impl Into<String>) -> Self {
        Self {
            reply,
            error: RpcError::MalformedRequest {
                message: message.into(),
            },
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    method: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    params: Option<Box<RawValue>>,
}

/// Decode one text frame into a call envelope.
pub fn decode_call(frame: &str) -> Result<RpcCall, DecodeError> {
    // A derived struct also accepts JSON arrays positionally.
    if !frame.trim_start().starts_with('{') {
        return Err(DecodeError::malformed(
            ReplyTarget::Drop,
            "frame is not a JSON object",
        ));
    }

    let envelope: Envelope = serde_json::from_str(frame)
        .map_err(|e| DecodeError::malformed(recover_reply(frame), e.to_string()))?;

    let id = match envelope.id {
        None => None,
        Some(value) => Some(parse_id(&value)?),
    };
    let reply = id.map_or(ReplyTarget::Drop, ReplyTarget::Id);

    let method = match envelope.method {
        Some(Value::String(method)) => method,
        Some(other) => {
            return Err(DecodeError::malformed(
                reply,
                format!("'method' must be a string, got {other}"),
            ));
        }
        None => return Err(DecodeError::malformed(reply, "missing 'method'")),
    };

    Ok(RpcCall {
        method,
        id,
        params: Params::from_raw(envelope.params),
    })
}

/// Reply addressing for an object the envelope rejected (duplicate keys).
/// A plain map keeps the last value of a repeated key, so the id is often
/// still readable.
fn recover_reply(frame: &str) -> ReplyTarget {
    let Ok(map) = serde_json::from_str::<Map<String, Value>>(frame) else {
        return ReplyTarget::Drop;
    };
    match map.get("id") {
        None | Some(Value::Null) => ReplyTarget::Drop,
        Some(value) => parse_id(value).map_or(ReplyTarget::NullId, ReplyTarget::Id),
    }
}

/// Identifiers must be integers in `0..=u64::MAX`. Integral floats such as
/// `1.0` or `1e2` count; fractions, negatives and larger values are rejected
/// rather than truncated.
fn parse_id(value: &Value) -> Result<u64, DecodeError> {
    value
        .as_u64()
        .or_else(|| value.as_f64().and_then(integral_f64))
        .ok_or_else(|| DecodeError {
            reply: ReplyTarget::NullId,
            error: RpcError::InvalidIdentifier {
                message: format!("expected a non-negative integer, got {value}"),
            },
        })
}

/// 2^64, exactly representable as `f64`.
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
fn integral_f64(n: f64) -> Option<u64> {
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n < U64_LIMIT).then_some(n as u64)
}
