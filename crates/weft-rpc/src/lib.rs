//! # weft-rpc
//!
//! JSON-RPC protocol layer shared by the server and its clients.
//!
//! - [`call`]: two-phase decoding of inbound call frames (envelope first,
//!   params deferred to the target method)
//! - [`params`]: opaque parameter payloads decoded on demand
//! - [`types`]: response and publish envelopes as they appear on the wire
//! - [`errors`]: the error taxonomy and its stable codes

#![deny(unsafe_code)]

pub mod call;
pub mod errors;
pub mod params;
pub mod types;

pub use call::{DecodeError, ReplyTarget, RpcCall, decode_call};
pub use errors::RpcError;
pub use params::Params;
pub use types::{Outcome, PublishEnvelope, PublishNotification, RpcResponse};
