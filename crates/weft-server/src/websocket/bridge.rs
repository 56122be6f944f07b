//! Protocol bridge: one inbound frame in, at most one response out.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, instrument, warn};
use weft_rpc::{DecodeError, ReplyTarget, RpcCall, RpcError, RpcResponse, decode_call};

use super::connection::{Connection, Frame};
use crate::metrics::record_call;
use crate::pubsub::{
    BuiltinMethod, Publisher, SubscriptionRegistry, SubscriptionRequest, SubscriptionService,
};
use crate::rpc::{CallContext, MethodRegistry};

/// Decodes calls, routes them to built-ins or registered methods, and
/// builds the response.
pub struct Bridge {
    methods: Arc<MethodRegistry>,
    subscriptions: SubscriptionService,
    publisher: Publisher,
}

impl Bridge {
    /// Bridge over a method registry and a subscription registry.
    pub fn new(methods: Arc<MethodRegistry>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            methods,
            subscriptions: SubscriptionService::new(registry.clone()),
            publisher: Publisher::new(registry),
        }
    }

    /// Publisher handed to method handlers.
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Subscription registry shared with the publisher.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.subscriptions.registry()
    }

    /// Registered methods.
    pub fn methods(&self) -> &Arc<MethodRegistry> {
        &self.methods
    }

    /// Handle one inbound frame.
    ///
    /// Returns the response to send, or `None` for notifications and for
    /// frames too broken to address a reply to.
    #[instrument(skip_all, fields(method))]
    pub async fn handle_frame(&self, frame: &str, conn: &mut Connection) -> Option<RpcResponse> {
        let call = match decode_call(frame) {
            Ok(call) => call,
            Err(DecodeError { reply, error }) => {
                warn!(code = error.code(), error = %error, "rejected inbound frame");
                return match reply {
                    ReplyTarget::Drop => None,
                    ReplyTarget::Id(id) => Some(RpcResponse::error(Some(id), &error)),
                    ReplyTarget::NullId => Some(RpcResponse::error(None, &error)),
                };
            }
        };

        let RpcCall { method, id, params } = call;
        let _ = tracing::Span::current().record("method", method.as_str());
        debug!(method = %method, ?id, "dispatching RPC");

        let result = match BuiltinMethod::from_name(&method) {
            Some(builtin) => {
                let start = Instant::now();
                let result = SubscriptionRequest::from_params(&params, conn)
                    .map(|request| self.subscriptions.call(builtin, request));
                record_call(&method, &result, start.elapsed());
                result
            }
            None => {
                let ctx = CallContext::new(conn.id().clone(), self.publisher.clone());
                self.methods.dispatch(&method, params, &ctx).await
            }
        };

        let Some(id) = id else {
            if let Err(err) = result {
                debug!(method = %method, code = err.code(), error = %err, "notification failed");
            }
            return None;
        };
        Some(match result {
            Ok(value) => RpcResponse::success(id, value),
            Err(err) => {
                debug!(method = %method, id, code = err.code(), "call failed");
                RpcResponse::error(Some(id), &err)
            }
        })
    }
}

/// Encode a response as a frame.
///
/// If the response itself cannot be encoded, a `Serialization` error for
/// the same id is sent instead.
pub fn encode_response(response: &RpcResponse) -> Option<Frame> {
    match response.to_frame() {
        Ok(text) => Some(text.into()),
        Err(err) => {
            warn!(error = %err, "failed to encode response");
            match RpcResponse::error(response.id, &err).to_frame() {
                Ok(text) => Some(text.into()),
                Err(err) => {
                    error!(error = %err, "failed to encode error response");
                    None
                }
            }
        }
    }
}
