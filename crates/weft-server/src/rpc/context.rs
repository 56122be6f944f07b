//! Per-call context handed to method handlers.

use crate::pubsub::Publisher;
use crate::websocket::connection::ConnectionId;

/// What a handler knows about the call it is serving.
#[derive(Clone)]
pub struct CallContext {
    /// Connection the call arrived on.
    pub connection_id: ConnectionId,
    /// Publisher for pushing topic messages from inside a handler.
    pub publisher: Publisher,
}

impl CallContext {
    /// Context for a call on `connection_id`.
    pub fn new(connection_id: ConnectionId, publisher: Publisher) -> Self {
        Self {
            connection_id,
            publisher,
        }
    }
}
