//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_settings::ServerSettings;

/// Runtime configuration for [`WeftServer`](crate::server::WeftServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Per-call time limit for registered methods, in milliseconds.
    pub handler_timeout_ms: u64,
    /// Maximum concurrent `WebSocket` connections.
    pub max_connections: usize,
}

impl ServerConfig {
    /// Handler time limit as a `Duration`.
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Outbound queue capacity, never zero.
    pub fn queue_capacity(&self) -> usize {
        self.send_queue_capacity.max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue_capacity: 256,
            max_message_size: 1024 * 1024,
            handler_timeout_ms: 30_000,
            max_connections: 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            send_queue_capacity: settings.send_queue_capacity,
            max_message_size: settings.max_message_size,
            handler_timeout_ms: settings.handler_timeout_ms,
            max_connections: settings.max_connections,
        }
    }
}
