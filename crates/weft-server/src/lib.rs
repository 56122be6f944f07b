//! # weft-server
//!
//! Axum `WebSocket` server that carries JSON-RPC calls and topic
//! publish/subscribe over the same long-lived connections.
//!
//! - `/ws`: per-connection read/dispatch task plus a writer task draining a
//!   bounded outbound queue
//! - `System.Subscribe` / `System.Unsubscribe` built into the dispatch path
//! - [`pubsub::Publisher`] fans topic messages out without ever blocking
//! - `/health` and `/metrics` (Prometheus) endpoints
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod pubsub;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use pubsub::{BackpressurePolicy, PublishReport, Publisher, SubscriptionRegistry};
pub use rpc::{CallContext, MethodHandler, MethodRegistry, RegistryError};
pub use server::WeftServer;
pub use websocket::connection::{Connection, ConnectionHandle, ConnectionId, ConnectionState};
