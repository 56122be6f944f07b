//! `WebSocket` side of the server: connection state, transport, protocol
//! bridge, and the per-connection session loop.

pub mod bridge;
pub mod connection;
pub mod session;
pub mod transport;
