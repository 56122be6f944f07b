//! Message transport seam between sessions and the socket.
//!
//! Sessions only see whole text frames: [`FrameSource`] yields them,
//! [`FrameSink`] writes them. The axum `WebSocket` halves implement both;
//! [`memory`] provides a channel-backed pair for tests.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

/// Transport failure. Never sent to the peer; it ends the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The other side is gone.
    #[error("transport closed")]
    Closed,
    /// Protocol or I/O failure reported by the socket.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl TransportError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Closed => "TRANSPORT_CLOSED",
            Self::WebSocket(_) => "TRANSPORT_ERROR",
        }
    }
}

/// Inbound half of a transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame; `None` at end of stream.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}

/// Outbound half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Close the transport. Calling it more than once is harmless.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an axum `WebSocket`.
pub struct WsSource(SplitStream<WebSocket>);

/// Write half of an axum `WebSocket`.
pub struct WsSink(SplitSink<WebSocket, Message>);

/// Split an upgraded socket into transport halves.
pub fn split(socket: WebSocket) -> (WsSource, WsSink) {
    let (sink, stream) = socket.split();
    (WsSource(stream), WsSink(sink))
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let msg = match self.0.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(TransportError::WebSocket(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!(len = data.len(), "dropping non-UTF-8 binary frame"),
                },
                Message::Close(_) => {
                    debug!("peer sent close frame");
                    return None;
                }
                // pongs are queued by the socket itself
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(frame.to_owned().into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(&mut self.0)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }
}

pub mod memory {
    //! Channel-backed transport for tests and in-process peers.

    use tokio::sync::mpsc;

    use super::{FrameSink, FrameSource, TransportError, async_trait};

    /// Server-side read half.
    pub struct MemorySource {
        rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    }

    /// Server-side write half.
    pub struct MemorySink {
        tx: Option<mpsc::UnboundedSender<String>>,
    }

    /// The remote end: feeds frames in and reads frames out.
    pub struct MemoryPeer {
        tx: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    /// Create a connected transport pair.
    pub fn pair() -> (MemorySource, MemorySink, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MemorySource { rx: in_rx },
            MemorySink { tx: Some(out_tx) },
            MemoryPeer {
                tx: Some(in_tx),
                rx: out_rx,
            },
        )
    }

    impl MemoryPeer {
        /// Deliver a frame to the server. Returns `false` once the server
        /// stopped reading.
        pub fn send(&self, frame: impl Into<String>) -> bool {
            self.tx
                .as_ref()
                .is_some_and(|tx| tx.send(Ok(frame.into())).is_ok())
        }

        /// Make the server's next read fail.
        pub fn fail(&self, message: &str) -> bool {
            self.tx.as_ref().is_some_and(|tx| {
                tx.send(Err(TransportError::WebSocket(message.to_owned())))
                    .is_ok()
            })
        }

        /// End the inbound stream (the server sees end-of-stream).
        pub fn disconnect(&mut self) {
            self.tx = None;
        }

        /// Stop accepting frames; subsequent server writes fail.
        pub fn stop_reading(&mut self) {
            self.rx.close();
        }

        /// Next frame written by the server; `None` once the server closed
        /// the transport and every frame was read.
        pub async fn recv(&mut self) -> Option<String> {
            self.rx.recv().await
        }

        /// A frame already written by the server, without waiting.
        pub fn try_recv(&mut self) -> Option<String> {
            self.rx.try_recv().ok()
        }
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn recv(&mut self) -> Option<Result<String, TransportError>> {
            self.rx.recv().await
        }
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
            let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
            tx.send(frame.to_owned()).map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.tx = None;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::pair;
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(TransportError::Closed.code(), "TRANSPORT_CLOSED");
        assert_eq!(
            TransportError::WebSocket("reset".into()).code(),
            "TRANSPORT_ERROR"
        );
        assert_eq!(
            TransportError::WebSocket("reset".into()).to_string(),
            "websocket error: reset"
        );
    }

    #[tokio::test]
    async fn memory_frames_flow_both_ways() {
        let (mut source, mut sink, mut peer) = pair();
        assert!(peer.send("hello"));
        assert_eq!(source.recv().await, Some(Ok("hello".to_owned())));

        sink.send("world").await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn memory_disconnect_ends_stream() {
        let (mut source, _sink, mut peer) = pair();
        peer.disconnect();
        assert_eq!(source.recv().await, None);
        assert!(!peer.send("late"));
    }

    #[tokio::test]
    async fn memory_fail_surfaces_error() {
        let (mut source, _sink, peer) = pair();
        assert!(peer.fail("reset"));
        assert_eq!(
            source.recv().await,
            Some(Err(TransportError::WebSocket("reset".into())))
        );
    }

    #[tokio::test]
    async fn memory_sink_close_ends_peer_stream() {
        let (_source, mut sink, mut peer) = pair();
        sink.send("last").await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("last"));
        assert_eq!(peer.recv().await, None);
        assert_eq!(sink.send("after").await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn memory_write_fails_when_peer_stops_reading() {
        let (_source, mut sink, mut peer) = pair();
        peer.stop_reading();
        assert_eq!(sink.send("x").await, Err(TransportError::Closed));
    }
}
