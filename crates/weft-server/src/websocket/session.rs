//! WebSocket session lifecycle: handles a single connection from upgrade
//! through teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::bridge::{Bridge, encode_response};
use super::connection::{Connection, ConnectionHandle, EnqueueOutcome, Frame};
use super::transport::{self, FrameSink, FrameSource};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long teardown waits for the writer to flush queued frames after the
/// peer closed cleanly.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drain deadline after a read error or a close from our side. A peer in
/// either state is unlikely to read what is left, and the connection slot
/// stays held until the writer is gone.
const ABORTED_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a session's read loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the stream.
    PeerClosed,
    /// Reading from the transport failed.
    ReadError,
    /// The connection was closed from our side (writer failure, shutdown).
    Closed,
}

impl SessionEnd {
    /// How long teardown lets the writer flush before aborting it.
    pub fn drain_timeout(self) -> Duration {
        match self {
            Self::PeerClosed => WRITER_DRAIN_TIMEOUT,
            Self::ReadError | Self::Closed => ABORTED_DRAIN_TIMEOUT,
        }
    }
}

/// Run a session over an upgraded axum socket.
pub async fn run_ws_session(
    socket: WebSocket,
    connection: Connection,
    outbound: mpsc::Receiver<Frame>,
    bridge: Arc<Bridge>,
) -> SessionEnd {
    let (source, sink) = transport::split(socket);
    run_session(source, sink, connection, outbound, bridge).await
}

/// Run a session over any transport.
///
/// 1. Spawns the writer task draining `outbound` into `sink`
/// 2. Reads frames sequentially, dispatching each through the bridge and
///    enqueueing the response
/// 3. Stops on end-of-stream, read error, or close signal
/// 4. Tears down: closes the queue, removes every subscription, waits for
///    the writer to flush and close the transport
#[instrument(skip_all, fields(conn_id = %connection.id()))]
pub async fn run_session<S, K>(
    mut source: S,
    sink: K,
    mut connection: Connection,
    outbound: mpsc::Receiver<Frame>,
    bridge: Arc<Bridge>,
) -> SessionEnd
where
    S: FrameSource,
    K: FrameSink + 'static,
{
    let handle = connection.handle().clone();
    let token = handle.token().clone();

    info!("connection opened");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(write_loop(sink, outbound, handle.clone()));

    let end = loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break SessionEnd::Closed,
            next = source.recv() => next,
        };
        let text = match next {
            None => break SessionEnd::PeerClosed,
            Some(Err(e)) => {
                warn!(error = %e, "transport read failed");
                break SessionEnd::ReadError;
            }
            Some(Ok(text)) => text,
        };

        let response = tokio::select! {
            biased;
            () = token.cancelled() => break SessionEnd::Closed,
            response = bridge.handle_frame(&text, &mut connection) => response,
        };
        let Some(frame) = response.as_ref().and_then(encode_response) else {
            continue;
        };
        if handle.enqueue(frame).await == EnqueueOutcome::Closed {
            break SessionEnd::Closed;
        }
    };

    let removed = connection.teardown(bridge.registry());
    if tokio::time::timeout(end.drain_timeout(), &mut writer).await.is_err() {
        warn!(reason = ?end, "writer did not finish draining, aborting");
        writer.abort();
    }

    info!(
        reason = ?end,
        topics_removed = removed,
        dropped = handle.drop_count(),
        "connection closed"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(handle.age().as_secs_f64());
    end
}

/// Only task that touches the write half. Writes frames in queue order;
/// on close it flushes what is already queued, then closes the transport.
async fn write_loop<K: FrameSink>(
    mut sink: K,
    mut outbound: mpsc::Receiver<Frame>,
    handle: ConnectionHandle,
) {
    let token = handle.token().clone();
    loop {
        let frame = tokio::select! {
            biased;
            frame = outbound.recv() => frame,
            () = token.cancelled() => None,
        };
        let Some(frame) = frame else { break };
        if let Err(e) = sink.send(&frame).await {
            warn!(error = %e, "transport write failed");
            let _ = handle.close();
            return;
        }
    }

    outbound.close();
    while let Some(frame) = outbound.recv().await {
        if sink.send(&frame).await.is_err() {
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "transport close failed");
    }
}
