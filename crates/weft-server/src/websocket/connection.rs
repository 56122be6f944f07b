//! Per-connection state: identity, outbound queue, and subscribed topics.
//!
//! A connection is split in two:
//! - [`ConnectionHandle`]: cheap to clone, held by the subscription
//!   registry and publishers; can only enqueue frames and request close
//! - [`Connection`]: owned by the read task; holds the local topic set
//!   and is consumed by [`Connection::teardown`]

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::pubsub::SubscriptionRegistry;

/// One encoded outbound text frame, shared between subscribers.
pub type Frame = Arc<str>;

/// Opaque identity of one live transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh identifier (`conn_<uuid v7>`).
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// String form of the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Reading frames and accepting outbound frames.
    Open = 0,
    /// Close requested; no new frames are accepted.
    Closing = 1,
    /// Torn down and removed from every topic.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Result of handing a frame to a connection's outbound queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The frame will be written.
    Queued,
    /// The queue was full; the frame was discarded.
    Dropped,
    /// The connection is closing or closed.
    Closed,
}

struct Shared {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    token: CancellationToken,
    state: AtomicU8,
    dropped: AtomicU64,
    connected_at: Instant,
}

/// Shareable reference to a connection's outbound side.
///
/// Equality and hashing use the connection ID only.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Shared>,
}

impl ConnectionHandle {
    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether the connection still accepts frames.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && !self.inner.token.is_cancelled()
    }

    /// Close signal shared by the reader and writer tasks.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Frames discarded because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Time since the connection was established.
    pub fn age(&self) -> Duration {
        self.inner.connected_at.elapsed()
    }

    /// Enqueue without waiting. A full queue drops the frame.
    pub fn try_enqueue(&self, frame: Frame) -> EnqueueOutcome {
        if !self.is_open() {
            return EnqueueOutcome::Closed;
        }
        match self.inner.tx.try_send(frame) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Enqueue, waiting for space. Gives up once the connection closes.
    pub async fn enqueue(&self, frame: Frame) -> EnqueueOutcome {
        if !self.is_open() {
            return EnqueueOutcome::Closed;
        }
        tokio::select! {
            biased;
            () = self.inner.token.cancelled() => EnqueueOutcome::Closed,
            sent = self.inner.tx.send(frame) => match sent {
                Ok(()) => EnqueueOutcome::Queued,
                Err(_) => EnqueueOutcome::Closed,
            },
        }
    }

    /// Request close. Returns `true` only for the call that moved the
    /// connection out of `Open`; later calls are no-ops.
    pub fn close(&self) -> bool {
        let first = self
            .inner
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        self.inner.token.cancel();
        first
    }

    fn mark_closed(&self) {
        self.inner
            .state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("dropped", &self.drop_count())
            .finish()
    }
}

/// Read-side owner of a connection.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    topics: BTreeSet<String>,
}

impl Connection {
    /// Create a connection with a bounded outbound queue.
    ///
    /// `token` is the close signal; pass a child of the server's shutdown
    /// token so shutdown closes every connection.
    pub fn open(capacity: usize, token: CancellationToken) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = ConnectionHandle {
            inner: Arc::new(Shared {
                id: ConnectionId::new(),
                tx,
                token,
                state: AtomicU8::new(ConnectionState::Open as u8),
                dropped: AtomicU64::new(0),
                connected_at: Instant::now(),
            }),
        };
        let conn = Self {
            handle,
            topics: BTreeSet::new(),
        };
        (conn, rx)
    }

    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        self.handle.id()
    }

    /// Shareable outbound handle.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Topics this connection is subscribed to, in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    /// Whether `topic` is in the local subscription set.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub(crate) fn insert_topic(&mut self, topic: String) {
        let _ = self.topics.insert(topic);
    }

    pub(crate) fn remove_topic(&mut self, topic: &str) {
        let _ = self.topics.remove(topic);
    }

    /// Close the connection and remove it from every subscribed topic.
    ///
    /// Consumes the connection, so cleanup runs exactly once. Returns the
    /// number of topic memberships removed.
    pub fn teardown(self, registry: &SubscriptionRegistry) -> usize {
        let _ = self.handle.close();
        let removed = registry.remove_all(self.topics.iter().map(String::as_str), self.id());
        self.handle.mark_closed();
        removed
    }
}
