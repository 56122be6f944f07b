//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::pubsub::SubscriptionRegistry;

/// Liveness plus a snapshot of connection and subscription load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"draining"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live `WebSocket` connections.
    pub connections: usize,
    /// Topics with at least one subscriber.
    pub topics: usize,
    /// Total (topic, connection) memberships.
    pub subscriptions: usize,
}

impl HealthResponse {
    /// Read the current counters.
    pub fn collect(
        start_time: Instant,
        connections: usize,
        registry: &SubscriptionRegistry,
        draining: bool,
    ) -> Self {
        Self {
            status: if draining { "draining" } else { "ok" },
            uptime_secs: start_time.elapsed().as_secs(),
            connections,
            topics: registry.topic_count(),
            subscriptions: registry.membership_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Connection;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn empty_registry() {
        let resp = HealthResponse::collect(Instant::now(), 0, &SubscriptionRegistry::new(), false);
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.topics, 0);
        assert_eq!(resp.subscriptions, 0);
    }

    #[test]
    fn counts_topics_and_memberships() {
        let registry = SubscriptionRegistry::new();
        let (a, _rx_a) = Connection::open(4, CancellationToken::new());
        let (b, _rx_b) = Connection::open(4, CancellationToken::new());
        let _ = registry.add("news", a.handle());
        let _ = registry.add("news", b.handle());
        let _ = registry.add("sports", b.handle());

        let resp = HealthResponse::collect(Instant::now(), 2, &registry, false);
        assert_eq!(resp.connections, 2);
        assert_eq!(resp.topics, 2);
        assert_eq!(resp.subscriptions, 3);
    }

    #[test]
    fn draining_status() {
        let resp = HealthResponse::collect(Instant::now(), 0, &SubscriptionRegistry::new(), true);
        assert_eq!(resp.status, "draining");
    }

    #[test]
    fn uptime_from_start() {
        let start = Instant::now().checked_sub(Duration::from_secs(90)).unwrap();
        let resp = HealthResponse::collect(start, 0, &SubscriptionRegistry::new(), false);
        assert!(resp.uptime_secs >= 89);
    }

    #[test]
    fn wire_fields() {
        let resp = HealthResponse::collect(Instant::now(), 1, &SubscriptionRegistry::new(), false);
        let v = serde_json::to_value(&resp).unwrap();
        for key in ["status", "uptime_secs", "connections", "topics", "subscriptions"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }
}
