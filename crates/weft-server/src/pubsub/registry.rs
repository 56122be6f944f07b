//! Topic → subscriber mapping shared by every connection.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::websocket::connection::{ConnectionHandle, ConnectionId};

type Subscribers = HashMap<ConnectionId, ConnectionHandle>;

/// Process-wide subscription table.
///
/// A topic key exists only while at least one connection is subscribed to
/// it. All operations serialize on one lock and never hold it across an
/// await point.
#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: Mutex<HashMap<String, Subscribers>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `conn` to `topic`. Returns `false` if it already was.
    pub fn add(&self, topic: &str, conn: &ConnectionHandle) -> bool {
        let mut topics = self.topics.lock();
        topics
            .entry(topic.to_owned())
            .or_default()
            .insert(conn.id().clone(), conn.clone())
            .is_none()
    }

    /// Unsubscribe `conn` from `topic`, pruning the topic when it empties.
    /// Returns `false` if there was nothing to remove.
    pub fn remove(&self, topic: &str, conn: &ConnectionId) -> bool {
        let mut topics = self.topics.lock();
        remove_locked(&mut topics, topic, conn)
    }

    /// Remove `conn` from each of `topics` under a single lock.
    /// Returns how many memberships were removed.
    pub fn remove_all<'a>(
        &self,
        topics: impl IntoIterator<Item = &'a str>,
        conn: &ConnectionId,
    ) -> usize {
        let mut map = self.topics.lock();
        topics
            .into_iter()
            .filter(|topic| remove_locked(&mut map, topic, conn))
            .count()
    }

    /// Independent copy of the current subscribers of `topic`.
    pub fn snapshot(&self, topic: &str) -> Vec<ConnectionHandle> {
        self.topics
            .lock()
            .get(topic)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `conn` is subscribed to `topic`.
    pub fn is_subscribed(&self, topic: &str, conn: &ConnectionId) -> bool {
        self.topics
            .lock()
            .get(topic)
            .is_some_and(|subs| subs.contains_key(conn))
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    /// Number of subscribers of `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, HashMap::len)
    }

    /// Total (topic, connection) memberships.
    pub fn membership_count(&self) -> usize {
        self.topics.lock().values().map(HashMap::len).sum()
    }

    /// Topic names with subscribers (sorted).
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

fn remove_locked(map: &mut HashMap<String, Subscribers>, topic: &str, conn: &ConnectionId) -> bool {
    let Some(subs) = map.get_mut(topic) else {
        return false;
    };
    let removed = subs.remove(conn).is_some();
    if subs.is_empty() {
        let _ = map.remove(topic);
    }
    removed
}
