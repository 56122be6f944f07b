//! Topic fan-out.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};
use weft_rpc::{PublishEnvelope, RpcError};

use super::registry::SubscriptionRegistry;
use crate::metrics::{PUBSUB_DELIVERIES_TOTAL, PUBSUB_PUBLISHES_TOTAL, WS_PUBLISH_DROPS_TOTAL};
use crate::websocket::connection::{EnqueueOutcome, Frame};

/// What happens when a subscriber's outbound queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Discard the frame being published for that subscriber only.
    #[default]
    DropNewest,
}

/// Per-publish delivery tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Frames enqueued.
    pub delivered: usize,
    /// Frames discarded on full queues.
    pub dropped: usize,
    /// Subscribers that were already closing.
    pub closed: usize,
}

impl PublishReport {
    /// Subscribers present in the snapshot.
    pub fn subscribers(&self) -> usize {
        self.delivered + self.dropped + self.closed
    }
}

/// Pushes topic messages to current subscribers without ever waiting.
#[derive(Clone)]
pub struct Publisher {
    registry: Arc<SubscriptionRegistry>,
    policy: BackpressurePolicy,
}

impl Publisher {
    /// Publisher over `registry` using the default policy.
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self::with_policy(registry, BackpressurePolicy::default())
    }

    /// Publisher with an explicit backpressure policy.
    pub fn with_policy(registry: Arc<SubscriptionRegistry>, policy: BackpressurePolicy) -> Self {
        Self { registry, policy }
    }

    /// Active backpressure policy.
    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// Registry this publisher reads subscribers from.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Publish `payload` to every subscriber of `topic`.
    ///
    /// The envelope is serialized once before any subscriber is touched, so
    /// a serialization failure delivers nothing. Publishing to a topic with
    /// no subscribers succeeds with an empty report.
    pub fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<PublishReport, RpcError> {
        let frame: Frame = PublishEnvelope::new(topic, payload).to_frame()?.into();
        counter!(PUBSUB_PUBLISHES_TOTAL).increment(1);

        let mut report = PublishReport::default();
        for conn in self.registry.snapshot(topic) {
            let outcome = match self.policy {
                BackpressurePolicy::DropNewest => conn.try_enqueue(frame.clone()),
            };
            match outcome {
                EnqueueOutcome::Queued => report.delivered += 1,
                EnqueueOutcome::Dropped => {
                    report.dropped += 1;
                    counter!(WS_PUBLISH_DROPS_TOTAL).increment(1);
                    warn!(
                        conn_id = %conn.id(),
                        topic,
                        dropped_total = conn.drop_count(),
                        "outbound queue full, publish dropped"
                    );
                }
                EnqueueOutcome::Closed => report.closed += 1,
            }
        }

        counter!(PUBSUB_DELIVERIES_TOTAL).increment(report.delivered as u64);
        debug!(
            topic,
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "published"
        );
        Ok(report)
    }
}
