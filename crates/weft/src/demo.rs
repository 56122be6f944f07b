//! Methods and background publishers the binary ships with.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_rpc::RpcError;
use weft_server::{MethodRegistry, Publisher, RegistryError};

/// Topic the tick publisher writes to.
pub const TICK_TOPIC: &str = "system.tick";

/// Result of `Server.Time`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    /// RFC 3339 timestamp.
    pub now: String,
    /// Milliseconds since the Unix epoch.
    pub unix_ms: i64,
}

impl ServerTime {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            now: now.to_rfc3339(),
            unix_ms: now.timestamp_millis(),
        }
    }
}

/// Payload published on [`TICK_TOPIC`].
#[derive(Debug, Serialize)]
pub struct Tick {
    /// Starts at 1.
    pub seq: u64,
    /// RFC 3339 timestamp.
    pub at: String,
}

/// Register `Echo.Echo` and `Server.Time`.
pub fn register_demo_methods(methods: &mut MethodRegistry) -> Result<(), RegistryError> {
    methods.register_fn("Echo.Echo", |value: Value, _ctx| async move {
        Ok::<_, RpcError>(value)
    })?;
    methods.register_fn("Server.Time", |_params: Value, _ctx| async move {
        Ok::<_, RpcError>(ServerTime::now())
    })?;
    Ok(())
}

/// Publish a [`Tick`] every `interval` until `token` is cancelled.
pub fn spawn_ticker(
    publisher: Publisher,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        let _ = ticker.tick().await;

        info!(topic = TICK_TOPIC, interval_secs = interval.as_secs(), "tick publisher started");
        let mut seq = 0u64;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            seq += 1;
            let tick = Tick {
                seq,
                at: Utc::now().to_rfc3339(),
            };
            match publisher.publish(TICK_TOPIC, &tick) {
                Ok(report) => debug!(
                    seq,
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "tick published"
                ),
                Err(e) => warn!(error = %e, "tick publish failed"),
            }
        }
        info!("tick publisher stopped");
    })
}
