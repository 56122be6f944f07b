//! Prometheus metrics recorder and metric names.

use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;
use weft_rpc::RpcError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if another recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle for a recorder that is not installed globally (tests, embedding).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Record one finished call: request count, latency, and error type.
pub fn record_call(method: &str, result: &Result<serde_json::Value, RpcError>, elapsed: Duration) {
    counter!(RPC_REQUESTS_TOTAL, "method" => method.to_owned()).increment(1);
    histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.to_owned())
        .record(elapsed.as_secs_f64());
    if let Err(err) = result {
        counter!(
            RPC_ERRORS_TOTAL,
            "method" => method.to_owned(),
            "error_type" => err.code()
        )
        .increment(1);
    }
}

/// RPC requests total (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// RPC errors total (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// RPC request duration seconds (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrades refused by the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Publish frames dropped on full queues (counter).
pub const WS_PUBLISH_DROPS_TOTAL: &str = "ws_publish_drops_total";
/// Publish calls total (counter).
pub const PUBSUB_PUBLISHES_TOTAL: &str = "pubsub_publishes_total";
/// Frames enqueued by publishes (counter).
pub const PUBSUB_DELIVERIES_TOTAL: &str = "pubsub_deliveries_total";
