//! `WeftServer`: Axum HTTP + `WebSocket` server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::HealthResponse;
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::pubsub::{Publisher, SubscriptionRegistry};
use crate::rpc::MethodRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::bridge::Bridge;
use crate::websocket::connection::Connection;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Protocol bridge shared by every session.
    pub bridge: Arc<Bridge>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Live `WebSocket` connection count.
    pub connections: Arc<AtomicUsize>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus render handle.
    pub metrics_handle: PrometheusHandle,
}

/// The main Weft server.
pub struct WeftServer {
    config: Arc<ServerConfig>,
    bridge: Arc<Bridge>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    connections: Arc<AtomicUsize>,
    metrics_handle: PrometheusHandle,
}

impl WeftServer {
    /// Create a new server. The configured handler timeout replaces the
    /// registry's.
    pub fn new(
        config: ServerConfig,
        mut methods: MethodRegistry,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        methods.set_timeout(config.handler_timeout());
        let registry = Arc::new(SubscriptionRegistry::new());
        Self {
            config: Arc::new(config),
            bridge: Arc::new(Bridge::new(Arc::new(methods), registry)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            connections: Arc::new(AtomicUsize::new(0)),
            metrics_handle,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: self.bridge.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            connections: self.connections.clone(),
            config: self.config.clone(),
            metrics_handle: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(addr = %local_addr, "weft server listening");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Publisher for application code outside of RPC handlers.
    pub fn publisher(&self) -> &Publisher {
        self.bridge.publisher()
    }

    /// Subscription registry.
    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        self.bridge.registry()
    }

    /// Registered methods.
    pub fn methods(&self) -> &Arc<MethodRegistry> {
        self.bridge.methods()
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live `WebSocket` connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// A reserved place under the connection limit, released on drop.
struct ConnectionSlot {
    counter: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self {
                counter: counter.clone(),
            })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    }
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let capacity = state.config.queue_capacity();
    let token = state.shutdown.child_token();
    let bridge = state.bridge.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let (connection, outbound) = Connection::open(capacity, token);
            let _ = run_ws_session(socket, connection, outbound, bridge).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::collect(
        state.start_time,
        state.connections.load(Ordering::Acquire),
        state.bridge.registry(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::detached_handle;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn make_server() -> WeftServer {
        WeftServer::new(
            ServerConfig::default(),
            MethodRegistry::new(),
            detached_handle(),
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn handler_timeout_applied_to_registry() {
        let config = ServerConfig {
            handler_timeout_ms: 250,
            ..ServerConfig::default()
        };
        let server = WeftServer::new(config, MethodRegistry::new(), detached_handle());
        assert_eq!(
            server.methods().timeout(),
            std::time::Duration::from_millis(250)
        );
    }

    #[test]
    fn publisher_shares_registry() {
        let server = make_server();
        assert!(Arc::ptr_eq(
            server.publisher().registry(),
            server.subscriptions()
        ));
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["topics"], 0);
        assert_eq!(body["subscriptions"], 0);
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let server = make_server();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let server = make_server();
        let (status, _) = get_json(server.router(), "/ws").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = get_json(server.router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn connection_slots_respect_limit() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = ConnectionSlot::acquire(&counter, 2).unwrap();
        let b = ConnectionSlot::acquire(&counter, 2).unwrap();
        assert!(ConnectionSlot::acquire(&counter, 2).is_none());
        assert_eq!(counter.load(Ordering::Acquire), 2);

        drop(a);
        assert_eq!(counter.load(Ordering::Acquire), 1);
        let _c = ConnectionSlot::acquire(&counter, 2).unwrap();
        drop(b);
        assert_eq!(counter.load(Ordering::Acquire), 1);
    }

    #[test]
    fn shutdown_propagates_to_coordinator() {
        let server = make_server();
        let shutdown = server.shutdown().clone();
        shutdown.shutdown();
        assert!(server.shutdown().is_shutting_down());
    }
}
