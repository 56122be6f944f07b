//! End-to-end tests using a real `WebSocket` client.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::body::Body;
use axum::http::Request;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tower::ServiceExt;

use weft_rpc::RpcError;
use weft_server::metrics::detached_handle;
use weft_server::{CallContext, MethodRegistry, ServerConfig, WeftServer};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn test_methods() -> MethodRegistry {
    let mut methods = MethodRegistry::new();
    methods
        .register_fn("Echo.Echo", |v: Value, _ctx| async move {
            Ok::<_, RpcError>(v)
        })
        .unwrap();
    methods
        .register_fn(
            "Pub.Send",
            |(topic, data): (String, Value), ctx: CallContext| async move {
                let report = ctx.publisher.publish(&topic, &data)?;
                Ok::<_, RpcError>(report.delivered)
            },
        )
        .unwrap();
    methods
}

/// Boot a test server and return the WS URL + server.
async fn boot_server(config: ServerConfig) -> (String, Arc<WeftServer>) {
    let server = Arc::new(WeftServer::new(config, test_methods(), detached_handle()));
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn boot_default() -> (String, Arc<WeftServer>) {
    boot_server(ServerConfig::default()).await
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsStream, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Send a call and read the next frame, which must be its response.
async fn rpc_call(ws: &mut WsStream, id: u64, method: &str, params: Option<Value>) -> Value {
    let mut req = json!({"id": id, "method": method});
    if let Some(p) = params {
        req["params"] = p;
    }
    send_json(ws, req).await;
    let resp = read_json(ws).await;
    assert_eq!(resp["id"], id, "unexpected frame {resp}");
    resp
}

async fn subscribe(ws: &mut WsStream, topic: &str) {
    let resp = rpc_call(ws, 1, "System.Subscribe", Some(json!(topic))).await;
    assert_eq!(resp, json!({"jsonrpc":"2.0","id":1,"result":"ok"}));
}

/// Wait until `check` holds, polling the server state.
async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the server to close the stream.
async fn expect_closed(ws: &mut WsStream) {
    loop {
        let next = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for close");
        match next {
            None | Some(Err(_) | Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

#[tokio::test]
async fn subscribe_acknowledged() {
    let (url, server) = boot_default().await;
    let mut ws = connect(&url).await;
    subscribe(&mut ws, "sports").await;
    assert_eq!(server.subscriptions().subscriber_count("sports"), 1);
}

#[tokio::test]
async fn unknown_method_answered_with_error() {
    let (url, _server) = boot_default().await;
    let mut ws = connect(&url).await;
    let resp = rpc_call(&mut ws, 2, "Unknown.Method", None).await;
    assert_eq!(resp["jsonrpc"], "2.0");
    assert!(resp.get("result").is_none());
    assert!(!resp["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn notifications_get_no_response() {
    let (url, _server) = boot_default().await;
    let mut ws = connect(&url).await;
    send_json(&mut ws, json!({"method":"Echo.Echo","params":"quiet"})).await;
    send_json(&mut ws, json!({"method":"Unknown.Method"})).await;
    let resp = rpc_call(&mut ws, 5, "Echo.Echo", Some(json!("loud"))).await;
    assert_eq!(resp["result"], "loud");
}

#[tokio::test]
async fn publish_reaches_only_subscribers() {
    let (url, server) = boot_default().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    subscribe(&mut a, "sports").await;

    let report = server
        .publisher()
        .publish("sports", &json!({"score": 1}))
        .unwrap();
    assert_eq!(report.delivered, 1);

    let pushed = read_json(&mut a).await;
    assert_eq!(
        pushed,
        json!({"type":"publish","topic":"sports","data":{"score":1}})
    );

    // b's next frame is its own response, not the publish
    let resp = rpc_call(&mut b, 9, "Echo.Echo", Some(json!(null))).await;
    assert_eq!(resp["id"], 9);
}

#[tokio::test]
async fn handler_publish_fans_out_to_other_connections() {
    let (url, _server) = boot_default().await;
    let mut listener_a = connect(&url).await;
    let mut listener_b = connect(&url).await;
    let mut caller = connect(&url).await;
    subscribe(&mut listener_a, "room").await;
    subscribe(&mut listener_b, "room").await;

    let resp = rpc_call(
        &mut caller,
        3,
        "Pub.Send",
        Some(json!(["room", {"text": "hi"}])),
    )
    .await;
    assert_eq!(resp["result"], 2);

    for ws in [&mut listener_a, &mut listener_b] {
        let pushed = read_json(ws).await;
        assert_eq!(pushed["topic"], "room");
        assert_eq!(pushed["data"]["text"], "hi");
    }
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (url, server) = boot_default().await;
    let mut ws = connect(&url).await;
    subscribe(&mut ws, "news").await;
    let resp = rpc_call(&mut ws, 2, "System.Unsubscribe", Some(json!("news"))).await;
    assert_eq!(resp["result"], "ok");

    let report = server.publisher().publish("news", &1).unwrap();
    assert_eq!(report.subscribers(), 0);
    let resp = rpc_call(&mut ws, 3, "Echo.Echo", Some(json!("next"))).await;
    assert_eq!(resp["result"], "next");
}

#[tokio::test]
async fn publish_to_empty_topic_is_noop() {
    let (url, server) = boot_default().await;
    let _ws = connect(&url).await;
    let report = server.publisher().publish("nobody", &"x").unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.dropped, 0);
    assert_eq!(server.subscriptions().topic_count(), 0);
}

#[tokio::test]
async fn disconnect_removes_subscriptions() {
    let (url, server) = boot_default().await;
    let mut ws = connect(&url).await;
    subscribe(&mut ws, "a").await;
    let resp = rpc_call(&mut ws, 2, "System.Subscribe", Some(json!("b"))).await;
    assert_eq!(resp["result"], "ok");
    assert_eq!(server.subscriptions().topic_count(), 2);

    ws.close(None).await.unwrap();
    drop(ws);

    eventually(|| server.subscriptions().topic_count() == 0).await;
    eventually(|| server.connection_count() == 0).await;
}

#[tokio::test]
async fn invalid_frames_do_not_close_connection() {
    let (url, _server) = boot_default().await;
    let mut ws = connect(&url).await;
    ws.send(Message::text("not json at all")).await.unwrap();
    ws.send(Message::text("[1,2,3]")).await.unwrap();

    let resp = rpc_call(&mut ws, 4, "Echo.Echo", Some(json!({"still": "here"}))).await;
    assert_eq!(resp["result"]["still"], "here");
}

#[tokio::test]
async fn invalid_identifier_answered_with_null_id() {
    let (url, _server) = boot_default().await;
    let mut ws = connect(&url).await;
    send_json(&mut ws, json!({"method":"Echo.Echo","id":"abc"})).await;
    let resp = read_json(&mut ws).await;
    assert!(resp["id"].is_null());
    assert!(resp["error"].is_string());
}

#[tokio::test]
async fn binary_frames_are_accepted() {
    let (url, _server) = boot_default().await;
    let mut ws = connect(&url).await;
    let frame = json!({"method":"Echo.Echo","id":6,"params":[1,2]}).to_string();
    ws.send(Message::binary(frame.into_bytes())).await.unwrap();
    let resp = read_json(&mut ws).await;
    assert_eq!(resp, json!({"jsonrpc":"2.0","id":6,"result":[1,2]}));
}

#[tokio::test]
async fn responses_preserve_request_order() {
    let (url, _server) = boot_default().await;
    let mut ws = connect(&url).await;
    for id in 1..=10u64 {
        send_json(&mut ws, json!({"method":"Echo.Echo","id":id,"params":id})).await;
    }
    for id in 1..=10u64 {
        let resp = read_json(&mut ws).await;
        assert_eq!(resp["id"], id);
    }
}

#[tokio::test]
async fn health_reports_live_counts() {
    let (url, server) = boot_default().await;
    let mut ws = connect(&url).await;
    subscribe(&mut ws, "t1").await;

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = server.router().oneshot(req).await.unwrap();
    let body = axum::body::to_bytes(resp.into_body(), 10_000)
        .await
        .unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["connections"], 1);
    assert_eq!(parsed["topics"], 1);
}

#[tokio::test]
async fn connection_limit_refuses_upgrade() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (url, server) = boot_server(config).await;
    let first = connect(&url).await;

    let err = connect_async(&url).await.unwrap_err();
    assert_matches!(err, WsError::Http(resp) if resp.status() == 503);

    drop(first);
    eventually(|| server.connection_count() == 0).await;
    let _again = connect(&url).await;
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let (url, server) = boot_default().await;
    let mut ws = connect(&url).await;
    subscribe(&mut ws, "t").await;

    server.shutdown().shutdown();
    expect_closed(&mut ws).await;
    eventually(|| server.subscriptions().topic_count() == 0).await;
}
