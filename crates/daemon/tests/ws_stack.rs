//! Full-stack test: real server on an ephemeral port, real WebSocket client.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::tungstenite::Message;

use band_daemon::dispatcher::CommandDispatcher;
use band_daemon::registry::SubscriptionRegistry;
use band_daemon::router::{self, ConnectionTable};
use band_daemon::rpc::RpcSessions;
use band_daemon::server::{self, AppState};
use band_device::{BandConfig, DeviceBridge, MockBandDriver};

async fn start_server() -> (String, AppState) {
    let driver = MockBandDriver::new(BandConfig::default()).unwrap();
    let (bridge, events_rx) = DeviceBridge::new(Box::new(driver), 256);
    let registry = Arc::new(SubscriptionRegistry::new());
    let connections = Arc::new(ConnectionTable::new());
    let dispatcher = Arc::new(CommandDispatcher::new(registry.clone(), bridge.clone()));
    tokio::spawn(router::run(events_rx, registry, connections.clone()));

    let state = AppState {
        dispatcher,
        connections,
        sessions: Arc::new(RpcSessions::new()),
        bridge,
        config: Arc::new(band_daemon::config::DaemonConfig::default()),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    // Leak the sender so the server runs for the whole test.
    std::mem::forget(_shutdown_tx);
    tokio::spawn(server::run(state.clone(), listener, shutdown_rx));

    (addr, state)
}

/// Minimal HTTP/1.1 client, enough for the status/docs/rpc routes.
async fn http_request(addr: &str, method: &str, path: &str, body: Option<&Value>) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let payload = body.map(|b| b.to_string()).unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len(),
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let (_, response_body) = response
        .split_once("\r\n\r\n")
        .expect("response should have a body");
    response_body.to_string()
}

#[tokio::test]
async fn websocket_subscribe_trigger_and_receive() {
    let (addr, _state) = start_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    ws.send(Message::Text(
        r#"{"command":"subscribe","signal":"gesture"}"#.into(),
    ))
    .await
    .unwrap();

    let reply: Value =
        serde_json::from_str(ws.next().await.unwrap().unwrap().to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["subscriptions"], json!(["gesture"]));

    ws.send(Message::Text(
        r#"{"command":"trigger_gesture","data":{"type":"double_tap","confidence":0.7}}"#.into(),
    ))
    .await
    .unwrap();

    // The command reply and the routed event share the socket; order between
    // them is not guaranteed.
    let mut saw_reply = false;
    let mut saw_event = false;
    while !(saw_reply && saw_event) {
        let message: Value =
            serde_json::from_str(ws.next().await.unwrap().unwrap().to_text().unwrap()).unwrap();
        if message["type"] == "response" {
            assert_eq!(message["command"], "trigger_gesture");
            assert_eq!(message["injected"], true);
            saw_reply = true;
        } else {
            assert_eq!(message["type"], "gesture");
            assert_eq!(message["data"]["type"], "double_tap");
            assert_eq!(message["data"]["confidence"], 0.7);
            saw_event = true;
        }
    }
}

#[tokio::test]
async fn websocket_rejects_array_signals() {
    let (addr, _state) = start_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    ws.send(Message::Text(
        r#"{"command":"subscribe","signals":["gesture","pressure"]}"#.into(),
    ))
    .await
    .unwrap();
    let reply: Value =
        serde_json::from_str(ws.next().await.unwrap().unwrap().to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"], "malformed_message");

    // Malformed commands do not close the connection.
    ws.send(Message::Text(r#"{"command":"get_subscriptions"}"#.into()))
        .await
        .unwrap();
    let reply: Value =
        serde_json::from_str(ws.next().await.unwrap().unwrap().to_text().unwrap()).unwrap();
    assert_eq!(reply["subscriptions"], json!([]));
}

#[tokio::test]
async fn websocket_disconnect_cleans_up_features() {
    let (addr, state) = start_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    ws.send(Message::Text(
        r#"{"command":"subscribe","signal":"imu_acc"}"#.into(),
    ))
    .await
    .unwrap();
    let _ = ws.next().await.unwrap().unwrap();
    assert_eq!(
        state.dispatcher.registry().active_features(),
        vec![band_types::SignalType::ImuAcc]
    );

    ws.close(None).await.unwrap();
    drop(ws);

    // Close handling is asynchronous; wait for the cleanup path to run.
    for _ in 0..100 {
        if state.dispatcher.registry().active_features().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(state.dispatcher.registry().active_features().is_empty());
}

#[tokio::test]
async fn http_status_and_docs() {
    let (addr, _state) = start_server().await;

    let body = http_request(&addr, "GET", "/api/status", None).await;
    let status: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status["device"]["status"], "disconnected");
    assert_eq!(status["active_features"], json!([]));

    let docs = http_request(&addr, "GET", "/api/docs", None).await;
    assert!(docs.contains("trigger_gesture"));
    assert!(docs.contains("connection_status"));
}

#[tokio::test]
async fn rpc_surface_round_trip() {
    let (addr, _state) = start_server().await;

    let body = http_request(
        &addr,
        "POST",
        "/rpc",
        Some(&json!({"command": "subscribe", "signal": "gesture", "session": "tool"})),
    )
    .await;
    let reply: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["subscriptions"], json!(["gesture"]));

    let body = http_request(
        &addr,
        "POST",
        "/rpc",
        Some(&json!({"command": "trigger_gesture", "data": {"type": "tap"}, "session": "tool"})),
    )
    .await;
    let reply: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(reply["injected"], true);

    let mut events = json!([]);
    for _ in 0..50 {
        let body = http_request(
            &addr,
            "POST",
            "/rpc",
            Some(&json!({"command": "poll_events", "session": "tool"})),
        )
        .await;
        let reply: Value = serde_json::from_str(&body).unwrap();
        events = reply["events"].clone();
        if !events.as_array().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["type"], "gesture");
}
