//! HTTP/WebSocket server wiring.

use axum::{
    body::Body,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use http::StatusCode;
use serde_json::{json, Value};
use std::{any::Any, sync::Arc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as CorsAny, CorsLayer},
};
use tracing::error;

use band_device::DeviceBridge;
use band_types::docs::PROTOCOL_DOCS;

use crate::{
    config::DaemonConfig,
    connection,
    dispatcher::CommandDispatcher,
    router::ConnectionTable,
    rpc::RpcSessions,
};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<CommandDispatcher>,
    pub connections: Arc<ConnectionTable>,
    pub sessions: Arc<RpcSessions>,
    pub bridge: Arc<DeviceBridge>,
    pub config: Arc<DaemonConfig>,
}

// Keeps a panicking handler from taking the daemon down with it; the band
// stream and the other connections keep running.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };

    error!("request handler panicked: {}", detail);

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::from(format!("internal server error: {}", detail)))
        .unwrap()
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| connection::serve_socket(socket, state))
}

async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "device": state.bridge.status(),
        "active_features": state.dispatcher.registry().active_features(),
        "connections": state.connections.len(),
    }))
}

async fn docs_handler() -> &'static str {
    PROTOCOL_DOCS
}

async fn rpc_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    Json(state.sessions.handle(&state, &body).await)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/status", get(status_handler))
        .route("/api/docs", get(docs_handler))
        .route("/rpc", post(rpc_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(CorsAny)
                .allow_methods(CorsAny)
                .allow_headers(CorsAny),
        )
        .layer(CatchPanicLayer::custom(handle_panic))
}

/// Serves until the shutdown receiver fires. The listener is passed in so
/// tests can bind an ephemeral port.
pub async fn run(
    state: AppState,
    listener: tokio::net::TcpListener,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        })
        .await?;

    Ok(())
}
