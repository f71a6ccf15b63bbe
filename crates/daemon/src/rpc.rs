//! Structured command/response surface for tool-style invocation.
//!
//! `POST /rpc` takes the same one-command JSON object as the WebSocket
//! surface. An optional `session` field names a persistent server-side
//! session whose subscription set behaves like a connection's; events routed
//! to it accumulate in a bounded queue and are drained with
//! `{"command":"poll_events"}`. Sessions idle past the configured window are
//! reaped so abandoned tool sessions cannot pin device features forever.

use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use band_types::{parse_command_value, ClientCommand, CommandError};

use crate::registry::ConnectionId;
use crate::router::OutboundQueue;
use crate::server::AppState;

struct RpcSession {
    id: ConnectionId,
    queue: Arc<OutboundQueue>,
    last_used: Instant,
}

#[derive(Default)]
pub struct RpcSessions {
    sessions: DashMap<String, RpcSession>,
}

impl RpcSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_queue(&self, state: &AppState, name: &str) -> (ConnectionId, Arc<OutboundQueue>) {
        let mut entry = self.sessions.entry(name.to_string()).or_insert_with(|| {
            let id = Uuid::new_v4();
            let queue = Arc::new(OutboundQueue::new(state.config.outbound_queue_capacity));
            state.connections.insert(id, queue.clone());
            info!(session = name, connection = %id, "rpc session created");
            RpcSession {
                id,
                queue,
                last_used: Instant::now(),
            }
        });
        entry.last_used = Instant::now();
        (entry.id, entry.queue.clone())
    }

    /// Handles one RPC request body and produces the reply value.
    pub async fn handle(&self, state: &AppState, body: &Value) -> Value {
        let session_name = match body.get("session") {
            None => "rpc",
            Some(Value::String(name)) if !name.is_empty() => name.as_str(),
            Some(_) => {
                return CommandError::Malformed("`session` must be a non-empty string".into())
                    .to_reply()
            }
        };

        let command = match parse_command_value(body) {
            Ok(command) => command,
            Err(e) => return e.to_reply(),
        };

        let (conn, queue) = self.session_queue(state, session_name);
        let reply = match command {
            ClientCommand::PollEvents => {
                let events: Vec<Value> = queue
                    .drain()
                    .iter()
                    .filter_map(|event| serde_json::to_value(&**event).ok())
                    .collect();
                json!({
                    "type": "response",
                    "command": "poll_events",
                    "events": events,
                })
            }
            other => match state.dispatcher.dispatch(conn, other).await {
                Ok(reply) => reply,
                Err(e) => e.to_reply(),
            },
        };

        // The sweeper may have reaped this session between `session_queue`
        // and the dispatch above, in which case any registry state the
        // command just added belongs to a connection id nothing tracks
        // anymore. Re-run the close path; it is idempotent.
        if !self.is_current(session_name, conn) {
            queue.close();
            state.connections.remove(&conn);
            state.dispatcher.close_connection(conn).await;
            debug!(session = session_name, connection = %conn, "session reaped mid-command, state released");
        }
        reply
    }

    fn is_current(&self, name: &str, id: ConnectionId) -> bool {
        self.sessions
            .get(name)
            .map(|entry| entry.id == id)
            .unwrap_or(false)
    }

    /// Removes sessions idle longer than `idle`, releasing their
    /// subscriptions and any features they alone held.
    pub async fn sweep(&self, state: &AppState, idle: Duration) {
        let now = Instant::now();
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now.duration_since(entry.last_used) > idle)
            .map(|entry| entry.key().clone())
            .collect();

        for name in candidates {
            // Idleness is re-checked under the entry lock: a request that
            // touched the session after the snapshot keeps it alive.
            let removed = self
                .sessions
                .remove_if(&name, |_, session| {
                    now.saturating_duration_since(session.last_used) > idle
                });
            if let Some((name, session)) = removed {
                session.queue.close();
                state.connections.remove(&session.id);
                state.dispatcher.close_connection(session.id).await;
                debug!(session = name, connection = %session.id, "idle rpc session reaped");
            }
        }
    }
}

/// Periodic sweeper task, spawned at startup.
pub async fn run_sweeper(state: AppState) {
    let idle = Duration::from_secs(state.config.rpc_session_idle_secs.max(1));
    let mut ticker = tokio::time::interval(Duration::from_secs(60).min(idle));
    loop {
        ticker.tick().await;
        state.sessions.sweep(&state, idle).await;
    }
}
