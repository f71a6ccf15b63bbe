//! Translates parsed client commands into registry/bridge operations.
//!
//! One dispatcher instance is shared by every surface. Command-level errors
//! become structured error replies for the originating connection only; no
//! command ever closes a connection or touches another client's state.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use band_device::DeviceBridge;
use band_types::{docs::PROTOCOL_DOCS, ClientCommand, CommandError, SignalEvent};

use crate::registry::{ConnectionId, FeatureEdge, SubscriptionRegistry};

/// Per-connection lifecycle. Commands are accepted only in `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Shared handle on one connection's lifecycle state. The delivery task
/// flips it to `Closing` when the peer stops accepting writes, so commands
/// still queued inbound are rejected instead of mutating registry state for
/// a connection on its way out.
#[derive(Clone, Default)]
pub struct ConnStateCell(Arc<Mutex<ConnState>>);

impl ConnStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnState {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, state: ConnState) {
        *self.0.lock().unwrap() = state;
    }
}

pub struct CommandDispatcher {
    registry: Arc<SubscriptionRegistry>,
    bridge: Arc<DeviceBridge>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, bridge: Arc<DeviceBridge>) -> Self {
        Self { registry, bridge }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Parses and executes one inbound message, always producing a reply.
    pub async fn dispatch_text(&self, conn: ConnectionId, state: ConnState, text: &str) -> Value {
        if state != ConnState::Open {
            return json!({
                "type": "error",
                "error": "invalid_command",
                "message": "connection is not open; commands are accepted only in the open state",
            });
        }
        match band_types::parse_command(text) {
            Ok(command) => match self.dispatch(conn, command).await {
                Ok(reply) => reply,
                Err(e) => e.to_reply(),
            },
            Err(e) => e.to_reply(),
        }
    }

    /// Executes an already-parsed command on behalf of `conn`.
    pub async fn dispatch(
        &self,
        conn: ConnectionId,
        command: ClientCommand,
    ) -> Result<Value, CommandError> {
        debug!(connection = %conn, command = command.name(), "dispatching");
        match command {
            ClientCommand::Subscribe(signal) => {
                let edge = self.registry.subscribe(conn, signal)?;
                self.apply_edge(edge).await;
                Ok(json!({
                    "type": "response",
                    "command": "subscribe",
                    "signal": signal,
                    "subscriptions": self.registry.subscriptions_of(conn),
                }))
            }
            ClientCommand::Unsubscribe(signal) => {
                let edge = self.registry.unsubscribe(conn, signal);
                self.apply_edge(edge).await;
                Ok(json!({
                    "type": "response",
                    "command": "unsubscribe",
                    "signal": signal,
                    "subscriptions": self.registry.subscriptions_of(conn),
                }))
            }
            ClientCommand::GetSubscriptions => Ok(json!({
                "type": "response",
                "command": "get_subscriptions",
                "subscriptions": self.registry.subscriptions_of(conn),
            })),
            ClientCommand::Enable(signal) => {
                let edge = self.registry.enable(conn, signal)?;
                self.apply_edge(edge).await;
                Ok(json!({
                    "type": "response",
                    "command": "enable",
                    "feature": signal,
                    "active": true,
                }))
            }
            ClientCommand::Disable(signal) => {
                let edge = self.registry.disable(conn, signal);
                self.apply_edge(edge).await;
                let still_active = self.registry.active_features().contains(&signal);
                Ok(json!({
                    "type": "response",
                    "command": "disable",
                    "feature": signal,
                    "active": still_active,
                }))
            }
            ClientCommand::GetStatus => Ok(json!({
                "type": "response",
                "command": "get_status",
                "device": self.bridge.status(),
                "active_features": self.registry.active_features(),
            })),
            ClientCommand::GetDocs => Ok(json!({
                "type": "response",
                "command": "get_docs",
                "docs": PROTOCOL_DOCS,
            })),
            ClientCommand::TriggerGesture { kind, confidence } => {
                // Enters the merged stream upstream of the router, so it is
                // indistinguishable from a device-produced gesture and works
                // with the band disconnected.
                let event = Arc::new(SignalEvent::gesture(kind, confidence));
                let injected = match self.bridge.inject(event).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("gesture injection failed: {}", e);
                        false
                    }
                };
                Ok(json!({
                    "type": "response",
                    "command": "trigger_gesture",
                    "injected": injected,
                }))
            }
            ClientCommand::PollEvents => Err(CommandError::InvalidCommand(
                "poll_events (only available on the rpc surface)".to_string(),
            )),
        }
    }

    /// Runs the connection-close cleanup path: releases every subscription
    /// and pin the connection held and turns off features that lost their
    /// last holder.
    pub async fn close_connection(&self, conn: ConnectionId) {
        for edge in self.registry.remove_connection(conn) {
            self.apply_edge(Some(edge)).await;
        }
    }

    async fn apply_edge(&self, edge: Option<FeatureEdge>) {
        match edge {
            Some(FeatureEdge::Activated(signal)) => self.bridge.set_feature(signal, true).await,
            Some(FeatureEdge::Deactivated(signal)) => self.bridge.set_feature(signal, false).await,
            None => {}
        }
    }
}
