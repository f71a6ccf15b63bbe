//! Inbound command grammar and the command error taxonomy.
//!
//! Commands arrive as one JSON object per message with a `command` field.
//! Parsing is done by hand over `serde_json::Value` so that protocol-level
//! mistakes (an array-valued `signals` field, a missing `signal`) map to
//! precise error codes instead of a generic serde failure.

use serde_json::Value;

use crate::signal::{GestureKind, SignalType};

/// A parsed client command. Exactly one signal per command.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Subscribe(SignalType),
    Unsubscribe(SignalType),
    GetSubscriptions,
    Enable(SignalType),
    Disable(SignalType),
    GetStatus,
    GetDocs,
    TriggerGesture { kind: GestureKind, confidence: f64 },
    /// Drains queued events for an RPC session. Not valid on the WebSocket
    /// surface, where delivery is push-based.
    PollEvents,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Subscribe(_) => "subscribe",
            ClientCommand::Unsubscribe(_) => "unsubscribe",
            ClientCommand::GetSubscriptions => "get_subscriptions",
            ClientCommand::Enable(_) => "enable",
            ClientCommand::Disable(_) => "disable",
            ClientCommand::GetStatus => "get_status",
            ClientCommand::GetDocs => "get_docs",
            ClientCommand::TriggerGesture { .. } => "trigger_gesture",
            ClientCommand::PollEvents => "poll_events",
        }
    }
}

/// Command-level errors. These are reported back to the originating
/// connection only and never close it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    InvalidCommand(String),
    #[error("unknown signal: {0}")]
    InvalidSignal(String),
    #[error("unknown feature: {0}")]
    InvalidFeature(String),
    #[error("cannot enable {signal}: {reason}")]
    Conflict {
        signal: SignalType,
        with: SignalType,
        reason: String,
    },
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown gesture type: {0}")]
    InvalidGestureType(String),
}

impl CommandError {
    /// Stable wire code for the `error` field of an error reply.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::InvalidCommand(_) => "invalid_command",
            CommandError::InvalidSignal(_) => "invalid_signal",
            CommandError::InvalidFeature(_) => "invalid_feature",
            CommandError::Conflict { .. } => "conflict",
            CommandError::Malformed(_) => "malformed_message",
            CommandError::InvalidGestureType(_) => "invalid_gesture_type",
        }
    }

    pub fn conflict_with(&self) -> Option<SignalType> {
        match self {
            CommandError::Conflict { with, .. } => Some(*with),
            _ => None,
        }
    }

    /// The structured error reply sent back to the client.
    pub fn to_reply(&self) -> Value {
        let mut reply = serde_json::json!({
            "type": "error",
            "error": self.code(),
            "message": self.to_string(),
        });
        if let Some(with) = self.conflict_with() {
            reply["conflict_with"] = Value::String(with.as_str().to_string());
        }
        reply
    }
}

fn signal_field(object: &serde_json::Map<String, Value>) -> Result<SignalType, CommandError> {
    match object.get("signal") {
        Some(Value::String(name)) => name
            .parse()
            .map_err(|unknown: String| CommandError::InvalidSignal(unknown)),
        Some(other) => Err(CommandError::Malformed(format!(
            "`signal` must be a string, got {other}"
        ))),
        None => Err(CommandError::Malformed("missing `signal` field".into())),
    }
}

fn feature_field(object: &serde_json::Map<String, Value>) -> Result<SignalType, CommandError> {
    // `feature` is the command-surface name; `signal` is accepted as an alias
    // since the enumerations are identical.
    let field = object.get("feature").or_else(|| object.get("signal"));
    match field {
        Some(Value::String(name)) => name
            .parse()
            .map_err(|unknown: String| CommandError::InvalidFeature(unknown)),
        Some(other) => Err(CommandError::Malformed(format!(
            "`feature` must be a string, got {other}"
        ))),
        None => Err(CommandError::Malformed("missing `feature` field".into())),
    }
}

/// Parses one inbound message into a command.
pub fn parse_command(text: &str) -> Result<ClientCommand, CommandError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CommandError::Malformed(format!("invalid JSON: {e}")))?;
    parse_command_value(&value)
}

/// Parses an already-deserialized message (the RPC surface receives JSON
/// bodies directly).
pub fn parse_command_value(value: &Value) -> Result<ClientCommand, CommandError> {
    let object = value
        .as_object()
        .ok_or_else(|| CommandError::Malformed("message must be a JSON object".into()))?;

    // Batch subscription is not part of the protocol; reject it loudly
    // instead of silently taking the first element.
    if object.contains_key("signals") {
        return Err(CommandError::Malformed(
            "`signals` arrays are not accepted; send one command per signal".into(),
        ));
    }

    let command = match object.get("command") {
        Some(Value::String(name)) => name.as_str(),
        Some(other) => {
            return Err(CommandError::Malformed(format!(
                "`command` must be a string, got {other}"
            )))
        }
        None => return Err(CommandError::Malformed("missing `command` field".into())),
    };

    match command {
        "subscribe" => Ok(ClientCommand::Subscribe(signal_field(object)?)),
        "unsubscribe" => Ok(ClientCommand::Unsubscribe(signal_field(object)?)),
        "get_subscriptions" => Ok(ClientCommand::GetSubscriptions),
        "enable" => Ok(ClientCommand::Enable(feature_field(object)?)),
        "disable" => Ok(ClientCommand::Disable(feature_field(object)?)),
        "get_status" => Ok(ClientCommand::GetStatus),
        "get_docs" => Ok(ClientCommand::GetDocs),
        "trigger_gesture" => {
            let data = object
                .get("data")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    CommandError::Malformed("trigger_gesture requires a `data` object".into())
                })?;
            let kind = match data.get("type") {
                Some(Value::String(name)) => name
                    .parse()
                    .map_err(|unknown: String| CommandError::InvalidGestureType(unknown))?,
                _ => {
                    return Err(CommandError::Malformed(
                        "trigger_gesture data requires a string `type`".into(),
                    ))
                }
            };
            let confidence = data
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            Ok(ClientCommand::TriggerGesture { kind, confidence })
        }
        "poll_events" => Ok(ClientCommand::PollEvents),
        other => Err(CommandError::InvalidCommand(other.to_string())),
    }
}
