//! The immutable event value passed from producers to the router.
//!
//! Events are created once by a driver (or by the simulated injection path),
//! wrapped in `Arc`, and fanned out as shared read-only references. The wire
//! form is the envelope `{"type": ..., "data": {...}, "timestamp": ...}`.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::signal::{
    BatteryPayload, ButtonPayload, ButtonState, ConnectionStatusPayload, GestureKind,
    GesturePayload, ImuPayload, LinkStatus, NavigationPayload, PressurePayload, SignalPayload,
    SignalType, SncPayload,
};

/// Microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// A single telemetry occurrence. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub payload: SignalPayload,
    pub timestamp: u64,
}

impl SignalEvent {
    pub fn new(payload: SignalPayload, timestamp: u64) -> Self {
        Self { payload, timestamp }
    }

    pub fn gesture(kind: GestureKind, confidence: f64) -> Self {
        let timestamp = now_micros();
        Self::new(
            SignalPayload::Gesture(GesturePayload {
                kind,
                confidence,
                timestamp,
            }),
            timestamp,
        )
    }

    pub fn pressure(value: u8) -> Self {
        let timestamp = now_micros();
        Self::new(
            SignalPayload::Pressure(PressurePayload {
                value,
                normalized: f64::from(value) / 100.0,
                timestamp,
            }),
            timestamp,
        )
    }

    pub fn imu_acc(values: [f32; 3], frequency: u32) -> Self {
        let timestamp = now_micros();
        Self::new(
            SignalPayload::ImuAcc(ImuPayload {
                timestamp,
                values,
                frequency,
            }),
            timestamp,
        )
    }

    pub fn imu_gyro(values: [f32; 3], frequency: u32) -> Self {
        let timestamp = now_micros();
        Self::new(
            SignalPayload::ImuGyro(ImuPayload {
                timestamp,
                values,
                frequency,
            }),
            timestamp,
        )
    }

    pub fn navigation(delta_x: i32, delta_y: i32) -> Self {
        let timestamp = now_micros();
        Self::new(
            SignalPayload::Navigation(NavigationPayload {
                delta_x,
                delta_y,
                timestamp,
            }),
            timestamp,
        )
    }

    pub fn snc(values: Vec<f32>, frequency: u32) -> Self {
        let timestamp = now_micros();
        Self::new(
            SignalPayload::Snc(SncPayload {
                values,
                frequency,
                timestamp,
            }),
            timestamp,
        )
    }

    pub fn battery(level: u8, charging: bool) -> Self {
        let timestamp = now_micros();
        Self::new(
            SignalPayload::Battery(BatteryPayload {
                level,
                charging,
                timestamp,
            }),
            timestamp,
        )
    }

    pub fn button(state: ButtonState) -> Self {
        let timestamp = now_micros();
        Self::new(SignalPayload::Button(ButtonPayload { state, timestamp }), timestamp)
    }

    pub fn connection_status(status: LinkStatus, message: impl Into<String>) -> Self {
        Self::new(
            SignalPayload::ConnectionStatus(ConnectionStatusPayload {
                status,
                message: message.into(),
            }),
            now_micros(),
        )
    }

    /// Signal type for routing, or `None` for `connection_status` events
    /// which bypass subscription filtering.
    pub fn signal(&self) -> Option<SignalType> {
        self.payload.signal()
    }

    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}

impl Serialize for SignalEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut envelope = serializer.serialize_struct("SignalEvent", 3)?;
        envelope.serialize_field("type", self.type_name())?;
        envelope.serialize_field("data", &self.payload)?;
        envelope.serialize_field("timestamp", &self.timestamp)?;
        envelope.end()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireParseError {
    #[error("malformed event frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event type: {0}")]
    UnknownType(String),
}

impl SignalEvent {
    /// Parses the wire envelope back into an event. Used by the physical
    /// driver for frames arriving from the band transport.
    pub fn from_wire_json(text: &str) -> Result<Self, WireParseError> {
        #[derive(serde::Deserialize)]
        struct Envelope {
            #[serde(rename = "type")]
            kind: String,
            data: serde_json::Value,
            #[serde(default)]
            timestamp: u64,
        }

        let envelope: Envelope = serde_json::from_str(text)?;
        let data = envelope.data;
        let payload = match envelope.kind.as_str() {
            "gesture" => SignalPayload::Gesture(serde_json::from_value(data)?),
            "pressure" => SignalPayload::Pressure(serde_json::from_value(data)?),
            "imu_acc" => SignalPayload::ImuAcc(serde_json::from_value(data)?),
            "imu_gyro" => SignalPayload::ImuGyro(serde_json::from_value(data)?),
            "navigation" => SignalPayload::Navigation(serde_json::from_value(data)?),
            "snc" => SignalPayload::Snc(serde_json::from_value(data)?),
            "battery" => SignalPayload::Battery(serde_json::from_value(data)?),
            "button" => SignalPayload::Button(serde_json::from_value(data)?),
            "connection_status" => SignalPayload::ConnectionStatus(serde_json::from_value(data)?),
            other => return Err(WireParseError::UnknownType(other.to_string())),
        };
        let timestamp = if envelope.timestamp != 0 {
            envelope.timestamp
        } else {
            now_micros()
        };
        Ok(SignalEvent::new(payload, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_type_data_timestamp() {
        let event = SignalEvent::gesture(GestureKind::Tap, 0.8);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "gesture");
        assert_eq!(json["data"]["type"], "tap");
        assert_eq!(json["data"]["confidence"], 0.8);
        assert_eq!(json["timestamp"], json["data"]["timestamp"]);
    }

    #[test]
    fn connection_status_envelope_shape() {
        let event = SignalEvent::connection_status(LinkStatus::Disconnected, "band lost");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection_status");
        assert_eq!(json["data"]["status"], "disconnected");
        assert_eq!(json["data"]["message"], "band lost");
    }

    #[test]
    fn wire_round_trip() {
        let event = SignalEvent::navigation(-4, 11);
        let text = serde_json::to_string(&event).unwrap();
        let parsed = SignalEvent::from_wire_json(&text).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = SignalEvent::from_wire_json(r#"{"type":"emg","data":{},"timestamp":1}"#)
            .unwrap_err();
        assert!(matches!(err, WireParseError::UnknownType(name) if name == "emg"));
    }

    #[test]
    fn pressure_normalization() {
        let event = SignalEvent::pressure(75);
        match event.payload {
            SignalPayload::Pressure(p) => {
                assert_eq!(p.value, 75);
                assert!((p.normalized - 0.75).abs() < f64::EPSILON);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
