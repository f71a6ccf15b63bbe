//! Signal types and payload shapes produced by the band.
//!
//! The payload structs serialize to exactly the JSON shapes clients expect;
//! field names and enum spellings here are wire-visible and must not change
//! without a protocol version bump.

use serde::{Deserialize, Serialize};

/// The closed set of telemetry signals the band can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Discrete hand gestures (tap, twist, ...)
    Gesture,
    /// Analog fingertip pressure, 0-100
    Pressure,
    /// 3-axis accelerometer samples (~100 Hz)
    ImuAcc,
    /// 3-axis gyroscope samples (~100 Hz)
    ImuGyro,
    /// Pointer deltas derived on-device
    Navigation,
    /// High-frequency muscle activity samples (500 Hz)
    Snc,
    /// Battery level updates
    Battery,
    /// Physical button press/release
    Button,
}

impl SignalType {
    pub const ALL: [SignalType; 8] = [
        SignalType::Gesture,
        SignalType::Pressure,
        SignalType::ImuAcc,
        SignalType::ImuGyro,
        SignalType::Navigation,
        SignalType::Snc,
        SignalType::Battery,
        SignalType::Button,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Gesture => "gesture",
            SignalType::Pressure => "pressure",
            SignalType::ImuAcc => "imu_acc",
            SignalType::ImuGyro => "imu_gyro",
            SignalType::Navigation => "navigation",
            SignalType::Snc => "snc",
            SignalType::Battery => "battery",
            SignalType::Button => "button",
        }
    }

    /// Nominal production rate in Hz for sampled signals. Event-driven
    /// signals (gesture, button, battery, pressure updates) return `None`.
    pub fn nominal_rate_hz(&self) -> Option<u32> {
        match self {
            SignalType::ImuAcc | SignalType::ImuGyro => Some(100),
            SignalType::Snc => Some(500),
            _ => None,
        }
    }
}

impl std::str::FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gesture" => Ok(SignalType::Gesture),
            "pressure" => Ok(SignalType::Pressure),
            "imu_acc" => Ok(SignalType::ImuAcc),
            "imu_gyro" => Ok(SignalType::ImuGyro),
            "navigation" => Ok(SignalType::Navigation),
            "snc" => Ok(SignalType::Snc),
            "battery" => Ok(SignalType::Battery),
            "button" => Ok(SignalType::Button),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete gestures the band recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Tap,
    DoubleTap,
    Twist,
    DoubleTwist,
}

impl std::str::FromStr for GestureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tap" => Ok(GestureKind::Tap),
            "double_tap" => Ok(GestureKind::DoubleTap),
            "twist" => Ok(GestureKind::Twist),
            "double_twist" => Ok(GestureKind::DoubleTwist),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GesturePayload {
    #[serde(rename = "type")]
    pub kind: GestureKind,
    /// Classifier confidence, 0.0..=1.0
    pub confidence: f64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressurePayload {
    /// Raw pressure, 0..=100
    pub value: u8,
    /// `value` scaled to 0.0..=1.0
    pub normalized: f64,
    pub timestamp: u64,
}

/// Shared shape for `imu_acc` and `imu_gyro`; the envelope type tag tells
/// them apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuPayload {
    pub timestamp: u64,
    /// [x, y, z]
    pub values: [f32; 3],
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavigationPayload {
    pub delta_x: i32,
    pub delta_y: i32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SncPayload {
    /// One sample per SNC channel, each in -1.0..=1.0
    pub values: Vec<f32>,
    pub frequency: u32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryPayload {
    /// Percent, 0..=100
    pub level: u8,
    pub charging: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonPayload {
    pub state: ButtonState,
    pub timestamp: u64,
}

/// Link state between the daemon and the physical band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatusPayload {
    pub status: LinkStatus,
    pub message: String,
}

/// Snapshot of the hardware link plus the last battery report, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub status: LinkStatus,
    pub battery: Option<BatteryPayload>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            status: LinkStatus::Disconnected,
            battery: None,
        }
    }
}

/// Event payload, one variant per signal type plus the subscription-bypassing
/// `connection_status` broadcast. Untagged: the envelope carries the type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SignalPayload {
    Gesture(GesturePayload),
    Pressure(PressurePayload),
    ImuAcc(ImuPayload),
    ImuGyro(ImuPayload),
    Navigation(NavigationPayload),
    Snc(SncPayload),
    Battery(BatteryPayload),
    Button(ButtonPayload),
    ConnectionStatus(ConnectionStatusPayload),
}

impl SignalPayload {
    /// The signal type this payload belongs to, or `None` for
    /// `connection_status` which is not a subscribable signal.
    pub fn signal(&self) -> Option<SignalType> {
        match self {
            SignalPayload::Gesture(_) => Some(SignalType::Gesture),
            SignalPayload::Pressure(_) => Some(SignalType::Pressure),
            SignalPayload::ImuAcc(_) => Some(SignalType::ImuAcc),
            SignalPayload::ImuGyro(_) => Some(SignalType::ImuGyro),
            SignalPayload::Navigation(_) => Some(SignalType::Navigation),
            SignalPayload::Snc(_) => Some(SignalType::Snc),
            SignalPayload::Battery(_) => Some(SignalType::Battery),
            SignalPayload::Button(_) => Some(SignalType::Button),
            SignalPayload::ConnectionStatus(_) => None,
        }
    }

    /// Wire name used in the envelope `type` field.
    pub fn type_name(&self) -> &'static str {
        match self.signal() {
            Some(signal) => signal.as_str(),
            None => "connection_status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_type_round_trips_through_names() {
        for signal in SignalType::ALL {
            let parsed: SignalType = signal.as_str().parse().unwrap();
            assert_eq!(parsed, signal);
        }
        assert!("emg".parse::<SignalType>().is_err());
    }

    #[test]
    fn gesture_payload_serializes_with_type_field() {
        let payload = GesturePayload {
            kind: GestureKind::DoubleTap,
            confidence: 0.92,
            timestamp: 1234,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "double_tap");
        assert_eq!(json["confidence"], 0.92);
        assert_eq!(json["timestamp"], 1234);
    }

    #[test]
    fn payload_signal_mapping_is_total() {
        let imu = ImuPayload {
            timestamp: 0,
            values: [0.0, 0.0, 9.8],
            frequency: 100,
        };
        assert_eq!(
            SignalPayload::ImuAcc(imu).signal(),
            Some(SignalType::ImuAcc)
        );
        assert_eq!(
            SignalPayload::ImuGyro(imu).signal(),
            Some(SignalType::ImuGyro)
        );
        let status = SignalPayload::ConnectionStatus(ConnectionStatusPayload {
            status: LinkStatus::Disconnected,
            message: "band lost".into(),
        });
        assert_eq!(status.signal(), None);
        assert_eq!(status.type_name(), "connection_status");
    }
}
