//! Core data model for the Mudra Band daemon
//!
//! This crate defines the closed set of signal types the band produces, the
//! payload shapes carried on the wire, the inbound command grammar, and the
//! command error taxonomy. Everything that crosses a process or network
//! boundary is defined here so the device and daemon crates agree on it.

pub mod command;
pub mod docs;
pub mod event;
pub mod signal;

pub use command::{parse_command, parse_command_value, ClientCommand, CommandError};
pub use event::{now_micros, SignalEvent, WireParseError};
pub use signal::{
    BatteryPayload, ButtonPayload, ButtonState, ConnectionStatusPayload, DeviceStatus,
    GestureKind, GesturePayload, ImuPayload, LinkStatus, NavigationPayload, PressurePayload,
    SignalPayload, SignalType, SncPayload,
};
