//! Device layer for the Mudra Band daemon.
//!
//! A `BandDriver` produces a single ordered stream of `SignalEvent`s and
//! accepts per-feature enable/disable requests. Two drivers are provided:
//! `MockBandDriver` synthesizes realistic telemetry without hardware, and
//! `PhysicalBandDriver` reads event frames from the band's transport bridge.
//! `DeviceBridge` merges whichever driver is active with the simulated
//! injection path into one channel the router consumes.

pub mod bridge;
pub mod mock_band;
pub mod physical;
pub mod types;

pub use bridge::DeviceBridge;
pub use mock_band::MockBandDriver;
pub use physical::PhysicalBandDriver;
pub use types::{BandConfig, BandDriver, DriverError};
