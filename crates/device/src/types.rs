//! Common types and the driver trait for band devices.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use band_types::{DeviceStatus, SignalEvent, SignalType};

/// Configuration for a band driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    /// IMU sample rate in Hz (accelerometer and gyroscope)
    #[serde(default = "default_imu_rate")]
    pub imu_rate_hz: u32,
    /// SNC sample rate in Hz
    #[serde(default = "default_snc_rate")]
    pub snc_rate_hz: u32,
    /// Number of SNC electrode channels per sample
    #[serde(default = "default_snc_channels")]
    pub snc_channels: usize,
    /// Pressure update rate while the pressure feature is active, in Hz
    #[serde(default = "default_pressure_rate")]
    pub pressure_rate_hz: u32,
    /// Seconds between battery reports
    #[serde(default = "default_battery_interval")]
    pub battery_interval_secs: u64,
}

fn default_imu_rate() -> u32 {
    100
}
fn default_snc_rate() -> u32 {
    500
}
fn default_snc_channels() -> usize {
    4
}
fn default_pressure_rate() -> u32 {
    20
}
fn default_battery_interval() -> u64 {
    30
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            imu_rate_hz: default_imu_rate(),
            snc_rate_hz: default_snc_rate(),
            snc_channels: default_snc_channels(),
            pressure_rate_hz: default_pressure_rate(),
            battery_interval_secs: default_battery_interval(),
        }
    }
}

/// Errors that can occur in band drivers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("hardware error: {0}")]
    HardwareError(String),
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("driver already running")]
    AlreadyRunning,
    #[error("event channel closed")]
    ChannelClosed,
}

/// A source of band telemetry.
///
/// `start` hands the driver the shared event channel; from then on the
/// driver owns its producer tasks until `stop`. Feature toggles take effect
/// on the device without interrupting other streams. Status transitions are
/// published on the watch channel returned by `status`.
#[async_trait]
pub trait BandDriver: Send + Sync {
    async fn start(&mut self, tx: flume::Sender<Arc<SignalEvent>>) -> Result<(), DriverError>;

    async fn stop(&mut self);

    async fn set_feature(&mut self, signal: SignalType, enabled: bool) -> Result<(), DriverError>;

    fn status(&self) -> watch::Receiver<DeviceStatus>;
}
