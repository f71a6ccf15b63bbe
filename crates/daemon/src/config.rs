//! Daemon configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use band_device::BandConfig;

/// Which driver feeds the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverType {
    /// Synthesized telemetry, no hardware required
    Mock,
    /// Real band via its transport bridge
    Physical,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Defaults to mock so a bare checkout runs without hardware.
    #[serde(default = "default_driver_type")]
    pub driver_type: DriverType,
    /// TCP endpoint of the band transport bridge (physical driver only)
    #[serde(default = "default_band_endpoint")]
    pub band_endpoint: String,
    /// Per-connection outbound queue capacity; overflow drops the oldest
    /// undelivered event for that connection.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Capacity of the merged device/injection event channel
    #[serde(default = "default_device_event_capacity")]
    pub device_event_capacity: usize,
    /// Idle RPC sessions are reaped after this many seconds
    #[serde(default = "default_rpc_session_idle_secs")]
    pub rpc_session_idle_secs: u64,
    #[serde(default)]
    pub band: BandConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_driver_type() -> DriverType {
    DriverType::Mock
}
fn default_band_endpoint() -> String {
    "127.0.0.1:9100".to_string()
}
fn default_outbound_queue_capacity() -> usize {
    256
}
fn default_device_event_capacity() -> usize {
    1024
}
fn default_rpc_session_idle_secs() -> u64 {
    300
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            driver_type: default_driver_type(),
            band_endpoint: default_band_endpoint(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            device_event_capacity: default_device_event_capacity(),
            rpc_session_idle_secs: default_rpc_session_idle_secs(),
            band: BandConfig::default(),
        }
    }
}

/// Loads configuration from a JSON file. A missing file falls back to
/// defaults; a present but unparseable file is an error so typos are not
/// silently ignored.
pub fn load_config(path: &Path) -> anyhow::Result<DaemonConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config: DaemonConfig = serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("could not parse {}: {}", path.display(), e))?;
            info!("loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not found, using default configuration", path.display());
            Ok(DaemonConfig::default())
        }
        Err(e) => Err(anyhow::anyhow!("could not read {}: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: DaemonConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.driver_type, DriverType::Mock);
        assert_eq!(config.outbound_queue_capacity, 256);
        assert_eq!(config.band.snc_rate_hz, 500);
    }

    #[test]
    fn partial_overrides_apply() {
        let config: DaemonConfig = serde_json::from_str(
            r#"{"port": 9100, "driver_type": "physical", "band": {"imu_rate_hz": 50}}"#,
        )
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.driver_type, DriverType::Physical);
        assert_eq!(config.band.imu_rate_hz, 50);
        // unset nested fields keep their defaults
        assert_eq!(config.band.snc_rate_hz, 500);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/band-daemon.json")).unwrap();
        assert_eq!(config.port, 9000);
    }
}
