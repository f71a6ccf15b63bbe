//! Hardware-free band driver that synthesizes telemetry at nominal rates.
//!
//! Each stream runs on its own interval task and only produces events while
//! its feature is enabled, matching how the physical band only streams
//! enabled sensors. Used by default in development and by the test suite.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use band_types::{
    ButtonState, DeviceStatus, GestureKind, LinkStatus, SignalEvent, SignalType,
};

use crate::types::{BandConfig, BandDriver, DriverError};

pub struct MockBandDriver {
    config: BandConfig,
    enabled: Arc<RwLock<HashSet<SignalType>>>,
    status_tx: watch::Sender<DeviceStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockBandDriver {
    pub fn new(config: BandConfig) -> Result<Self, DriverError> {
        if config.imu_rate_hz == 0 || config.snc_rate_hz == 0 || config.pressure_rate_hz == 0 {
            return Err(DriverError::ConfigurationError(
                "sample rates must be non-zero".into(),
            ));
        }
        if config.snc_channels == 0 {
            return Err(DriverError::ConfigurationError(
                "at least one SNC channel must be configured".into(),
            ));
        }
        let (status_tx, _) = watch::channel(DeviceStatus::default());
        Ok(Self {
            config,
            enabled: Arc::new(RwLock::new(HashSet::new())),
            status_tx,
            tasks: Vec::new(),
        })
    }

    fn is_enabled(enabled: &RwLock<HashSet<SignalType>>, signal: SignalType) -> bool {
        enabled.read().map(|set| set.contains(&signal)).unwrap_or(false)
    }
}

#[async_trait]
impl BandDriver for MockBandDriver {
    async fn start(&mut self, tx: flume::Sender<Arc<SignalEvent>>) -> Result<(), DriverError> {
        if !self.tasks.is_empty() {
            return Err(DriverError::AlreadyRunning);
        }
        info!("mock band driver starting");
        self.status_tx.send_modify(|s| s.status = LinkStatus::Connected);

        let imu_rate = self.config.imu_rate_hz;
        let enabled = self.enabled.clone();
        let imu_tx = tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker =
                tokio::time::interval(Duration::from_micros(1_000_000 / u64::from(imu_rate)));
            loop {
                ticker.tick().await;
                if Self::is_enabled(&enabled, SignalType::ImuAcc) {
                    let values = [
                        rng.gen_range(-0.3..0.3),
                        rng.gen_range(-0.3..0.3),
                        9.81 + rng.gen_range(-0.1..0.1),
                    ];
                    let ev = Arc::new(SignalEvent::imu_acc(values, imu_rate));
                    if imu_tx.send_async(ev).await.is_err() {
                        break;
                    }
                }
                if Self::is_enabled(&enabled, SignalType::ImuGyro) {
                    let values = [
                        rng.gen_range(-2.0..2.0),
                        rng.gen_range(-2.0..2.0),
                        rng.gen_range(-2.0..2.0),
                    ];
                    let ev = Arc::new(SignalEvent::imu_gyro(values, imu_rate));
                    if imu_tx.send_async(ev).await.is_err() {
                        break;
                    }
                }
            }
        }));

        let snc_rate = self.config.snc_rate_hz;
        let snc_channels = self.config.snc_channels;
        let enabled = self.enabled.clone();
        let snc_tx = tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker =
                tokio::time::interval(Duration::from_micros(1_000_000 / u64::from(snc_rate)));
            loop {
                ticker.tick().await;
                if !Self::is_enabled(&enabled, SignalType::Snc) {
                    continue;
                }
                let values: Vec<f32> =
                    (0..snc_channels).map(|_| rng.gen_range(-1.0..1.0)).collect();
                let ev = Arc::new(SignalEvent::snc(values, snc_rate));
                if snc_tx.send_async(ev).await.is_err() {
                    break;
                }
            }
        }));

        let pressure_rate = self.config.pressure_rate_hz;
        let enabled = self.enabled.clone();
        let pressure_tx = tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut value: i32 = 20;
            let mut ticker =
                tokio::time::interval(Duration::from_micros(1_000_000 / u64::from(pressure_rate)));
            loop {
                ticker.tick().await;
                if !Self::is_enabled(&enabled, SignalType::Pressure) {
                    continue;
                }
                value = (value + rng.gen_range(-4..=4)).clamp(0, 100);
                let ev = Arc::new(SignalEvent::pressure(value as u8));
                if pressure_tx.send_async(ev).await.is_err() {
                    break;
                }
            }
        }));

        let enabled = self.enabled.clone();
        let nav_tx = tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(Duration::from_millis(16));
            loop {
                ticker.tick().await;
                if !Self::is_enabled(&enabled, SignalType::Navigation) {
                    continue;
                }
                let ev = Arc::new(SignalEvent::navigation(
                    rng.gen_range(-8..=8),
                    rng.gen_range(-8..=8),
                ));
                if nav_tx.send_async(ev).await.is_err() {
                    break;
                }
            }
        }));

        let battery_interval = self.config.battery_interval_secs.max(1);
        let enabled = self.enabled.clone();
        let status_tx = self.status_tx.clone();
        let battery_tx = tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut level: u8 = 87;
            let mut ticker = tokio::time::interval(Duration::from_secs(battery_interval));
            loop {
                ticker.tick().await;
                level = level.saturating_sub(1).max(5);
                let ev = Arc::new(SignalEvent::battery(level, false));
                // The battery snapshot is part of device status even when no
                // client subscribes to battery events.
                if let band_types::SignalPayload::Battery(p) = &ev.payload {
                    let snapshot = *p;
                    status_tx.send_modify(|s| s.battery = Some(snapshot));
                }
                if !Self::is_enabled(&enabled, SignalType::Battery) {
                    continue;
                }
                if battery_tx.send_async(ev).await.is_err() {
                    break;
                }
            }
        }));

        let enabled = self.enabled.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let gestures = [
                GestureKind::Tap,
                GestureKind::DoubleTap,
                GestureKind::Twist,
                GestureKind::DoubleTwist,
            ];
            let mut ticker = tokio::time::interval(Duration::from_secs(3));
            loop {
                ticker.tick().await;
                if Self::is_enabled(&enabled, SignalType::Gesture) {
                    let kind = gestures[rng.gen_range(0..gestures.len())];
                    let confidence = rng.gen_range(0.6..1.0);
                    let ev = Arc::new(SignalEvent::gesture(kind, confidence));
                    if tx.send_async(ev).await.is_err() {
                        break;
                    }
                }
                if Self::is_enabled(&enabled, SignalType::Button) && rng.gen_bool(0.3) {
                    let press = Arc::new(SignalEvent::button(ButtonState::Pressed));
                    if tx.send_async(press).await.is_err() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(120)).await;
                    let release = Arc::new(SignalEvent::button(ButtonState::Released));
                    if tx.send_async(release).await.is_err() {
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    async fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.status_tx.send_modify(|s| s.status = LinkStatus::Disconnected);
        info!("mock band driver stopped");
    }

    async fn set_feature(&mut self, signal: SignalType, enabled: bool) -> Result<(), DriverError> {
        let mut set = self
            .enabled
            .write()
            .map_err(|_| DriverError::HardwareError("feature set lock poisoned".into()))?;
        if enabled {
            set.insert(signal);
        } else {
            set.remove(&signal);
        }
        debug!(signal = %signal, enabled, "mock feature toggled");
        Ok(())
    }

    fn status(&self) -> watch::Receiver<DeviceStatus> {
        self.status_tx.subscribe()
    }
}
