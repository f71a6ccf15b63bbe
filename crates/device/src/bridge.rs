//! Merges driver telemetry and injected events into one ordered stream.
//!
//! The bridge owns the driver plus the sending side of the shared event
//! channel. The router consumes the receiving side and never learns whether
//! an event came from hardware or from the simulated path, which is what
//! makes `trigger_gesture` indistinguishable from a real gesture.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use band_types::{DeviceStatus, LinkStatus, SignalEvent, SignalType};

use crate::types::{BandDriver, DriverError};

pub struct DeviceBridge {
    driver: Mutex<Box<dyn BandDriver>>,
    events_tx: flume::Sender<Arc<SignalEvent>>,
    status_rx: watch::Receiver<DeviceStatus>,
}

impl DeviceBridge {
    /// Wraps a driver and returns the bridge plus the merged event stream.
    pub fn new(
        driver: Box<dyn BandDriver>,
        capacity: usize,
    ) -> (Arc<Self>, flume::Receiver<Arc<SignalEvent>>) {
        let (events_tx, events_rx) = flume::bounded(capacity);
        let status_rx = driver.status();
        let bridge = Arc::new(Self {
            driver: Mutex::new(driver),
            events_tx,
            status_rx,
        });
        (bridge, events_rx)
    }

    /// Starts the driver and the status forwarder. Link transitions become
    /// `connection_status` events in the merged stream; the router
    /// broadcasts those to every connection.
    pub async fn start(self: &Arc<Self>) -> Result<(), DriverError> {
        self.driver.lock().await.start(self.events_tx.clone()).await?;

        let mut status_rx = self.status_rx.clone();
        let events_tx = self.events_tx.clone();
        let mut last_link = status_rx.borrow().status;
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let link = status_rx.borrow().status;
                if link == last_link {
                    continue;
                }
                last_link = link;
                let message = match link {
                    LinkStatus::Connected => "band connected",
                    LinkStatus::Disconnected => "band disconnected",
                };
                info!("{}", message);
                let event = Arc::new(SignalEvent::connection_status(link, message));
                if events_tx.send_async(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    pub async fn stop(&self) {
        self.driver.lock().await.stop().await;
    }

    /// Injects a simulated event into the shared stream, upstream of the
    /// router. Works with the device disconnected.
    pub async fn inject(&self, event: Arc<SignalEvent>) -> Result<(), DriverError> {
        self.events_tx
            .send_async(event)
            .await
            .map_err(|_| DriverError::ChannelClosed)
    }

    /// Forwards a feature activation edge to the device. Device refusal is
    /// logged, not fatal: registry state is the source of truth and the
    /// toggle is retried on reconnect by the physical driver.
    pub async fn set_feature(&self, signal: SignalType, enabled: bool) {
        if let Err(e) = self.driver.lock().await.set_feature(signal, enabled).await {
            warn!(signal = %signal, enabled, "device feature toggle failed: {}", e);
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status_rx.borrow().clone()
    }
}
