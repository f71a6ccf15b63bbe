//! Driver for a real band reachable through its transport bridge.
//!
//! The band SDK exposes a line-delimited JSON stream on a TCP endpoint:
//! inbound lines are event envelopes, outbound lines are feature toggles
//! (`{"command":"set_feature","feature":"...","enabled":bool}`). The driver
//! reconnects with backoff on transport loss and replays the desired
//! feature set on every (re)connect, so clients never need to resubscribe.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use band_types::{DeviceStatus, LinkStatus, SignalEvent, SignalPayload, SignalType};

use crate::types::{BandDriver, DriverError};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

pub struct PhysicalBandDriver {
    endpoint: String,
    desired: Arc<RwLock<HashSet<SignalType>>>,
    status_tx: watch::Sender<DeviceStatus>,
    control_tx: Option<mpsc::UnboundedSender<(SignalType, bool)>>,
    task: Option<JoinHandle<()>>,
}

impl PhysicalBandDriver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(DeviceStatus::default());
        Self {
            endpoint: endpoint.into(),
            desired: Arc::new(RwLock::new(HashSet::new())),
            status_tx,
            control_tx: None,
            task: None,
        }
    }

    fn feature_frame(signal: SignalType, enabled: bool) -> String {
        format!(
            "{}\n",
            serde_json::json!({
                "command": "set_feature",
                "feature": signal.as_str(),
                "enabled": enabled,
            })
        )
    }

    async fn session(
        stream: TcpStream,
        tx: &flume::Sender<Arc<SignalEvent>>,
        control_rx: &mut mpsc::UnboundedReceiver<(SignalType, bool)>,
        desired: &RwLock<HashSet<SignalType>>,
        status_tx: &watch::Sender<DeviceStatus>,
    ) -> Result<(), DriverError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let replay: Vec<SignalType> = desired
            .read()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for signal in replay {
            write_half
                .write_all(Self::feature_frame(signal, true).as_bytes())
                .await
                .map_err(|e| DriverError::TransportError(e.to_string()))?;
        }

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = line.map_err(|e| DriverError::TransportError(e.to_string()))?;
                    let Some(line) = line else {
                        return Err(DriverError::TransportError("stream closed by band".into()));
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match SignalEvent::from_wire_json(&line) {
                        Ok(event) => {
                            if let SignalPayload::Battery(p) = &event.payload {
                                let snapshot = *p;
                                status_tx.send_modify(|s| s.battery = Some(snapshot));
                            }
                            if tx.send_async(Arc::new(event)).await.is_err() {
                                return Err(DriverError::ChannelClosed);
                            }
                        }
                        Err(e) => warn!("dropping unparseable band frame: {}", e),
                    }
                }
                msg = control_rx.recv() => {
                    let Some((signal, enabled)) = msg else {
                        return Err(DriverError::ChannelClosed);
                    };
                    write_half
                        .write_all(Self::feature_frame(signal, enabled).as_bytes())
                        .await
                        .map_err(|e| DriverError::TransportError(e.to_string()))?;
                }
            }
        }
    }
}

#[async_trait]
impl BandDriver for PhysicalBandDriver {
    async fn start(&mut self, tx: flume::Sender<Arc<SignalEvent>>) -> Result<(), DriverError> {
        if self.task.is_some() {
            return Err(DriverError::AlreadyRunning);
        }
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        self.control_tx = Some(control_tx);

        let endpoint = self.endpoint.clone();
        let desired = self.desired.clone();
        let status_tx = self.status_tx.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                match TcpStream::connect(&endpoint).await {
                    Ok(stream) => {
                        info!("band transport connected at {}", endpoint);
                        status_tx.send_modify(|s| s.status = LinkStatus::Connected);
                        let result =
                            Self::session(stream, &tx, &mut control_rx, &desired, &status_tx)
                                .await;
                        status_tx.send_modify(|s| s.status = LinkStatus::Disconnected);
                        match result {
                            Err(DriverError::ChannelClosed) => return,
                            Err(e) => warn!("band transport lost: {}", e),
                            Ok(()) => return,
                        }
                    }
                    Err(e) => {
                        warn!("cannot reach band transport at {}: {}", endpoint, e);
                    }
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        self.control_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.status_tx.send_modify(|s| s.status = LinkStatus::Disconnected);
    }

    async fn set_feature(&mut self, signal: SignalType, enabled: bool) -> Result<(), DriverError> {
        {
            let mut set = self
                .desired
                .write()
                .map_err(|_| DriverError::HardwareError("feature set lock poisoned".into()))?;
            if enabled {
                set.insert(signal);
            } else {
                set.remove(&signal);
            }
        }
        // Best effort while disconnected; the desired set is replayed on
        // reconnect.
        if let Some(control) = &self.control_tx {
            let _ = control.send((signal, enabled));
        }
        Ok(())
    }

    fn status(&self) -> watch::Receiver<DeviceStatus> {
        self.status_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn streams_events_and_replays_features() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut driver = PhysicalBandDriver::new(addr.to_string());
        driver
            .set_feature(SignalType::Gesture, true)
            .await
            .unwrap();

        let (tx, rx) = flume::bounded(64);
        driver.start(tx).await.unwrap();

        let (mut band, _) = listener.accept().await.unwrap();

        // The driver replays the desired feature set on connect.
        let mut buf = [0u8; 256];
        let n = band.read(&mut buf).await.unwrap();
        let replayed = String::from_utf8_lossy(&buf[..n]);
        assert!(replayed.contains("\"feature\":\"gesture\""));
        assert!(replayed.contains("\"enabled\":true"));

        let frame = serde_json::to_string(&SignalEvent::gesture(
            band_types::GestureKind::Tap,
            0.9,
        ))
        .unwrap();
        band.write_all(format!("{frame}\n").as_bytes()).await.unwrap();

        let event = rx.recv_async().await.unwrap();
        assert_eq!(event.signal(), Some(SignalType::Gesture));

        driver.stop().await;
    }

    #[tokio::test]
    async fn disconnect_flips_status_without_killing_driver() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut driver = PhysicalBandDriver::new(addr.to_string());
        let status = driver.status();
        let (tx, _rx) = flume::bounded(64);
        driver.start(tx).await.unwrap();

        let (band, _) = listener.accept().await.unwrap();
        let mut status_wait = status.clone();
        status_wait
            .wait_for(|s| s.status == LinkStatus::Connected)
            .await
            .unwrap();

        drop(band);
        let mut status_wait = status.clone();
        status_wait
            .wait_for(|s| s.status == LinkStatus::Disconnected)
            .await
            .unwrap();

        driver.stop().await;
    }
}
