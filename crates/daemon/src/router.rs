//! Event dispatch core: per-connection outbound queues and the router task.
//!
//! The router is the single consumer of the merged device/injection stream,
//! which is what guarantees per-signal-type delivery order. Each connection
//! owns a bounded drop-oldest queue; the router never blocks on a slow
//! subscriber. Telemetry is best-effort and latest-favored: when a queue is
//! full the oldest undelivered event goes, never the newest.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use band_types::SignalEvent;

use crate::registry::{ConnectionId, SubscriptionRegistry};

/// Bounded FIFO of undelivered events for one connection.
pub struct OutboundQueue {
    events: Mutex<VecDeque<Arc<SignalEvent>>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues an event, evicting the oldest one if the queue is full.
    /// Pushes to a closed queue are silently discarded, which is the
    /// in-flight-delivery-to-a-closed-connection case.
    pub fn push(&self, event: Arc<SignalEvent>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut events = self.events.lock().unwrap();
            if events.len() >= self.capacity {
                events.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    warn!(dropped, "outbound queue full, dropping oldest event");
                }
            }
            events.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Waits for the next event. Returns `None` once the queue is closed
    /// and drained.
    pub async fn pop(&self) -> Option<Arc<SignalEvent>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut events = self.events.lock().unwrap();
                if let Some(event) = events.pop_front() {
                    return Some(event);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Takes everything currently queued. Used by the RPC polling surface.
    pub fn drain(&self) -> Vec<Arc<SignalEvent>> {
        let mut events = self.events.lock().unwrap();
        events.drain(..).collect()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.events.lock().unwrap().clear();
        self.notify.notify_waiters();
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Live connections and their outbound queues. RPC sessions register here
/// too, so the router treats every consumer uniformly.
#[derive(Default)]
pub struct ConnectionTable {
    queues: DashMap<ConnectionId, Arc<OutboundQueue>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ConnectionId, queue: Arc<OutboundQueue>) {
        self.queues.insert(id, queue);
    }

    pub fn remove(&self, id: &ConnectionId) {
        self.queues.remove(id);
    }

    pub fn queue(&self, id: &ConnectionId) -> Option<Arc<OutboundQueue>> {
        self.queues.get(id).map(|entry| entry.value().clone())
    }

    pub fn all_queues(&self) -> Vec<Arc<OutboundQueue>> {
        self.queues.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

/// Consumes the merged event stream until every sender is dropped.
///
/// Subscriber sets are snapshotted under the registry lock; queue pushes
/// happen outside it. `connection_status` events bypass subscription
/// filtering and go to every connection.
pub async fn run(
    events_rx: flume::Receiver<Arc<SignalEvent>>,
    registry: Arc<SubscriptionRegistry>,
    connections: Arc<ConnectionTable>,
) {
    while let Ok(event) = events_rx.recv_async().await {
        match event.signal() {
            None => {
                for queue in connections.all_queues() {
                    queue.push(event.clone());
                }
            }
            Some(signal) => {
                let subscribers = registry.subscribers_of(signal);
                trace!(signal = %signal, subscribers = subscribers.len(), "routing event");
                for id in subscribers {
                    if let Some(queue) = connections.queue(&id) {
                        queue.push(event.clone());
                    }
                }
            }
        }
    }
    debug!("event stream closed, router exiting");
}
