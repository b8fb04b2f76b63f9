//! Configuration-changed notifications for in-process consumers.
//!
//! Consumers register for an unbounded channel and re-read through the facade
//! whenever an event arrives. Delivery is best-effort: a consumer whose
//! receiver has been dropped is pruned on the next send.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::sync::scheduler::CycleReport;

/// Registry key for a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Event delivered to every registered consumer.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// An update cycle finished; cached documents may have changed.
    Refreshed(CycleReport),
    /// All cached configs were cleared; the bundled baseline is active.
    Reset,
}

/// In-memory consumer registry, rebuilt every process start.
#[derive(Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    consumers: Mutex<BTreeMap<ConsumerId, mpsc::UnboundedSender<ConfigEvent>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer and return its id plus the event receiver.
    pub fn register(&self) -> (ConsumerId, mpsc::UnboundedReceiver<ConfigEvent>) {
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.consumers.lock().insert(id, tx);
        crate::debug_trace!("CONFIG_SYNC", "Registered {}", id);
        (id, rx)
    }

    /// Remove a consumer. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ConsumerId) -> bool {
        let removed = self.consumers.lock().remove(&id).is_some();
        crate::debug_trace!("CONFIG_SYNC", "Unregistered {} (found={})", id, removed);
        removed
    }

    /// Send `event` to every consumer, pruning closed ones.
    ///
    /// Never blocks. Returns the number of consumers that received the event.
    pub fn notify_all(&self, event: &ConfigEvent) -> usize {
        let mut consumers = self.consumers.lock();
        let before = consumers.len();
        consumers.retain(|id, tx| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                crate::debug_log!("CONFIG_SYNC", "Pruning closed {}", id);
            }
            delivered
        });
        let delivered = consumers.len();
        if delivered < before {
            log::debug!("Pruned {} closed config consumers", before - delivered);
        }
        delivered
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }
}
