//! Bounded drop-oldest queue between request tasks and the audit worker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

use super::ProxyLogEntry;
use crate::observability::metrics;

pub struct AuditQueue {
    entries: Mutex<VecDeque<ProxyLogEntry>>,
    capacity: usize,
    dropped: AtomicU64,
    notify: Notify,
}

impl AuditQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Enqueue without blocking; evicts the oldest entry when full.
    pub fn push(&self, entry: ProxyLogEntry) {
        let evicted = {
            let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            let evicted = if entries.len() >= self.capacity {
                entries.pop_front()
            } else {
                None
            };
            entries.push_back(entry);
            evicted
        };
        if let Some(old) = evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::record_audit_dropped();
            tracing::debug!(request_id = %old.request_id, "Audit queue full, dropped oldest entry");
        }
        self.notify.notify_one();
    }

    /// Take up to `max` entries, oldest first.
    pub fn drain(&self, max: usize) -> Vec<ProxyLogEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let n = entries.len().min(max);
        entries.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
