//! Atomically swappable rule snapshot.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::snapshot::RuleSnapshot;

/// Holder of the current [`RuleSnapshot`].
///
/// Readers take an `Arc` at request start and keep it for the whole call;
/// replacing the snapshot never blocks them.
pub struct SnapshotStore {
    current: ArcSwap<RuleSnapshot>,
    invalidated: Notify,
    next_generation: AtomicU64,
}

impl SnapshotStore {
    pub fn new(initial: RuleSnapshot) -> Self {
        let next = initial.generation() + 1;
        Self {
            current: ArcSwap::from_pointee(initial),
            invalidated: Notify::new(),
            next_generation: AtomicU64::new(next),
        }
    }

    pub fn load(&self) -> Arc<RuleSnapshot> {
        self.current.load_full()
    }

    pub fn replace(&self, snapshot: RuleSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// Generation number for the next compiled snapshot.
    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Ask the refresher to reload the catalogue now.
    pub fn invalidate(&self) {
        self.invalidated.notify_one();
    }

    pub async fn invalidated(&self) {
        self.invalidated.notified().await;
    }
}
