//! Background snapshot refresh.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time;

use crate::catalogue::{RuleSource, SourceError};
use crate::observability::metrics;

use super::snapshot::RuleSnapshot;
use super::store::SnapshotStore;

/// Reloads the catalogue on a timer, on invalidation and on file changes.
pub struct SnapshotRefresher {
    store: Arc<SnapshotStore>,
    source: RuleSource,
    interval: Duration,
}

impl SnapshotRefresher {
    pub fn new(store: Arc<SnapshotStore>, source: RuleSource, interval: Duration) -> Self {
        Self {
            store,
            source,
            interval,
        }
    }

    /// Load once and swap the snapshot in. On failure the previous snapshot
    /// stays active.
    pub async fn refresh_once(&self) -> Result<(), SourceError> {
        let doc = self.source.load().await?;
        let snapshot = RuleSnapshot::compile(doc, self.store.next_generation());

        tracing::info!(
            generation = snapshot.generation(),
            rules = snapshot.rule_count(),
            excluded = snapshot.excluded().len(),
            source = %self.source.describe(),
            "Rule snapshot loaded"
        );
        metrics::record_snapshot(
            snapshot.rule_count(),
            snapshot.excluded().len(),
            snapshot.generation(),
        );

        self.store.replace(snapshot);
        Ok(())
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>, mut changes: Option<mpsc::UnboundedReceiver<()>>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            source = %self.source.describe(),
            "Snapshot refresher starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick fires immediately; startup already loaded once.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.store.invalidated() => {
                    tracing::info!("Rule snapshot invalidated");
                }
                Some(()) = recv_change(&mut changes) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Snapshot refresher received shutdown signal, exiting loop");
                    break;
                }
            }

            if let Err(e) = self.refresh_once().await {
                tracing::error!(error = %e, "Catalogue refresh failed, keeping current snapshot");
            }
        }
    }
}

async fn recv_change(changes: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::CatalogueDocument;

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let store = Arc::new(SnapshotStore::new(RuleSnapshot::empty()));
        let refresher = SnapshotRefresher::new(
            store.clone(),
            RuleSource::File("/nonexistent/catalogue.toml".into()),
            Duration::from_secs(60),
        );
        assert!(refresher.refresh_once().await.is_err());
        assert_eq!(store.load().generation(), 0);
    }

    #[tokio::test]
    async fn test_refresh_on_invalidate() {
        let store = Arc::new(SnapshotStore::new(RuleSnapshot::empty()));
        let refresher = SnapshotRefresher::new(
            store.clone(),
            RuleSource::Static(CatalogueDocument::default()),
            Duration::from_secs(3600),
        );
        let (tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(refresher.run(tx.subscribe(), None));

        store.invalidate();
        for _ in 0..50 {
            if store.load().generation() > 0 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.load().generation(), 1);

        let _ = tx.send(());
        handle.await.unwrap();
    }
}
