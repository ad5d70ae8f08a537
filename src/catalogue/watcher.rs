//! Catalogue file watcher.
//!
//! Turns file system events on a file-based catalogue into refresh requests.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Watches the catalogue file and signals each change.
pub struct CatalogueWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl CatalogueWatcher {
    /// Create a new watcher.
    ///
    /// Returns the watcher and a receiver yielding one item per change.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Catalogue file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Catalogue watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Catalogue watcher started");
        Ok(watcher)
    }
}
