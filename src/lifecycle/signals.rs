//! OS signal handling.
//!
//! SIGTERM and SIGINT start a graceful shutdown. SIGHUP asks for an
//! immediate catalogue reload and keeps the process running.

use std::sync::Arc;

use super::Shutdown;
use crate::policy::SnapshotStore;

#[cfg(unix)]
pub async fn listen(shutdown: Shutdown, store: Arc<SnapshotStore>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
            ctrl_c(shutdown).await;
            return;
        }
    };
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = term.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            _ = hup.recv() => {
                tracing::info!("SIGHUP received, reloading catalogue");
                store.invalidate();
            }
            _ = stop.recv() => return,
        }
    }
    shutdown.trigger();
}

#[cfg(not(unix))]
pub async fn listen(shutdown: Shutdown, _store: Arc<SnapshotStore>) {
    ctrl_c(shutdown).await;
}

async fn ctrl_c(shutdown: Shutdown) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl+C received, shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
    shutdown.trigger();
}
