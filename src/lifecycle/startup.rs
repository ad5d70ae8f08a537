//! Startup orchestration.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;

use super::{signals, Shutdown};
use crate::admin::{setup_admin_router, AdminState};
use crate::audit::{AuditError, AuditQueue, AuditSink, AuditWorker};
use crate::catalogue::{CatalogueWatcher, RuleSource, SourceError};
use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::observability::{metrics, ProxyStats};
use crate::policy::{RuleSnapshot, SnapshotRefresher, SnapshotStore};
use crate::proxy::ProxyOrchestrator;

/// Time background tasks get to finish after the servers stopped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("catalogue unavailable: {0}")]
    Catalogue(#[from] SourceError),

    #[error("audit sink: {0}")]
    Audit(#[from] AuditError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),

    #[error("{0}")]
    Init(String),
}

/// Bring the proxy up and serve until shutdown.
pub async fn start(config: ProxyConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let timeout = Duration::from_secs(config.timeouts.upstream_secs);
    let source = RuleSource::from_config(&config.catalogue, timeout)?;
    let watch_path = config
        .catalogue
        .watch
        .then(|| source.watch_path().cloned())
        .flatten();

    let store = Arc::new(SnapshotStore::new(RuleSnapshot::empty()));
    let refresher = SnapshotRefresher::new(
        store.clone(),
        source,
        Duration::from_secs(config.catalogue.refresh_secs),
    );
    refresher.refresh_once().await?;

    let shutdown = Shutdown::new();

    // The watcher stops when this handle is dropped at the end of `start`.
    let (_watch_handle, changes) = match watch_path {
        Some(path) => {
            let (watcher, rx) = CatalogueWatcher::new(&path);
            match watcher.run() {
                Ok(handle) => (Some(handle), Some(rx)),
                Err(e) => {
                    tracing::warn!(error = %e, "Catalogue watcher unavailable, relying on periodic refresh");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };
    let refresher_task = tokio::spawn(refresher.run(shutdown.subscribe(), changes));

    let audit = Arc::new(AuditQueue::new(config.audit.queue_capacity));
    let sink = AuditSink::from_config(&config.audit.sink, timeout)?;
    let worker = AuditWorker::new(
        audit.clone(),
        sink,
        config.audit.batch_size,
        Duration::from_millis(config.audit.flush_interval_ms),
    );
    let audit_task = tokio::spawn(worker.run(shutdown.subscribe()));

    let proxy = Arc::new(
        ProxyOrchestrator::new(&config, store.clone(), audit, Arc::new(ProxyStats::new()))
            .map_err(StartupError::Init)?,
    );

    tokio::spawn(signals::listen(shutdown.clone(), store.clone()));

    if config.admin.enabled {
        let address = config.admin.bind_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;
        let app = setup_admin_router(AdminState {
            proxy: proxy.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
            started: Instant::now(),
        });
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            tracing::info!(address = ?listener.local_addr().ok(), "Admin API listening");
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;
    tracing::info!(
        address = ?listener.local_addr().ok(),
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Proxy listening"
    );

    let served = HttpServer::new(&config, proxy)
        .run(listener, shutdown.subscribe())
        .await;

    // Whatever stopped the server, stop everything else too.
    shutdown.trigger();
    if tokio::time::timeout(DRAIN_TIMEOUT, async {
        let _ = refresher_task.await;
        let _ = audit_task.await;
    })
    .await
    .is_err()
    {
        tracing::warn!("Background tasks did not finish in time");
    }

    served.map_err(StartupError::Serve)
}
