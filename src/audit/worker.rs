//! Background audit writer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{AuditQueue, AuditSink};

pub struct AuditWorker {
    queue: Arc<AuditQueue>,
    sink: AuditSink,
    batch_size: usize,
    flush_interval: Duration,
}

impl AuditWorker {
    pub fn new(queue: Arc<AuditQueue>, sink: AuditSink, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            queue,
            sink,
            batch_size: batch_size.max(1),
            flush_interval,
        }
    }

    /// Write batches until shutdown, then drain what is left.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(sink = self.sink.name(), "Audit worker started");
        let mut ticker = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                _ = self.queue.notified() => {
                    if self.queue.len() >= self.batch_size {
                        self.flush().await;
                    }
                }
                _ = shutdown.recv() => {
                    self.flush().await;
                    tracing::info!(dropped = self.queue.dropped(), "Audit worker stopped");
                    return;
                }
            }
        }
    }

    /// Write everything currently queued.
    pub async fn flush(&self) {
        loop {
            let batch = self.queue.drain(self.batch_size);
            if batch.is_empty() {
                return;
            }
            if let Err(e) = self.sink.write(&batch).await {
                tracing::warn!(sink = self.sink.name(), entries = batch.len(), error = %e, "Audit batch discarded");
            }
        }
    }
}
