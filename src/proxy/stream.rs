//! Byte-counting body stream that files its log entry when it ends.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::audit::{AuditQueue, ProxyLogEntry};

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Passes chunks through and counts them. The entry is queued when the
/// stream is dropped, which covers completion and client disconnect alike.
pub struct AccountedStream {
    inner: BodyStream,
    bytes: u64,
    started: Instant,
    entry: Option<ProxyLogEntry>,
    queue: Option<Arc<AuditQueue>>,
}

impl AccountedStream {
    pub fn new(inner: BodyStream, started: Instant, entry: ProxyLogEntry, queue: Option<Arc<AuditQueue>>) -> Self {
        Self {
            inner,
            bytes: 0,
            started,
            entry: Some(entry),
            queue,
        }
    }
}

impl Stream for AccountedStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            self.bytes += chunk.len() as u64;
        }
        polled
    }
}

impl Drop for AccountedStream {
    fn drop(&mut self) {
        let Some(mut entry) = self.entry.take() else {
            return;
        };
        entry.bytes_transferred = self.bytes;
        entry.duration_ms = self.started.elapsed().as_millis() as u64;
        tracing::debug!(
            request_id = %entry.request_id,
            bytes = entry.bytes_transferred,
            duration_ms = entry.duration_ms,
            "Streamed response finished"
        );
        if let Some(queue) = &self.queue {
            queue.push(entry);
        }
    }
}
