//! Audit log of proxied calls.
//!
//! # Data Flow
//! ```text
//! orchestrator ──push──▶ queue.rs (bounded, drops the oldest entry when full)
//!                            │
//!                 worker.rs (batch by size or interval, drain on shutdown)
//!                            │
//!                 sink.rs ──▶ tracing | JSON lines file | HTTP endpoint
//! ```
//!
//! # Design Decisions
//! - Pushing never blocks and never fails the client request
//! - Delivery is best effort; a failed batch is logged and discarded
//! - Entries carry their own timestamp, ordering between them is not kept

pub mod entry;
pub mod queue;
pub mod sink;
pub mod worker;

use thiserror::Error;

pub use entry::{Outcome, ProxyLogEntry};
pub use queue::AuditQueue;
pub use sink::AuditSink;
pub use worker::AuditWorker;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit endpoint unreachable: {0}")]
    Http(String),

    #[error("audit endpoint answered {0}")]
    Status(u16),
}
