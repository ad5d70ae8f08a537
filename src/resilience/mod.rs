//! Resilience for upstream calls.
//!
//! # Data Flow
//! ```text
//! upstream send fails
//!     → retries.rs (classify the failure, decide on the single retry)
//!     → backoff.rs (jittered delay before the retry)
//! ```
//!
//! # Design Decisions
//! - Only connection-level failures are retried, and only once
//! - Any HTTP response, including 4xx/5xx, is final and passed through
//! - Timeouts are not retried: the deadline has already been spent

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{FailureKind, RetryPolicy};
