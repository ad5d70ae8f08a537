//! Upstream dispatch.
//!
//! # Data Flow
//! ```text
//! authorized OperationRequest + SecuredService
//!     → dispatcher.rs: resolve origin URL for (operation, method)
//!     → merge the client query into the origin query (GET) or forward the body (POST)
//!     → allowlisted headers only, identity headers never leave the proxy
//!     → send with a deadline; one retry after a connection failure
//!     → UpstreamResponse (status + headers, body still streaming)
//! ```
//!
//! # Design Decisions
//! - Upstream 4xx/5xx are ordinary responses: passed through, never retried
//! - Redirects are not followed; a `Location` header reaches the client
//!   through the camouflage rewriter

pub mod dispatcher;

use std::time::Duration;
use thiserror::Error;

use crate::ogc::{HttpMethod, Operation};

pub use dispatcher::{merge_query, ForwardedCall, UpstreamDispatcher, UpstreamResponse};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no origin URL registered for {operation} via {method}")]
    NoOrigin { operation: Operation, method: HttpMethod },

    #[error("invalid origin URL {url}: {reason}")]
    InvalidOrigin { url: String, reason: String },

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream connection failed: {0}")]
    Connect(String),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("failed to build upstream client: {0}")]
    Client(String),
}
