//! OGC protocol layer (request normalizer).
//!
//! # Data Flow
//! ```text
//! query string / form body ──▶ kvp.rs ──┐
//!                                       ├──▶ request.rs ──▶ OperationRequest
//! XML body ──▶ xml.rs + filter.rs ──────┘
//!
//! ProxyError ──▶ exception.rs ──▶ ServiceExceptionReport / ows:ExceptionReport
//! ```
//!
//! # Design Decisions
//! - Parameter names are case-insensitive, values are kept verbatim
//! - Only bounding boxes are read from filters; other predicates pass through
//! - Axis order is resolved at parse time so later stages see east/north

pub mod exception;
pub mod filter;
pub mod kvp;
pub mod request;
pub mod types;
pub mod xml;

pub use exception::{ExceptionCode, ExceptionReport};
pub use kvp::KvpParams;
pub use request::{normalize, OperationRequest, RawCall, RequestError};
pub use types::{HttpMethod, Operation, ServiceKind};
