//! Response analysis and camouflage.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse
//!     → buffer.rs (read up to the analysis limit, or hand back the stream)
//!     → camouflage.rs (origin URLs → public proxy URLs, single pass)
//!     → analyzer.rs (count features / records for the log entry)
//!     → spatial masking (crate::spatial) when the plan asks for it
//! ```
//!
//! # Design Decisions
//! - Rewriting walks the XML event stream once and never builds a tree
//! - Counting is best effort; a failure is logged, never returned to the client
//! - Bodies above the analysis limit stream through untouched unless they
//!   must be rewritten or masked, in which case the call fails closed

pub mod analyzer;
pub mod buffer;
pub mod camouflage;

use thiserror::Error;

pub use analyzer::count_entities;
pub use buffer::{collect_bounded, Collected};
pub use camouflage::Camouflage;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("XML response could not be read: {0}")]
    Xml(String),

    #[error("JSON response could not be read: {0}")]
    Json(String),

    #[error("response exceeds the {limit} byte analysis limit")]
    TooLarge { limit: usize },
}
