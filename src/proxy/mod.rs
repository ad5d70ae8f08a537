//! Proxy orchestration.
//!
//! # Data Flow
//! ```text
//! /proxy/{service_id} (GET | POST)
//!     → identity.rs (trusted headers → Principal)
//!     → orchestrator.rs
//!         ogc::normalize → policy::authorize → spatial::evaluate
//!         → spatial::empty_payload | upstream::dispatch → response analysis
//!     → error.rs (failures → OGC exception + status)
//!     → stream.rs (streamed bodies file their audit entry when done)
//! ```
//!
//! # Design Decisions
//! - Fail closed: any error while evaluating rules or geometry denies
//! - The rule snapshot is captured once at the start of a call
//! - Configuration is passed in explicitly, nothing is process-global

pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod stream;

pub use error::ProxyError;
pub use identity::IdentityResolver;
pub use orchestrator::{InboundCall, ProxyOrchestrator};
