//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router + tower layers)
//!         request id → trace span → concurrency limit → body limit
//!     → /proxy/{service_id}     → proxy::ProxyOrchestrator
//!     → /health                 → liveness + snapshot generation
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
