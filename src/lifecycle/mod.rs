//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     metrics → rule source → first snapshot → background tasks → listeners
//!
//! Shutdown (shutdown.rs):
//!     signal → broadcast → servers drain, refresher stops, audit worker flushes
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → invalidate the rule snapshot
//! ```
//!
//! # Design Decisions
//! - Fail fast: no listener is bound until the first catalogue load succeeded
//! - Background tasks get a bounded time to finish after shutdown

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, StartupError};
