//! Access-control policy: rule snapshot and matcher.
//!
//! # Data Flow
//! ```text
//! CatalogueDocument
//!     → snapshot.rs (validate rules, exclude broken ones, index by service+subject)
//!     → store.rs (ArcSwap, copy-on-write replacement)
//!
//! per request:
//!     store.load() ──▶ matcher.rs ──▶ AuthorizationResult (decision.rs)
//!
//! refresh.rs: timer | invalidate() | file change ──▶ reload ──▶ store.replace()
//! ```
//!
//! # Design Decisions
//! - Snapshots are never mutated; a refresh builds a new one
//! - In-flight requests keep the snapshot they started with
//! - A failed reload keeps the previous snapshot active
//! - Subjects referenced by excluded rules stay closed

pub mod decision;
pub mod matcher;
pub mod refresh;
pub mod snapshot;
pub mod store;

pub use decision::{AuthorizationResult, Decision, LayerDecision};
pub use matcher::authorize;
pub use refresh::SnapshotRefresher;
pub use snapshot::{RuleConfigurationError, RuleSnapshot};
pub use store::SnapshotStore;
