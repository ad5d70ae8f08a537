//! Catalogue boundary: services, layers and access rules.
//!
//! # Data Flow
//! ```text
//! catalogue file (TOML) / catalogue endpoint (JSON)
//!     → source.rs (RuleSource::load)
//!     → CatalogueDocument { services, rules }
//!     → policy::snapshot (compiled, immutable)
//!
//! watcher.rs: file change → refresh request
//! ```
//!
//! # Design Decisions
//! - Rules are authored by the catalogue, never by the proxy
//! - The document is reloaded as a whole; there is no incremental update

pub mod model;
pub mod source;
pub mod watcher;

pub use model::{
    AllowedOperation, CatalogueDocument, OperationUrl, Principal, RuleRecord, SecuredLayer,
    SecuredService, SecuritySettings,
};
pub use source::{RuleSource, SourceError};
pub use watcher::CatalogueWatcher;
