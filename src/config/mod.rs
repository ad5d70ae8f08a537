//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → passed explicitly into the orchestrator and background tasks
//! ```
//!
//! # Design Decisions
//! - Process config is immutable once loaded; the catalogue of services and
//!   rules is the part that changes at runtime (see `catalogue`, `policy`)
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, AuditSinkConfig, CatalogueConfig, IdentityConfig, ListenerConfig,
    ObservabilityConfig, ProxyConfig, PublicConfig, RetryConfig, SecurityConfig, SpatialConfig,
    TimeoutConfig,
};
