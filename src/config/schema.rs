//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the OGC security proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, concurrency).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration for upstream connection failures.
    pub retries: RetryConfig,

    /// Where services and access rules come from.
    pub catalogue: CatalogueConfig,

    /// Externally visible address used when camouflaging origin URLs.
    pub public: PublicConfig,

    /// Trusted identity headers set by the authenticating front end.
    pub identity: IdentityConfig,

    /// Proxy log delivery.
    pub audit: AuditConfig,

    /// Spatial masking limits.
    pub spatial: SpatialConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrently processed requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout towards origins in seconds.
    pub connect_secs: u64,

    /// Time allowed for an origin to answer (headers) in seconds.
    pub upstream_secs: u64,

    /// Overall budget for one proxied call before the body starts streaming.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry once after a connection-level failure.
    pub enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Catalogue (services + rules) source.
///
/// Exactly one of `path` (TOML file) or `url` (JSON over HTTP) must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogueConfig {
    pub path: Option<String>,

    pub url: Option<String>,

    /// Bearer token sent to `url`.
    pub token: Option<String>,

    /// Periodic snapshot refresh in seconds.
    pub refresh_secs: u64,

    /// Watch `path` for changes and refresh immediately.
    pub watch: bool,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            token: None,
            refresh_secs: 60,
            watch: true,
        }
    }
}

/// Public proxy address.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PublicConfig {
    /// Scheme and authority clients use to reach the proxy.
    pub base_url: String,

    /// Path under which services are mounted (`{prefix}/{service_id}`).
    pub path_prefix: String,
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            path_prefix: "/proxy".to_string(),
        }
    }
}

/// Trusted identity headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_header: String,

    pub groups_header: String,

    pub group_separator: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_header: "x-auth-user".to_string(),
            groups_header: "x-auth-groups".to_string(),
            group_separator: ",".to_string(),
        }
    }
}

/// Proxy log delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Bounded queue size; the oldest entry is dropped when full.
    pub queue_capacity: usize,

    /// Entries written per sink call.
    pub batch_size: usize,

    /// Maximum time an entry waits before being flushed.
    pub flush_interval_ms: u64,

    pub sink: AuditSinkConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval_ms: 1000,
            sink: AuditSinkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuditSinkConfig {
    /// Emit entries as structured tracing events.
    #[default]
    Tracing,

    /// Append JSON lines to a file.
    Jsonl { path: String },

    /// POST JSON batches to the catalogue.
    Http { url: String, token: Option<String> },
}

/// Spatial masking limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Largest WIDTH or HEIGHT accepted for raster masking or empty images.
    pub max_image_dimension: u32,

    /// Size of empty images when a request carries no WIDTH/HEIGHT.
    pub default_tile_size: u32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            max_image_dimension: 8192,
            default_tile_size: 256,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "json" or "pretty".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Request and response size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Largest upstream body buffered for rewriting, masking or counting.
    pub max_analyzed_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            max_analyzed_bytes: 32 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [catalogue]
            path = "catalogue.toml"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.public.path_prefix, "/proxy");
        assert_eq!(config.audit.sink, AuditSinkConfig::Tracing);
        assert!(config.retries.enabled);
    }

    #[test]
    fn test_audit_sink_variants() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [audit.sink]
            kind = "jsonl"
            path = "/var/log/proxy.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.audit.sink,
            AuditSinkConfig::Jsonl {
                path: "/var/log/proxy.jsonl".into()
            }
        );
    }
}
