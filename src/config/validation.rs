//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that exactly one catalogue source is configured
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::{AuditSinkConfig, ProxyConfig};

/// One semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    for (field, value) in [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    let catalogue = &config.catalogue;
    match (&catalogue.path, &catalogue.url) {
        (None, None) => errors.push(ValidationError::new("catalogue", "set either path or url")),
        (Some(_), Some(_)) => errors.push(ValidationError::new("catalogue", "path and url are exclusive")),
        (None, Some(url)) => {
            if url::Url::parse(url).is_err() {
                errors.push(ValidationError::new("catalogue.url", "not a valid URL"));
            }
        }
        (Some(_), None) => {}
    }
    if catalogue.refresh_secs == 0 {
        errors.push(ValidationError::new("catalogue.refresh_secs", "must be > 0"));
    }

    match url::Url::parse(&config.public.base_url) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
        _ => errors.push(ValidationError::new("public.base_url", "must be an absolute http(s) URL")),
    }
    if !config.public.path_prefix.starts_with('/') {
        errors.push(ValidationError::new("public.path_prefix", "must start with '/'"));
    }

    for (field, value) in [
        ("identity.user_header", &config.identity.user_header),
        ("identity.groups_header", &config.identity.groups_header),
    ] {
        if HeaderName::from_bytes(value.as_bytes()).is_err() {
            errors.push(ValidationError::new(field, "not a valid header name"));
        }
    }
    if config.identity.group_separator.is_empty() {
        errors.push(ValidationError::new("identity.group_separator", "must not be empty"));
    }

    if config.audit.queue_capacity == 0 {
        errors.push(ValidationError::new("audit.queue_capacity", "must be > 0"));
    }
    if config.audit.batch_size == 0 {
        errors.push(ValidationError::new("audit.batch_size", "must be > 0"));
    }
    if let AuditSinkConfig::Http { url, .. } = &config.audit.sink {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::new("audit.sink.url", "not a valid URL"));
        }
    }

    if config.spatial.max_image_dimension == 0 || config.spatial.default_tile_size == 0 {
        errors.push(ValidationError::new("spatial", "image sizes must be > 0"));
    }
    if config.spatial.default_tile_size > config.spatial.max_image_dimension {
        errors.push(ValidationError::new(
            "spatial.default_tile_size",
            "exceeds max_image_dimension",
        ));
    }

    if !matches!(config.observability.log_format.as_str(), "json" | "pretty") {
        errors.push(ValidationError::new("observability.log_format", "expected json or pretty"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() || config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            errors.push(ValidationError::new("admin.api_key", "set a real key"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
