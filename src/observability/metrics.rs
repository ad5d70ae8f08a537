//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ogc_proxy_requests_total` (counter): proxied calls by service, operation, outcome
//! - `ogc_proxy_request_duration_seconds` (histogram): time until the response head
//! - `ogc_proxy_upstream_retries_total` (counter): retries after connection failures
//! - `ogc_proxy_audit_dropped_total` (counter): log entries dropped on a full queue
//! - `ogc_proxy_snapshot_rules` / `ogc_proxy_snapshot_excluded_rules` /
//!   `ogc_proxy_snapshot_generation` (gauges): active rule snapshot

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(service: &str, operation: &str, outcome: &'static str, start: Instant) {
    metrics::counter!(
        "ogc_proxy_requests_total",
        "service" => service.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("ogc_proxy_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_retry(service: &str) {
    metrics::counter!("ogc_proxy_upstream_retries_total", "service" => service.to_string()).increment(1);
}

pub fn record_audit_dropped() {
    metrics::counter!("ogc_proxy_audit_dropped_total").increment(1);
}

pub fn record_snapshot(rules: usize, excluded: usize, generation: u64) {
    metrics::gauge!("ogc_proxy_snapshot_rules").set(rules as f64);
    metrics::gauge!("ogc_proxy_snapshot_excluded_rules").set(excluded as f64);
    metrics::gauge!("ogc_proxy_snapshot_generation").set(generation as f64);
}
