//! Per-service outcome counters for the admin API.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    outcomes: DashMap<&'static str, AtomicU64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceStats {
    pub service: String,
    pub total: u64,
    pub outcomes: BTreeMap<String, u64>,
}

/// Lock-free request statistics keyed by service id.
#[derive(Default)]
pub struct ProxyStats {
    services: DashMap<String, Counters>,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, service: &str, outcome: &'static str) {
        let entry = self.services.entry(service.to_string()).or_default();
        entry.total.fetch_add(1, Ordering::Relaxed);
        entry
            .outcomes
            .entry(outcome)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.services
            .iter()
            .map(|e| e.value().total.load(Ordering::Relaxed))
            .sum()
    }

    pub fn summary(&self) -> Vec<ServiceStats> {
        let mut out: Vec<ServiceStats> = self
            .services
            .iter()
            .map(|e| ServiceStats {
                service: e.key().clone(),
                total: e.value().total.load(Ordering::Relaxed),
                outcomes: e
                    .value()
                    .outcomes
                    .iter()
                    .map(|o| (o.key().to_string(), o.value().load(Ordering::Relaxed)))
                    .collect(),
            })
            .collect();
        out.sort_by(|a, b| a.service.cmp(&b.service));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_service() {
        let stats = ProxyStats::new();
        stats.record("wms1", "passthrough");
        stats.record("wms1", "denied");
        stats.record("wms1", "denied");
        stats.record("wfs1", "empty");

        assert_eq!(stats.total(), 4);
        let summary = stats.summary();
        assert_eq!(summary[0].service, "wfs1");
        assert_eq!(summary[1].outcomes.get("denied"), Some(&2));
    }
}
