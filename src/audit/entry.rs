use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::policy::Decision;

/// Terminal state of a proxied call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passthrough,
    Masked,
    Empty,
    Denied,
    Rejected,
    NotFound,
    UpstreamError,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passthrough => "passthrough",
            Outcome::Masked => "masked",
            Outcome::Empty => "empty",
            Outcome::Denied => "denied",
            Outcome::Rejected => "rejected",
            Outcome::NotFound => "not_found",
            Outcome::UpstreamError => "upstream_error",
            Outcome::Error => "error",
        }
    }
}

/// One record per proxied call. Never mutated after it is queued.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub service: String,
    pub operation: Option<String>,
    pub layers: Vec<String>,
    pub principal: String,
    pub matched_rule_ids: Vec<u64>,
    /// Absent when the call was rejected before authorization.
    pub decision: Option<Decision>,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub status_code: u16,
    pub bytes_transferred: u64,
    pub entity_count: Option<u64>,
}

#[cfg(test)]
pub(crate) fn sample(n: u64) -> ProxyLogEntry {
    ProxyLogEntry {
        timestamp: Utc::now(),
        request_id: format!("req-{n}"),
        service: "wms1".into(),
        operation: Some("GetMap".into()),
        layers: vec!["LayerA".into()],
        principal: "alice".into(),
        matched_rule_ids: vec![n],
        decision: Some(Decision::Allow),
        outcome: Outcome::Passthrough,
        duration_ms: 3,
        status_code: 200,
        bytes_transferred: 10,
        entity_count: None,
    }
}
