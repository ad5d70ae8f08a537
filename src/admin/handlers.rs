use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use super::AdminState;
use crate::observability::stats::ServiceStats;
use crate::policy::snapshot::ExcludedRule;

#[derive(Serialize)]
pub struct SnapshotSummary {
    pub generation: u64,
    pub loaded_at: String,
    pub services: usize,
    pub rules: usize,
    pub excluded_rules: usize,
}

#[derive(Serialize)]
pub struct AuditSummary {
    pub queued: usize,
    pub dropped: u64,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub snapshot: SnapshotSummary,
    pub audit: AuditSummary,
    pub total_requests: u64,
    pub services: Vec<ServiceStats>,
}

#[derive(Serialize)]
pub struct ServiceView {
    pub id: String,
    pub kind: &'static str,
    pub layers: Vec<String>,
    pub logging: bool,
    pub camouflage: bool,
}

#[derive(Serialize)]
pub struct RuleView {
    pub id: u64,
    pub service: String,
    pub layers: Vec<String>,
    pub operations: Vec<&'static str>,
    pub groups: Vec<String>,
    pub restricted_area: bool,
    pub description: String,
}

#[derive(Serialize)]
pub struct RulesView {
    pub generation: u64,
    pub services: Vec<ServiceView>,
    pub rules: Vec<RuleView>,
    pub excluded: Vec<ExcludedRule>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.proxy.store().load();
    let audit = state.proxy.audit();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        snapshot: SnapshotSummary {
            generation: snapshot.generation(),
            loaded_at: snapshot.loaded_at().to_rfc3339(),
            services: snapshot.services().count(),
            rules: snapshot.rule_count(),
            excluded_rules: snapshot.excluded().len(),
        },
        audit: AuditSummary {
            queued: audit.len(),
            dropped: audit.dropped(),
        },
        total_requests: state.proxy.stats().total(),
        services: state.proxy.stats().summary(),
    })
}

pub async fn get_rules(State(state): State<AdminState>) -> Json<RulesView> {
    let snapshot = state.proxy.store().load();

    let mut services: Vec<ServiceView> = snapshot
        .services()
        .map(|s| ServiceView {
            id: s.id.clone(),
            kind: s.kind.as_str(),
            layers: s.layers.iter().map(|l| l.name.clone()).collect(),
            logging: s.settings.logging,
            camouflage: s.settings.camouflage,
        })
        .collect();
    services.sort_by(|a, b| a.id.cmp(&b.id));

    let rules = snapshot
        .rules()
        .iter()
        .map(|r| RuleView {
            id: r.id,
            service: r.service.clone(),
            layers: r.layers.iter().cloned().collect(),
            operations: r.operations.iter().map(|o| o.as_str()).collect(),
            groups: r.groups.iter().cloned().collect(),
            restricted_area: r.area.is_some(),
            description: r.description.clone(),
        })
        .collect();

    Json(RulesView {
        generation: snapshot.generation(),
        services,
        rules,
        excluded: snapshot.excluded().to_vec(),
    })
}

pub async fn invalidate_rules(State(state): State<AdminState>) -> (StatusCode, Json<serde_json::Value>) {
    state.proxy.store().invalidate();
    tracing::info!("Rule snapshot invalidated via admin API");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "reload requested" })),
    )
}
