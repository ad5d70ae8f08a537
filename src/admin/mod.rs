//! Admin API on its own listener.
//!
//! # Endpoints
//! - `GET /admin/status`: version, uptime, snapshot and audit counters, per-service outcomes
//! - `GET /admin/rules`: services and rules of the active snapshot, with exclusions
//! - `POST /admin/rules/invalidate`: reload the catalogue now
//!
//! All endpoints require `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use self::auth::admin_auth_middleware;
use self::handlers::{get_rules, get_status, invalidate_rules};
use crate::proxy::ProxyOrchestrator;

#[derive(Clone)]
pub struct AdminState {
    pub proxy: Arc<ProxyOrchestrator>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/rules", get(get_rules))
        .route("/admin/rules/invalidate", post(invalidate_rules))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
