//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum router for proxied services and health
//! - Wire middleware (request id, tracing, limits)
//! - Serve until the shutdown broadcast fires

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::ogc::HttpMethod;
use crate::proxy::{InboundCall, ProxyOrchestrator};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ProxyOrchestrator>,
}

pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, proxy: Arc<ProxyOrchestrator>) -> Self {
        let router = Self::build_router(config, AppState { proxy });
        Self { router }
    }

    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let prefix = format!("/{}", config.public.path_prefix.trim_matches('/'));
        let prefix = if prefix == "/" { String::new() } else { prefix };

        Router::new()
            .route(&format!("{prefix}/{{service_id}}"), get(proxy_handler).post(proxy_handler))
            // Camouflaged URLs may carry a trailing path; it is not forwarded.
            .route(
                &format!("{prefix}/{{service_id}}/{{*rest}}"),
                get(nested_proxy_handler).post(nested_proxy_handler),
            )
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size)),
            )
    }

    /// Router without a listener, for driving requests in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(state, service_id, None, method, uri, headers, body).await
}

async fn nested_proxy_handler(
    State(state): State<AppState>,
    Path((service_id, rest)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(state, service_id, Some(rest), method, uri, headers, body).await
}

async fn forward(
    state: AppState,
    service_id: String,
    sub_path: Option<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = if method == Method::POST {
        HttpMethod::Post
    } else {
        HttpMethod::Get
    };
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let call = InboundCall {
        request_id,
        method,
        query: uri.query().map(str::to_string),
        sub_path,
        headers,
        body,
    };
    state.proxy.handle(&service_id, call).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.proxy.store().load();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "snapshot_generation": snapshot.generation(),
        })),
    )
}
