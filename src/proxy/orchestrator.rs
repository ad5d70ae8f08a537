//! Per-call state flow.
//!
//! ```text
//! RECEIVED → PARSED ─┬─▶ REJECTED (malformed, unknown service/layer)
//!                    ├─▶ DENIED
//!                    └─▶ AUTHORIZED ─┬─▶ EMPTY (no upstream call)
//!                                    └─▶ DISPATCHED → RESPONSE_RECEIVED → PASSTHROUGH | MASKED
//! every terminal state → LOGGED → RETURNED
//! ```
//!
//! A GET below the service path without an OGC `REQUEST` fetches a static
//! document next to the origin endpoint (schemas, legends). It needs the
//! same grant as `GetCapabilities`.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ProxyError;
use super::identity::IdentityResolver;
use super::stream::{AccountedStream, BodyStream};
use crate::audit::{AuditQueue, Outcome, ProxyLogEntry};
use crate::catalogue::{Principal, SecuredService};
use crate::config::{ProxyConfig, PublicConfig, SpatialConfig};
use crate::observability::{metrics, ProxyStats};
use crate::ogc::{
    normalize, HttpMethod, KvpParams, Operation, OperationRequest, RawCall, RequestError, ServiceKind,
};
use crate::policy::{authorize, Decision, RuleSnapshot, SnapshotStore};
use crate::response::{collect_bounded, count_entities, AnalysisError, Camouflage, Collected};
use crate::spatial::{self, MaskPlan, SpatialEvaluationError, SpatialPlan};
use crate::upstream::{ForwardedCall, UpstreamDispatcher, UpstreamResponse};

/// The inbound HTTP call.
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub request_id: String,
    pub method: HttpMethod,
    pub query: Option<String>,
    /// Path below `/proxy/{service}/`, already percent-decoded.
    pub sub_path: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Request-scoped facts collected for the log entry.
#[derive(Debug, Default)]
struct CallTrace {
    kind: Option<ServiceKind>,
    version: Option<&'static str>,
    operation: Option<Operation>,
    layers: Vec<String>,
    matched_rule_ids: Vec<u64>,
    decision: Option<Decision>,
    entity_count: Option<u64>,
    logging: bool,
}

enum Reply {
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
        outcome: Outcome,
    },
    Streamed {
        status: StatusCode,
        headers: HeaderMap,
        body: BodyStream,
    },
}

pub struct ProxyOrchestrator {
    store: Arc<SnapshotStore>,
    dispatcher: UpstreamDispatcher,
    identity: IdentityResolver,
    audit: Arc<AuditQueue>,
    stats: Arc<ProxyStats>,
    public: PublicConfig,
    spatial: SpatialConfig,
    max_analyzed_bytes: usize,
    request_timeout: Duration,
}

impl ProxyOrchestrator {
    pub fn new(
        config: &ProxyConfig,
        store: Arc<SnapshotStore>,
        audit: Arc<AuditQueue>,
        stats: Arc<ProxyStats>,
    ) -> Result<Self, String> {
        Ok(Self {
            store,
            dispatcher: UpstreamDispatcher::new(&config.timeouts, &config.retries).map_err(|e| e.to_string())?,
            identity: IdentityResolver::from_config(&config.identity)?,
            audit,
            stats,
            public: config.public.clone(),
            spatial: config.spatial.clone(),
            max_analyzed_bytes: config.security.max_analyzed_bytes,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        })
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    pub fn audit(&self) -> &Arc<AuditQueue> {
        &self.audit
    }

    /// Run one proxied call to completion and build the client response.
    pub async fn handle(&self, service_id: &str, call: InboundCall) -> Response {
        let started = Instant::now();
        // Captured once; a refresh during the call does not affect it.
        let snapshot = self.store.load();
        let principal = self.identity.resolve(&call.headers);
        let mut trace = CallTrace {
            logging: true,
            ..CallTrace::default()
        };

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.process(&snapshot, service_id, &call, &principal, &mut trace),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProxyError::Timeout(self.request_timeout)),
        };

        let (response, outcome, entry) = match result {
            Ok(Reply::Buffered {
                status,
                headers,
                body,
                outcome,
            }) => {
                let mut entry = self.entry(&call, service_id, &principal, &trace, outcome, status, started);
                entry.bytes_transferred = body.len() as u64;
                (build(status, headers, Body::from(body)), outcome, Some(entry))
            }
            Ok(Reply::Streamed { status, headers, body }) => {
                let entry = self.entry(&call, service_id, &principal, &trace, Outcome::Passthrough, status, started);
                let queue = trace.logging.then(|| self.audit.clone());
                let stream = AccountedStream::new(body, started, entry, queue);
                (build(status, headers, Body::from_stream(stream)), Outcome::Passthrough, None)
            }
            Err(e) => {
                let outcome = e.outcome();
                let status = e.status();
                if outcome == Outcome::Denied {
                    trace.decision = Some(Decision::Deny);
                }
                match outcome {
                    Outcome::Denied if !matches!(e, ProxyError::Denied(_)) => tracing::error!(
                        request_id = %call.request_id,
                        service = %service_id,
                        error = %e,
                        "Spatial evaluation failed, denying"
                    ),
                    Outcome::Error | Outcome::UpstreamError => tracing::warn!(
                        request_id = %call.request_id,
                        service = %service_id,
                        error = %e,
                        "Proxied call failed"
                    ),
                    _ => {}
                }
                let response = e.to_response(trace.kind, trace.version);
                let entry = self.entry(&call, service_id, &principal, &trace, outcome, status, started);
                (response, outcome, Some(entry))
            }
        };

        tracing::info!(
            request_id = %call.request_id,
            service = %service_id,
            operation = trace.operation.map(|o| o.as_str()).unwrap_or("-"),
            principal = %principal,
            matched_rules = ?trace.matched_rule_ids,
            decision = trace.decision.map(|d| d.as_str()).unwrap_or("-"),
            outcome = outcome.as_str(),
            status = response.status().as_u16(),
            "Request handled"
        );
        metrics::record_request(
            service_id,
            trace.operation.map(|o| o.as_str()).unwrap_or("unknown"),
            outcome.as_str(),
            started,
        );
        self.stats.record(service_id, outcome.as_str());

        if let Some(entry) = entry {
            if trace.logging {
                self.audit.push(entry);
            }
        }
        response
    }

    async fn process(
        &self,
        snapshot: &RuleSnapshot,
        service_id: &str,
        call: &InboundCall,
        principal: &Principal,
        trace: &mut CallTrace,
    ) -> Result<Reply, ProxyError> {
        let service = snapshot
            .service(service_id)
            .ok_or_else(|| ProxyError::UnknownService(service_id.to_string()))?;
        trace.kind = Some(service.kind);
        trace.logging = service.settings.logging;

        if let Some(path) = call.sub_path.as_deref() {
            if !carries_ogc_request(call) {
                return self.resource(snapshot, service, path, call, principal, trace).await;
            }
        }

        let content_type = call.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let raw = RawCall {
            method: call.method,
            query: call.query.as_deref(),
            content_type,
            body: &call.body,
        };
        let request = normalize(&raw, service.kind)?;
        trace.version = request.version;
        trace.operation = Some(request.operation);
        trace.layers = request.layers.clone();

        if service.declares_layers() {
            let unknown: Vec<String> = request
                .layers
                .iter()
                .filter(|l| !service.has_layer(l))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(ProxyError::UnknownLayer(unknown));
            }
        }

        let auth = authorize(snapshot, service_id, request.operation, &request.layers, principal)
            .map_err(ProxyError::Policy)?;
        trace.matched_rule_ids = auth.matched_rule_ids();
        trace.decision = Some(auth.decision);
        if !auth.is_allowed() {
            return Err(ProxyError::Denied(
                auth.denied_layers().into_iter().map(str::to_string).collect(),
            ));
        }

        let plan = spatial::evaluate(&request, &auth)?;
        if plan == SpatialPlan::Empty {
            let payload = spatial::empty_payload(&request, &self.spatial)?;
            let mut headers = HeaderMap::new();
            if let Ok(ct) = HeaderValue::from_str(&payload.content_type) {
                headers.insert(header::CONTENT_TYPE, ct);
            }
            trace.entity_count = request.operation.returns_entities().then_some(0);
            return Ok(Reply::Buffered {
                status: StatusCode::OK,
                headers,
                body: payload.body,
                outcome: Outcome::Empty,
            });
        }

        let forwarded = ForwardedCall {
            query: call.query.as_deref(),
            content_type,
            body: call.body.clone(),
            headers: &call.headers,
            request_id: &call.request_id,
        };
        let upstream = self.dispatcher.dispatch(service, &request, &forwarded).await?;
        let mask = match plan {
            SpatialPlan::Mask(m) => Some(m),
            _ => None,
        };
        self.finish(service, &request, upstream, mask, trace).await
    }

    async fn resource(
        &self,
        snapshot: &RuleSnapshot,
        service: &SecuredService,
        path: &str,
        call: &InboundCall,
        principal: &Principal,
        trace: &mut CallTrace,
    ) -> Result<Reply, ProxyError> {
        let segments = resource_segments(path)?;
        let auth = authorize(snapshot, &service.id, Operation::GetCapabilities, &[], principal)
            .map_err(ProxyError::Policy)?;
        trace.matched_rule_ids = auth.matched_rule_ids();
        trace.decision = Some(auth.decision);
        if !auth.is_allowed() {
            return Err(ProxyError::Denied(vec![path.to_string()]));
        }

        let forwarded = ForwardedCall {
            query: None,
            content_type: None,
            body: Bytes::new(),
            headers: &call.headers,
            request_id: &call.request_id,
        };
        let upstream = self.dispatcher.dispatch_resource(service, &segments, &forwarded).await?;
        let request = OperationRequest {
            service: service.kind,
            version: None,
            operation: Operation::GetCapabilities,
            layers: Vec::new(),
            bbox: None,
            output_format: None,
            info_format: None,
            srs: None,
            size: None,
            pixel: None,
            http_method: HttpMethod::Get,
        };
        self.finish(service, &request, upstream, None, trace).await
    }

    /// RESPONSE_RECEIVED → PASSTHROUGH | MASKED.
    async fn finish(
        &self,
        service: &SecuredService,
        request: &OperationRequest,
        mut upstream: UpstreamResponse,
        mask: Option<MaskPlan>,
        trace: &mut CallTrace,
    ) -> Result<Reply, ProxyError> {
        let status = upstream.status;
        let success = status.is_success();
        let camouflage = service
            .settings
            .camouflage
            .then(|| Camouflage::for_service(service, &self.public));
        if let Some(c) = &camouflage {
            c.rewrite_headers(&mut upstream.headers);
        }

        let rewrite = success
            && camouflage.is_some()
            && request.operation.describes_service()
            && !upstream.content_type().is_some_and(|ct| ct.starts_with("image/"));
        let mask = mask.filter(|_| success);
        let count = success && request.operation.returns_entities();

        if !rewrite && mask.is_none() && !count {
            let headers = std::mem::take(&mut upstream.headers);
            return Ok(Reply::Streamed {
                status,
                headers,
                body: Box::pin(upstream.into_stream()),
            });
        }

        let mut body = match collect_bounded(&mut upstream, self.max_analyzed_bytes).await? {
            Collected::Complete(body) => body,
            Collected::Overflow(prefix) => {
                let limit = self.max_analyzed_bytes;
                if mask.is_some() {
                    return Err(SpatialEvaluationError::Decode(format!(
                        "response exceeds the {limit} byte analysis limit"
                    ))
                    .into());
                }
                if rewrite {
                    return Err(AnalysisError::TooLarge { limit }.into());
                }
                tracing::debug!(limit, "Response too large to count, streaming");
                let headers = std::mem::take(&mut upstream.headers);
                let rest = upstream.into_stream();
                let head = futures_util::stream::once(async move { Ok(Bytes::from(prefix)) });
                return Ok(Reply::Streamed {
                    status,
                    headers,
                    body: Box::pin(head.chain(rest)),
                });
            }
        };
        let mut headers = std::mem::take(&mut upstream.headers);
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut outcome = Outcome::Passthrough;

        if let Some(plan) = &mask {
            if request.operation == Operation::GetMap {
                body = spatial::mask_image(&body, content_type.as_deref(), plan, self.spatial.max_image_dimension)?;
            } else {
                let filtered = spatial::filter_features(&body, content_type.as_deref(), plan)?;
                trace.entity_count = Some(filtered.kept as u64);
                body = filtered.body;
            }
            outcome = Outcome::Masked;
        }

        if rewrite && looks_like_xml(&body, content_type.as_deref()) {
            if let Some(c) = &camouflage {
                let (rewritten, count) = c.rewrite_document(&body)?;
                tracing::debug!(service = %service.id, rewrites = count, "Camouflaged origin URLs");
                body = rewritten;
            }
        }

        if count && trace.entity_count.is_none() {
            match count_entities(request.operation, &body, content_type.as_deref()) {
                Ok(n) => trace.entity_count = n,
                Err(e) => tracing::warn!(service = %service.id, error = %e, "Entity count failed"),
            }
        }

        headers.remove(header::CONTENT_LENGTH);
        Ok(Reply::Buffered {
            status,
            headers,
            body,
            outcome,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        call: &InboundCall,
        service_id: &str,
        principal: &Principal,
        trace: &CallTrace,
        outcome: Outcome,
        status: StatusCode,
        started: Instant,
    ) -> ProxyLogEntry {
        ProxyLogEntry {
            timestamp: chrono::Utc::now(),
            request_id: call.request_id.clone(),
            service: service_id.to_string(),
            operation: trace.operation.map(|o| o.as_str().to_string()),
            layers: trace.layers.clone(),
            principal: principal.to_string(),
            matched_rule_ids: trace.matched_rule_ids.clone(),
            decision: trace.decision,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            status_code: status.as_u16(),
            bytes_transferred: 0,
            entity_count: trace.entity_count,
        }
    }
}

fn carries_ogc_request(call: &InboundCall) -> bool {
    call.method == HttpMethod::Post || KvpParams::parse(call.query.as_deref().unwrap_or("")).get("REQUEST").is_some()
}

/// Split a resource path, refusing segments that could climb out of the
/// origin path.
fn resource_segments(path: &str) -> Result<Vec<&str>, RequestError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        return Err(RequestError::InvalidParameter {
            param: "path",
            reason: format!("unusable resource path {path}"),
        });
    }
    Ok(segments)
}

fn looks_like_xml(body: &[u8], content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) if ct.to_ascii_lowercase().contains("xml") => true,
        _ => body.trim_ascii_start().first() == Some(&b'<'),
    }
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_segments() {
        assert_eq!(resource_segments("schemas/wms.xsd").unwrap(), vec!["schemas", "wms.xsd"]);
        for bad in ["../secret", "schemas/../../x", "./x", "a//b", "schemas/", "a\\..\\b"] {
            assert!(resource_segments(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_ogc_request_detection() {
        let call = |method, query: &str| InboundCall {
            request_id: "r".into(),
            method,
            query: Some(query.to_string()),
            sub_path: Some("x".into()),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        assert!(carries_ogc_request(&call(HttpMethod::Get, "service=WMS&request=GetMap")));
        assert!(!carries_ogc_request(&call(HttpMethod::Get, "v=2")));
        assert!(carries_ogc_request(&call(HttpMethod::Post, "")));
    }
}
