//! Forwarding authorized calls to the origin service.

use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use bytes::Bytes;
use futures_util::Stream;
use std::time::{Duration, Instant};
use url::Url;

use super::UpstreamError;
use crate::catalogue::SecuredService;
use crate::config::{RetryConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::ogc::{HttpMethod, Operation, OperationRequest};
use crate::resilience::{FailureKind, RetryPolicy};

/// Request headers copied to the origin.
const FORWARDED_HEADERS: &[HeaderName] = &[
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::USER_AGENT,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
];

/// Response headers never copied back to the client.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "set-cookie",
];

/// The parts of the inbound call that travel upstream.
#[derive(Debug, Clone)]
pub struct ForwardedCall<'a> {
    pub query: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: Bytes,
    pub headers: &'a HeaderMap,
    pub request_id: &'a str,
}

/// Upstream reply with the body not yet read.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub origin: String,
    inner: reqwest::Response,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub async fn chunk(&mut self) -> Result<Option<Bytes>, UpstreamError> {
        self.inner
            .chunk()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        self.inner.bytes_stream()
    }
}

pub struct UpstreamDispatcher {
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl UpstreamDispatcher {
    pub fn new(timeouts: &TimeoutConfig, retries: &RetryConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self {
            client,
            timeout: Duration::from_secs(timeouts.upstream_secs),
            retry: RetryPolicy::from_config(retries),
        })
    }

    /// Forward `request` to the origin of `service`.
    pub async fn dispatch(
        &self,
        service: &SecuredService,
        request: &OperationRequest,
        call: &ForwardedCall<'_>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let method = request.http_method;
        let origin = service
            .origin_url(request.operation, method)
            .ok_or(UpstreamError::NoOrigin {
                operation: request.operation,
                method,
            })?;
        let url = match method {
            HttpMethod::Get => merge_query(origin, call.query.unwrap_or(""))?,
            HttpMethod::Post => parse_origin(origin)?,
        };
        self.send(service, origin, &url, method, call).await
    }

    /// Fetch a document below the service's default GET origin, such as an
    /// XML schema its capabilities point to. The client query is not sent.
    pub async fn dispatch_resource(
        &self,
        service: &SecuredService,
        segments: &[&str],
        call: &ForwardedCall<'_>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let origin = service
            .origin_url(Operation::GetCapabilities, HttpMethod::Get)
            .ok_or(UpstreamError::NoOrigin {
                operation: Operation::GetCapabilities,
                method: HttpMethod::Get,
            })?;
        let url = resource_url(origin, segments)?;
        self.send(service, origin, &url, HttpMethod::Get, call).await
    }

    async fn send(
        &self,
        service: &SecuredService,
        origin: &str,
        url: &Url,
        method: HttpMethod,
        call: &ForwardedCall<'_>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.build(url, method, call).send().await {
                Ok(response) => {
                    tracing::debug!(
                        request_id = %call.request_id,
                        service = %service.id,
                        status = response.status().as_u16(),
                        latency_ms = started.elapsed().as_millis() as u64,
                        "Upstream response received"
                    );
                    let headers = response_headers(response.headers());
                    return Ok(UpstreamResponse {
                        status: response.status(),
                        headers,
                        origin: origin.to_string(),
                        inner: response,
                    });
                }
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    if self.retry.should_retry(attempt, kind) {
                        let delay = self.retry.delay(attempt);
                        tracing::info!(
                            request_id = %call.request_id,
                            service = %service.id,
                            attempt,
                            delay = ?delay,
                            error = %e,
                            "Retrying after connection failure"
                        );
                        metrics::record_upstream_retry(&service.id);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        request_id = %call.request_id,
                        service = %service.id,
                        attempt,
                        error = %e,
                        "Upstream request failed"
                    );
                    return Err(match kind {
                        FailureKind::Timeout => UpstreamError::Timeout(self.timeout),
                        FailureKind::Connect => UpstreamError::Connect(e.to_string()),
                        FailureKind::Other => UpstreamError::Request(e.to_string()),
                    });
                }
            }
        }
    }

    fn build(&self, url: &Url, method: HttpMethod, call: &ForwardedCall<'_>) -> reqwest::RequestBuilder {
        let mut builder = match method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Post => self.client.post(url.clone()).body(call.body.clone()),
        }
        .timeout(self.timeout)
        .header("x-request-id", call.request_id);

        for name in FORWARDED_HEADERS {
            if let Some(value) = call.headers.get(name) {
                builder = builder.header(name.clone(), value.clone());
            }
        }
        if method == HttpMethod::Post {
            if let Some(ct) = call.content_type {
                builder = builder.header(header::CONTENT_TYPE, ct);
            }
        }
        builder
    }
}

fn parse_origin(origin: &str) -> Result<Url, UpstreamError> {
    Url::parse(origin).map_err(|e| UpstreamError::InvalidOrigin {
        url: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Origin URL with the client's KVP pairs appended. A client pair replaces
/// an origin pair of the same key, compared case-insensitively.
pub fn merge_query(origin: &str, client_query: &str) -> Result<Url, UpstreamError> {
    let mut url = parse_origin(origin)?;
    let client: Vec<(String, String)> = url::form_urlencoded::parse(client_query.as_bytes())
        .into_owned()
        .filter(|(k, _)| !k.is_empty())
        .collect();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(k, _)| !client.iter().any(|(ck, _)| ck.eq_ignore_ascii_case(k)))
        .collect();

    if kept.is_empty() && client.is_empty() {
        url.set_query(None);
        return Ok(url);
    }
    url.query_pairs_mut().clear().extend_pairs(kept).extend_pairs(client);
    Ok(url)
}

/// Origin URL with `segments` appended to its path and the query dropped.
pub fn resource_url(origin: &str, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = parse_origin(origin)?;
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| UpstreamError::InvalidOrigin {
            url: origin.to_string(),
            reason: "origin cannot carry a path".into(),
        })?
        .pop_if_empty()
        .extend(segments.iter());
    Ok(url)
}

fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
