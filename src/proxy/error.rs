//! Proxy failures and their OGC exception form.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use std::time::Duration;
use thiserror::Error;

use crate::audit::Outcome;
use crate::geometry::GeometryError;
use crate::ogc::{ExceptionCode, ExceptionReport, RequestError, ServiceKind};
use crate::response::AnalysisError;
use crate::spatial::SpatialEvaluationError;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Malformed(#[from] RequestError),

    #[error("unknown service {0}")]
    UnknownService(String),

    #[error("unknown layers: {}", .0.join(", "))]
    UnknownLayer(Vec<String>),

    #[error("access denied for {}", .0.join(", "))]
    Denied(Vec<String>),

    #[error("rule evaluation failed: {0}")]
    Policy(GeometryError),

    #[error(transparent)]
    Spatial(#[from] SpatialEvaluationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("request not completed within {0:?}")]
    Timeout(Duration),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Malformed(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnknownService(_) | ProxyError::UnknownLayer(_) => StatusCode::NOT_FOUND,
            ProxyError::Denied(_) | ProxyError::Policy(_) | ProxyError::Spatial(_) => StatusCode::FORBIDDEN,
            ProxyError::Upstream(UpstreamError::NoOrigin { .. }) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Analysis(_) | ProxyError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ProxyError::Malformed(_) | ProxyError::Upstream(UpstreamError::NoOrigin { .. }) => Outcome::Rejected,
            ProxyError::UnknownService(_) | ProxyError::UnknownLayer(_) => Outcome::NotFound,
            ProxyError::Denied(_) | ProxyError::Policy(_) | ProxyError::Spatial(_) => Outcome::Denied,
            ProxyError::Upstream(_) => Outcome::UpstreamError,
            ProxyError::Analysis(_) | ProxyError::Timeout(_) => Outcome::Error,
        }
    }

    /// Client-facing report. Denials say nothing about the rules involved.
    pub fn report(&self, service: Option<ServiceKind>) -> ExceptionReport {
        match self {
            ProxyError::Malformed(e) => {
                let code = match e {
                    RequestError::MissingParameter(_) => ExceptionCode::MissingParameterValue,
                    RequestError::InvalidParameter { .. } => ExceptionCode::InvalidParameterValue,
                    RequestError::OperationNotSupported(_) => ExceptionCode::OperationNotSupported,
                    RequestError::MalformedXml(_) => ExceptionCode::NoApplicableCode,
                };
                let report = ExceptionReport::new(code, e.to_string());
                match e.locator() {
                    Some(locator) => report.with_locator(locator),
                    None => report,
                }
            }
            ProxyError::UnknownService(_) => ExceptionReport::new(ExceptionCode::NoApplicableCode, "Unknown service"),
            ProxyError::UnknownLayer(names) => {
                let (code, locator) = match service {
                    Some(ServiceKind::Wms) => (ExceptionCode::LayerNotDefined, "LAYERS"),
                    _ => (ExceptionCode::InvalidParameterValue, "TYPENAMES"),
                };
                ExceptionReport::new(code, format!("Unknown layer: {}", names.join(", "))).with_locator(locator)
            }
            ProxyError::Denied(_) | ProxyError::Policy(_) | ProxyError::Spatial(_) => {
                ExceptionReport::new(ExceptionCode::AccessDenied, "Access denied")
            }
            ProxyError::Upstream(UpstreamError::NoOrigin { operation, .. }) => ExceptionReport::new(
                ExceptionCode::OperationNotSupported,
                format!("{operation} is not available on this service"),
            )
            .with_locator(operation.as_str()),
            ProxyError::Upstream(_) => ExceptionReport::new(ExceptionCode::NoApplicableCode, "Origin service unavailable"),
            ProxyError::Analysis(_) | ProxyError::Timeout(_) => {
                ExceptionReport::new(ExceptionCode::NoApplicableCode, "Internal error")
            }
        }
    }

    pub fn to_response(&self, service: Option<ServiceKind>, version: Option<&str>) -> Response {
        let (content_type, body) = self.report(service).render(service, version);
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogc::{HttpMethod, Operation};

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::Malformed(RequestError::MissingParameter("REQUEST")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::UnknownService("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ProxyError::Denied(vec!["A".into()]).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ProxyError::Spatial(SpatialEvaluationError::UnsupportedFormat("image/svg".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ProxyError::Upstream(UpstreamError::Connect("refused".into())).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::Upstream(UpstreamError::NoOrigin { operation: Operation::GetMap, method: HttpMethod::Post }).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ProxyError::Timeout(Duration::from_secs(1)).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_denial_does_not_leak_layers() {
        let report = ProxyError::Denied(vec!["Secret".into()]).report(Some(ServiceKind::Wms));
        assert_eq!(report.code, ExceptionCode::AccessDenied);
        assert!(!report.message.contains("Secret"));
    }

    #[test]
    fn test_wms_exception_body() {
        let response = ProxyError::UnknownLayer(vec!["Nope".into()]).to_response(Some(ServiceKind::Wms), Some("1.1.1"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/vnd.ogc.se_xml");
    }
}
