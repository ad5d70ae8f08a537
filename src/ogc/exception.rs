//! OGC exception reports.
//!
//! WMS answers with a `ServiceExceptionReport` (1.1.x and 1.3.0 flavours),
//! WFS and CSW with an OWS `ExceptionReport`.

use quick_xml::escape::escape;

use super::types::ServiceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    MissingParameterValue,
    InvalidParameterValue,
    OperationNotSupported,
    LayerNotDefined,
    AccessDenied,
    NoApplicableCode,
}

impl ExceptionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionCode::MissingParameterValue => "MissingParameterValue",
            ExceptionCode::InvalidParameterValue => "InvalidParameterValue",
            ExceptionCode::OperationNotSupported => "OperationNotSupported",
            ExceptionCode::LayerNotDefined => "LayerNotDefined",
            ExceptionCode::AccessDenied => "AccessDenied",
            ExceptionCode::NoApplicableCode => "NoApplicableCode",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionReport {
    pub code: ExceptionCode,
    pub locator: Option<String>,
    pub message: String,
}

impl ExceptionReport {
    pub fn new(code: ExceptionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            locator: None,
            message: message.into(),
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Render for the given protocol. Returns `(content_type, body)`.
    pub fn render(&self, service: Option<ServiceKind>, version: Option<&str>) -> (&'static str, String) {
        let code = self.code.as_str();
        let locator = self
            .locator
            .as_deref()
            .map(|l| format!(" locator=\"{}\"", escape(l)))
            .unwrap_or_default();
        let message = escape(self.message.as_str());

        match service {
            Some(ServiceKind::Wms) => {
                let legacy = matches!(version, Some(v) if v.starts_with("1.1") || v.starts_with("1.0"));
                if legacy {
                    let body = format!(
                        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                         <ServiceExceptionReport version=\"1.1.1\">\
                         <ServiceException code=\"{code}\"{locator}>{message}</ServiceException>\
                         </ServiceExceptionReport>"
                    );
                    ("application/vnd.ogc.se_xml", body)
                } else {
                    let body = format!(
                        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                         <ServiceExceptionReport version=\"1.3.0\" xmlns=\"http://www.opengis.net/ogc\">\
                         <ServiceException code=\"{code}\"{locator}>{message}</ServiceException>\
                         </ServiceExceptionReport>"
                    );
                    ("text/xml", body)
                }
            }
            _ => {
                let ows_version = match (service, version) {
                    (Some(ServiceKind::Wfs), Some(v)) if v.starts_with("2.") => "2.0.0",
                    (Some(ServiceKind::Csw), Some(v)) if v.starts_with("3.") => "2.0.0",
                    _ => "1.1.0",
                };
                let ns = if ows_version == "2.0.0" {
                    "http://www.opengis.net/ows/2.0"
                } else {
                    "http://www.opengis.net/ows/1.1"
                };
                let body = format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                     <ows:ExceptionReport xmlns:ows=\"{ns}\" version=\"{ows_version}\">\
                     <ows:Exception exceptionCode=\"{code}\"{locator}>\
                     <ows:ExceptionText>{message}</ows:ExceptionText>\
                     </ows:Exception></ows:ExceptionReport>"
                );
                ("application/xml", body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wms_legacy_report() {
        let report = ExceptionReport::new(ExceptionCode::LayerNotDefined, "unknown <layer>").with_locator("LAYERS");
        let (ct, body) = report.render(Some(ServiceKind::Wms), Some("1.1.1"));
        assert_eq!(ct, "application/vnd.ogc.se_xml");
        assert!(body.contains("code=\"LayerNotDefined\""));
        assert!(body.contains("locator=\"LAYERS\""));
        assert!(body.contains("unknown &lt;layer&gt;"));
    }

    #[test]
    fn test_ows_report() {
        let report = ExceptionReport::new(ExceptionCode::AccessDenied, "denied");
        let (ct, body) = report.render(Some(ServiceKind::Wfs), Some("2.0.0"));
        assert_eq!(ct, "application/xml");
        assert!(body.contains("http://www.opengis.net/ows/2.0"));
        assert!(body.contains("exceptionCode=\"AccessDenied\""));

        let (_, body) = report.render(None, None);
        assert!(body.contains("ows/1.1"));
    }
}
