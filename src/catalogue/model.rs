//! Catalogue records supplied by the external registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::ogc::{HttpMethod, Operation, ServiceKind};

/// Everything the proxy needs from the catalogue in one document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogueDocument {
    pub services: Vec<SecuredService>,
    /// Rules are kept raw here so one bad rule cannot reject the document.
    /// Each is converted on its own when the snapshot is compiled.
    pub rules: Vec<RuleRecord>,
}

/// An OGC service under proxy control.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecuredService {
    pub id: String,
    pub kind: ServiceKind,
    #[serde(default)]
    pub operation_urls: Vec<OperationUrl>,
    /// Registered layers / feature types. Empty means "not declared", in
    /// which case requested layer names are not checked.
    #[serde(default)]
    pub layers: Vec<SecuredLayer>,
    #[serde(default)]
    pub settings: SecuritySettings,
}

/// Origin endpoint for an operation and HTTP method.
///
/// `operation = None` is the service-wide default endpoint for that method.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OperationUrl {
    #[serde(default)]
    pub operation: Option<Operation>,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    pub url: String,
}

fn default_method() -> HttpMethod {
    HttpMethod::Get
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SecuredLayer {
    pub name: String,
    /// Parent layer in the catalogue hierarchy. Informational only, access is
    /// always evaluated on the concrete layer.
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecuritySettings {
    pub logging: bool,
    pub camouflage: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            logging: true,
            camouflage: true,
        }
    }
}

impl SecuredService {
    /// Origin URL for `(operation, method)`, falling back to the
    /// service-wide URL for the method.
    pub fn origin_url(&self, operation: Operation, method: HttpMethod) -> Option<&str> {
        self.operation_urls
            .iter()
            .find(|u| u.operation == Some(operation) && u.method == method)
            .or_else(|| {
                self.operation_urls
                    .iter()
                    .find(|u| u.operation.is_none() && u.method == method)
            })
            .map(|u| u.url.as_str())
    }

    pub fn origin_urls(&self) -> impl Iterator<Item = &str> {
        self.operation_urls.iter().map(|u| u.url.as_str())
    }

    pub fn declares_layers(&self) -> bool {
        !self.layers.is_empty()
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l.name == name)
    }
}

/// An access rule (`AllowedOperation`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AllowedOperation {
    pub id: u64,
    pub service: String,
    /// Empty: the rule applies to the service itself.
    #[serde(default)]
    pub layers: BTreeSet<String>,
    pub operations: BTreeSet<Operation>,
    /// Empty: public.
    #[serde(default)]
    pub groups: BTreeSet<String>,
    /// WKT polygon set in WGS84 lon/lat.
    #[serde(default)]
    pub allowed_area: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// A rule as it arrived from the catalogue, not yet validated.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct RuleRecord(serde_json::Value);

impl RuleRecord {
    pub fn parse(&self) -> Result<AllowedOperation, serde_json::Error> {
        AllowedOperation::deserialize(&self.0)
    }

    /// Best-effort fields of a record that failed to parse.
    pub fn id(&self) -> Option<u64> {
        self.0.get("id").and_then(|v| v.as_u64())
    }

    pub fn service(&self) -> Option<&str> {
        self.0.get("service").and_then(|v| v.as_str())
    }

    pub fn layers(&self) -> BTreeSet<String> {
        self.0
            .get("layers")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// The requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    Anonymous,
    User { id: String, groups: BTreeSet<String> },
}

impl Principal {
    pub fn groups(&self) -> Option<&BTreeSet<String>> {
        match self {
            Principal::Anonymous => None,
            Principal::User { groups, .. } => Some(groups),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Anonymous => f.write_str("anonymous"),
            Principal::User { id, .. } => f.write_str(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
        [[services]]
        id = "wms1"
        kind = "WMS"
        layers = [{ name = "LayerA" }, { name = "LayerB", parent = "LayerA" }]
        operation_urls = [
            { url = "http://origin/wms" },
            { operation = "GetMap", method = "GET", url = "http://tiles/wms" },
            { method = "POST", url = "http://origin/wms-post" },
        ]

        [[rules]]
        id = 7
        service = "wms1"
        layers = ["LayerA"]
        operations = ["GetMap"]
        groups = ["GroupX"]
        allowed_area = "POLYGON((0 0,10 0,10 10,0 10,0 0))"
    "#;

    #[test]
    fn test_document_parses() {
        let doc: CatalogueDocument = toml::from_str(DOC).unwrap();
        assert_eq!(doc.services.len(), 1);
        assert!(doc.services[0].settings.camouflage);
        let rule = doc.rules[0].parse().unwrap();
        assert_eq!(rule.operations.iter().next(), Some(&Operation::GetMap));
    }

    #[test]
    fn test_unknown_operation_only_spoils_its_rule() {
        let doc: CatalogueDocument = toml::from_str(
            r#"
            [[rules]]
            id = 1
            service = "wms1"
            layers = ["LayerA"]
            operations = ["GetMap"]

            [[rules]]
            id = 2
            service = "wms1"
            layers = ["LayerB"]
            operations = ["GetTile"]
            "#,
        )
        .unwrap();
        assert_eq!(doc.rules.len(), 2);
        assert!(doc.rules[0].parse().is_ok());
        assert!(doc.rules[1].parse().is_err());
        assert_eq!(doc.rules[1].id(), Some(2));
        assert_eq!(doc.rules[1].service(), Some("wms1"));
        assert!(doc.rules[1].layers().contains("LayerB"));
    }

    #[test]
    fn test_origin_url_resolution() {
        let doc: CatalogueDocument = toml::from_str(DOC).unwrap();
        let svc = &doc.services[0];
        assert_eq!(svc.origin_url(Operation::GetMap, HttpMethod::Get), Some("http://tiles/wms"));
        assert_eq!(
            svc.origin_url(Operation::GetCapabilities, HttpMethod::Get),
            Some("http://origin/wms")
        );
        assert_eq!(
            svc.origin_url(Operation::GetMap, HttpMethod::Post),
            Some("http://origin/wms-post")
        );
        assert!(svc.has_layer("LayerB"));
        assert!(!svc.has_layer("LayerC"));
    }
}
