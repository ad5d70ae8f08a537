//! Service kinds, operations and versions understood by the proxy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// OGC service protocol of a secured service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceKind {
    Wms,
    Wfs,
    Csw,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {what}: {value}")]
pub struct UnknownToken {
    pub what: &'static str,
    pub value: String,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Wms => "WMS",
            ServiceKind::Wfs => "WFS",
            ServiceKind::Csw => "CSW",
        }
    }

    /// Versions this proxy is able to reason about for the service kind.
    pub fn supported_versions(&self) -> &'static [&'static str] {
        match self {
            ServiceKind::Wms => &["1.0.0", "1.1.0", "1.1.1", "1.3.0"],
            ServiceKind::Wfs => &["1.0.0", "1.1.0", "2.0.0", "2.0.2"],
            ServiceKind::Csw => &["2.0.2", "3.0.0"],
        }
    }

    /// Returns the canonical spelling of `raw` if it is a known version.
    pub fn canonical_version(&self, raw: &str) -> Option<&'static str> {
        let raw = raw.trim();
        self.supported_versions().iter().copied().find(|v| *v == raw)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WMS" => Ok(ServiceKind::Wms),
            "WFS" => Ok(ServiceKind::Wfs),
            "CSW" => Ok(ServiceKind::Csw),
            _ => Err(UnknownToken {
                what: "service",
                value: s.to_string(),
            }),
        }
    }
}

/// HTTP binding of an OGC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OGC operation name (the `REQUEST` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    GetCapabilities,
    GetMap,
    GetFeatureInfo,
    GetLegendGraphic,
    DescribeLayer,
    GetStyles,
    DescribeFeatureType,
    GetFeature,
    GetPropertyValue,
    ListStoredQueries,
    DescribeStoredQueries,
    Transaction,
    LockFeature,
    GetFeatureWithLock,
    DescribeRecord,
    GetRecords,
    GetRecordById,
    GetDomain,
    Harvest,
}

impl Operation {
    pub const ALL: [Operation; 19] = [
        Operation::GetCapabilities,
        Operation::GetMap,
        Operation::GetFeatureInfo,
        Operation::GetLegendGraphic,
        Operation::DescribeLayer,
        Operation::GetStyles,
        Operation::DescribeFeatureType,
        Operation::GetFeature,
        Operation::GetPropertyValue,
        Operation::ListStoredQueries,
        Operation::DescribeStoredQueries,
        Operation::Transaction,
        Operation::LockFeature,
        Operation::GetFeatureWithLock,
        Operation::DescribeRecord,
        Operation::GetRecords,
        Operation::GetRecordById,
        Operation::GetDomain,
        Operation::Harvest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetCapabilities => "GetCapabilities",
            Operation::GetMap => "GetMap",
            Operation::GetFeatureInfo => "GetFeatureInfo",
            Operation::GetLegendGraphic => "GetLegendGraphic",
            Operation::DescribeLayer => "DescribeLayer",
            Operation::GetStyles => "GetStyles",
            Operation::DescribeFeatureType => "DescribeFeatureType",
            Operation::GetFeature => "GetFeature",
            Operation::GetPropertyValue => "GetPropertyValue",
            Operation::ListStoredQueries => "ListStoredQueries",
            Operation::DescribeStoredQueries => "DescribeStoredQueries",
            Operation::Transaction => "Transaction",
            Operation::LockFeature => "LockFeature",
            Operation::GetFeatureWithLock => "GetFeatureWithLock",
            Operation::DescribeRecord => "DescribeRecord",
            Operation::GetRecords => "GetRecords",
            Operation::GetRecordById => "GetRecordById",
            Operation::GetDomain => "GetDomain",
            Operation::Harvest => "Harvest",
        }
    }

    /// Whether the operation exists in the given protocol.
    pub fn applies_to(&self, kind: ServiceKind) -> bool {
        use Operation::*;
        match self {
            GetCapabilities => true,
            GetMap | GetFeatureInfo | GetLegendGraphic | DescribeLayer | GetStyles => {
                kind == ServiceKind::Wms
            }
            DescribeFeatureType | GetFeature | GetPropertyValue | ListStoredQueries
            | DescribeStoredQueries | LockFeature | GetFeatureWithLock => kind == ServiceKind::Wfs,
            Transaction => matches!(kind, ServiceKind::Wfs | ServiceKind::Csw),
            DescribeRecord | GetRecords | GetRecordById | GetDomain | Harvest => {
                kind == ServiceKind::Csw
            }
        }
    }

    /// Operations answering with a feature collection.
    pub fn returns_features(&self) -> bool {
        matches!(self, Operation::GetFeature | Operation::GetFeatureWithLock)
    }

    /// Operations whose responses are counted for the analyzed-response log.
    pub fn returns_entities(&self) -> bool {
        matches!(
            self,
            Operation::GetFeature
                | Operation::GetFeatureWithLock
                | Operation::GetPropertyValue
                | Operation::GetRecords
                | Operation::GetRecordById
        )
    }

    /// Operations answering with service metadata that may leak origin URLs.
    pub fn describes_service(&self) -> bool {
        matches!(
            self,
            Operation::GetCapabilities
                | Operation::DescribeFeatureType
                | Operation::DescribeRecord
                | Operation::DescribeLayer
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // WMS 1.0.0 spellings
        match s.to_ascii_lowercase().as_str() {
            "map" => return Ok(Operation::GetMap),
            "capabilities" => return Ok(Operation::GetCapabilities),
            "feature_info" => return Ok(Operation::GetFeatureInfo),
            _ => {}
        }
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownToken {
                what: "operation",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_parse_is_case_insensitive() {
        assert_eq!("getmap".parse::<Operation>(), Ok(Operation::GetMap));
        assert_eq!("GETFEATURE".parse::<Operation>(), Ok(Operation::GetFeature));
        assert_eq!("map".parse::<Operation>(), Ok(Operation::GetMap));
        assert!("GetTile".parse::<Operation>().is_err());
    }

    #[test]
    fn test_operation_applicability() {
        assert!(Operation::GetMap.applies_to(ServiceKind::Wms));
        assert!(!Operation::GetMap.applies_to(ServiceKind::Wfs));
        assert!(Operation::Transaction.applies_to(ServiceKind::Csw));
        assert!(Operation::GetCapabilities.applies_to(ServiceKind::Csw));
    }

    #[test]
    fn test_versions() {
        assert_eq!(ServiceKind::Wms.canonical_version(" 1.3.0 "), Some("1.3.0"));
        assert_eq!(ServiceKind::Wfs.canonical_version("1.3.0"), None);
        assert_eq!("wfs".parse::<ServiceKind>(), Ok(ServiceKind::Wfs));
    }
}
