//! Request normalizer: raw OGC call → [`OperationRequest`].

use thiserror::Error;

use super::filter::{extract_bboxes, RawBox};
use super::kvp::KvpParams;
use super::types::{HttpMethod, Operation, ServiceKind};
use super::xml;
use crate::geometry::{BoundingBox, Envelope, Srs};

/// Normalization failures. All of them surface as HTTP 400.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("missing mandatory parameter {0}")]
    MissingParameter(&'static str),

    #[error("invalid value for {param}: {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    #[error("operation {0} is not supported by this service")]
    OperationNotSupported(String),

    #[error("malformed XML request: {0}")]
    MalformedXml(String),
}

impl RequestError {
    fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        RequestError::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }

    /// Parameter the exception report should point at.
    pub fn locator(&self) -> Option<&str> {
        match self {
            RequestError::MissingParameter(p) => Some(*p),
            RequestError::InvalidParameter { param, .. } => Some(*param),
            RequestError::OperationNotSupported(op) => Some(op.as_str()),
            RequestError::MalformedXml(_) => None,
        }
    }
}

/// The inbound HTTP call as seen by the normalizer.
#[derive(Debug, Clone, Copy)]
pub struct RawCall<'a> {
    pub method: HttpMethod,
    pub query: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

/// Canonical form of an OGC request.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub service: ServiceKind,
    pub version: Option<&'static str>,
    pub operation: Operation,
    pub layers: Vec<String>,
    pub bbox: Option<BoundingBox>,
    pub output_format: Option<String>,
    pub info_format: Option<String>,
    /// CRS of the response coordinates (WMS `CRS`/`SRS`, WFS `SRSNAME`).
    pub srs: Option<Srs>,
    pub size: Option<(u32, u32)>,
    pub pixel: Option<(u32, u32)>,
    pub http_method: HttpMethod,
}

impl OperationRequest {
    /// WMS 1.3.0 swaps the axes of EPSG:4326.
    pub fn epsg_lat_first(&self) -> bool {
        self.service == ServiceKind::Wms && self.version == Some("1.3.0")
    }
}

/// Parse a raw call addressed to a service of kind `expected`.
pub fn normalize(call: &RawCall<'_>, expected: ServiceKind) -> Result<OperationRequest, RequestError> {
    let mut params = KvpParams::parse(call.query.unwrap_or(""));
    let mut body_xml = None;

    if call.method == HttpMethod::Post {
        let form = call
            .content_type
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        let trimmed = call.body.trim_ascii();
        if form {
            params.extend(KvpParams::parse(&String::from_utf8_lossy(trimmed)));
        } else if !trimmed.is_empty() {
            body_xml = Some(xml::parse(trimmed)?);
        }
    }
    let doc = body_xml.as_ref();

    let service_raw = doc
        .and_then(|d| d.service.as_deref())
        .or_else(|| params.get("SERVICE"))
        .ok_or(RequestError::MissingParameter("SERVICE"))?;
    let service: ServiceKind = service_raw
        .parse()
        .map_err(|_| RequestError::invalid("SERVICE", service_raw))?;
    if service != expected {
        return Err(RequestError::invalid(
            "SERVICE",
            format!("{service} requested from a {expected} endpoint"),
        ));
    }

    let op_raw = match doc {
        Some(d) => d.operation.as_str(),
        None => params.get("REQUEST").ok_or(RequestError::MissingParameter("REQUEST"))?,
    };
    let operation: Operation = op_raw
        .parse()
        .map_err(|_| RequestError::OperationNotSupported(op_raw.to_string()))?;
    if !operation.applies_to(service) {
        return Err(RequestError::OperationNotSupported(op_raw.to_string()));
    }

    let version = match doc
        .and_then(|d| d.version.as_deref())
        .or_else(|| params.get_any(&["VERSION", "WMTVER"]))
    {
        Some(raw) => Some(
            service
                .canonical_version(raw)
                .ok_or_else(|| RequestError::invalid("VERSION", raw))?,
        ),
        None => None,
    };

    let layers = match doc {
        Some(d) => match service {
            ServiceKind::Wms => d.named_layers.clone(),
            ServiceKind::Wfs => dedup(d.type_names.clone()),
            ServiceKind::Csw => Vec::new(),
        },
        None => kvp_layers(&params, service, operation)?,
    };

    let mut req = OperationRequest {
        service,
        version,
        operation,
        layers,
        bbox: None,
        output_format: doc
            .and_then(|d| d.output_format.clone())
            .or_else(|| params.get_any(&["FORMAT", "OUTPUTFORMAT"]).map(str::to_string)),
        info_format: params.get("INFO_FORMAT").map(str::to_string),
        srs: None,
        size: parse_size(&params)?,
        pixel: parse_pixel(&params)?,
        http_method: call.method,
    };

    match service {
        ServiceKind::Wms => wms_spatial(&mut req, &params, call, doc.is_some())?,
        ServiceKind::Wfs => {
            let srs_name = doc
                .and_then(|d| d.srs_name.as_deref())
                .or_else(|| params.get("SRSNAME"));
            req.srs = srs_name.map(|s| parse_srs("SRSNAME", s, false)).transpose()?;

            let mut boxes = Vec::new();
            if doc.is_some() {
                boxes = extract_bboxes(call.body)?;
            } else if let Some(filter) = params.get("FILTER") {
                boxes = extract_bboxes(filter.as_bytes())?;
            }
            let widened = boxes.iter().any(|b| !b.restrictive);
            let mut bbox = resolve_boxes(boxes, req.srs.as_ref())?;
            if bbox.is_none() && !widened {
                bbox = params.get("BBOX").map(|v| parse_kvp_bbox(v, req.srs.as_ref())).transpose()?;
            }
            req.bbox = bbox;
        }
        ServiceKind::Csw => {
            let boxes = if doc.is_some() {
                extract_bboxes(call.body)?
            } else {
                match (params.get("CONSTRAINT"), params.get("CONSTRAINTLANGUAGE")) {
                    (Some(c), Some(lang)) if lang.eq_ignore_ascii_case("FILTER") => extract_bboxes(c.as_bytes())?,
                    _ => Vec::new(),
                }
            };
            req.bbox = resolve_boxes(boxes, None)?;
        }
    }

    Ok(req)
}

fn kvp_layers(params: &KvpParams, service: ServiceKind, operation: Operation) -> Result<Vec<String>, RequestError> {
    let layers = match (service, operation) {
        (ServiceKind::Wms, Operation::GetMap) => {
            let layers = params.list("LAYERS");
            if layers.is_empty() {
                return Err(RequestError::MissingParameter("LAYERS"));
            }
            layers
        }
        (ServiceKind::Wms, Operation::GetFeatureInfo) => {
            let queried = params.list("QUERY_LAYERS");
            if queried.is_empty() {
                return Err(RequestError::MissingParameter("QUERY_LAYERS"));
            }
            params.list("LAYERS").into_iter().chain(queried).collect()
        }
        (ServiceKind::Wms, Operation::GetLegendGraphic) => {
            params.get("LAYER").map(|l| vec![l.trim().to_string()]).unwrap_or_default()
        }
        (ServiceKind::Wms, _) => params.list("LAYERS"),
        (ServiceKind::Wfs, _) => {
            let names = params.list("TYPENAMES");
            if names.is_empty() {
                params.list("TYPENAME")
            } else {
                names
            }
        }
        (ServiceKind::Csw, _) => Vec::new(),
    };
    Ok(dedup(layers))
}

fn wms_spatial(req: &mut OperationRequest, params: &KvpParams, call: &RawCall<'_>, is_xml: bool) -> Result<(), RequestError> {
    let lat_first = req.epsg_lat_first();
    let crs = params.get_any(&["CRS", "SRS"]);
    req.srs = crs.map(|c| parse_srs("CRS", c, lat_first)).transpose()?;

    if is_xml {
        let boxes = extract_bboxes(call.body)?;
        req.bbox = resolve_boxes(boxes, req.srs.as_ref())?;
        if req.srs.is_none() {
            req.srs = req.bbox.as_ref().map(|b| b.srs.clone());
        }
    } else if let Some(raw) = params.get("BBOX") {
        let srs = req.srs.clone().ok_or(RequestError::MissingParameter("CRS"))?;
        let values = parse_four("BBOX", raw)?;
        let envelope = Envelope::from_axis_values(values, srs.is_lat_first())
            .map_err(|e| RequestError::invalid("BBOX", e.to_string()))?;
        req.bbox = Some(BoundingBox::new(envelope, srs));
    }

    if matches!(req.operation, Operation::GetMap | Operation::GetFeatureInfo) && req.bbox.is_none() {
        return Err(RequestError::MissingParameter("BBOX"));
    }
    Ok(())
}

/// WFS KVP `BBOX=a,b,c,d[,crs]`.
fn parse_kvp_bbox(raw: &str, default_srs: Option<&Srs>) -> Result<BoundingBox, RequestError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let (numbers, srs) = match parts.len() {
        4 => (&parts[..], default_srs.cloned().unwrap_or_else(Srs::wgs84)),
        5 => (&parts[..4], parse_srs("BBOX", parts[4], false)?),
        _ => return Err(RequestError::invalid("BBOX", "expected four coordinates and an optional CRS")),
    };
    let values = parse_four("BBOX", &numbers.join(","))?;
    let envelope = Envelope::from_axis_values(values, srs.is_lat_first())
        .map_err(|e| RequestError::invalid("BBOX", e.to_string()))?;
    Ok(BoundingBox::new(envelope, srs))
}

/// Merge all filter boxes into one; they must share a CRS. A box under
/// `Not` or `Or` leaves the request without a usable extent.
fn resolve_boxes(boxes: Vec<RawBox>, default_srs: Option<&Srs>) -> Result<Option<BoundingBox>, RequestError> {
    if boxes.iter().any(|b| !b.restrictive) {
        return Ok(None);
    }
    let mut merged: Option<BoundingBox> = None;
    for raw in boxes {
        let srs = match raw.srs_name.as_deref() {
            Some(name) => parse_srs("BBOX", name, false)?,
            None => default_srs.cloned().unwrap_or_else(Srs::wgs84),
        };
        let envelope = Envelope::from_axis_values(raw.values, srs.is_lat_first())
            .map_err(|e| RequestError::invalid("BBOX", e.to_string()))?;
        merged = Some(match merged {
            None => BoundingBox::new(envelope, srs),
            Some(prev) if prev.srs.same_crs(&srs) => BoundingBox::new(prev.envelope.merge(&envelope), prev.srs),
            Some(prev) => {
                return Err(RequestError::invalid(
                    "BBOX",
                    format!("filter mixes {} and {}", prev.srs, srs),
                ))
            }
        });
    }
    Ok(merged)
}

fn parse_srs(param: &'static str, raw: &str, epsg_lat_first: bool) -> Result<Srs, RequestError> {
    Srs::parse(raw, epsg_lat_first).map_err(|e| RequestError::invalid(param, e.to_string()))
}

fn parse_four(param: &'static str, raw: &str) -> Result<[f64; 4], RequestError> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| RequestError::invalid(param, raw))?;
    values
        .try_into()
        .map_err(|_| RequestError::invalid(param, "expected four comma separated numbers"))
}

fn parse_size(params: &KvpParams) -> Result<Option<(u32, u32)>, RequestError> {
    match (params.get("WIDTH"), params.get("HEIGHT")) {
        (Some(w), Some(h)) => {
            let w = w.trim().parse().map_err(|_| RequestError::invalid("WIDTH", w))?;
            let h = h.trim().parse().map_err(|_| RequestError::invalid("HEIGHT", h))?;
            Ok(Some((w, h)))
        }
        _ => Ok(None),
    }
}

fn parse_pixel(params: &KvpParams) -> Result<Option<(u32, u32)>, RequestError> {
    let x = params.get_any(&["I", "X"]);
    let y = params.get_any(&["J", "Y"]);
    match (x, y) {
        (Some(x), Some(y)) => {
            let px = x.trim().parse().map_err(|_| RequestError::invalid("I", x))?;
            let py = y.trim().parse().map_err(|_| RequestError::invalid("J", y))?;
            Ok(Some((px, py)))
        }
        _ => Ok(None),
    }
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(query: &str, kind: ServiceKind) -> Result<OperationRequest, RequestError> {
        normalize(
            &RawCall {
                method: HttpMethod::Get,
                query: Some(query),
                content_type: None,
                body: b"",
            },
            kind,
        )
    }

    #[test]
    fn test_wms_130_get_map_swaps_axes() {
        let req = get(
            "SERVICE=WMS&VERSION=1.3.0&REQUEST=GetMap&LAYERS=a,b&CRS=EPSG:4326&BBOX=47,5,55,15&WIDTH=256&HEIGHT=128&FORMAT=image/png",
            ServiceKind::Wms,
        )
        .unwrap();
        assert_eq!(req.operation, Operation::GetMap);
        assert_eq!(req.layers, vec!["a", "b"]);
        assert_eq!(req.size, Some((256, 128)));
        let bbox = req.bbox.unwrap();
        assert_eq!(bbox.envelope, Envelope::new(5.0, 47.0, 15.0, 55.0).unwrap());
        assert_eq!(req.output_format.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_wms_111_keeps_axes() {
        let req = get(
            "service=wms&version=1.1.1&request=GetMap&layers=a&srs=EPSG:4326&bbox=5,47,15,55",
            ServiceKind::Wms,
        )
        .unwrap();
        assert_eq!(req.bbox.unwrap().envelope, Envelope::new(5.0, 47.0, 15.0, 55.0).unwrap());
    }

    #[test]
    fn test_missing_service_and_request() {
        assert_eq!(
            get("REQUEST=GetMap", ServiceKind::Wms),
            Err(RequestError::MissingParameter("SERVICE"))
        );
        assert_eq!(
            get("SERVICE=WMS", ServiceKind::Wms),
            Err(RequestError::MissingParameter("REQUEST"))
        );
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            get("SERVICE=WMS&REQUEST=GetMap&LAYERS=a&CRS=EPSG:4326&BBOX=1,2,x,4", ServiceKind::Wms),
            Err(RequestError::InvalidParameter { param: "BBOX", .. })
        ));
        assert!(matches!(
            get("SERVICE=WMS&VERSION=9.9&REQUEST=GetCapabilities", ServiceKind::Wms),
            Err(RequestError::InvalidParameter { param: "VERSION", .. })
        ));
        assert!(matches!(
            get("SERVICE=WFS&REQUEST=GetFeature", ServiceKind::Wms),
            Err(RequestError::InvalidParameter { param: "SERVICE", .. })
        ));
        assert!(matches!(
            get("SERVICE=WMS&REQUEST=GetFeature", ServiceKind::Wms),
            Err(RequestError::OperationNotSupported(_))
        ));
        assert_eq!(
            get("SERVICE=WMS&REQUEST=GetMap&LAYERS=a&BBOX=1,2,3,4", ServiceKind::Wms),
            Err(RequestError::MissingParameter("CRS"))
        );
    }

    #[test]
    fn test_wfs_filter_bbox() {
        let filter = "<Filter><BBOX><Envelope srsName=\"EPSG:4326\"><lowerCorner>1 2</lowerCorner><upperCorner>3 4</upperCorner></Envelope></BBOX></Filter>";
        let query = format!(
            "SERVICE=WFS&VERSION=2.0.0&REQUEST=GetFeature&TYPENAMES=ns:a&FILTER={}",
            url::form_urlencoded::byte_serialize(filter.as_bytes()).collect::<String>()
        );
        let req = get(&query, ServiceKind::Wfs).unwrap();
        assert_eq!(req.layers, vec!["ns:a"]);
        assert_eq!(req.bbox.unwrap().envelope, Envelope::new(1.0, 2.0, 3.0, 4.0).unwrap());
    }

    #[test]
    fn test_wfs_negated_filter_gives_no_extent() {
        let filter = "<Filter><Not><BBOX><Envelope srsName=\"EPSG:4326\"><lowerCorner>1 2</lowerCorner><upperCorner>3 4</upperCorner></Envelope></BBOX></Not></Filter>";
        let query = format!(
            "SERVICE=WFS&VERSION=2.0.0&REQUEST=GetFeature&TYPENAMES=ns:a&BBOX=1,2,3,4&FILTER={}",
            url::form_urlencoded::byte_serialize(filter.as_bytes()).collect::<String>()
        );
        let req = get(&query, ServiceKind::Wfs).unwrap();
        assert!(req.bbox.is_none());
    }

    #[test]
    fn test_wfs_without_spatial_filter() {
        let req = get("SERVICE=WFS&VERSION=1.1.0&REQUEST=GetFeature&TYPENAME=ns:a", ServiceKind::Wfs).unwrap();
        assert!(req.bbox.is_none());
    }

    #[test]
    fn test_wfs_kvp_bbox_with_crs() {
        let req = get(
            "SERVICE=WFS&VERSION=2.0.0&REQUEST=GetFeature&TYPENAMES=ns:a&BBOX=47,5,55,15,urn:ogc:def:crs:EPSG::4326",
            ServiceKind::Wfs,
        )
        .unwrap();
        assert_eq!(req.bbox.unwrap().envelope, Envelope::new(5.0, 47.0, 15.0, 55.0).unwrap());
    }

    #[test]
    fn test_xml_post() {
        let body = br#"<wfs:GetFeature service="WFS" version="1.1.0" xmlns:wfs="http://www.opengis.net/wfs">
            <wfs:Query typeName="ns:a"><ogc:Filter><ogc:BBOX><gml:Envelope srsName="EPSG:4326">
            <gml:lowerCorner>1 2</gml:lowerCorner><gml:upperCorner>3 4</gml:upperCorner>
            </gml:Envelope></ogc:BBOX></ogc:Filter></wfs:Query></wfs:GetFeature>"#;
        let req = normalize(
            &RawCall {
                method: HttpMethod::Post,
                query: None,
                content_type: Some("text/xml"),
                body,
            },
            ServiceKind::Wfs,
        )
        .unwrap();
        assert_eq!(req.operation, Operation::GetFeature);
        assert_eq!(req.layers, vec!["ns:a"]);
        assert!(req.bbox.is_some());
        assert_eq!(req.http_method, HttpMethod::Post);
    }

    #[test]
    fn test_form_post() {
        let req = normalize(
            &RawCall {
                method: HttpMethod::Post,
                query: None,
                content_type: Some("application/x-www-form-urlencoded; charset=UTF-8"),
                body: b"SERVICE=CSW&REQUEST=GetRecords&VERSION=2.0.2",
            },
            ServiceKind::Csw,
        )
        .unwrap();
        assert_eq!(req.operation, Operation::GetRecords);
        assert!(req.layers.is_empty());
    }
}
