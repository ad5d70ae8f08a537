//! Valid empty responses for requests entirely outside the permitted area.

use chrono::{SecondsFormat, Utc};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use super::raster::{base_mime, encode, raster_format};
use super::SpatialEvaluationError;
use crate::config::SpatialConfig;
use crate::ogc::{Operation, OperationRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct EmptyPayload {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl EmptyPayload {
    fn new(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

pub fn empty_payload(request: &OperationRequest, config: &SpatialConfig) -> Result<EmptyPayload, SpatialEvaluationError> {
    match request.operation {
        Operation::GetMap => empty_image(request, config),
        Operation::GetFeature | Operation::GetFeatureWithLock => empty_features(request),
        Operation::GetFeatureInfo => empty_feature_info(request),
        Operation::GetRecords => Ok(empty_records(request)),
        op => Err(SpatialEvaluationError::UnsupportedOperation(op)),
    }
}

fn empty_image(request: &OperationRequest, config: &SpatialConfig) -> Result<EmptyPayload, SpatialEvaluationError> {
    let requested = request.output_format.as_deref().unwrap_or("image/png");
    let (format, mime) =
        raster_format(requested).ok_or_else(|| SpatialEvaluationError::UnsupportedFormat(requested.to_string()))?;

    let (width, height) = request
        .size
        .unwrap_or((config.default_tile_size, config.default_tile_size));
    if width == 0 || height == 0 || width > config.max_image_dimension || height > config.max_image_dimension {
        return Err(SpatialEvaluationError::ImageTooLarge { width, height });
    }

    let fill = if format == ImageFormat::Jpeg {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([0, 0, 0, 0])
    };
    let body = encode(DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, fill)), format)?;
    Ok(EmptyPayload::new(mime, body))
}

fn empty_features(request: &OperationRequest) -> Result<EmptyPayload, SpatialEvaluationError> {
    let format = request.output_format.as_deref().unwrap_or("");
    let lower = format.to_ascii_lowercase();
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    if lower.contains("json") {
        let body = serde_json::json!({
            "type": "FeatureCollection",
            "features": [],
            "totalFeatures": 0,
            "numberMatched": 0,
            "numberReturned": 0,
            "timeStamp": timestamp,
        });
        return Ok(EmptyPayload::new("application/json", body.to_string()));
    }
    if !(lower.is_empty() || lower.contains("gml") || lower.contains("xml")) {
        return Err(SpatialEvaluationError::UnsupportedFormat(format.to_string()));
    }

    let (content_type, body) = match request.version {
        Some("1.0.0") => (
            "text/xml; subtype=gml/2.1.2",
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs\" xmlns:gml=\"http://www.opengis.net/gml\">\
             <gml:boundedBy><gml:null>unknown</gml:null></gml:boundedBy></wfs:FeatureCollection>"
                .to_string(),
        ),
        Some("1.1.0") => (
            "text/xml; subtype=gml/3.1.1",
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs\" xmlns:gml=\"http://www.opengis.net/gml\" \
                 numberOfFeatures=\"0\" timeStamp=\"{timestamp}\"/>"
            ),
        ),
        _ => (
            "application/gml+xml; version=3.2",
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" xmlns:gml=\"http://www.opengis.net/gml/3.2\" \
                 numberMatched=\"0\" numberReturned=\"0\" timeStamp=\"{timestamp}\"/>"
            ),
        ),
    };
    // Echo a concrete MIME type the client asked for.
    let content_type = if format.contains('/') { format } else { content_type };
    Ok(EmptyPayload::new(content_type, body))
}

fn empty_feature_info(request: &OperationRequest) -> Result<EmptyPayload, SpatialEvaluationError> {
    let requested = request.info_format.as_deref().unwrap_or("text/plain");
    let mime = base_mime(requested).to_ascii_lowercase();
    let body = match mime.as_str() {
        "text/plain" => String::new(),
        "text/html" => "<html><body></body></html>".to_string(),
        "application/json" | "application/geo+json" | "application/geojson" => {
            serde_json::json!({ "type": "FeatureCollection", "features": [] }).to_string()
        }
        m if m.contains("gml") || m.contains("xml") => "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs\" xmlns:gml=\"http://www.opengis.net/gml\"/>"
            .to_string(),
        _ => return Err(SpatialEvaluationError::UnsupportedFormat(requested.to_string())),
    };
    Ok(EmptyPayload::new(mime, body))
}

fn empty_records(request: &OperationRequest) -> EmptyPayload {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let (ns, version) = match request.version {
        Some(v) if v.starts_with("3.") => ("http://www.opengis.net/cat/csw/3.0", "3.0.0"),
        _ => ("http://www.opengis.net/cat/csw/2.0.2", "2.0.2"),
    };
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <csw:GetRecordsResponse xmlns:csw=\"{ns}\" version=\"{version}\">\
         <csw:SearchStatus timestamp=\"{timestamp}\"/>\
         <csw:SearchResults numberOfRecordsMatched=\"0\" numberOfRecordsReturned=\"0\" nextRecord=\"0\"/>\
         </csw:GetRecordsResponse>"
    );
    EmptyPayload::new("application/xml", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogc::{HttpMethod, ServiceKind};

    fn request(service: ServiceKind, op: Operation, version: Option<&'static str>, format: Option<&str>) -> OperationRequest {
        OperationRequest {
            service,
            version,
            operation: op,
            layers: Vec::new(),
            bbox: None,
            output_format: format.map(str::to_string),
            info_format: None,
            srs: None,
            size: Some((64, 32)),
            pixel: None,
            http_method: HttpMethod::Get,
        }
    }

    #[test]
    fn test_transparent_png_of_requested_size() {
        let req = request(ServiceKind::Wms, Operation::GetMap, Some("1.3.0"), Some("image/png; mode=8bit"));
        let payload = empty_payload(&req, &SpatialConfig::default()).unwrap();
        assert_eq!(payload.content_type, "image/png");
        let img = image::load_from_memory(&payload.body).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (64, 32));
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_vendor_image_formats() {
        for (requested, answered) in [
            ("image/png8", "image/png"),
            ("image/vnd.jpeg-png", "image/png"),
            ("image/vnd.jpeg-png8", "image/png"),
            ("image/jpg", "image/jpeg"),
        ] {
            let req = request(ServiceKind::Wms, Operation::GetMap, Some("1.3.0"), Some(requested));
            let payload = empty_payload(&req, &SpatialConfig::default()).unwrap();
            assert_eq!(payload.content_type, answered, "{requested}");
            assert!(image::load_from_memory(&payload.body).is_ok());
        }
    }

    #[test]
    fn test_unsupported_image_format() {
        let req = request(ServiceKind::Wms, Operation::GetMap, None, Some("application/vnd.google-earth.kml+xml"));
        assert!(empty_payload(&req, &SpatialConfig::default()).is_err());
    }

    #[test]
    fn test_feature_collections_per_version() {
        let v2 = empty_payload(&request(ServiceKind::Wfs, Operation::GetFeature, Some("2.0.0"), None), &SpatialConfig::default()).unwrap();
        let body = String::from_utf8(v2.body).unwrap();
        assert!(body.contains("numberReturned=\"0\""));

        let v11 = empty_payload(&request(ServiceKind::Wfs, Operation::GetFeature, Some("1.1.0"), Some("GML3")), &SpatialConfig::default()).unwrap();
        assert!(String::from_utf8(v11.body).unwrap().contains("numberOfFeatures=\"0\""));

        let json = empty_payload(&request(ServiceKind::Wfs, Operation::GetFeature, Some("2.0.0"), Some("application/json")), &SpatialConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json.body).unwrap();
        assert_eq!(value["features"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn test_empty_records() {
        let payload = empty_payload(&request(ServiceKind::Csw, Operation::GetRecords, Some("2.0.2"), None), &SpatialConfig::default()).unwrap();
        assert!(String::from_utf8(payload.body).unwrap().contains("numberOfRecordsReturned=\"0\""));
    }
}
