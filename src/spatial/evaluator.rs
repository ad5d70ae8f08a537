//! Spatial authorization evaluator.

use geo::{Coord, MultiPolygon};

use super::SpatialEvaluationError;
use crate::geometry::area::{contains_point, relate};
use crate::geometry::{Area, BoundingBox, Envelope, GeometryError, Relation, Srs};
use crate::ogc::{Operation, OperationRequest};
use crate::policy::AuthorizationResult;

/// What to do with an allowed request.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialPlan {
    Passthrough,
    Mask(MaskPlan),
    Empty,
}

/// Area to keep, expressed in the CRS of the response.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPlan {
    pub area: MultiPolygon<f64>,
    pub srs: Srs,
    /// Map extent of a raster response.
    pub extent: Envelope,
}

fn supports_mask(op: Operation) -> bool {
    matches!(op, Operation::GetMap | Operation::GetFeature | Operation::GetFeatureWithLock)
}

fn supports_empty(op: Operation) -> bool {
    matches!(
        op,
        Operation::GetMap
            | Operation::GetFeature
            | Operation::GetFeatureWithLock
            | Operation::GetFeatureInfo
            | Operation::GetRecords
    )
}

/// Decide passthrough, mask or empty for an allowed request.
pub fn evaluate(request: &OperationRequest, auth: &AuthorizationResult) -> Result<SpatialPlan, SpatialEvaluationError> {
    let areas = auth.bounded_areas();
    let Some((first, rest)) = areas.split_first() else {
        return Ok(SpatialPlan::Passthrough);
    };

    let mut effective = (*first).clone();
    for area in rest {
        effective = effective.intersection(area)?;
    }

    let op = request.operation;
    let bbox = match &request.bbox {
        Some(b) => b.clone(),
        // Feature requests without a spatial filter would return everything.
        None if op.returns_features() => {
            let srs = request.srs.clone().unwrap_or_else(Srs::wgs84);
            let area = project(&effective, &srs)?;
            return Ok(SpatialPlan::Mask(MaskPlan {
                area,
                srs,
                extent: BoundingBox::world().envelope,
            }));
        }
        // Other entity listings cannot be trimmed after the fact.
        None if op.returns_entities() => return Err(SpatialEvaluationError::UnsupportedOperation(op)),
        None => return Ok(SpatialPlan::Passthrough),
    };

    let projected = project(&effective, &bbox.srs)?;

    if op == Operation::GetFeatureInfo {
        return feature_info_plan(request, &bbox, &projected);
    }

    match relate(&projected, &bbox.envelope)? {
        Relation::Within => Ok(SpatialPlan::Passthrough),
        Relation::Disjoint if supports_empty(op) => Ok(SpatialPlan::Empty),
        Relation::Overlaps if supports_mask(op) => {
            // Features come back in SRSNAME when given, else in the filter CRS.
            let srs = match (&request.srs, op.returns_features()) {
                (Some(s), true) => s.clone(),
                _ => bbox.srs.clone(),
            };
            let area = if srs.same_crs(&bbox.srs) { projected } else { project(&effective, &srs)? };
            Ok(SpatialPlan::Mask(MaskPlan {
                area,
                srs,
                extent: bbox.envelope,
            }))
        }
        _ => Err(SpatialEvaluationError::UnsupportedOperation(op)),
    }
}

/// The queried pixel decides: inside the area passes, outside is empty.
fn feature_info_plan(
    request: &OperationRequest,
    bbox: &BoundingBox,
    projected: &MultiPolygon<f64>,
) -> Result<SpatialPlan, SpatialEvaluationError> {
    let (Some((width, height)), Some((i, j))) = (request.size, request.pixel) else {
        return match relate(projected, &bbox.envelope)? {
            Relation::Within => Ok(SpatialPlan::Passthrough),
            Relation::Disjoint => Ok(SpatialPlan::Empty),
            Relation::Overlaps => Err(SpatialEvaluationError::UnsupportedOperation(request.operation)),
        };
    };
    if width == 0 || height == 0 {
        return Err(GeometryError::InvalidEnvelope("zero sized map".into()).into());
    }

    let env = &bbox.envelope;
    let point = Coord {
        x: env.min_x + (f64::from(i) + 0.5) * env.width() / f64::from(width),
        y: env.max_y - (f64::from(j) + 0.5) * env.height() / f64::from(height),
    };
    if contains_point(projected, point)? {
        Ok(SpatialPlan::Passthrough)
    } else {
        Ok(SpatialPlan::Empty)
    }
}

fn project(area: &Area, srs: &Srs) -> Result<MultiPolygon<f64>, SpatialEvaluationError> {
    if !srs.is_supported() {
        return Err(GeometryError::UnsupportedSrs(srs.to_string()).into());
    }
    Ok(area.project(srs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogc::{HttpMethod, ServiceKind};
    use crate::policy::{Decision, LayerDecision};

    fn auth(areas: &[Option<&str>]) -> AuthorizationResult {
        AuthorizationResult::from_layers(
            areas
                .iter()
                .enumerate()
                .map(|(i, wkt)| LayerDecision {
                    layer: Some(format!("L{i}")),
                    decision: Decision::Allow,
                    permitted_area: wkt.map(|w| Area::from_wkt(w).unwrap()),
                    matched_rule_ids: vec![i as u64],
                    restricted: true,
                })
                .collect(),
        )
    }

    fn request(op: Operation, bbox: Option<[f64; 4]>, crs: &str) -> OperationRequest {
        let srs = Srs::parse(crs, false).unwrap();
        OperationRequest {
            service: if op == Operation::GetMap || op == Operation::GetFeatureInfo {
                ServiceKind::Wms
            } else {
                ServiceKind::Wfs
            },
            version: None,
            operation: op,
            layers: vec!["L0".into()],
            bbox: bbox.map(|b| BoundingBox::new(Envelope::new(b[0], b[1], b[2], b[3]).unwrap(), srs.clone())),
            output_format: None,
            info_format: None,
            srs: Some(srs),
            size: Some((100, 100)),
            pixel: Some((50, 50)),
            http_method: HttpMethod::Get,
        }
    }

    const REGION: &str = "POLYGON((0 0,10 0,10 10,0 10,0 0))";

    #[test]
    fn test_unbounded_is_passthrough() {
        let plan = evaluate(&request(Operation::GetMap, Some([50.0, 50.0, 60.0, 60.0]), "EPSG:4326"), &auth(&[None])).unwrap();
        assert_eq!(plan, SpatialPlan::Passthrough);
    }

    #[test]
    fn test_relations_map_to_plans() {
        let a = auth(&[Some(REGION)]);
        let inside = request(Operation::GetMap, Some([1.0, 1.0, 2.0, 2.0]), "EPSG:4326");
        let partial = request(Operation::GetMap, Some([5.0, 5.0, 15.0, 15.0]), "EPSG:4326");
        let outside = request(Operation::GetMap, Some([20.0, 20.0, 30.0, 30.0]), "EPSG:4326");
        assert_eq!(evaluate(&inside, &a).unwrap(), SpatialPlan::Passthrough);
        assert!(matches!(evaluate(&partial, &a).unwrap(), SpatialPlan::Mask(_)));
        assert_eq!(evaluate(&outside, &a).unwrap(), SpatialPlan::Empty);
    }

    #[test]
    fn test_web_mercator_request() {
        let a = auth(&[Some(REGION)]);
        // roughly 1..2 degrees in EPSG:3857
        let req = request(Operation::GetMap, Some([111_320.0, 111_325.0, 222_640.0, 222_684.0]), "EPSG:3857");
        assert_eq!(evaluate(&req, &a).unwrap(), SpatialPlan::Passthrough);
    }

    #[test]
    fn test_unsupported_crs_fails_closed() {
        let a = auth(&[Some(REGION)]);
        let req = request(Operation::GetMap, Some([1.0, 1.0, 2.0, 2.0]), "EPSG:25832");
        assert!(evaluate(&req, &a).is_err());
    }

    #[test]
    fn test_multi_layer_intersection() {
        let a = auth(&[Some(REGION), Some("POLYGON((20 20,30 20,30 30,20 30,20 20))")]);
        let req = request(Operation::GetMap, Some([1.0, 1.0, 2.0, 2.0]), "EPSG:4326");
        assert_eq!(evaluate(&req, &a).unwrap(), SpatialPlan::Empty);
    }

    #[test]
    fn test_get_feature_without_bbox_is_masked() {
        let a = auth(&[Some(REGION)]);
        let req = request(Operation::GetFeature, None, "EPSG:4326");
        assert!(matches!(evaluate(&req, &a).unwrap(), SpatialPlan::Mask(_)));
    }

    #[test]
    fn test_feature_info_pixel() {
        let a = auth(&[Some(REGION)]);
        // pixel (50, 50) of 5..15 is (10.05, 9.95), just east of the region
        let hit = request(Operation::GetFeatureInfo, Some([5.0, 5.0, 15.0, 15.0]), "EPSG:4326");
        assert_eq!(evaluate(&hit, &a).unwrap(), SpatialPlan::Empty);
        let mut miss = request(Operation::GetFeatureInfo, Some([5.0, 5.0, 15.0, 15.0]), "EPSG:4326");
        miss.pixel = Some((10, 90));
        assert_eq!(evaluate(&miss, &a).unwrap(), SpatialPlan::Passthrough);
    }

    #[test]
    fn test_operation_without_mask_support_is_denied() {
        let a = auth(&[Some(REGION)]);
        let req = request(Operation::GetPropertyValue, Some([5.0, 5.0, 15.0, 15.0]), "EPSG:4326");
        assert_eq!(
            evaluate(&req, &a),
            Err(SpatialEvaluationError::UnsupportedOperation(Operation::GetPropertyValue))
        );
    }

    #[test]
    fn test_unbounded_entity_listing_is_denied() {
        let a = auth(&[Some(REGION)]);
        let req = request(Operation::GetPropertyValue, None, "EPSG:4326");
        assert_eq!(
            evaluate(&req, &a),
            Err(SpatialEvaluationError::UnsupportedOperation(Operation::GetPropertyValue))
        );
        assert_eq!(
            evaluate(&request(Operation::GetPropertyValue, None, "EPSG:4326"), &auth(&[None])).unwrap(),
            SpatialPlan::Passthrough
        );
    }

    #[test]
    fn test_negated_filter_box_is_masked() {
        use crate::ogc::{normalize, RawCall};

        let body = br#"<wfs:GetFeature service="WFS" version="2.0.0" xmlns:wfs="http://www.opengis.net/wfs/2.0"
            xmlns:fes="http://www.opengis.net/fes/2.0" xmlns:gml="http://www.opengis.net/gml/3.2">
          <wfs:Query typeNames="L0"><fes:Filter><fes:Not><fes:BBOX>
            <gml:Envelope srsName="EPSG:4326"><gml:lowerCorner>1 1</gml:lowerCorner><gml:upperCorner>2 2</gml:upperCorner></gml:Envelope>
          </fes:BBOX></fes:Not></fes:Filter></wfs:Query>
        </wfs:GetFeature>"#;
        let call = RawCall {
            method: HttpMethod::Post,
            query: None,
            content_type: Some("application/xml"),
            body,
        };
        let req = normalize(&call, ServiceKind::Wfs).unwrap();
        assert!(req.bbox.is_none());

        let plan = evaluate(&req, &auth(&[Some(REGION)])).unwrap();
        assert!(matches!(plan, SpatialPlan::Mask(ref m) if m.extent == BoundingBox::world().envelope));
    }
}
