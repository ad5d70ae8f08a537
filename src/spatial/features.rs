//! Feature collection filtering.
//!
//! A feature is kept when any of its coordinate paths touches the permitted
//! area. Features whose geometry cannot be read are dropped.
//!
//! GML: members are `member` / `featureMember` children of the collection,
//! or the children of `featureMembers`. Coordinates come from `pos`,
//! `posList`, `coordinates`, `lowerCorner` and `upperCorner`, ignoring
//! `boundedBy`. Count attributes on the collection are rewritten.
//!
//! GeoJSON: the `features` array is filtered and count members updated.

use geo::{Coord, MultiPolygon};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value;

use super::evaluator::MaskPlan;
use super::SpatialEvaluationError;
use crate::geometry::area::path_intersects;
use crate::geometry::{GeometryError, Srs};

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredFeatures {
    pub body: Vec<u8>,
    pub kept: usize,
    pub removed: usize,
}

pub fn filter_features(
    body: &[u8],
    content_type: Option<&str>,
    plan: &MaskPlan,
) -> Result<FilteredFeatures, SpatialEvaluationError> {
    if is_json(body, content_type) {
        filter_geojson(body, &plan.area)
    } else {
        filter_gml(body, plan)
    }
}

pub(crate) fn is_json(body: &[u8], content_type: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        if ct.to_ascii_lowercase().contains("json") {
            return true;
        }
    }
    body.trim_ascii_start().first() == Some(&b'{')
}

fn decode_err(e: impl std::fmt::Display) -> SpatialEvaluationError {
    SpatialEvaluationError::Decode(e.to_string())
}

// GeoJSON

fn filter_geojson(body: &[u8], area: &MultiPolygon<f64>) -> Result<FilteredFeatures, SpatialEvaluationError> {
    let mut doc: Value = serde_json::from_slice(body).map_err(decode_err)?;
    let features = doc
        .get_mut("features")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| SpatialEvaluationError::Decode("no features array".into()))?;

    let before = features.len();
    let mut failure: Option<GeometryError> = None;
    features.retain(|feature| {
        let mut paths = Vec::new();
        if let Some(geometry) = feature.get("geometry") {
            geometry_paths(geometry, &mut paths);
        }
        match any_path_intersects(area, &paths) {
            Ok(keep) => keep,
            Err(e) => {
                failure.get_or_insert(e);
                false
            }
        }
    });
    if let Some(e) = failure {
        return Err(e.into());
    }
    let kept = features.len();

    if let Some(obj) = doc.as_object_mut() {
        for key in ["totalFeatures", "numberReturned", "numberMatched"] {
            if obj.contains_key(key) {
                obj.insert(key.to_string(), Value::from(kept));
            }
        }
        obj.remove("bbox");
    }

    Ok(FilteredFeatures {
        body: serde_json::to_vec(&doc).map_err(|e| SpatialEvaluationError::Encode(e.to_string()))?,
        kept,
        removed: before - kept,
    })
}

fn geometry_paths(geometry: &Value, out: &mut Vec<Vec<Coord<f64>>>) {
    if let Some(children) = geometry.get("geometries").and_then(Value::as_array) {
        for child in children {
            geometry_paths(child, out);
        }
    }
    if let Some(coords) = geometry.get("coordinates") {
        coordinate_paths(coords, out);
    }
}

fn coordinate_paths(value: &Value, out: &mut Vec<Vec<Coord<f64>>>) {
    let Some(items) = value.as_array() else {
        return;
    };
    match items.first() {
        Some(Value::Number(_)) => {
            if let Some(c) = position(value) {
                out.push(vec![c]);
            }
        }
        Some(Value::Array(inner)) if matches!(inner.first(), Some(Value::Number(_))) => {
            out.push(items.iter().filter_map(position).collect());
        }
        _ => {
            for item in items {
                coordinate_paths(item, out);
            }
        }
    }
}

fn position(value: &Value) -> Option<Coord<f64>> {
    let arr = value.as_array()?;
    Some(Coord {
        x: arr.first()?.as_f64()?,
        y: arr.get(1)?.as_f64()?,
    })
}

fn any_path_intersects(area: &MultiPolygon<f64>, paths: &[Vec<Coord<f64>>]) -> Result<bool, GeometryError> {
    for path in paths {
        if path_intersects(area, path)? {
            return Ok(true);
        }
    }
    Ok(false)
}

// GML

#[derive(Clone, Copy, PartialEq)]
enum CoordText {
    Positions,
    Tuples,
}

struct Unit {
    start: usize,
    depth: usize,
    paths: Vec<Vec<Coord<f64>>>,
    lat_first: bool,
    dimension: usize,
    bounded_by_depth: Option<usize>,
}

fn filter_gml(body: &[u8], plan: &MaskPlan) -> Result<FilteredFeatures, SpatialEvaluationError> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut events: Vec<Event<'static>> = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(decode_err)? {
            Event::Eof => break,
            ev => events.push(ev.into_owned()),
        }
        buf.clear();
    }

    let mut depth = 0usize;
    let mut names: Vec<Vec<u8>> = Vec::new();
    let mut root: Option<usize> = None;
    let mut unit: Option<Unit> = None;
    let mut capture: Option<CoordText> = None;
    let mut dropped: Vec<(usize, usize)> = Vec::new();
    let mut kept = 0usize;

    for (i, ev) in events.iter().enumerate() {
        match ev {
            Event::Start(e) | Event::Empty(e) => {
                let is_empty = matches!(ev, Event::Empty(_));
                depth += 1;
                let local = e.local_name().as_ref().to_vec();
                if depth == 1 && root.is_none() {
                    root = Some(i);
                }

                if unit.is_none() && is_member_start(depth, &local, &names) {
                    unit = Some(Unit {
                        start: i,
                        depth,
                        paths: Vec::new(),
                        lat_first: plan.srs.is_lat_first(),
                        dimension: 2,
                        bounded_by_depth: None,
                    });
                }

                if let Some(u) = unit.as_mut() {
                    if local == b"boundedBy" && u.bounded_by_depth.is_none() {
                        u.bounded_by_depth = Some(depth);
                    }
                    read_geometry_attributes(e, u)?;
                    capture = match local.as_slice() {
                        _ if u.bounded_by_depth.is_some() => None,
                        b"pos" | b"posList" | b"lowerCorner" | b"upperCorner" => Some(CoordText::Positions),
                        b"coordinates" => Some(CoordText::Tuples),
                        _ => None,
                    };
                }

                if is_empty {
                    capture = None;
                    close(&mut depth, &mut unit, i, plan, &mut dropped, &mut kept)?;
                } else {
                    names.push(local);
                }
            }
            Event::Text(t) => {
                if let (Some(kind), Some(u)) = (capture, unit.as_mut()) {
                    let text = t.unescape().map_err(decode_err)?;
                    u.paths.push(parse_coordinates(&text, kind, u.dimension, u.lat_first));
                }
            }
            Event::End(_) => {
                capture = None;
                names.pop();
                if let Some(u) = unit.as_mut() {
                    if u.bounded_by_depth == Some(depth) {
                        u.bounded_by_depth = None;
                    }
                }
                close(&mut depth, &mut unit, i, plan, &mut dropped, &mut kept)?;
            }
            _ => {}
        }
    }

    let removed = dropped.len();
    let mut writer = Writer::new(Vec::with_capacity(body.len()));
    let mut skip = dropped.iter().peekable();
    let mut i = 0;
    while i < events.len() {
        if let Some(&&(start, end)) = skip.peek() {
            if i == start {
                i = end + 1;
                skip.next();
                continue;
            }
        }
        let ev = &events[i];
        let written = match (ev, root == Some(i)) {
            (Event::Start(e), true) => writer.write_event(Event::Start(patch_counts(e, kept)?)),
            (Event::Empty(e), true) => writer.write_event(Event::Empty(patch_counts(e, kept)?)),
            _ => writer.write_event(ev.clone()),
        };
        written.map_err(|e| SpatialEvaluationError::Encode(e.to_string()))?;
        i += 1;
    }

    Ok(FilteredFeatures {
        body: writer.into_inner(),
        kept,
        removed,
    })
}

fn is_member_start(depth: usize, local: &[u8], open: &[Vec<u8>]) -> bool {
    match depth {
        2 => local == b"member" || local == b"featureMember",
        3 => open.get(1).map(|p| p.as_slice() == b"featureMembers").unwrap_or(false),
        _ => false,
    }
}

/// Pop one level; finish the current unit if it ends here.
fn close(
    depth: &mut usize,
    unit: &mut Option<Unit>,
    index: usize,
    plan: &MaskPlan,
    dropped: &mut Vec<(usize, usize)>,
    kept: &mut usize,
) -> Result<(), SpatialEvaluationError> {
    if unit.as_ref().map(|u| u.depth) == Some(*depth) {
        if let Some(u) = unit.take() {
            if any_path_intersects(&plan.area, &u.paths)? {
                *kept += 1;
            } else {
                dropped.push((u.start, index));
            }
        }
    }
    *depth = depth.saturating_sub(1);
    Ok(())
}

fn read_geometry_attributes(e: &BytesStart<'_>, unit: &mut Unit) -> Result<(), SpatialEvaluationError> {
    for attr in e.attributes() {
        let attr = attr.map_err(decode_err)?;
        match attr.key.local_name().as_ref() {
            b"srsName" => {
                let value = attr.unescape_value().map_err(decode_err)?;
                if let Ok(srs) = Srs::parse(&value, false) {
                    unit.lat_first = srs.is_lat_first();
                }
            }
            b"srsDimension" => {
                let value = attr.unescape_value().map_err(decode_err)?;
                unit.dimension = value.trim().parse().unwrap_or(2).max(2);
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_coordinates(text: &str, kind: CoordText, dimension: usize, lat_first: bool) -> Vec<Coord<f64>> {
    let make = |a: f64, b: f64| if lat_first { Coord { x: b, y: a } } else { Coord { x: a, y: b } };
    match kind {
        CoordText::Positions => {
            let numbers: Vec<f64> = text.split_whitespace().filter_map(|s| s.parse().ok()).collect();
            numbers
                .chunks_exact(dimension)
                .map(|c| make(c[0], c[1]))
                .collect()
        }
        CoordText::Tuples => text
            .split_whitespace()
            .filter_map(|tuple| {
                let mut it = tuple.split(',').map(|s| s.parse::<f64>());
                match (it.next(), it.next()) {
                    (Some(Ok(a)), Some(Ok(b))) => Some(make(a, b)),
                    _ => None,
                }
            })
            .collect(),
    }
}

fn patch_counts(e: &BytesStart<'_>, kept: usize) -> Result<BytesStart<'static>, SpatialEvaluationError> {
    let mut patched = e.clone().into_owned();
    patched.clear_attributes();
    let count = kept.to_string();
    for attr in e.attributes() {
        let attr = attr.map_err(decode_err)?;
        match attr.key.local_name().as_ref() {
            b"numberReturned" | b"numberOfFeatures" => {
                patched.push_attribute(Attribute::from((attr.key.as_ref(), count.as_bytes())));
            }
            b"numberMatched" => {
                patched.push_attribute(Attribute::from((attr.key.as_ref(), b"unknown".as_slice())));
            }
            _ => patched.push_attribute(attr),
        }
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Area, Envelope};

    fn plan(srs: &str) -> MaskPlan {
        MaskPlan {
            area: Area::from_wkt("POLYGON((0 0,10 0,10 10,0 10,0 0))").unwrap().polygons().clone(),
            srs: Srs::parse(srs, false).unwrap(),
            extent: Envelope::new(-180.0, -90.0, 180.0, 90.0).unwrap(),
        }
    }

    #[test]
    fn test_wfs2_members_filtered() {
        let gml = r#"<?xml version="1.0"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0" xmlns:gml="http://www.opengis.net/gml/3.2" numberMatched="2" numberReturned="2">
  <wfs:member><ns:poi gml:id="a"><ns:geom><gml:Point srsName="urn:ogc:def:crs:EPSG::4326"><gml:pos>5 5</gml:pos></gml:Point></ns:geom></ns:poi></wfs:member>
  <wfs:member><ns:poi gml:id="b"><gml:boundedBy><gml:Envelope><gml:lowerCorner>1 1</gml:lowerCorner><gml:upperCorner>2 2</gml:upperCorner></gml:Envelope></gml:boundedBy><ns:geom><gml:Point><gml:pos>50 50</gml:pos></gml:Point></ns:geom></ns:poi></wfs:member>
</wfs:FeatureCollection>"#;
        let out = filter_features(gml.as_bytes(), Some("application/gml+xml"), &plan("EPSG:4326")).unwrap();
        let text = String::from_utf8(out.body).unwrap();
        assert_eq!((out.kept, out.removed), (1, 1));
        assert!(text.contains("gml:id=\"a\""));
        assert!(!text.contains("gml:id=\"b\""));
        assert!(text.contains("numberReturned=\"1\""));
        assert!(text.contains("numberMatched=\"unknown\""));
    }

    #[test]
    fn test_wfs1_feature_members() {
        let gml = r#"<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs" xmlns:gml="http://www.opengis.net/gml" numberOfFeatures="2">
<gml:featureMembers>
<ns:road fid="r1"><ns:geom><gml:LineString><gml:posList>-5 5 5 5</gml:posList></gml:LineString></ns:geom></ns:road>
<ns:road fid="r2"><ns:geom><gml:LineString><gml:posList>20 20 30 30</gml:posList></gml:LineString></ns:geom></ns:road>
</gml:featureMembers></wfs:FeatureCollection>"#;
        let out = filter_features(gml.as_bytes(), Some("text/xml"), &plan("EPSG:4326")).unwrap();
        let text = String::from_utf8(out.body).unwrap();
        assert!(text.contains("fid=\"r1\""));
        assert!(!text.contains("fid=\"r2\""));
        assert!(text.contains("numberOfFeatures=\"1\""));
    }

    #[test]
    fn test_gml2_coordinates_and_missing_geometry() {
        let gml = r#"<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs" xmlns:gml="http://www.opengis.net/gml">
<gml:featureMember><ns:a fid="1"><gml:Point><gml:coordinates>3,4</gml:coordinates></gml:Point></ns:a></gml:featureMember>
<gml:featureMember><ns:a fid="2"><ns:name>no geometry</ns:name></ns:a></gml:featureMember>
</wfs:FeatureCollection>"#;
        let out = filter_features(gml.as_bytes(), None, &plan("EPSG:4326")).unwrap();
        assert_eq!((out.kept, out.removed), (1, 1));
    }

    #[test]
    fn test_geojson() {
        let json = serde_json::json!({
            "type": "FeatureCollection",
            "totalFeatures": 3,
            "bbox": [0, 0, 100, 100],
            "features": [
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [1, 1] } },
                { "type": "Feature", "geometry": { "type": "Polygon", "coordinates": [[[20, 20], [30, 20], [30, 30], [20, 20]]] } },
                { "type": "Feature", "geometry": null }
            ]
        });
        let body = serde_json::to_vec(&json).unwrap();
        let out = filter_features(&body, Some("application/json"), &plan("EPSG:4326")).unwrap();
        let value: Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(value["features"].as_array().unwrap().len(), 1);
        assert_eq!(value["totalFeatures"], 1);
        assert!(value.get("bbox").is_none());
        assert_eq!(out.removed, 2);
    }
}
