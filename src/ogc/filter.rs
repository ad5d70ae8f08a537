//! Bounding box extraction from OGC filter encodings.
//!
//! Only the spatial `BBOX` predicate (and WMS XML `BoundingBox`) is read; any
//! other filter content is skipped. Both GML 2 (`Box` with `coordinates` or
//! `coord/X/Y`) and GML 3 (`Envelope` with `lowerCorner`/`upperCorner`)
//! envelopes are understood.
//!
//! A box nested under `Not` or `Or` does not bound the result set, so it is
//! reported as non-restrictive.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::request::RequestError;

/// A box as written on the wire, axis order not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBox {
    pub values: [f64; 4],
    pub srs_name: Option<String>,
    /// False when a `Not` or `Or` encloses the box.
    pub restrictive: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Target {
    None,
    Lower,
    Upper,
    Coordinates,
    X,
    Y,
}

#[derive(Default)]
struct Pending {
    srs_name: Option<String>,
    lower: Option<String>,
    upper: Option<String>,
    coordinates: Option<String>,
    xs: Vec<String>,
    ys: Vec<String>,
}

/// Collect every bounding box found in an XML document or fragment.
pub fn extract_bboxes(xml: &[u8]) -> Result<Vec<RawBox>, RequestError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut boxes = Vec::new();
    let mut depth_in_box = 0usize;
    let mut pending = Pending::default();
    let mut target = Target::None;
    // One entry per open element outside a box: does it widen the match?
    let mut enclosing: Vec<bool> = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| RequestError::MalformedXml(e.to_string()))?;
        match event {
            Event::Start(ref e) => {
                let name = e.local_name();
                if depth_in_box == 0 {
                    if is_container(name.as_ref()) {
                        depth_in_box = 1;
                        pending = Pending::default();
                        pending.srs_name = srs_attribute(e)?;
                    } else {
                        enclosing.push(matches!(name.as_ref(), b"Not" | b"Or"));
                    }
                } else {
                    depth_in_box += 1;
                    if let Some(srs) = srs_attribute(e)? {
                        pending.srs_name = Some(srs);
                    }
                    target = match name.as_ref() {
                        b"lowerCorner" => Target::Lower,
                        b"upperCorner" => Target::Upper,
                        b"coordinates" => Target::Coordinates,
                        b"X" => Target::X,
                        b"Y" => Target::Y,
                        _ => Target::None,
                    };
                }
            }
            Event::Empty(ref e) => {
                if depth_in_box > 0 {
                    if let Some(srs) = srs_attribute(e)? {
                        pending.srs_name = Some(srs);
                    }
                }
            }
            Event::Text(ref t) if depth_in_box > 0 && target != Target::None => {
                let text = t
                    .unescape()
                    .map_err(|e| RequestError::MalformedXml(e.to_string()))?
                    .into_owned();
                match target {
                    Target::Lower => pending.lower = Some(text),
                    Target::Upper => pending.upper = Some(text),
                    Target::Coordinates => pending.coordinates = Some(text),
                    Target::X => pending.xs.push(text),
                    Target::Y => pending.ys.push(text),
                    Target::None => {}
                }
            }
            Event::End(_) if depth_in_box > 0 => {
                target = Target::None;
                depth_in_box -= 1;
                if depth_in_box == 0 {
                    let restrictive = !enclosing.iter().any(|&widening| widening);
                    boxes.push(finish(std::mem::take(&mut pending), restrictive)?);
                }
            }
            Event::End(_) => {
                enclosing.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth_in_box > 0 {
        return Err(RequestError::MalformedXml("unterminated BBOX element".into()));
    }
    Ok(boxes)
}

fn is_container(local: &[u8]) -> bool {
    local == b"BBOX" || local == b"BoundingBox"
}

fn srs_attribute(e: &BytesStart<'_>) -> Result<Option<String>, RequestError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| RequestError::MalformedXml(e.to_string()))?;
        if attr.key.local_name().as_ref() == b"srsName" {
            let value = attr
                .unescape_value()
                .map_err(|e| RequestError::MalformedXml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn finish(p: Pending, restrictive: bool) -> Result<RawBox, RequestError> {
    let invalid = |reason: &str| RequestError::InvalidParameter {
        param: "BBOX",
        reason: reason.to_string(),
    };

    let numbers: Vec<f64> = if let (Some(lower), Some(upper)) = (&p.lower, &p.upper) {
        parse_numbers(&format!("{lower} {upper}")).ok_or_else(|| invalid("unparsable corner"))?
    } else if let Some(coords) = &p.coordinates {
        // GML 2: "x1,y1 x2,y2"
        parse_numbers(&coords.replace(',', " ")).ok_or_else(|| invalid("unparsable coordinates"))?
    } else if p.xs.len() == 2 && p.ys.len() == 2 {
        let joined = format!("{} {} {} {}", p.xs[0], p.ys[0], p.xs[1], p.ys[1]);
        parse_numbers(&joined).ok_or_else(|| invalid("unparsable coord"))?
    } else {
        return Err(invalid("filter BBOX without envelope"));
    };

    let values: [f64; 4] = numbers
        .try_into()
        .map_err(|_| invalid("envelope must have exactly two 2D corners"))?;
    Ok(RawBox {
        values,
        srs_name: p.srs_name,
        restrictive,
    })
}

fn parse_numbers(text: &str) -> Option<Vec<f64>> {
    text.split_whitespace().map(|s| s.parse::<f64>().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gml3_envelope() {
        let xml = br#"<fes:Filter xmlns:fes="http://www.opengis.net/fes/2.0" xmlns:gml="http://www.opengis.net/gml/3.2">
            <fes:BBOX><fes:ValueReference>geom</fes:ValueReference>
              <gml:Envelope srsName="urn:ogc:def:crs:EPSG::4326">
                <gml:lowerCorner>47 5</gml:lowerCorner><gml:upperCorner>55 15</gml:upperCorner>
              </gml:Envelope>
            </fes:BBOX></fes:Filter>"#;
        let boxes = extract_bboxes(xml).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].values, [47.0, 5.0, 55.0, 15.0]);
        assert_eq!(boxes[0].srs_name.as_deref(), Some("urn:ogc:def:crs:EPSG::4326"));
    }

    #[test]
    fn test_gml2_box() {
        let xml = br#"<ogc:Filter><ogc:BBOX><ogc:PropertyName>the_geom</ogc:PropertyName>
            <gml:Box srsName="EPSG:4326"><gml:coordinates>1,2 3,4</gml:coordinates></gml:Box>
            </ogc:BBOX></ogc:Filter>"#;
        let boxes = extract_bboxes(xml).unwrap();
        assert_eq!(boxes[0].values, [1.0, 2.0, 3.0, 4.0]);
        assert!(boxes[0].restrictive);
    }

    #[test]
    fn test_negated_or_alternative_box_is_not_restrictive() {
        let negated = br#"<fes:Filter xmlns:fes="http://www.opengis.net/fes/2.0"><fes:Not><fes:BBOX>
            <gml:Envelope><gml:lowerCorner>0 0</gml:lowerCorner><gml:upperCorner>1 1</gml:upperCorner></gml:Envelope>
            </fes:BBOX></fes:Not></fes:Filter>"#;
        assert!(!extract_bboxes(negated).unwrap()[0].restrictive);

        let alternative = br#"<Filter><Or>
            <BBOX><Envelope><lowerCorner>0 0</lowerCorner><upperCorner>1 1</upperCorner></Envelope></BBOX>
            <PropertyIsEqualTo><PropertyName>a</PropertyName><Literal>1</Literal></PropertyIsEqualTo>
            </Or></Filter>"#;
        assert!(!extract_bboxes(alternative).unwrap()[0].restrictive);

        let conjunction = br#"<Filter><And><Not><PropertyIsNull><PropertyName>a</PropertyName></PropertyIsNull></Not>
            <BBOX><Envelope><lowerCorner>0 0</lowerCorner><upperCorner>1 1</upperCorner></Envelope></BBOX>
            </And></Filter>"#;
        assert!(extract_bboxes(conjunction).unwrap()[0].restrictive);
    }

    #[test]
    fn test_filter_without_spatial_predicate() {
        let xml = br#"<Filter><PropertyIsEqualTo><PropertyName>a</PropertyName><Literal>1</Literal></PropertyIsEqualTo></Filter>"#;
        assert!(extract_bboxes(xml).unwrap().is_empty());
    }

    #[test]
    fn test_broken_envelope() {
        let xml = br#"<Filter><BBOX><Envelope><lowerCorner>a b</lowerCorner><upperCorner>1 2</upperCorner></Envelope></BBOX></Filter>"#;
        assert!(extract_bboxes(xml).is_err());
        assert!(extract_bboxes(b"<Filter><BBOX>").is_err());
    }
}
