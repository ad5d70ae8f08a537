//! Permitted areas: decoding stored WKT, combining and relating geometries.
//!
//! The boolean operations of `geo` may panic on degenerate input. Every call
//! into them goes through [`guarded`] so a bad geometry turns into an error
//! (and therefore a denial) instead of taking down the request task.

use geo::{
    BooleanOps, Coord, CoordsIter, Geometry, Intersects, LineString, MultiPolygon, Point, Polygon, Relate,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use wkt::TryFromWkt;

use super::{Envelope, GeometryError, Srs};

/// A set of polygons in WGS84 longitude/latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    polygons: MultiPolygon<f64>,
}

/// How a requested extent relates to a permitted area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The extent lies completely inside the area.
    Within,
    /// The extent and the area share some but not all of the extent.
    Overlaps,
    /// Nothing in common.
    Disjoint,
}

impl Area {
    /// Decode a stored `allowedArea`.
    ///
    /// Accepts `POLYGON` and `MULTIPOLYGON`, optionally in EWKT form with
    /// `SRID=4326;`.
    pub fn from_wkt(raw: &str) -> Result<Self, GeometryError> {
        let mut text = raw.trim();
        if let Some((prefix, rest)) = text.split_once(';') {
            let srid = prefix
                .trim()
                .strip_prefix("SRID=")
                .or_else(|| prefix.trim().strip_prefix("srid="))
                .ok_or_else(|| GeometryError::InvalidWkt(raw.to_string()))?;
            let srid: u32 = srid
                .trim()
                .parse()
                .map_err(|_| GeometryError::InvalidWkt(raw.to_string()))?;
            if srid != 4326 {
                return Err(GeometryError::UnsupportedSrid(srid));
            }
            text = rest.trim();
        }

        let geometry = Geometry::<f64>::try_from_wkt_str(text)
            .map_err(|e| GeometryError::InvalidWkt(e.to_string()))?;
        let polygons = match geometry {
            Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            Geometry::MultiPolygon(mp) => mp,
            other => return Err(GeometryError::UnsupportedGeometry(geometry_name(&other).into())),
        };

        if polygons.0.is_empty() || polygons.0.iter().all(|p| p.exterior().0.len() < 4) {
            return Err(GeometryError::EmptyArea);
        }
        for c in polygons.coords_iter() {
            if !(-180.0..=180.0).contains(&c.x) || !(-90.0..=90.0).contains(&c.y) {
                return Err(GeometryError::OutOfRange { x: c.x, y: c.y });
            }
        }
        Ok(Self { polygons })
    }

    /// An area covering nothing.
    pub fn empty() -> Self {
        Self {
            polygons: MultiPolygon::new(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.0.is_empty()
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// Union of several areas.
    pub fn union_all<'a>(areas: impl IntoIterator<Item = &'a Area>) -> Result<Area, GeometryError> {
        let mut iter = areas.into_iter();
        let Some(first) = iter.next() else {
            return Ok(Area::empty());
        };
        let mut acc = first.polygons.clone();
        for area in iter {
            acc = guarded("union", || acc.union(&area.polygons))?;
        }
        Ok(Area { polygons: acc })
    }

    pub fn intersection(&self, other: &Area) -> Result<Area, GeometryError> {
        let polygons = guarded("intersection", || self.polygons.intersection(&other.polygons))?;
        Ok(Area { polygons })
    }

    /// Project into `srs`, yielding coordinates in the request CRS.
    pub fn project(&self, srs: &Srs) -> Result<MultiPolygon<f64>, GeometryError> {
        srs.project_area(&self.polygons)
    }
}

/// Relate a request envelope to an area already expressed in the same CRS.
pub fn relate(area: &MultiPolygon<f64>, envelope: &Envelope) -> Result<Relation, GeometryError> {
    if area.0.is_empty() {
        return Ok(Relation::Disjoint);
    }

    if envelope.width() == 0.0 || envelope.height() == 0.0 {
        let inside = contains_point(area, envelope.center())?;
        return Ok(if inside { Relation::Within } else { Relation::Disjoint });
    }

    let bbox = envelope.to_polygon();
    let matrix = guarded("relate", || area.relate(&bbox))?;
    if matrix.is_contains() {
        Ok(Relation::Within)
    } else if matrix.is_intersects() {
        Ok(Relation::Overlaps)
    } else {
        Ok(Relation::Disjoint)
    }
}

/// Point-in-area test, boundary inclusive.
pub fn contains_point(area: &MultiPolygon<f64>, point: Coord<f64>) -> Result<bool, GeometryError> {
    guarded("point test", || area.intersects(&Point::from(point)))
}

/// Whether a coordinate path (a point, line or ring) touches the area.
pub fn path_intersects(area: &MultiPolygon<f64>, path: &[Coord<f64>]) -> Result<bool, GeometryError> {
    match path {
        [] => Ok(false),
        [single] => contains_point(area, *single),
        _ => {
            let line = LineString::from(path.to_vec());
            if path.len() >= 4 && line.is_closed() {
                // A closed ring may enclose the whole area without crossing it.
                let ring = Polygon::new(line, Vec::new());
                return guarded("intersects", || area.intersects(&ring));
            }
            guarded("intersects", || area.intersects(&line))
        }
    }
}

fn guarded<T>(stage: &'static str, f: impl FnOnce() -> T) -> Result<T, GeometryError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|_| {
        tracing::error!(stage, "Geometry operation panicked");
        GeometryError::Computation(stage)
    })
}

fn geometry_name(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) | Geometry::LineString(_) => "LINESTRING",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        Geometry::Rect(_) => "RECT",
        Geometry::Triangle(_) => "TRIANGLE",
        Geometry::Polygon(_) => "POLYGON",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::BoundingRect;

    fn square(min: f64, max: f64) -> Area {
        Area::from_wkt(&format!(
            "POLYGON(({min} {min},{max} {min},{max} {max},{min} {max},{min} {min}))"
        ))
        .unwrap()
    }

    #[test]
    fn test_decode_variants() {
        assert!(Area::from_wkt("SRID=4326;POLYGON((0 0,1 0,1 1,0 1,0 0))").is_ok());
        assert!(Area::from_wkt("MULTIPOLYGON(((0 0,1 0,1 1,0 1,0 0)),((2 2,3 2,3 3,2 2)))").is_ok());
        assert_eq!(
            Area::from_wkt("SRID=3857;POLYGON((0 0,1 0,1 1,0 1,0 0))"),
            Err(GeometryError::UnsupportedSrid(3857))
        );
        assert!(matches!(
            Area::from_wkt("POINT(1 2)"),
            Err(GeometryError::UnsupportedGeometry(_))
        ));
        assert!(matches!(Area::from_wkt("POLYGON((0 0,1 0"), Err(GeometryError::InvalidWkt(_))));
        assert!(matches!(
            Area::from_wkt("POLYGON((0 0,200 0,200 1,0 1,0 0))"),
            Err(GeometryError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_relations() {
        let area = square(0.0, 10.0);
        let poly = area.polygons();
        let inside = Envelope::new(2.0, 2.0, 4.0, 4.0).unwrap();
        let partial = Envelope::new(8.0, 8.0, 12.0, 12.0).unwrap();
        let outside = Envelope::new(20.0, 20.0, 30.0, 30.0).unwrap();
        assert_eq!(relate(poly, &inside).unwrap(), Relation::Within);
        assert_eq!(relate(poly, &partial).unwrap(), Relation::Overlaps);
        assert_eq!(relate(poly, &outside).unwrap(), Relation::Disjoint);
        assert_eq!(relate(Area::empty().polygons(), &inside).unwrap(), Relation::Disjoint);
    }

    #[test]
    fn test_union_and_intersection() {
        let a = square(0.0, 10.0);
        let b = square(5.0, 15.0);
        let union = Area::union_all([&a, &b]).unwrap();
        let strip = Envelope::new(1.0, 1.0, 14.0, 4.0).unwrap();
        assert_eq!(relate(union.polygons(), &strip).unwrap(), Relation::Overlaps);
        assert_eq!(
            relate(union.polygons(), &Envelope::new(1.0, 1.0, 9.0, 9.0).unwrap()).unwrap(),
            Relation::Within
        );

        let inter = a.intersection(&b).unwrap();
        let b = inter.polygons().bounding_rect().unwrap();
        assert!((b.min().x - 5.0).abs() < 1e-9 && (b.max().x - 10.0).abs() < 1e-9);

        let none = square(0.0, 1.0).intersection(&square(5.0, 6.0)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_point_inclusion() {
        let area = square(0.0, 10.0);
        assert!(contains_point(area.polygons(), Coord { x: 5.0, y: 5.0 }).unwrap());
        assert!(!contains_point(area.polygons(), Coord { x: 50.0, y: 5.0 }).unwrap());
    }

    #[test]
    fn test_enclosing_ring_intersects() {
        let area = square(4.0, 6.0);
        let ring = [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 0.0, y: 10.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        assert!(path_intersects(area.polygons(), &ring).unwrap());
        assert!(!path_intersects(area.polygons(), &ring[..3]).unwrap());
    }
}
