//! Coordinate reference system identifiers and projection.
//!
//! # Supported forms
//! - `EPSG:n`
//! - `CRS:84`, `urn:ogc:def:crs:OGC:1.3:CRS84`
//! - `urn:ogc:def:crs:EPSG::n`, `urn:x-ogc:def:crs:EPSG:n`
//! - `http://www.opengis.net/def/crs/EPSG/0/n`
//! - `http://www.opengis.net/gml/srs/epsg.xml#n`
//!
//! EPSG:4326 is latitude-first in its URN/URI forms, and in its `EPSG:` form
//! only where the protocol says so (WMS 1.3.0).

use geo::{Coord, MapCoords, MultiPolygon};
use std::fmt;

use super::GeometryError;

const EARTH_RADIUS: f64 = 6_378_137.0;
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrsCode {
    Epsg(u32),
    Crs84,
}

/// A parsed CRS together with the axis order used on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Srs {
    code: SrsCode,
    lat_first: bool,
    raw: String,
}

impl Srs {
    /// Parse a CRS identifier.
    ///
    /// `epsg_prefix_lat_first` tells whether the plain `EPSG:4326` form uses
    /// latitude/longitude order in the calling protocol.
    pub fn parse(raw: &str, epsg_prefix_lat_first: bool) -> Result<Self, GeometryError> {
        let trimmed = raw.trim();
        let upper = trimmed.to_ascii_uppercase();
        let invalid = || GeometryError::InvalidSrs(trimmed.to_string());

        if upper == "CRS:84" || upper == "CRS84" || upper.ends_with(":CRS84") || upper.ends_with("/CRS84") {
            return Ok(Self {
                code: SrsCode::Crs84,
                lat_first: false,
                raw: trimmed.to_string(),
            });
        }

        let (number, lat_first_form) = if let Some(rest) = upper.strip_prefix("EPSG:") {
            (rest, epsg_prefix_lat_first)
        } else if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") || upper.starts_with("URN:X-OGC:DEF:CRS:EPSG:") {
            (upper.rsplit(':').next().ok_or_else(invalid)?, true)
        } else if upper.starts_with("HTTP://WWW.OPENGIS.NET/DEF/CRS/EPSG/") {
            (upper.rsplit('/').next().ok_or_else(invalid)?, true)
        } else if let Some((_, rest)) = upper.split_once("EPSG.XML#") {
            (rest, false)
        } else {
            return Err(invalid());
        };

        let code: u32 = number.trim().parse().map_err(|_| invalid())?;
        Ok(Self {
            code: SrsCode::Epsg(code),
            lat_first: lat_first_form && code == 4326,
            raw: trimmed.to_string(),
        })
    }

    /// WGS84 in longitude/latitude order, the reference system of stored areas.
    pub fn wgs84() -> Self {
        Self {
            code: SrsCode::Crs84,
            lat_first: false,
            raw: "CRS:84".to_string(),
        }
    }

    pub fn code(&self) -> SrsCode {
        self.code
    }

    /// Whether coordinates on the wire are latitude first.
    pub fn is_lat_first(&self) -> bool {
        self.lat_first
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Same CRS regardless of spelling and axis order.
    pub fn same_crs(&self, other: &Srs) -> bool {
        let geographic = |c: SrsCode| matches!(c, SrsCode::Crs84 | SrsCode::Epsg(4326));
        self.code == other.code || (geographic(self.code) && geographic(other.code))
    }

    fn is_web_mercator(&self) -> bool {
        matches!(
            self.code,
            SrsCode::Epsg(3857) | SrsCode::Epsg(900913) | SrsCode::Epsg(3785) | SrsCode::Epsg(102100) | SrsCode::Epsg(102113)
        )
    }

    fn is_geographic(&self) -> bool {
        matches!(self.code, SrsCode::Crs84 | SrsCode::Epsg(4326))
    }

    /// Whether WGS84 areas can be projected into this CRS.
    pub fn is_supported(&self) -> bool {
        self.is_geographic() || self.is_web_mercator()
    }

    /// Project a WGS84 lon/lat coordinate into this CRS (east/north order).
    pub fn from_wgs84(&self, c: Coord<f64>) -> Result<Coord<f64>, GeometryError> {
        if self.is_geographic() {
            Ok(c)
        } else if self.is_web_mercator() {
            Ok(to_web_mercator(c))
        } else {
            Err(GeometryError::UnsupportedSrs(self.raw.clone()))
        }
    }

    /// Project a WGS84 area into this CRS.
    pub fn project_area(&self, area: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
        if self.is_geographic() {
            Ok(area.clone())
        } else if self.is_web_mercator() {
            Ok(area.map_coords(to_web_mercator))
        } else {
            Err(GeometryError::UnsupportedSrs(self.raw.clone()))
        }
    }
}

impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn to_web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    Coord {
        x: EARTH_RADIUS * c.x.to_radians(),
        y: EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_order_by_form() {
        assert!(Srs::parse("EPSG:4326", true).unwrap().is_lat_first());
        assert!(!Srs::parse("EPSG:4326", false).unwrap().is_lat_first());
        assert!(Srs::parse("urn:ogc:def:crs:EPSG::4326", false).unwrap().is_lat_first());
        assert!(Srs::parse("http://www.opengis.net/def/crs/EPSG/0/4326", false).unwrap().is_lat_first());
        assert!(!Srs::parse("http://www.opengis.net/gml/srs/epsg.xml#4326", true).unwrap().is_lat_first());
        assert!(!Srs::parse("CRS:84", true).unwrap().is_lat_first());
        assert!(!Srs::parse("EPSG:3857", true).unwrap().is_lat_first());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(Srs::parse("EPSG:abc", false).is_err());
        assert!(Srs::parse("WGS84", false).is_err());
    }

    #[test]
    fn test_web_mercator_projection() {
        let srs = Srs::parse("EPSG:3857", false).unwrap();
        let origin = srs.from_wgs84(Coord { x: 0.0, y: 0.0 }).unwrap();
        assert!(origin.x.abs() < 1e-6 && origin.y.abs() < 1e-6);

        let east = srs.from_wgs84(Coord { x: 180.0, y: 0.0 }).unwrap();
        assert!((east.x - 20_037_508.342_789_244).abs() < 1e-3);
    }

    #[test]
    fn test_unsupported_projection() {
        let srs = Srs::parse("EPSG:25832", false).unwrap();
        assert!(!srs.is_supported());
        assert!(matches!(
            srs.from_wgs84(Coord { x: 7.0, y: 50.0 }),
            Err(GeometryError::UnsupportedSrs(_))
        ));
    }
}
