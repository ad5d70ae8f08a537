//! Request envelopes.

use geo::{coord, Coord, Polygon, Rect};
use serde::Serialize;

use super::{GeometryError, Srs};

/// Axis-aligned envelope in east/north order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, GeometryError> {
        let values = [min_x, min_y, max_x, max_y];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::InvalidEnvelope("non-finite coordinate".into()));
        }
        if min_x > max_x || min_y > max_y {
            return Err(GeometryError::InvalidEnvelope(format!(
                "minimum exceeds maximum in {min_x},{min_y},{max_x},{max_y}"
            )));
        }
        Ok(Self { min_x, min_y, max_x, max_y })
    }

    /// Build from the four wire values `a,b,c,d`, swapping axes when the CRS
    /// is latitude first.
    pub fn from_axis_values(values: [f64; 4], lat_first: bool) -> Result<Self, GeometryError> {
        let [a, b, c, d] = values;
        if lat_first {
            Self::new(b, a, d, c)
        } else {
            Self::new(a, b, c, d)
        }
    }

    /// Smallest envelope covering both.
    pub fn merge(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    pub fn center(&self) -> Coord<f64> {
        coord! {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }
}

/// An envelope together with the CRS it is expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub envelope: Envelope,
    pub srs: Srs,
}

impl BoundingBox {
    pub fn new(envelope: Envelope, srs: Srs) -> Self {
        Self { envelope, srs }
    }

    /// Whole-world extent in WGS84.
    pub fn world() -> Self {
        Self {
            envelope: Envelope {
                min_x: -180.0,
                min_y: -90.0,
                max_x: 180.0,
                max_y: 90.0,
            },
            srs: Srs::wgs84(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_first_values_are_swapped() {
        let env = Envelope::from_axis_values([47.0, 5.0, 55.0, 15.0], true).unwrap();
        assert_eq!(env, Envelope::new(5.0, 47.0, 15.0, 55.0).unwrap());
    }

    #[test]
    fn test_inverted_envelope_rejected() {
        assert!(Envelope::new(10.0, 0.0, 5.0, 1.0).is_err());
        assert!(Envelope::new(0.0, 0.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_merge() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = Envelope::new(-1.0, 0.5, 0.5, 2.0).unwrap();
        assert_eq!(a.merge(&b), Envelope::new(-1.0, 0.0, 1.0, 2.0).unwrap());
    }
}
