//! Geometry primitives used by authorization.
//!
//! # Data Flow
//! ```text
//! stored allowedArea (WKT, WGS84 lon/lat)
//!     → area.rs (decode, validate, union / intersection)
//!
//! request BBOX / CRS (raw axis order)
//!     → srs.rs (CRS identifier, axis order, WGS84 → request CRS projection)
//!     → envelope.rs (east/north normalized envelope)
//! ```
//!
//! # Design Decisions
//! - Allowed areas are stored and combined in WGS84; they are projected into
//!   the request CRS only when a spatial decision is needed
//! - Envelopes are always east/north ordered after parsing
//! - Panics raised inside polygon clipping are caught and surfaced as errors

pub mod area;
pub mod envelope;
pub mod srs;

use thiserror::Error;

pub use area::{Area, Relation};
pub use envelope::{BoundingBox, Envelope};
pub use srs::Srs;

/// Errors raised while decoding or combining geometries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid WKT: {0}")]
    InvalidWkt(String),

    #[error("unsupported geometry type {0}, expected POLYGON or MULTIPOLYGON")]
    UnsupportedGeometry(String),

    #[error("area is empty")]
    EmptyArea,

    #[error("coordinate ({x}, {y}) outside the WGS84 domain")]
    OutOfRange { x: f64, y: f64 },

    #[error("area uses SRID {0}, only 4326 is accepted")]
    UnsupportedSrid(u32),

    #[error("invalid CRS identifier: {0}")]
    InvalidSrs(String),

    #[error("no projection from WGS84 to {0}")]
    UnsupportedSrs(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("geometry computation failed during {0}")]
    Computation(&'static str),
}
