//! Spatial authorization.
//!
//! # Data Flow
//! ```text
//! AuthorizationResult (bounded areas) + OperationRequest (bbox, CRS)
//!     → evaluator.rs ──▶ SpatialPlan
//!                          ├─ Passthrough: forward unchanged
//!                          ├─ Mask(MaskPlan): forward, then
//!                          │     raster.rs   (alpha / fill pixels outside the area)
//!                          │     features.rs (drop GML / GeoJSON features outside)
//!                          └─ Empty: empty.rs builds the payload, no upstream call
//! ```
//!
//! # Design Decisions
//! - Areas are combined in WGS84 and projected into the request CRS once
//! - Several bounded layers are intersected: one composited response gets
//!   masked once, with the area every layer agrees on
//! - Anything that cannot be evaluated or masked is an error, and errors deny

pub mod empty;
pub mod evaluator;
pub mod features;
pub mod raster;

use thiserror::Error;

use crate::geometry::GeometryError;
use crate::ogc::Operation;

pub use empty::{empty_payload, EmptyPayload};
pub use evaluator::{evaluate, MaskPlan, SpatialPlan};
pub use features::{filter_features, FilteredFeatures};
pub use raster::mask_image;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpatialEvaluationError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("{0} responses cannot be restricted to an area")]
    UnsupportedOperation(Operation),

    #[error("output format {0} cannot be restricted to an area")]
    UnsupportedFormat(String),

    #[error("image of {width}x{height} exceeds the masking limit")]
    ImageTooLarge { width: u32, height: u32 },

    #[error("response could not be decoded for masking: {0}")]
    Decode(String),

    #[error("masked response could not be encoded: {0}")]
    Encode(String),
}
