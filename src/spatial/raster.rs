//! Raster masking.
//!
//! Pixels whose centre lies outside the permitted area become transparent
//! (PNG, GIF, TIFF) or white (JPEG). Inside/outside is computed per row with
//! an even-odd scanline over all polygon rings.

use geo::MultiPolygon;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use super::evaluator::MaskPlan;
use super::SpatialEvaluationError;
use crate::geometry::Envelope;

/// Mask an encoded image. The output keeps the input format.
pub fn mask_image(
    bytes: &[u8],
    content_type: Option<&str>,
    plan: &MaskPlan,
    max_dimension: u32,
) -> Result<Vec<u8>, SpatialEvaluationError> {
    let format = image::guess_format(bytes)
        .ok()
        .or_else(|| content_type.and_then(raster_format).map(|(format, _)| format))
        .ok_or_else(|| SpatialEvaluationError::UnsupportedFormat(content_type.unwrap_or("unknown").to_string()))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Gif | ImageFormat::Jpeg | ImageFormat::Tiff) {
        return Err(SpatialEvaluationError::UnsupportedFormat(format!("{format:?}")));
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| SpatialEvaluationError::Decode(e.to_string()))?;
    if decoded.width() > max_dimension || decoded.height() > max_dimension {
        return Err(SpatialEvaluationError::ImageTooLarge {
            width: decoded.width(),
            height: decoded.height(),
        });
    }

    let mut pixels = decoded.to_rgba8();
    let fill = if format == ImageFormat::Jpeg {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([0, 0, 0, 0])
    };
    apply_mask(&mut pixels, &plan.area, &plan.extent, fill);

    encode(DynamicImage::ImageRgba8(pixels), format)
}

pub(crate) fn encode(image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, SpatialEvaluationError> {
    let image = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        image
    };
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .map_err(|e| SpatialEvaluationError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

pub(crate) fn base_mime(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or(content_type).trim()
}

/// Raster format for a MIME type, map server vendor variants included,
/// with the MIME type to answer with.
pub(crate) fn raster_format(content_type: &str) -> Option<(ImageFormat, &'static str)> {
    let mime = base_mime(content_type).to_ascii_lowercase();
    let format = match mime.as_str() {
        "image/png8" | "image/png24" | "image/png32" | "image/vnd.jpeg-png" | "image/vnd.jpeg-png8" => {
            ImageFormat::Png
        }
        "image/jpg" | "image/pjpeg" => ImageFormat::Jpeg,
        other => ImageFormat::from_mime_type(other)?,
    };
    let canonical = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Tiff => "image/tiff",
        _ => return None,
    };
    Some((format, canonical))
}

/// Overwrite every pixel outside `area` with `fill`.
pub fn apply_mask(pixels: &mut RgbaImage, area: &MultiPolygon<f64>, extent: &Envelope, fill: Rgba<u8>) {
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let px_w = extent.width() / f64::from(width);
    let px_h = extent.height() / f64::from(height);
    let mut inside = vec![false; width as usize];

    for row in 0..height {
        let y = extent.max_y - (f64::from(row) + 0.5) * px_h;
        inside.iter_mut().for_each(|v| *v = false);

        for (x0, x1) in row_spans(area, y) {
            let first = column_at(x0, extent.min_x, px_w, width);
            let last = column_at(x1, extent.min_x, px_w, width);
            for flag in &mut inside[first..last] {
                *flag = true;
            }
        }

        for (col, keep) in inside.iter().enumerate() {
            if !keep {
                pixels.put_pixel(col as u32, row, fill);
            }
        }
    }
}

/// First pixel column whose centre is at or right of `x`.
fn column_at(x: f64, min_x: f64, px_w: f64, width: u32) -> usize {
    if px_w <= 0.0 {
        return 0;
    }
    let col = ((x - min_x) / px_w - 0.5).ceil();
    col.clamp(0.0, f64::from(width)) as usize
}

/// Horizontal spans inside the area at height `y`.
fn row_spans(area: &MultiPolygon<f64>, y: f64) -> Vec<(f64, f64)> {
    let mut crossings = Vec::new();
    for polygon in &area.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for line in ring.lines() {
                let (a, b) = (line.start, line.end);
                if (a.y > y) != (b.y > y) {
                    let t = (y - a.y) / (b.y - a.y);
                    crossings.push(a.x + t * (b.x - a.x));
                }
            }
        }
    }
    crossings.sort_by(|a, b| a.total_cmp(b));
    crossings.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}
