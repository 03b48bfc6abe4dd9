// src/region.rs
//
// Region Extractor — stages `mask_to_bbox` and `align_mask_to_image`.
// Finds the tight bbox of the edit region, pads it, and (if the mask and
// base image differ in resolution) projects everything into image-space.

use crate::errors::CoreError;
use crate::geometry::{clamp_u32, ImageBBox, MaskBBox};
use crate::mask::EditAlpha;

/// Scan for the tight bbox of all alpha > 0 pixels, pad it, and clamp into
/// the mask's own bounds. Fails with `empty_mask` if no pixel is set
/// (spec P4).
pub fn extract_bbox(alpha: &EditAlpha, padding: u32) -> Result<MaskBBox, CoreError> {
    let (w, h) = (alpha.width, alpha.height);

    let mut min_x: Option<u32> = None;
    let mut max_x: u32 = 0;
    let mut min_y: Option<u32> = None;
    let mut max_y: u32 = 0;

    for y in 0..h {
        for x in 0..w {
            if alpha.get(x, y) > 0 {
                min_x = Some(min_x.map_or(x, |m| m.min(x)));
                max_x = max_x.max(x);
                min_y = Some(min_y.map_or(y, |m| m.min(y)));
                max_y = max_y.max(y);
            }
        }
    }

    let (min_x, min_y) = match (min_x, min_y) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(CoreError::mask("empty_mask", "mask has no edit pixels")),
    };

    let last_col = w.saturating_sub(1);
    let last_row = h.saturating_sub(1);

    let left = min_x.saturating_sub(padding).min(last_col);
    let top = min_y.saturating_sub(padding).min(last_row);
    let right = max_x.saturating_add(padding).min(last_col);
    let bottom = max_y.saturating_add(padding).min(last_row);

    let width = right - left + 1;
    let height = bottom - top + 1;

    Ok(MaskBBox::new(left, top, width, height))
}

/// If the mask's resolution matches the image's, the bbox and alpha carry
/// over untouched (spec P8). Otherwise, scale the bbox corners (rounding,
/// not flooring — spec §4.2 "Why rounding, not floor") and resample the
/// alpha raster to the image's dimensions with a stretch-to-fill filter.
pub fn align_to_image(
    alpha: &EditAlpha,
    bbox: MaskBBox,
    image_width: u32,
    image_height: u32,
) -> (EditAlpha, ImageBBox) {
    if alpha.width == image_width && alpha.height == image_height {
        return (alpha.clone(), bbox.retag());
    }

    let sx = image_width as f64 / alpha.width as f64;
    let sy = image_height as f64 / alpha.height as f64;

    let scale = |v: u32, factor: f64, max: u32| -> u32 {
        clamp_u32((v as f64 * factor).round() as u32, 0, max)
    };

    let left = scale(bbox.left, sx, image_width.saturating_sub(1));
    let top = scale(bbox.top, sy, image_height.saturating_sub(1));
    let right = scale(bbox.right(), sx, image_width).max(left + 1).min(image_width);
    let bottom = scale(bbox.bottom(), sy, image_height).max(top + 1).min(image_height);

    let scaled_bbox = ImageBBox::new(left, top, right - left, bottom - top);

    let gray = image::GrayImage::from_raw(alpha.width, alpha.height, alpha.buffer.clone())
        .expect("EditAlpha buffer length invariant holds width*height");
    let resized = image::imageops::resize(
        &gray,
        image_width,
        image_height,
        image::imageops::FilterType::Triangle,
    );

    let resampled = EditAlpha {
        buffer: resized.into_raw(),
        width: image_width,
        height: image_height,
    };

    (resampled, scaled_bbox)
}
