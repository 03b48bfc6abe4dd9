// src/color.rs
//
// Color Matcher — stage sits between the model adapter and the compositor.
// The model's returned patch is color-graded independently of the source
// image; this nudges its mean RGB back toward the surrounding pixels so the
// seam at the mask edge doesn't read as a flat color shift.

use crate::geometry::ImageBBox;
use image::{DynamicImage, GenericImageView, Rgba};

const GAIN_EPSILON: f64 = 1e-3;

/// Default multiplicative per-channel gain clamp (spec §4.5 "gain clamp").
/// Without this, a near-black ring mean against a near-white patch mean
/// would produce an enormous gain and blow out the composited patch.
/// Callers may override via `PipelineConfig::color_gain_range`.
pub const GAIN_MIN: f64 = 0.6;
pub const GAIN_MAX: f64 = 1.6;

fn clamp_gain(g: f64, min: f64, max: f64) -> f64 {
    g.max(min).min(max)
}

fn mean_rgb(img: &DynamicImage) -> [f64; 3] {
    let rgba = img.to_rgba8();
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for px in rgba.pixels() {
        for c in 0..3 {
            sum[c] += px[c] as u64;
        }
        count += 1;
    }
    if count == 0 {
        return [0.0; 3];
    }
    [
        sum[0] as f64 / count as f64,
        sum[1] as f64 / count as f64,
        sum[2] as f64 / count as f64,
    ]
}

/// Mean RGB of the ring of pixels within `radius` of the bbox but outside
/// it, clamped to the image bounds. Falls back to the bbox's own mean if
/// the ring is empty (e.g. bbox already fills the image).
fn ring_mean_rgb(original: &DynamicImage, bbox: &ImageBBox, radius: u32) -> [f64; 3] {
    let (img_w, img_h) = original.dimensions();
    let outer_left = bbox.left.saturating_sub(radius);
    let outer_top = bbox.top.saturating_sub(radius);
    let outer_right = (bbox.right() + radius).min(img_w);
    let outer_bottom = (bbox.bottom() + radius).min(img_h);

    let rgba = original.to_rgba8();
    let mut sum = [0u64; 3];
    let mut count = 0u64;

    for y in outer_top..outer_bottom {
        for x in outer_left..outer_right {
            let inside_bbox = x >= bbox.left && x < bbox.right() && y >= bbox.top && y < bbox.bottom();
            if inside_bbox {
                continue;
            }
            let px = rgba.get_pixel(x, y);
            for c in 0..3 {
                sum[c] += px[c] as u64;
            }
            count += 1;
        }
    }

    if count == 0 {
        let cropped = original.crop_imm(bbox.left, bbox.top, bbox.width, bbox.height);
        return mean_rgb(&DynamicImage::ImageRgba8(cropped.to_rgba8()));
    }

    [
        sum[0] as f64 / count as f64,
        sum[1] as f64 / count as f64,
        sum[2] as f64 / count as f64,
    ]
}

/// Per-channel gain taking the model patch's mean toward the original
/// ring's mean, clamped to `[gain_min, gain_max]` (spec P7).
pub fn compute_gain(
    original: &DynamicImage,
    bbox: &ImageBBox,
    ring_radius: u32,
    patch: &DynamicImage,
    gain_min: f64,
    gain_max: f64,
) -> [f64; 3] {
    let ring = ring_mean_rgb(original, bbox, ring_radius);
    let patch_mean = mean_rgb(patch);

    let mut gain = [0.0; 3];
    for c in 0..3 {
        gain[c] = clamp_gain((ring[c] + GAIN_EPSILON) / (patch_mean[c] + GAIN_EPSILON), gain_min, gain_max);
    }
    gain
}

/// Apply a diagonal per-channel gain matrix to `patch`, clamping each
/// resulting channel back into `[0, 255]`. Alpha passes through unchanged.
pub fn apply_gain(patch: &DynamicImage, gain: [f64; 3]) -> DynamicImage {
    let mut rgba = patch.to_rgba8();
    for px in rgba.pixels_mut() {
        for c in 0..3 {
            let scaled = (px[c] as f64 * gain[c]).round();
            px[c] = scaled.max(0.0).min(255.0) as u8;
        }
    }
    DynamicImage::ImageRgba8(rgba)
}
