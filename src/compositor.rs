// src/compositor.rs
//
// Strict Compositor — stages `composite_precheck` and `composite`.
// Feathers the edit-region alpha, stretches the color-matched patch to the
// bbox, and blends source-over. Pixels with zero alpha are untouched byte
// for byte (spec P1 "exactness outside mask").

use crate::errors::CoreError;
use crate::geometry::ImageBBox;
use crate::mask::EditAlpha;
use image::{DynamicImage, GenericImageView, GrayImage, Rgba};

pub const FEATHER_MIN: u32 = 0;
pub const FEATHER_MAX: u32 = 32;

pub fn clamp_feather(feather: u32) -> u32 {
    feather.clamp(FEATHER_MIN, FEATHER_MAX)
}

/// Extract the alpha crop at `bbox` from the image-space alpha raster and
/// feather it with a Gaussian blur. `feather` is clamped to
/// `[FEATHER_MIN, FEATHER_MAX]` by the caller before reaching here — this
/// function trusts its input.
///
/// Re-validates the blurred crop's buffer length against
/// `bbox.width * bbox.height` before returning: a raster library whose blur
/// silently changed the channel count would otherwise corrupt every pixel
/// read downstream (spec §4.6 step 3, `alpha_crop_size_mismatch`).
pub fn feather_alpha_crop(full_alpha: &EditAlpha, bbox: &ImageBBox, feather: u32) -> Result<Vec<u8>, CoreError> {
    let expected_len = (bbox.width as usize) * (bbox.height as usize);
    let mut crop = vec![0u8; expected_len];
    for y in 0..bbox.height {
        for x in 0..bbox.width {
            crop[(y * bbox.width + x) as usize] = full_alpha.get(bbox.left + x, bbox.top + y);
        }
    }

    if feather == 0 {
        return Ok(crop);
    }

    let gray = GrayImage::from_raw(bbox.width, bbox.height, crop)
        .ok_or_else(|| CoreError::invariant("alpha_crop_size_mismatch", "alpha crop buffer does not match bbox dimensions"))?;
    let blurred = image::imageops::blur(&gray, feather as f32);

    let blurred_buffer = blurred.into_raw();
    if blurred_buffer.len() != expected_len {
        return Err(CoreError::invariant(
            "alpha_crop_size_mismatch",
            format!(
                "blurred alpha crop has {} bytes, expected {}",
                blurred_buffer.len(),
                expected_len
            ),
        ));
    }

    Ok(blurred_buffer)
}

/// Resize `patch` to exactly `width`x`height` with a stretch-to-fill
/// filter — the patch may already be smaller than the bbox if the Patch
/// Preparer downscaled it (spec §4.6 step 4).
fn stretch_to_bbox(patch: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if patch.dimensions() == (width, height) {
        return patch.clone();
    }
    patch.resize_exact(width, height, image::imageops::FilterType::Triangle)
}

/// Source-over composite of `patch` onto `original` within `bbox`, driven
/// by `alpha_crop` (one byte per bbox pixel, row-major). Pixels outside
/// `bbox`, and pixels inside it with `alpha == 0`, come out byte-identical
/// to `original` (spec P1).
pub fn composite(
    original: &DynamicImage,
    bbox: &ImageBBox,
    alpha_crop: &[u8],
    patch: &DynamicImage,
) -> Result<DynamicImage, CoreError> {
    if alpha_crop.len() != (bbox.width as usize) * (bbox.height as usize) {
        return Err(CoreError::invariant(
            "alpha_crop_size_mismatch",
            "alpha crop length does not match bbox area",
        ));
    }

    let stretched_patch = stretch_to_bbox(patch, bbox.width, bbox.height).to_rgba8();
    let mut out = original.to_rgba8();

    for y in 0..bbox.height {
        for x in 0..bbox.width {
            let a = alpha_crop[(y * bbox.width + x) as usize];
            if a == 0 {
                continue;
            }
            let ox = bbox.left + x;
            let oy = bbox.top + y;
            let base = *out.get_pixel(ox, oy);
            let over = *stretched_patch.get_pixel(x, y);

            if a == 255 {
                out.put_pixel(ox, oy, over);
                continue;
            }

            let af = a as f64 / 255.0;
            let mut blended = [0u8; 4];
            for c in 0..3 {
                let v = over[c] as f64 * af + base[c] as f64 * (1.0 - af);
                blended[c] = v.round().max(0.0).min(255.0) as u8;
            }
            blended[3] = 255;
            out.put_pixel(ox, oy, Rgba(blended));
        }
    }

    Ok(DynamicImage::ImageRgba8(out))
}

/// Encode `img` as PNG bytes (spec §6.1 output format).
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, CoreError> {
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| CoreError::image(format!("cannot encode composite as PNG: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(w, h, Rgba(color)))
    }

    fn alpha_all(w: u32, h: u32, v: u8) -> EditAlpha {
        EditAlpha { buffer: vec![v; (w * h) as usize], width: w, height: h }
    }

    #[test]
    fn zero_alpha_outside_mask_is_byte_identical() {
        let original = solid(20, 20, [10, 20, 30, 255]);
        let mut full_alpha = alpha_all(20, 20, 0);
        let bbox = ImageBBox::new(5, 5, 6, 6);
        for y in 0..6 {
            for x in 0..6 {
                full_alpha.buffer[((5 + y) * 20 + (5 + x)) as usize] = 255;
            }
        }
        let crop = feather_alpha_crop(&full_alpha, &bbox, 0).unwrap();
        let patch = solid(6, 6, [200, 200, 200, 255]);
        let result = composite(&original, &bbox, &crop, &patch).unwrap();
        let rgba = result.to_rgba8();

        // A pixel well outside the bbox must match the original exactly.
        assert_eq!(*rgba.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
        // Inside the bbox with full alpha, the patch color wins outright.
        assert_eq!(*rgba.get_pixel(5, 5), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn partial_alpha_blends_between_original_and_patch() {
        let original = solid(4, 4, [0, 0, 0, 255]);
        let bbox = ImageBBox::new(0, 0, 4, 4);
        let alpha = vec![128u8; 16];
        let patch = solid(4, 4, [200, 200, 200, 255]);
        let result = composite(&original, &bbox, &alpha, &patch).unwrap();
        let px = result.to_rgba8().get_pixel(0, 0).0;
        assert!(px[0] > 90 && px[0] < 110);
    }

    #[test]
    fn feather_zero_passes_alpha_through_unchanged() {
        let mut full_alpha = alpha_all(10, 10, 0);
        full_alpha.buffer[33] = 255; // (3,3)
        let bbox = ImageBBox::new(0, 0, 10, 10);
        let crop = feather_alpha_crop(&full_alpha, &bbox, 0).unwrap();
        assert_eq!(crop, full_alpha.buffer);
    }

    #[test]
    fn feather_clamps_into_valid_range() {
        assert_eq!(clamp_feather(1000), FEATHER_MAX);
        assert_eq!(clamp_feather(0), FEATHER_MIN);
    }

    #[test]
    fn mismatched_alpha_crop_length_is_rejected() {
        let original = solid(10, 10, [0, 0, 0, 255]);
        let bbox = ImageBBox::new(0, 0, 4, 4);
        let patch = solid(4, 4, [1, 1, 1, 255]);
        let bad_alpha = vec![255u8; 10]; // wrong length for a 4x4 bbox
        let err = composite(&original, &bbox, &bad_alpha, &patch).unwrap_err();
        assert_eq!(err.tag(), "alpha_crop_size_mismatch");
    }

    #[test]
    fn smaller_patch_is_stretched_to_fill_bbox() {
        let original = solid(20, 20, [0, 0, 0, 255]);
        let bbox = ImageBBox::new(0, 0, 10, 10);
        let alpha = vec![255u8; 100];
        let small_patch = solid(5, 5, [99, 99, 99, 255]);
        let result = composite(&original, &bbox, &alpha, &small_patch).unwrap();
        let rgba = result.to_rgba8();
        assert_eq!(rgba.get_pixel(9, 9).0[0], 99);
    }
}
