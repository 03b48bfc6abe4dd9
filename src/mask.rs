// src/mask.rs
//
// Mask Decoder — stage `parse_mask`.
// Converts an arbitrary mask image into a canonical single-channel edit
// alpha raster: 255 = edit this pixel, 0 = leave it alone.

use crate::errors::CoreError;
use base64::Engine;
use image::GenericImageView;

/// 0 = keep, 255 = edit, intermediate values are partial (spec §3).
#[derive(Debug, Clone)]
pub struct EditAlpha {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EditAlpha {
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.buffer[(y * self.width + x) as usize]
    }

    /// True if every pixel is zero — the Region Extractor's `empty_mask`
    /// check (spec P4) is driven off this.
    pub fn is_empty(&self) -> bool {
        self.buffer.iter().all(|&b| b == 0)
    }
}

/// Split a `data:image/...;base64,...` URL into (bytes, mime).
pub fn decode_data_url(data_url: &str) -> Result<(Vec<u8>, String), CoreError> {
    let rest = data_url.strip_prefix("data:").ok_or_else(|| {
        CoreError::mask("malformed_data_url", "mask_data_url is not a data URL")
    })?;

    let (meta, b64) = rest.split_once(',').ok_or_else(|| {
        CoreError::mask("malformed_data_url", "mask_data_url has no comma separator")
    })?;

    if !meta.ends_with(";base64") {
        return Err(CoreError::mask(
            "malformed_data_url",
            "mask_data_url is not base64-encoded",
        ));
    }
    let mime = meta.trim_end_matches(";base64").to_string();
    let mime = if mime.is_empty() { "image/png".to_string() } else { mime };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| CoreError::mask("malformed_data_url", format!("invalid base64: {}", e)))?;

    Ok((bytes, mime))
}

/// Decode mask bytes (any common raster encoding) into an `EditAlpha`.
///
/// Two conventions, in priority order (spec §4.1):
///   - "transparent = edit": if the mask carries an alpha channel and the
///     inverted alpha is non-trivial, `alpha[i] = 255 - input_alpha[i]`.
///   - "bright = edit": otherwise, threshold luminance at 200.
pub fn decode_mask(bytes: &[u8]) -> Result<EditAlpha, CoreError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| CoreError::mask("mask_meta_failed", format!("cannot decode mask: {}", e)))?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(CoreError::mask("mask_meta_failed", "mask has zero dimensions"));
    }

    if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        let mut buffer = Vec::with_capacity((width * height) as usize);
        let mut any_transparent = false;
        for px in rgba.pixels() {
            let inverted = 255u8.saturating_sub(px[3]);
            if inverted != 0 {
                any_transparent = true;
            }
            buffer.push(inverted);
        }
        if any_transparent {
            return Ok(EditAlpha { buffer, width, height });
        }
        // Fully opaque alpha channel: fall through to the brightness rule
        // using the RGB values under that opaque alpha.
    }

    let luma = img.to_luma8();
    let buffer = luma
        .pixels()
        .map(|p| if p[0] > 200 { 255 } else { 0 })
        .collect();

    Ok(EditAlpha { buffer, width, height })
}

/// One-pixel soft dilation: Gaussian blur of radius 1, then binarize at
/// 128. Compensates for anti-aliased mask edges (spec §4.1). Off by
/// default (§9 Open Question (b)).
pub fn soft_dilate(alpha: &EditAlpha) -> EditAlpha {
    let gray = image::GrayImage::from_raw(alpha.width, alpha.height, alpha.buffer.clone())
        .expect("EditAlpha buffer length invariant holds width*height");
    let blurred = image::imageops::blur(&gray, 1.0);
    let buffer = blurred
        .pixels()
        .map(|p| if p[0] >= 128 { 255 } else { 0 })
        .collect();
    EditAlpha { buffer, width: alpha.width, height: alpha.height }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn encode_png(img: &ImageBuffer<Rgba<u8>, Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn black_mask_decodes_all_zero() {
        let img = ImageBuffer::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let bytes = encode_png(&img);
        let alpha = decode_mask(&bytes).unwrap();
        assert!(alpha.is_empty());
        assert_eq!(alpha.buffer.len(), 16);
    }

    #[test]
    fn white_mask_decodes_all_edit() {
        let img = ImageBuffer::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let bytes = encode_png(&img);
        let alpha = decode_mask(&bytes).unwrap();
        assert!(alpha.buffer.iter().all(|&b| b == 255));
    }

    #[test]
    fn transparent_pixel_marks_edit_region() {
        let mut img = ImageBuffer::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([0, 0, 0, 0])); // fully transparent = edit
        let bytes = encode_png(&img);
        let alpha = decode_mask(&bytes).unwrap();
        assert_eq!(alpha.get(1, 1), 255);
        assert_eq!(alpha.get(0, 0), 0);
    }

    #[test]
    fn fully_opaque_rgba_falls_back_to_brightness() {
        // Alpha channel present but fully opaque everywhere: must fall
        // back to the luma threshold, not report "all keep".
        let mut img = ImageBuffer::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let bytes = encode_png(&img);
        let alpha = decode_mask(&bytes).unwrap();
        assert_eq!(alpha.get(2, 2), 255);
        assert_eq!(alpha.get(0, 0), 0);
    }

    #[test]
    fn zero_dimension_mask_errors() {
        // A 0-byte buffer can't decode at all; assert the tag used either way.
        let err = decode_mask(&[]).unwrap_err();
        assert_eq!(err.tag(), "mask_meta_failed");
    }

    #[test]
    fn data_url_round_trip() {
        let raw = vec![1, 2, 3, 4];
        let b64 = base64::engine::general_purpose::STANDARD.encode(&raw);
        let url = format!("data:image/png;base64,{}", b64);
        let (bytes, mime) = decode_data_url(&url).unwrap();
        assert_eq!(bytes, raw);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn data_url_rejects_non_data_scheme() {
        let err = decode_data_url("http://example.com/mask.png").unwrap_err();
        assert_eq!(err.tag(), "malformed_data_url");
    }

    #[test]
    fn soft_dilation_preserves_dimensions() {
        let mut buffer = vec![0u8; 16];
        buffer[5] = 255;
        let alpha = EditAlpha { buffer, width: 4, height: 4 };
        let dilated = soft_dilate(&alpha);
        assert_eq!(dilated.width, 4);
        assert_eq!(dilated.height, 4);
        assert_eq!(dilated.buffer.len(), 16);
    }
}
