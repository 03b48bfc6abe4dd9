// src/patch.rs
//
// Patch Preparer — stage `make_patch`.
// Crops the base image at the region bbox and downscales it (uniform,
// aspect-preserving, "contain") so its longest edge never exceeds
// `max_patch_edge` before it's handed to the model adapter.

use crate::errors::CoreError;
use crate::geometry::ImageBBox;
use image::{DynamicImage, GenericImageView};

pub struct Patch {
    pub image: DynamicImage,
    pub png_bytes: Vec<u8>,
}

/// Crop `image` at `bbox` and downscale to fit within `max_edge` on its
/// longest side, preserving aspect ratio ("contain" — spec §4.3). Never
/// upscales: a bbox already smaller than `max_edge` is cropped as-is.
pub fn prepare(image: &DynamicImage, bbox: &ImageBBox, max_edge: u32) -> Result<Patch, CoreError> {
    let (img_w, img_h) = image.dimensions();
    if !bbox.is_valid_within(img_w, img_h) {
        return Err(CoreError::invariant(
            "bbox_out_of_bounds",
            format!(
                "bbox {:?} does not fit within {}x{} image",
                (bbox.left, bbox.top, bbox.width, bbox.height),
                img_w,
                img_h
            ),
        ));
    }

    let cropped = image.crop_imm(bbox.left, bbox.top, bbox.width, bbox.height);
    let longest = bbox.width.max(bbox.height);

    let resized = if longest > max_edge {
        let scale = max_edge as f64 / longest as f64;
        let new_w = ((bbox.width as f64 * scale).round() as u32).max(1);
        let new_h = ((bbox.height as f64 * scale).round() as u32).max(1);
        cropped.resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
    } else {
        cropped
    };

    let mut png_bytes = Vec::new();
    resized
        .write_to(&mut std::io::Cursor::new(&mut png_bytes), image::ImageFormat::Png)
        .map_err(|e| CoreError::image(format!("cannot encode patch as PNG: {}", e)))?;

    Ok(Patch { image: resized, png_bytes })
}
