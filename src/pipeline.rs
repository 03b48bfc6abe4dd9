// src/pipeline.rs
//
// Top-level orchestration of the edit pipeline — the single operation the
// core exposes (spec §6.1). Stitches the Mask Decoder, Region Extractor,
// Patch Preparer, Model Adapter, Color Matcher and Strict Compositor in
// order, tagging every failure with the stage it happened in. Modeled on
// `comfyui_api::generate_scene_image`, the teacher's own chain of
// health-check → upload → modify → queue → poll → download.

use crate::color;
use crate::compositor;
use crate::config::PipelineConfig;
use crate::errors::{AtStage, CoreError, PipelineError, Stage};
use crate::geometry::clamp_u32;
use crate::mask;
use crate::model_adapter::{EditRequest as ModelEditRequest, ModelAdapter};
use crate::patch;
use crate::region;
use crate::storage::{Dest, Storage};
use base64::Engine;
use image::GenericImageView;
use serde::{Deserialize, Serialize};

const FEATHER_MAX: u32 = 32;
const PADDING_MAX: u32 = 128;

#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    pub filename: String,
    pub mask_data_url: String,
    pub prompt: String,
    #[serde(default)]
    pub feather: Option<u32>,
    #[serde(default)]
    pub padding: Option<u32>,
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub url: String,
    pub filename: String,
    pub mime: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditResponse {
    pub image_base64: String,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<SavedFile>,
}

/// Run one edit request end to end. Every stage either produces its output
/// or fails fast with a stage-tagged error (spec §7 "propagation policy") —
/// there is no local recovery anywhere in this function.
pub async fn edit(
    config: &PipelineConfig,
    storage: &dyn Storage,
    adapter: &dyn ModelAdapter,
    request: EditRequest,
) -> Result<EditResponse, PipelineError> {
    if request.prompt.trim().is_empty() {
        return Err(PipelineError::new(
            Stage::Parse,
            CoreError::validation("prompt_required", "prompt must not be empty"),
        ));
    }

    let feather = clamp_u32(request.feather.unwrap_or(config.default_feather), 0, FEATHER_MAX);
    let padding = clamp_u32(request.padding.unwrap_or(config.default_padding), 0, PADDING_MAX);

    // read_base
    let base_bytes = storage.read(&request.filename).at(Stage::ReadBase)?;
    if base_bytes.len() as u64 > config.max_upload_bytes {
        return Err(PipelineError::new(
            Stage::ReadBase,
            CoreError::image(format!(
                "base image is {} bytes, exceeds max_upload_bytes ({})",
                base_bytes.len(),
                config.max_upload_bytes
            )),
        ));
    }
    let original = image::load_from_memory(&base_bytes)
        .map_err(|e| CoreError::image(format!("cannot decode base image: {}", e)))
        .at(Stage::ReadBase)?;
    let (img_w, img_h) = original.dimensions();

    // parse_mask
    let (mask_bytes, _mime) = mask::decode_data_url(&request.mask_data_url).at(Stage::ParseMask)?;
    let mut decoded_alpha = mask::decode_mask(&mask_bytes).at(Stage::ParseMask)?;
    if config.soft_dilation {
        decoded_alpha = mask::soft_dilate(&decoded_alpha);
    }

    // mask_to_bbox
    let mask_bbox = region::extract_bbox(&decoded_alpha, padding).at(Stage::MaskToBbox)?;

    // align_mask_to_image
    let (full_alpha, bbox) = region::align_to_image(&decoded_alpha, mask_bbox, img_w, img_h);

    // make_patch
    let prepared = patch::prepare(&original, &bbox, config.max_patch_edge).at(Stage::MakePatch)?;

    // openrouter
    let edited = adapter
        .edit(ModelEditRequest {
            prompt: &request.prompt,
            patch_png: &prepared.png_bytes,
            model: &config.openrouter_model,
        })
        .await
        .at(Stage::Openrouter)?;

    // composite_precheck: decode the model's patch, color-match it, and
    // build the feathered alpha crop.
    let edited_patch = image::load_from_memory(&edited.patch_png)
        .map_err(|e| CoreError::image(format!("cannot decode model patch: {}", e)))
        .at(Stage::CompositePrecheck)?;

    let (gain_min, gain_max) = config.color_gain_range();
    let gain = color::compute_gain(&original, &bbox, config.color_match_ring, &edited_patch, gain_min, gain_max);
    let color_matched = color::apply_gain(&edited_patch, gain);

    let alpha_crop = compositor::feather_alpha_crop(&full_alpha, &bbox, feather).at(Stage::CompositePrecheck)?;

    // composite
    let composited = compositor::composite(&original, &bbox, &alpha_crop, &color_matched).at(Stage::Composite)?;
    let png_bytes = compositor::encode_png(&composited).at(Stage::Composite)?;

    // save_or_return
    let file = if request.save {
        let path = storage.save(Dest::Edits, &png_bytes, "png").at(Stage::SaveOrReturn)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Some(SavedFile {
            url: format!("file://{}", path.display()),
            filename,
            mime: "image/png".to_string(),
        })
    } else {
        None
    };

    Ok(EditResponse {
        image_base64: base64::engine::general_purpose::STANDARD.encode(&png_bytes),
        mime: "image/png".to_string(),
        file,
    })
}
