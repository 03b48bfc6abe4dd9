// src/errors.rs
//
// Error taxonomy for the edit pipeline.
//
// Mirrors the shape of `comfyui_api::ComfyError`: a typed enum with a
// `Display` impl, converted to a frontend-facing shape only at the
// Tauri command boundary. Unlike `ComfyError` (which collapses to a bare
// `String`), the edit pipeline's boundary needs the `{error, stage}` shape
// intact, so `PipelineError` carries its `Stage` through to serialization
// instead of being stringified away.

use serde::{Serialize, Serializer};
use std::fmt;

/// Point of failure within a single `edit` request, named the same way
/// across logs and the error response so the two can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    ReadBase,
    ParseMask,
    MaskToBbox,
    AlignMaskToImage,
    MakePatch,
    Openrouter,
    CompositePrecheck,
    Composite,
    SaveOrReturn,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::ReadBase => "read_base",
            Self::ParseMask => "parse_mask",
            Self::MaskToBbox => "mask_to_bbox",
            Self::AlignMaskToImage => "align_mask_to_image",
            Self::MakePatch => "make_patch",
            Self::Openrouter => "openrouter",
            Self::CompositePrecheck => "composite_precheck",
            Self::Composite => "composite",
            Self::SaveOrReturn => "save_or_return",
        };
        write!(f, "{}", s)
    }
}

/// One failure in the pipeline. Each variant carries the user-facing tag
/// from spec §7 and enough context for a log line; HTTP status mapping
/// lives in `http_status`.
#[derive(Debug)]
pub enum CoreError {
    Validation { tag: &'static str, message: String },
    NotFound { message: String },
    Mask { tag: &'static str, message: String },
    Image { message: String },
    Model {
        tag: String,
        message: String,
        http_status: u16,
    },
    Invariant { tag: &'static str, message: String },
}

impl CoreError {
    pub fn validation(tag: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { tag, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn mask(tag: &'static str, message: impl Into<String>) -> Self {
        Self::Mask { tag, message: message.into() }
    }

    pub fn image(message: impl Into<String>) -> Self {
        Self::Image { message: message.into() }
    }

    pub fn invariant(tag: &'static str, message: impl Into<String>) -> Self {
        Self::Invariant { tag, message: message.into() }
    }

    /// Authentication failure from the model adapter normalizes to a fixed
    /// tag/status regardless of the upstream's own wording (spec §7).
    pub fn invalid_model_credential(message: impl Into<String>) -> Self {
        Self::Model {
            tag: "invalid_openrouter_api_key".to_string(),
            message: message.into(),
            http_status: 401,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Model {
            tag: "rate_limited".to_string(),
            message: message.into(),
            http_status: 429,
        }
    }

    pub fn model_timeout(message: impl Into<String>) -> Self {
        Self::Model {
            tag: "ModelTimeout".to_string(),
            message: message.into(),
            http_status: 504,
        }
    }

    pub fn no_image_in_response(message: impl Into<String>) -> Self {
        Self::Model {
            tag: "no_image_in_response".to_string(),
            message: message.into(),
            http_status: 502,
        }
    }

    pub fn model_http(status: u16, message: impl Into<String>) -> Self {
        Self::Model {
            tag: format!("openrouter_http_{}", status),
            message: message.into(),
            http_status: status,
        }
    }

    /// Tag surfaced to the caller (the `error` field of the response).
    pub fn tag(&self) -> String {
        match self {
            Self::Validation { tag, .. } => tag.to_string(),
            Self::NotFound { .. } => "file_not_found".to_string(),
            Self::Mask { tag, .. } => tag.to_string(),
            Self::Image { .. } => "image_meta_failed".to_string(),
            Self::Model { tag, .. } => tag.clone(),
            Self::Invariant { tag, .. } => tag.to_string(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Mask { .. } => 400,
            Self::Image { .. } => 400,
            Self::Model { http_status, .. } => *http_status,
            Self::Invariant { .. } => 500,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message, .. } => write!(f, "validation error: {}", message),
            Self::NotFound { message } => write!(f, "not found: {}", message),
            Self::Mask { message, .. } => write!(f, "mask error: {}", message),
            Self::Image { message } => write!(f, "image error: {}", message),
            Self::Model { message, .. } => write!(f, "model error: {}", message),
            Self::Invariant { message, .. } => write!(f, "invariant violated (bug): {}", message),
        }
    }
}

impl From<CoreError> for String {
    fn from(e: CoreError) -> String {
        e.to_string()
    }
}

/// An error tagged with the stage it happened in — the shape returned to
/// the frontend on `edit` failure (spec §6.1 "response (error)").
#[derive(Debug)]
pub struct PipelineError {
    pub stage: Stage,
    pub error: CoreError,
}

impl PipelineError {
    pub fn new(stage: Stage, error: CoreError) -> Self {
        Self { stage, error }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.error)
    }
}

// Hand-rolled rather than derived: `CoreError` is not itself `Serialize`
// (its variants carry a mix of owned/static tags picked via `tag()`), and
// the wire shape is fixed by spec §6.1 to exactly {error, stage}.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("PipelineError", 2)?;
        s.serialize_field("error", &self.error.tag())?;
        s.serialize_field("stage", &self.stage)?;
        s.end()
    }
}

/// Extension trait for attaching a stage to a bare `CoreError` inline at
/// the call site, e.g. `foo().map_err(|e| e.at(Stage::ReadBase))?`.
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> AtStage<T> for Result<T, CoreError> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|error| PipelineError::new(stage, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_for_validation() {
        let e = CoreError::validation("prompt_required", "prompt must not be empty");
        assert_eq!(e.tag(), "prompt_required");
        assert_eq!(e.http_status(), 400);
    }

    #[test]
    fn model_http_tag_includes_status_code() {
        let e = CoreError::model_http(500, "upstream blew up");
        assert_eq!(e.tag(), "openrouter_http_500");
    }

    #[test]
    fn auth_failure_normalizes_regardless_of_upstream_message() {
        let e = CoreError::invalid_model_credential("Bearer token rejected");
        assert_eq!(e.tag(), "invalid_openrouter_api_key");
        assert_eq!(e.http_status(), 401);
    }

    #[test]
    fn pipeline_error_serializes_to_error_and_stage_only() {
        let pe = PipelineError::new(Stage::MaskToBbox, CoreError::mask("empty_mask", "no pixels"));
        let v = serde_json::to_value(&pe).unwrap();
        assert_eq!(v["error"], "empty_mask");
        assert_eq!(v["stage"], "mask_to_bbox");
        assert_eq!(v.as_object().unwrap().len(), 2);
    }
}
