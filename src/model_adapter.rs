// src/model_adapter.rs
//
// Model Adapter — stage `openrouter`.
// The one stage the spec deliberately keeps outside the deterministic core:
// it sends the prepared patch plus the edit prompt to an image-capable
// OpenRouter model and gets back an edited patch. Shaped after
// `comfyui_api`'s client/upload/poll chain, collapsed into a single
// request/response round trip since OpenRouter's chat-completions API
// doesn't need ComfyUI's queue-and-poll dance.

use crate::errors::CoreError;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// What the pipeline asks the model to do: edit `patch_png` (already
/// cropped and downscaled) per `prompt`, returning a same-purpose patch.
pub struct EditRequest<'a> {
    pub prompt: &'a str,
    pub patch_png: &'a [u8],
    pub model: &'a str,
}

pub struct EditResult {
    pub patch_png: Vec<u8>,
}

/// Boundary the pipeline depends on, so tests can swap in a fake without
/// touching the network (spec §9 "Non-goals" excludes model training/
/// selection, not adapter substitutability).
#[async_trait::async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn edit(&self, request: EditRequest<'_>) -> Result<EditResult, CoreError>;
}

/// Borrows the app's single `reqwest::Client` (cloning it is cheap — it's
/// an `Arc` handle internally) rather than building a dedicated one, so the
/// connection pool the client owns is actually shared across edits instead
/// of rebuilt per request. `model_timeout_s` varies per config reload, so
/// it's applied per-request via `RequestBuilder::timeout` rather than baked
/// into the client at construction time.
pub struct OpenRouterAdapter {
    client: reqwest::Client,
    api_key: String,
    timeout_secs: u64,
}

impl OpenRouterAdapter {
    pub fn new(client: reqwest::Client, api_key: String, timeout_secs: u64) -> Self {
        Self { client, api_key, timeout_secs }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    images: Vec<ResponseImage>,
}

#[derive(Debug, Deserialize)]
struct ResponseImage {
    image_url: ResponseImageUrl,
}

#[derive(Debug, Deserialize)]
struct ResponseImageUrl {
    url: String,
}

/// OpenRouter returns the edited image either as a bare base64 string or
/// as a `data:image/...;base64,...` URL depending on model; strip the
/// prefix if present.
fn base64_payload(image_url: &str) -> &str {
    image_url.split_once(",").map(|(_, b64)| b64).unwrap_or(image_url)
}

#[async_trait::async_trait]
impl ModelAdapter for OpenRouterAdapter {
    async fn edit(&self, request: EditRequest<'_>) -> Result<EditResult, CoreError> {
        let patch_b64 = base64::engine::general_purpose::STANDARD.encode(request.patch_png);
        let data_url = format!("data:image/png;base64,{}", patch_b64);

        let body = json!({
            "model": request.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.prompt },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ],
            }],
            "modalities": ["image", "text"],
        });

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::model_timeout(format!("openrouter request timed out: {}", e))
                } else {
                    CoreError::model_http(0, format!("openrouter request failed: {}", e))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str().map(String::from)))
                .unwrap_or(text);

            return Err(match status.as_u16() {
                401 | 403 => CoreError::invalid_model_credential(message),
                429 => CoreError::rate_limited(message),
                other => CoreError::model_http(other, message),
            });
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::model_http(status.as_u16(), format!("invalid openrouter response body: {}", e)))?;

        let image_url = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.images.into_iter().next())
            .map(|img| img.image_url.url)
            .ok_or_else(|| CoreError::no_image_in_response("openrouter response contained no image"))?;

        let b64 = base64_payload(&image_url);
        let patch_png = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| CoreError::no_image_in_response(format!("openrouter image payload is not valid base64: {}", e)))?;

        Ok(EditResult { patch_png })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_payload_strips_data_url_prefix() {
        assert_eq!(base64_payload("data:image/png;base64,aGVsbG8="), "aGVsbG8=");
    }

    #[test]
    fn base64_payload_passes_through_bare_base64() {
        assert_eq!(base64_payload("aGVsbG8="), "aGVsbG8=");
    }

    #[test]
    fn chat_completion_response_parses_image_url() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "images": [{ "image_url": { "url": "data:image/png;base64,AAAA" } }]
                }
            }]
        });
        let parsed: ChatCompletionResponse = serde_json::from_value(body).unwrap();
        let url = parsed.choices[0].message.images[0].image_url.url.clone();
        assert_eq!(base64_payload(&url), "AAAA");
    }

    #[test]
    fn chat_completion_response_with_no_images_parses_empty() {
        let body = serde_json::json!({ "choices": [{ "message": {} }] });
        let parsed: ChatCompletionResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.choices[0].message.images.is_empty());
    }
}
