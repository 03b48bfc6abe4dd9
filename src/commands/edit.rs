// src/commands/edit.rs
//
// The Tauri surface for the edit pipeline — a single orchestrating command,
// the same shape as the teacher's `generate_comfyui_scene` wrapping
// `generate_scene_image`.

use crate::config::ConfigState;
use crate::pipeline::{self, EditRequest, EditResponse};
use crate::state::AppState;
use base64::Engine;
use tauri::State;

#[tauri::command]
pub async fn edit(
    request: EditRequest,
    state: State<'_, AppState>,
    config_state: State<'_, ConfigState>,
) -> Result<EditResponse, crate::errors::PipelineError> {
    let config = config_state.0.lock().map_err(|_| {
        crate::errors::PipelineError::new(
            crate::errors::Stage::Parse,
            crate::errors::CoreError::invariant("config_lock_poisoned", "config mutex poisoned"),
        )
    })?.clone();

    let adapter = state.model_adapter(&config);
    pipeline::edit(&config, state.storage.as_ref(), &adapter, request).await
}

/// Read a previously-saved edit result back as base64, for the frontend to
/// redisplay without re-running the pipeline. Grounded in the teacher's
/// `read_file_base64`, scoped to the edits directory via `Storage::read`
/// rather than an arbitrary filesystem path.
#[tauri::command]
pub fn read_result_base64(filename: String, state: State<'_, AppState>) -> Result<String, String> {
    let bytes = state.storage.read(&filename).map_err(|e| e.to_string())?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
}
