use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tauri::{AppHandle, Manager};

/// Tunables for the edit pipeline (spec §6.4). Every field has a default
/// so a missing or partially-specified `config.json` still produces a
/// runnable config.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Longest edge a patch is allowed to reach before being sent to the
    /// model adapter.
    pub max_patch_edge: u32,

    /// Gaussian blur radius applied to the edit-region alpha before
    /// compositing, in pixels.
    pub default_feather: u32,

    /// Pixels added on each side of the mask's tight bbox before cropping.
    pub default_padding: u32,

    /// Radius of the ring sampled around the bbox for color matching.
    pub color_match_ring: u32,

    /// Inclusive per-channel gain clamp applied by the Color Matcher.
    pub color_gain_min: f64,
    pub color_gain_max: f64,

    /// Timeout for a single model adapter call.
    pub model_timeout_s: u64,

    /// Largest `base_image_b64`/`mask_data_url` payload accepted, in bytes
    /// (spec §9 "Supplemented features" — enforced at `read_base`).
    pub max_upload_bytes: u64,

    /// Apply a one-pixel soft dilation to the decoded mask before bbox
    /// extraction (spec §9 Open Question (b)). Off by default.
    pub soft_dilation: bool,

    /// OpenRouter endpoint credentials and default model.
    pub openrouter_api_key: String,
    pub openrouter_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_patch_edge: 1024,
            default_feather: 2,
            default_padding: 12,
            color_match_ring: 8,
            color_gain_min: 0.6,
            color_gain_max: 1.6,
            model_timeout_s: 60,
            max_upload_bytes: 20 * 1024 * 1024,
            soft_dilation: false,
            openrouter_api_key: String::new(),
            openrouter_model: "google/gemini-2.5-flash-image".to_string(),
        }
    }
}

impl PipelineConfig {
    fn config_path(app_handle: &AppHandle) -> Result<PathBuf, String> {
        let app_dir = app_handle
            .path()
            .app_data_dir()
            .map_err(|e| format!("Could not get app data dir: {}", e))?;

        if !app_dir.exists() {
            fs::create_dir_all(&app_dir).map_err(|e| format!("Could not create app dir: {}", e))?;
        }

        Ok(app_dir.join("config.json"))
    }

    pub fn load(app_handle: &AppHandle) -> Self {
        let path = match Self::config_path(app_handle) {
            Ok(p) => p,
            Err(e) => {
                println!("[Config] Could not get config path: {}", e);
                return Self::default();
            }
        };

        println!("[Config] Config path: {:?}", path);

        if !path.exists() {
            println!("[Config] Config file doesn't exist, creating default...");
            let config = Self::default();
            if let Err(e) = config.save(app_handle) {
                println!("[Config] Failed to save default config: {}", e);
            } else {
                println!("[Config] Default config saved successfully");
            }
            return config;
        }

        println!("[Config] Loading existing config...");
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    println!("[Config] Config loaded successfully");
                    config
                }
                Err(e) => {
                    println!("[Config] Failed to parse config: {}, using default", e);
                    Self::default()
                }
            },
            Err(e) => {
                println!("[Config] Failed to read config: {}, using default", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, app_handle: &AppHandle) -> Result<(), String> {
        let path = Self::config_path(app_handle)?;
        println!("[Config] Saving config to: {:?}", path);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
        println!("[Config] Config saved successfully");
        Ok(())
    }

    pub fn color_gain_range(&self) -> (f64, f64) {
        (self.color_gain_min, self.color_gain_max)
    }
}

// Tauri commands for config management

use std::sync::Mutex;
use tauri::State;

pub struct ConfigState(pub Mutex<PipelineConfig>);

#[tauri::command]
pub fn get_config(state: State<'_, ConfigState>) -> Result<PipelineConfig, String> {
    let config = state.0.lock().map_err(|e| e.to_string())?;
    Ok(config.clone())
}

#[tauri::command]
pub fn update_config(
    new_config: PipelineConfig,
    state: State<'_, ConfigState>,
    app: AppHandle,
) -> Result<(), String> {
    let mut config = state.0.lock().map_err(|e| e.to_string())?;
    *config = new_config;
    config.save(&app)?;
    Ok(())
}

#[tauri::command]
pub fn set_openrouter_api_key(
    api_key: String,
    state: State<'_, ConfigState>,
    app: AppHandle,
) -> Result<(), String> {
    let mut config = state.0.lock().map_err(|e| e.to_string())?;
    config.openrouter_api_key = api_key;
    config.save(&app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_patch_edge, 1024);
        assert_eq!(cfg.default_feather, 2);
        assert_eq!(cfg.default_padding, 12);
        assert_eq!(cfg.color_match_ring, 8);
        assert_eq!(cfg.color_gain_range(), (0.6, 1.6));
        assert!(!cfg.soft_dilation);
    }
}
