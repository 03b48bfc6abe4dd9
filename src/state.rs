// src/state.rs
//
// Application state. No database: the pipeline is stateless across
// requests (spec §3 "Ownership") — all that's shared is an HTTP client,
// the filesystem storage handle, and the live config.

use crate::config::PipelineConfig;
use crate::model_adapter::OpenRouterAdapter;
use crate::storage::FsStorage;
use std::fs;
use std::sync::Arc;
use tauri::{AppHandle, Manager};

pub struct AppState {
    pub client: reqwest::Client,
    pub storage: Arc<FsStorage>,
}

impl AppState {
    pub fn new(app_handle: &AppHandle) -> Self {
        let app_dir = app_handle
            .path()
            .app_data_dir()
            .expect("Could not determine app data directory");

        if !app_dir.exists() {
            fs::create_dir_all(&app_dir).expect("Failed to create app data directory");
        }

        let storage = FsStorage::new(app_dir).expect("Failed to initialize storage");

        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap(),
            storage: Arc::new(storage),
        }
    }

    pub fn model_adapter(&self, config: &PipelineConfig) -> OpenRouterAdapter {
        OpenRouterAdapter::new(self.client.clone(), config.openrouter_api_key.clone(), config.model_timeout_s)
    }
}
