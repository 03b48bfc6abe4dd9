#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

mod color;
mod commands;
mod compositor;
mod config;
mod errors;
mod geometry;
mod mask;
mod model_adapter;
mod patch;
mod pipeline;
mod region;
mod state;
mod storage;

use config::{ConfigState, PipelineConfig};
use state::AppState;
use std::sync::Mutex;
use tauri::Manager;

fn main() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let handle = app.handle().clone();

            let config = PipelineConfig::load(&handle);
            app.manage(ConfigState(Mutex::new(config)));
            app.manage(AppState::new(&handle));

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Edit pipeline
            commands::edit::edit,
            commands::edit::read_result_base64,
            // Config commands
            config::get_config,
            config::update_config,
            config::set_openrouter_api_key,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
