#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_config;
mod app_runtime;
mod app_types;
mod desktop_bridge_commands;
mod logging;
mod shell_locale;
mod tauri_transport;
mod update_prompt;
mod window_actions;

pub(crate) use app_config::ShellConfig;
pub(crate) use app_types::ShellState;
pub(crate) use tauri_transport::TauriUpdateTransport;
pub(crate) use window_actions::MAIN_WINDOW_LABEL;

fn main() {
    app_runtime::run();
}
