use serde_json::Value;
use tauri::{AppHandle, Manager};

use crate::ShellState;

#[tauri::command]
pub(crate) fn update_bridge_is_desktop_runtime() -> bool {
    true
}

/// Single entry point for `window.desktopUpdate`: one request, one reply.
#[tauri::command]
pub(crate) async fn update_bridge_invoke(
    app_handle: AppHandle,
    channel: String,
    args: Option<Value>,
) -> Result<Value, String> {
    let Some(registry) = app_handle
        .try_state::<ShellState>()
        .map(|state| state.registry.clone())
    else {
        return Err("Update bridge is not ready yet.".to_string());
    };

    registry
        .invoke(&channel, args.unwrap_or(Value::Null))
        .await
        .map_err(|error| {
            tracing::warn!(%channel, %error, "update bridge request failed");
            error.to_string()
        })
}
