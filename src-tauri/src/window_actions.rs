use serde_json::Value;
use tauri::{
    AppHandle, Emitter, EventTarget, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder,
};
use update_coordinator::{PrimaryWindow, UpdateEventSink, WindowBackend, UPDATE_BRIDGE_SCRIPT};

pub(crate) const MAIN_WINDOW_LABEL: &str = "main";
const MAIN_WINDOW_WIDTH: f64 = 900.0;
const MAIN_WINDOW_HEIGHT: f64 = 670.0;

/// The shell's primary webview window as seen by the update coordinator.
#[derive(Clone)]
pub(crate) struct MainWindow(WebviewWindow);

impl MainWindow {
    pub(crate) fn from_app(app_handle: &AppHandle, label: &str) -> Option<Self> {
        app_handle.get_webview_window(label).map(Self)
    }
}

impl UpdateEventSink for MainWindow {
    fn label(&self) -> &str {
        self.0.label()
    }

    fn deliver(&self, channel: &str, payload: Value) -> Result<(), String> {
        self.0
            .emit_to(
                EventTarget::WebviewWindow {
                    label: self.0.label().to_string(),
                },
                channel,
                payload,
            )
            .map_err(|error| format!("Failed to emit {channel}: {error}"))
    }
}

impl PrimaryWindow for MainWindow {
    fn show(&self) -> Result<(), String> {
        self.0
            .show()
            .map_err(|error| format!("Failed to show main window: {error}"))
    }

    fn focus(&self) -> Result<(), String> {
        if let Ok(true) = self.0.is_minimized() {
            if let Err(error) = self.0.unminimize() {
                tracing::warn!(%error, "failed to unminimize main window");
            }
        }
        self.0
            .set_focus()
            .map_err(|error| format!("Failed to focus main window: {error}"))
    }
}

pub(crate) struct TauriWindowBackend {
    app_handle: AppHandle,
    title: &'static str,
}

impl TauriWindowBackend {
    pub(crate) fn new(app_handle: AppHandle, title: &'static str) -> Self {
        Self { app_handle, title }
    }
}

impl WindowBackend for TauriWindowBackend {
    type Window = MainWindow;

    fn create_primary_window(&self) -> Result<MainWindow, String> {
        // Hidden until the first page load finishes so the user never sees a blank frame.
        WebviewWindowBuilder::new(&self.app_handle, MAIN_WINDOW_LABEL, WebviewUrl::default())
            .title(self.title)
            .inner_size(MAIN_WINDOW_WIDTH, MAIN_WINDOW_HEIGHT)
            .visible(false)
            .initialization_script(UPDATE_BRIDGE_SCRIPT)
            .build()
            .map(MainWindow)
            .map_err(|error| format!("Failed to build main window: {error}"))
    }
}
