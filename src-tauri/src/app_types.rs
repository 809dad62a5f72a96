use std::sync::Arc;

use update_coordinator::{HandlerRegistry, UpdateCoordinator, WindowHost};

use crate::window_actions::TauriWindowBackend;

/// Managed by Tauri for the lifetime of the app.
pub(crate) struct ShellState {
    pub(crate) host: Arc<WindowHost<TauriWindowBackend>>,
    pub(crate) registry: Arc<HandlerRegistry>,
}

impl ShellState {
    pub(crate) fn coordinator(&self) -> &Arc<UpdateCoordinator> {
        self.host.coordinator()
    }
}
