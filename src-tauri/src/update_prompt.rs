use tauri::AppHandle;
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use update_coordinator::UpdatePrompter;

use crate::shell_locale::ShellTexts;

/// Native dialogs for the restart question and failure notices.
///
/// Both dialogs use the callback form so the coordinator's emitting task is never blocked.
pub(crate) struct DialogPrompter {
    app_handle: AppHandle,
    texts: ShellTexts,
}

impl DialogPrompter {
    pub(crate) fn new(app_handle: AppHandle, texts: ShellTexts) -> Self {
        Self { app_handle, texts }
    }
}

impl UpdatePrompter for DialogPrompter {
    fn confirm_restart(&self, version: &str, respond: Box<dyn FnOnce(bool) + Send>) {
        tracing::info!(version, "asking user to restart into downloaded update");
        let version = version.to_string();
        self.app_handle
            .dialog()
            .message(self.texts.update_ready_message(&version))
            .title(self.texts.update_ready_title)
            .kind(MessageDialogKind::Info)
            .buttons(MessageDialogButtons::YesNo)
            .show(move |restart_now| {
                tracing::info!(
                    %version,
                    restart_now,
                    "update restart prompt answered"
                );
                respond(restart_now);
            });
    }

    fn notify_failure(&self, message: &str) {
        self.app_handle
            .dialog()
            .message(message)
            .title(self.texts.update_failed_title)
            .kind(MessageDialogKind::Error)
            .buttons(MessageDialogButtons::Ok)
            .show(|_| {});
    }
}
