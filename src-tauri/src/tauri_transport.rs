use std::sync::Mutex;

use async_trait::async_trait;
use tauri::AppHandle;
use tauri_plugin_updater::{Update, UpdaterExt};
use update_coordinator::{
    is_newer_release, DownloadProgress, ReleaseNotes, RemoteRelease, TransportEmitter,
    TransportError, TransportEvent, UpdateTransport, UpdaterConfig,
};

struct StagedUpdate {
    update: Update,
    bytes: Vec<u8>,
}

/// Update transport backed by `tauri-plugin-updater`.
///
/// `check_for_updates` remembers the offered release so `download_update`
/// can fetch it; the downloaded bytes stay staged until they are installed
/// now or on quit.
pub(crate) struct TauriUpdateTransport {
    app_handle: AppHandle,
    events: TransportEmitter,
    config: Mutex<UpdaterConfig>,
    pending: Mutex<Option<Update>>,
    staged: Mutex<Option<StagedUpdate>>,
}

impl TauriUpdateTransport {
    pub(crate) fn new(app_handle: AppHandle) -> Self {
        Self {
            app_handle,
            events: TransportEmitter::new(),
            config: Mutex::new(UpdaterConfig::default()),
            pending: Mutex::new(None),
            staged: Mutex::new(None),
        }
    }

    fn current_config(&self) -> UpdaterConfig {
        self.config.lock().map(|guard| *guard).unwrap_or_default()
    }

    fn take_staged(&self) -> Result<Option<StagedUpdate>, TransportError> {
        self.staged
            .lock()
            .map(|mut guard| guard.take())
            .map_err(|_| TransportError::Install("staged update state is poisoned".to_string()))
    }

    fn apply(&self, staged: &StagedUpdate) -> Result<(), TransportError> {
        staged
            .update
            .install(&staged.bytes)
            .map_err(|error| TransportError::Install(format!("Failed to install update: {error}")))
    }
}

fn release_from_update(update: &Update) -> RemoteRelease {
    let release = RemoteRelease::new(update.version.clone());
    match &update.body {
        Some(body) => release.with_notes(ReleaseNotes::Text(body.clone())),
        None => release,
    }
}

/// Turns per-chunk callbacks into cumulative progress samples.
#[derive(Debug, Default)]
struct ProgressCounter {
    transferred: u64,
}

impl ProgressCounter {
    fn record(&mut self, chunk_length: usize, content_length: Option<u64>) -> DownloadProgress {
        self.transferred = self.transferred.saturating_add(chunk_length as u64);
        DownloadProgress::from_bytes(self.transferred, content_length.unwrap_or(0))
    }
}

#[async_trait]
impl UpdateTransport for TauriUpdateTransport {
    fn configure(&self, config: &UpdaterConfig) {
        match self.config.lock() {
            Ok(mut guard) => *guard = *config,
            Err(_) => tracing::error!("updater config state is poisoned, keeping defaults"),
        }
    }

    fn events(&self) -> &TransportEmitter {
        &self.events
    }

    async fn check_for_updates(&self) -> Result<Option<RemoteRelease>, TransportError> {
        let allow_prerelease = self.current_config().allow_prerelease;
        let updater = self
            .app_handle
            .updater_builder()
            .version_comparator(move |current, release| {
                is_newer_release(
                    &current.to_string(),
                    &release.version.to_string(),
                    allow_prerelease,
                )
            })
            .build()
            .map_err(|error| {
                TransportError::Unavailable(format!("Failed to initialize updater: {error}"))
            })?;

        let update = updater
            .check()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;

        let release = update.as_ref().map(release_from_update);
        match self.pending.lock() {
            Ok(mut guard) => *guard = update,
            Err(_) => {
                return Err(TransportError::Unavailable(
                    "pending update state is poisoned".to_string(),
                ))
            }
        }
        Ok(release)
    }

    async fn download_update(&self) -> Result<(), TransportError> {
        let update = self
            .pending
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(TransportError::NoPendingUpdate)?;
        let release = release_from_update(&update);

        tracing::info!(version = %update.version, "downloading update package");
        let mut counter = ProgressCounter::default();
        let events = &self.events;
        let bytes = update
            .download(
                |chunk_length, content_length| {
                    let progress = counter.record(chunk_length, content_length);
                    events.emit(&TransportEvent::Progress(progress));
                },
                || {},
            )
            .await
            .map_err(|error| TransportError::Download(format!("Failed to download update: {error}")))?;

        tracing::info!(version = %update.version, size = bytes.len(), "update package staged");
        match self.staged.lock() {
            Ok(mut guard) => *guard = Some(StagedUpdate { update, bytes }),
            Err(_) => {
                return Err(TransportError::Download(
                    "staged update state is poisoned".to_string(),
                ))
            }
        }
        self.events.emit(&TransportEvent::Downloaded(release));
        Ok(())
    }

    fn quit_and_install(&self, silent: bool, force_run_after: bool) -> Result<(), TransportError> {
        let Some(staged) = self.take_staged()? else {
            return Err(TransportError::NoPendingUpdate);
        };

        // Installer UI mode comes from the bundle's updater config; `silent` is informational here.
        tracing::info!(version = %staged.update.version, silent, force_run_after, "installing update");
        self.apply(&staged)?;
        if force_run_after {
            self.app_handle.request_restart();
        } else {
            self.app_handle.exit(0);
        }
        Ok(())
    }

    fn install_on_quit(&self) -> Result<bool, TransportError> {
        if !self.current_config().auto_install_on_quit {
            return Ok(false);
        }
        let Some(staged) = self.take_staged()? else {
            return Ok(false);
        };

        tracing::info!(version = %staged.update.version, "installing staged update on quit");
        self.apply(&staged)?;
        Ok(true)
    }
}
