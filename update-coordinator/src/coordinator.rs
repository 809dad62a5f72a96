//! The update state machine.
//!
//! One [`UpdateCoordinator`] is built at process start and shared by
//! reference with the window host and the bridge. It owns the phase of the
//! current update session, the window that receives lifecycle events and the
//! guard that keeps request handlers from being registered twice.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
};

use futures_util::future::{AbortHandle, AbortRegistration, Abortable, Aborted, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

use crate::{
    bridge::{
        event_channel, request_handler, to_value, AvailablePayload, BridgeRequest,
        ConfirmInstallArgs, DownloadedPayload, ErrorPayload, RequestAck, UpdateCheckResult,
    },
    is_newer_release, lock_or_recover, BridgeError, BuildProfile, DownloadProgress,
    HandlerRegistry, RemoteRelease, TransportError, TransportEvent, TransportEventKind,
    UpdateTransport, UpdaterConfig, GENERIC_UPDATE_FAILURE_MESSAGE,
};

pub const DEVELOPMENT_SKIP_MESSAGE: &str = "Update checks are disabled in development builds.";
pub const DOWNLOAD_STARTED_MESSAGE: &str = "Update download started.";
pub const DOWNLOAD_IN_PROGRESS_MESSAGE: &str = "An update download is already in progress.";
pub const DOWNLOAD_READY_MESSAGE: &str = "The update has already been downloaded.";
pub const INSTALL_IN_PROGRESS_MESSAGE: &str = "The update is being installed.";
pub const DOWNLOAD_CANCELLED_MESSAGE: &str = "Update download cancelled.";
pub const NO_DOWNLOAD_TO_CANCEL_MESSAGE: &str = "No update download is in progress.";
pub const NO_STAGED_UPDATE_MESSAGE: &str = "No downloaded update is ready to install.";
pub const INSTALL_DEFERRED_MESSAGE: &str = "The update will be installed when the app quits.";
pub const CHECK_IN_PROGRESS_MESSAGE: &str =
    "An update check is in progress, try again when it finishes.";
pub const DOWNLOAD_NOT_FINISHED_MESSAGE: &str = "The update is still downloading.";

/// Receives lifecycle events for the UI; in the shell this is the primary window.
pub trait UpdateEventSink: Send + Sync {
    fn label(&self) -> &str;

    fn deliver(&self, channel: &str, payload: Value) -> Result<(), String>;
}

/// Decides how the user is asked about restarting and how failures are shown.
pub trait UpdatePrompter: Send + Sync {
    /// Ask whether to restart into `version` now; `respond(true)` installs immediately.
    fn confirm_restart(&self, version: &str, respond: Box<dyn FnOnce(bool) + Send>);

    fn notify_failure(&self, message: &str);
}

/// Runs a future on the host's event loop.
pub type TaskSpawner = Arc<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable { version: String },
    Downloading,
    Downloaded { version: String },
    Installing,
    Error { message: String },
}

impl UpdatePhase {
    fn accepts_check(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::UpToDate | Self::UpdateAvailable { .. } | Self::Error { .. }
        )
    }

    fn is_transfer(&self) -> bool {
        matches!(self, Self::Downloading | Self::Installing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOrigin {
    Explicit,
    Background,
}

pub struct CoordinatorOptions {
    pub profile: BuildProfile,
    pub current_version: String,
    pub config: UpdaterConfig,
    pub spawner: TaskSpawner,
    pub prompter: Option<Arc<dyn UpdatePrompter>>,
}

#[derive(Debug)]
struct Session {
    phase: UpdatePhase,
    phase_before_download: Option<UpdatePhase>,
    last_percent: f64,
    download: Option<AbortHandle>,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: UpdatePhase::Idle,
            phase_before_download: None,
            last_percent: 0.0,
            download: None,
            generation: 0,
        }
    }
}

struct CoordinatorCore {
    me: Weak<CoordinatorCore>,
    transport: Arc<dyn UpdateTransport>,
    profile: BuildProfile,
    current_version: String,
    config: UpdaterConfig,
    spawner: TaskSpawner,
    prompter: Option<Arc<dyn UpdatePrompter>>,
    session: Mutex<Session>,
    bound_window: Mutex<Option<Arc<dyn UpdateEventSink>>>,
}

pub struct UpdateCoordinator {
    core: Arc<CoordinatorCore>,
    handlers_registered: AtomicBool,
}

impl UpdateCoordinator {
    pub fn new(transport: Arc<dyn UpdateTransport>, options: CoordinatorOptions) -> Self {
        transport.configure(&options.config);
        let core = Arc::new_cyclic(|me| CoordinatorCore {
            me: me.clone(),
            transport,
            profile: options.profile,
            current_version: options.current_version,
            config: options.config,
            spawner: options.spawner,
            prompter: options.prompter,
            session: Mutex::new(Session::default()),
            bound_window: Mutex::new(None),
        });
        core.attach_listeners(None);
        tracing::info!(
            profile = core.profile.as_str(),
            current_version = %core.current_version,
            config = ?core.config,
            "update coordinator created"
        );

        Self {
            core,
            handlers_registered: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        lock_or_recover(&self.core.session).phase.clone()
    }

    pub fn profile(&self) -> BuildProfile {
        self.core.profile
    }

    pub fn config(&self) -> UpdaterConfig {
        self.core.config
    }

    pub fn current_version(&self) -> &str {
        &self.core.current_version
    }

    pub fn handlers_registered(&self) -> bool {
        self.handlers_registered.load(Ordering::Acquire)
    }

    pub fn bound_window_label(&self) -> Option<String> {
        lock_or_recover(&self.core.bound_window)
            .as_ref()
            .map(|window| window.label().to_string())
    }

    /// Explicit check: failures come back in the result and are not published.
    pub async fn check_for_update(&self) -> UpdateCheckResult {
        self.core.run_check(CheckOrigin::Explicit).await
    }

    /// Startup/auto check: failures only reach the UI as the `error` event.
    pub async fn background_check(&self) {
        self.core.run_check(CheckOrigin::Background).await;
    }

    pub fn spawn_background_check(&self) {
        let core = self.core.clone();
        (self.core.spawner)(
            async move {
                core.run_check(CheckOrigin::Background).await;
            }
            .boxed(),
        );
    }

    pub fn download_update(&self) -> RequestAck {
        self.core.start_download()
    }

    pub fn cancel_update(&self) -> RequestAck {
        self.core.cancel_download()
    }

    pub fn install_update(&self) -> RequestAck {
        self.core.install()
    }

    pub fn confirm_install(&self, restart_now: bool) -> RequestAck {
        self.core.confirm_install(restart_now)
    }

    /// Applies a staged update silently while the app exits, when configured to.
    pub fn handle_app_quit(&self) -> bool {
        self.core.install_on_quit()
    }

    /// Detaches every transport listener, then attaches fresh ones that deliver to `window`.
    pub fn bind_window(&self, window: Arc<dyn UpdateEventSink>) {
        let previous = lock_or_recover(&self.core.bound_window).replace(window.clone());
        self.core.attach_listeners(Some(window.clone()));
        tracing::info!(
            window = window.label(),
            previous = ?previous.as_ref().map(|previous| previous.label()),
            "bound update events to window"
        );
    }

    pub fn unbind_window(&self, label: &str) -> bool {
        {
            let mut bound = lock_or_recover(&self.core.bound_window);
            match bound.as_ref() {
                Some(window) if window.label() == label => {
                    *bound = None;
                }
                _ => return false,
            }
        }
        self.core.attach_listeners(None);
        tracing::info!(window = label, "unbound update events from window");
        true
    }

    /// Installs the request handlers once per process and (re)binds `window`.
    ///
    /// Returns `Ok(true)` when this call installed the handlers.
    pub fn register_handlers(
        self: &Arc<Self>,
        registry: &HandlerRegistry,
        window: Arc<dyn UpdateEventSink>,
    ) -> Result<bool, BridgeError> {
        let first = self
            .handlers_registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if first {
            if let Err(error) = self.install_handlers(registry) {
                self.handlers_registered.store(false, Ordering::Release);
                return Err(error);
            }
            tracing::info!("update request handlers registered");
        } else {
            tracing::debug!("update request handlers already registered, rebinding window only");
        }

        self.bind_window(window);
        Ok(first)
    }

    fn install_handlers(self: &Arc<Self>, registry: &HandlerRegistry) -> Result<(), BridgeError> {
        let handlers = BridgeRequest::ALL
            .into_iter()
            .map(|request| {
                let coordinator = self.clone();
                let handler = request_handler(move |args| {
                    let coordinator = coordinator.clone();
                    async move { coordinator.dispatch(request, args).await }
                });
                (request, handler)
            })
            .collect();
        registry.handle_all(handlers)
    }

    async fn dispatch(&self, request: BridgeRequest, args: Value) -> Result<Value, BridgeError> {
        tracing::debug!(channel = request.channel(), "update bridge request");
        let reply = match request {
            BridgeRequest::Check => to_value(&self.check_for_update().await),
            BridgeRequest::Download => to_value(&self.download_update()),
            BridgeRequest::Cancel => to_value(&self.cancel_update()),
            BridgeRequest::Install => to_value(&self.install_update()),
            BridgeRequest::ConfirmInstall => {
                let args: ConfirmInstallArgs =
                    serde_json::from_value(args).map_err(|error| BridgeError::InvalidArguments {
                        channel: request.channel().to_string(),
                        reason: error.to_string(),
                    })?;
                to_value(&self.confirm_install(args.restart_now))
            }
        };
        Ok(reply)
    }
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("phase", &self.phase())
            .field("profile", &self.core.profile)
            .field("handlers_registered", &self.handlers_registered())
            .field("bound_window", &self.bound_window_label())
            .finish()
    }
}

fn deliver<T: Serialize>(window: Option<&dyn UpdateEventSink>, channel: &str, payload: &T) {
    let Some(window) = window else {
        tracing::debug!(channel, "no window bound, dropping update event");
        return;
    };

    if let Err(error) = window.deliver(channel, to_value(payload)) {
        tracing::warn!(window = window.label(), channel, %error, "failed to deliver update event");
    }
}

impl CoordinatorCore {
    fn publish(&self, event: TransportEvent) {
        self.transport.events().emit(&event);
    }

    fn attach_listeners(&self, window: Option<Arc<dyn UpdateEventSink>>) {
        let events = self.transport.events();
        for kind in TransportEventKind::ALL {
            events.remove_all_listeners(kind);
        }

        for kind in TransportEventKind::ALL {
            let me = self.me.clone();
            let window = window.clone();
            events.on(
                kind,
                Arc::new(move |event| {
                    if let Some(core) = me.upgrade() {
                        core.on_transport_event(window.as_deref(), event);
                    }
                }),
            );
        }
    }

    fn on_transport_event(&self, window: Option<&dyn UpdateEventSink>, event: &TransportEvent) {
        let channel = event_channel(event.kind());
        match event {
            TransportEvent::Available(release) => {
                let payload = AvailablePayload {
                    version: release.version.clone(),
                    release_notes: release.notes_text(),
                };
                deliver(window, channel, &payload);
            }
            TransportEvent::NotAvailable => {
                deliver(window, channel, &Value::Null);
            }
            TransportEvent::Progress(progress) => {
                if let Some(progress) = self.accept_progress(progress) {
                    deliver(window, channel, &progress);
                }
            }
            TransportEvent::Downloaded(release) => {
                if !self.accept_downloaded(release) {
                    return;
                }
                let payload = DownloadedPayload {
                    version: release.version.clone(),
                    release_notes: release.notes_text(),
                };
                deliver(window, channel, &payload);
                self.ask_for_restart(&release.version);
            }
            TransportEvent::Error(message) => {
                let message = if message.trim().is_empty() {
                    GENERIC_UPDATE_FAILURE_MESSAGE.to_string()
                } else {
                    message.clone()
                };
                let aborted_transfer = self.enter_error(&message);
                deliver(
                    window,
                    channel,
                    &ErrorPayload {
                        message: message.clone(),
                    },
                );
                self.leave_error();
                if aborted_transfer {
                    if let Some(prompter) = &self.prompter {
                        prompter.notify_failure(&message);
                    }
                }
            }
        }
    }

    fn accept_progress(&self, progress: &DownloadProgress) -> Option<DownloadProgress> {
        let mut session = lock_or_recover(&self.session);
        if session.phase != UpdatePhase::Downloading {
            tracing::debug!(phase = ?session.phase, "dropping progress outside a download");
            return None;
        }

        let percent = if progress.percent.is_finite() {
            progress.percent.clamp(0.0, 100.0)
        } else {
            session.last_percent
        };
        if percent < session.last_percent {
            tracing::debug!(
                percent,
                last = session.last_percent,
                "dropping out-of-order progress"
            );
            return None;
        }

        session.last_percent = percent;
        Some(DownloadProgress {
            percent,
            transferred: progress.transferred,
            total: progress.total,
        })
    }

    fn accept_downloaded(&self, release: &RemoteRelease) -> bool {
        let mut session = lock_or_recover(&self.session);
        if session.phase != UpdatePhase::Downloading {
            tracing::debug!(phase = ?session.phase, "dropping downloaded outside a download");
            return false;
        }

        session.phase = UpdatePhase::Downloaded {
            version: release.version.clone(),
        };
        session.phase_before_download = None;
        session.download = None;
        tracing::info!(version = %release.version, "update downloaded");
        true
    }

    /// Returns whether the error aborted a download or an install.
    fn enter_error(&self, message: &str) -> bool {
        let mut session = lock_or_recover(&self.session);
        if matches!(session.phase, UpdatePhase::Downloaded { .. }) {
            tracing::warn!(%message, "update error while an update is staged");
            return false;
        }

        let aborted_transfer = session.phase.is_transfer();
        tracing::warn!(%message, phase = ?session.phase, "update error");
        session.phase = UpdatePhase::Error {
            message: message.to_string(),
        };
        session.phase_before_download = None;
        if let Some(download) = session.download.take() {
            download.abort();
        }
        session.generation += 1;
        aborted_transfer
    }

    fn leave_error(&self) {
        let mut session = lock_or_recover(&self.session);
        if matches!(session.phase, UpdatePhase::Error { .. }) {
            session.phase = UpdatePhase::Idle;
        }
    }

    fn ask_for_restart(&self, version: &str) {
        let Some(prompter) = &self.prompter else {
            return;
        };

        let me = self.me.clone();
        prompter.confirm_restart(
            version,
            Box::new(move |restart_now| {
                if let Some(core) = me.upgrade() {
                    core.confirm_install(restart_now);
                }
            }),
        );
    }

    async fn run_check(&self, origin: CheckOrigin) -> UpdateCheckResult {
        if !self.profile.is_packaged() {
            tracing::info!(?origin, "skipping update check in development build");
            return UpdateCheckResult::skipped(DEVELOPMENT_SKIP_MESSAGE);
        }

        let tracks_phase = {
            let mut session = lock_or_recover(&self.session);
            if session.phase.accepts_check() {
                session.phase = UpdatePhase::Checking;
                true
            } else {
                false
            }
        };
        if !tracks_phase && origin == CheckOrigin::Background {
            tracing::debug!(phase = ?self.phase(), "update session busy, skipping background check");
            return UpdateCheckResult::up_to_date();
        }

        tracing::info!(?origin, current_version = %self.current_version, "checking for updates");
        match self.transport.check_for_updates().await {
            Ok(Some(release))
                if is_newer_release(
                    &self.current_version,
                    &release.version,
                    self.config.allow_prerelease,
                ) =>
            {
                let notes = release.notes_text();
                tracing::info!(version = %release.version, "update available");
                let settled = tracks_phase
                    && self.settle_check(UpdatePhase::UpdateAvailable {
                        version: release.version.clone(),
                    });
                let version = release.version.clone();
                self.publish(TransportEvent::Available(release));
                if settled && self.config.auto_download {
                    self.start_download();
                }
                UpdateCheckResult::available(version, notes)
            }
            Ok(_) => {
                tracing::info!("no newer version available");
                if tracks_phase {
                    self.settle_check(UpdatePhase::UpToDate);
                }
                self.publish(TransportEvent::NotAvailable);
                UpdateCheckResult::up_to_date()
            }
            Err(error) => {
                let message = error.user_message();
                tracing::warn!(?origin, %error, "update check failed");
                match origin {
                    CheckOrigin::Explicit => {
                        if tracks_phase
                            && self.settle_check(UpdatePhase::Error {
                                message: message.clone(),
                            })
                        {
                            self.leave_error();
                        }
                    }
                    CheckOrigin::Background => {
                        if self.settle_check(UpdatePhase::Error {
                            message: message.clone(),
                        }) {
                            self.publish(TransportEvent::Error(message.clone()));
                        }
                    }
                }
                UpdateCheckResult::failed(message)
            }
        }
    }

    /// Records the outcome of a check unless another operation moved the phase meanwhile.
    fn settle_check(&self, outcome: UpdatePhase) -> bool {
        let mut session = lock_or_recover(&self.session);
        if session.phase != UpdatePhase::Checking {
            tracing::debug!(phase = ?session.phase, ?outcome, "phase moved during check, keeping it");
            return false;
        }
        tracing::debug!(to = ?outcome, "update check settled");
        session.phase = outcome;
        true
    }

    fn phase(&self) -> UpdatePhase {
        lock_or_recover(&self.session).phase.clone()
    }

    fn start_download(&self) -> RequestAck {
        let (registration, generation) = {
            let mut session = lock_or_recover(&self.session);
            match &session.phase {
                UpdatePhase::Downloading => return RequestAck::ok_with(DOWNLOAD_IN_PROGRESS_MESSAGE),
                UpdatePhase::Downloaded { .. } => return RequestAck::ok_with(DOWNLOAD_READY_MESSAGE),
                UpdatePhase::Installing => return RequestAck::rejected(INSTALL_IN_PROGRESS_MESSAGE),
                UpdatePhase::Checking => return RequestAck::rejected(CHECK_IN_PROGRESS_MESSAGE),
                _ => {}
            }

            let (handle, registration) = AbortHandle::new_pair();
            let previous = std::mem::replace(&mut session.phase, UpdatePhase::Downloading);
            session.phase_before_download = Some(previous);
            session.last_percent = 0.0;
            if let Some(stale) = session.download.replace(handle) {
                stale.abort();
            }
            session.generation += 1;
            (registration, session.generation)
        };

        let Some(core) = self.me.upgrade() else {
            return RequestAck::rejected(GENERIC_UPDATE_FAILURE_MESSAGE);
        };
        tracing::info!(generation, "starting update download");
        (self.spawner)(core.download_task(registration, generation).boxed());
        RequestAck::ok_with(DOWNLOAD_STARTED_MESSAGE)
    }

    async fn download_task(self: Arc<Self>, registration: AbortRegistration, generation: u64) {
        let transport = self.transport.clone();
        let outcome = Abortable::new(transport.download_update(), registration).await;
        self.finish_download(generation, outcome);
    }

    fn finish_download(&self, generation: u64, outcome: Result<Result<(), TransportError>, Aborted>) {
        let current = {
            let mut session = lock_or_recover(&self.session);
            let current = session.generation == generation;
            if current {
                session.download = None;
            }
            current
        };

        match outcome {
            Err(Aborted) => {
                tracing::info!(generation, "update download aborted");
            }
            Ok(Ok(())) => {
                if current && self.phase() == UpdatePhase::Downloading {
                    tracing::warn!(generation, "download finished without a downloaded event");
                }
            }
            Ok(Err(error)) => {
                if current && self.phase() == UpdatePhase::Downloading {
                    self.publish(TransportEvent::Error(
                        error.user_message_or(GENERIC_UPDATE_FAILURE_MESSAGE),
                    ));
                } else {
                    tracing::debug!(generation, %error, "ignoring failure of a stale download");
                }
            }
        }
    }

    fn cancel_download(&self) -> RequestAck {
        let handle = {
            let mut session = lock_or_recover(&self.session);
            if session.phase != UpdatePhase::Downloading {
                return RequestAck::rejected(NO_DOWNLOAD_TO_CANCEL_MESSAGE);
            }

            session.phase = session
                .phase_before_download
                .take()
                .unwrap_or(UpdatePhase::Idle);
            session.last_percent = 0.0;
            session.generation += 1;
            session.download.take()
        };

        if let Some(handle) = handle {
            handle.abort();
        }
        tracing::info!("update download cancelled");
        RequestAck::ok_with(DOWNLOAD_CANCELLED_MESSAGE)
    }

    fn install(&self) -> RequestAck {
        {
            let mut session = lock_or_recover(&self.session);
            match session.phase {
                UpdatePhase::Downloading => {
                    return RequestAck::rejected(DOWNLOAD_NOT_FINISHED_MESSAGE)
                }
                UpdatePhase::Installing => return RequestAck::rejected(INSTALL_IN_PROGRESS_MESSAGE),
                _ => {}
            }
            tracing::debug!(from = ?session.phase, "update phase changed to installing");
            session.phase = UpdatePhase::Installing;
        }
        tracing::info!("quitting to install update");
        if let Err(error) = self.transport.quit_and_install(false, true) {
            tracing::error!(%error, "failed to install update");
            self.publish(TransportEvent::Error(
                error.user_message_or(GENERIC_UPDATE_FAILURE_MESSAGE),
            ));
        }
        RequestAck::ok()
    }

    fn confirm_install(&self, restart_now: bool) -> RequestAck {
        let staged = matches!(self.phase(), UpdatePhase::Downloaded { .. });
        if !staged {
            return RequestAck::rejected(NO_STAGED_UPDATE_MESSAGE);
        }

        if restart_now {
            return self.install();
        }

        tracing::info!("user deferred update installation");
        if self.config.auto_install_on_quit {
            RequestAck::ok_with(INSTALL_DEFERRED_MESSAGE)
        } else {
            RequestAck::ok()
        }
    }

    fn install_on_quit(&self) -> bool {
        if !self.config.auto_install_on_quit {
            return false;
        }
        if !matches!(self.phase(), UpdatePhase::Downloaded { .. }) {
            return false;
        }

        match self.transport.install_on_quit() {
            Ok(installed) => {
                tracing::info!(installed, "applied staged update on quit");
                installed
            }
            Err(error) => {
                tracing::error!(%error, "failed to apply staged update on quit");
                false
            }
        }
    }
}
