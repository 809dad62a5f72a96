//! Auto-update coordination for the desktop shell.
//!
//! The crate has no GUI dependency: the shell plugs a concrete update
//! transport, window backend and restart prompter into the traits defined
//! here, and the coordinator drives the check, download and install flow.

mod bridge;
mod config;
mod coordinator;
mod error;
mod transport;
mod transport_events;
mod window_host;

#[cfg(test)]
mod test_support;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use bridge::{
    event_channel, request_handler, AvailablePayload, BridgeRequest, ConfirmInstallArgs,
    DownloadedPayload, ErrorPayload, HandlerRegistry, RequestAck, RequestHandler,
    UpdateCheckResult, UPDATE_AVAILABLE_EVENT, UPDATE_BRIDGE_SCRIPT, UPDATE_CANCEL_CHANNEL,
    UPDATE_CHECK_CHANNEL, UPDATE_CONFIRM_INSTALL_CHANNEL, UPDATE_DOWNLOADED_EVENT,
    UPDATE_DOWNLOAD_CHANNEL, UPDATE_ERROR_EVENT, UPDATE_INSTALL_CHANNEL,
    UPDATE_NOT_AVAILABLE_EVENT, UPDATE_PROGRESS_EVENT,
};
pub use config::{parse_bool_flag, BuildProfile, UpdaterConfig};
pub use coordinator::{
    CoordinatorOptions, TaskSpawner, UpdateCoordinator, UpdateEventSink, UpdatePhase,
    UpdatePrompter, CHECK_IN_PROGRESS_MESSAGE, DEVELOPMENT_SKIP_MESSAGE,
    DOWNLOAD_CANCELLED_MESSAGE, DOWNLOAD_IN_PROGRESS_MESSAGE, DOWNLOAD_NOT_FINISHED_MESSAGE,
    DOWNLOAD_READY_MESSAGE, DOWNLOAD_STARTED_MESSAGE, INSTALL_DEFERRED_MESSAGE,
    INSTALL_IN_PROGRESS_MESSAGE, NO_DOWNLOAD_TO_CANCEL_MESSAGE, NO_STAGED_UPDATE_MESSAGE,
};
pub use error::{
    BridgeError, HostError, TransportError, GENERIC_CHECK_FAILURE_MESSAGE,
    GENERIC_UPDATE_FAILURE_MESSAGE,
};
pub use transport::{
    is_newer_release, normalize_release_notes, DownloadProgress, ReleaseNotes, RemoteRelease,
    UpdateTransport, NO_RELEASE_NOTES_PLACEHOLDER,
};
pub use transport_events::{
    TransportEmitter, TransportEvent, TransportEventKind, TransportListener,
};
pub use window_host::{PrimaryWindow, WindowBackend, WindowHost, WindowPresence};

// A panicking listener must not wedge the update flow for the rest of the process.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
