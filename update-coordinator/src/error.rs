//! Error types shared by the coordinator, the bridge and the window host.

use thiserror::Error;

/// Shown when a failure carries no usable text of its own.
pub const GENERIC_CHECK_FAILURE_MESSAGE: &str =
    "Update check failed, please check your network connection.";
pub const GENERIC_UPDATE_FAILURE_MESSAGE: &str = "Update failed.";

/// Failures reported by the update transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0}")]
    Network(String),
    #[error("malformed update response: {0}")]
    MalformedResponse(String),
    #[error("no update has been found yet, check for updates first")]
    NoPendingUpdate,
    #[error("{0}")]
    Download(String),
    #[error("{0}")]
    Install(String),
    #[error("updater unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Text for the user, falling back to `fallback` when the error has none.
    pub fn user_message_or(&self, fallback: &str) -> String {
        let raw = match self {
            Self::Network(message)
            | Self::Download(message)
            | Self::Install(message) => message.trim().to_string(),
            other => other.to_string(),
        };

        if raw.is_empty() {
            fallback.to_string()
        } else {
            raw
        }
    }

    pub fn user_message(&self) -> String {
        self.user_message_or(GENERIC_CHECK_FAILURE_MESSAGE)
    }
}

/// Failures of the request table that sits between the UI and the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("a handler is already registered for '{channel}'")]
    DuplicateHandler { channel: String },
    #[error("'{channel}' is not an update bridge channel")]
    UnknownChannel { channel: String },
    #[error("no handler registered for '{channel}'")]
    NoHandler { channel: String },
    #[error("invalid arguments for '{channel}': {reason}")]
    InvalidArguments { channel: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("failed to create primary window: {0}")]
    WindowCreation(String),
}
