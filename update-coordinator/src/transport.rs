use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{transport_events::TransportEmitter, TransportError, UpdaterConfig};

pub const NO_RELEASE_NOTES_PLACEHOLDER: &str = "No release notes provided.";

/// Release notes as update servers publish them: one blob or one line per entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReleaseNotes {
    Text(String),
    Entries(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRelease {
    pub version: String,
    #[serde(default)]
    pub release_notes: Option<ReleaseNotes>,
}

impl RemoteRelease {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            release_notes: None,
        }
    }

    pub fn with_notes(mut self, notes: ReleaseNotes) -> Self {
        self.release_notes = Some(notes);
        self
    }

    pub fn notes_text(&self) -> String {
        normalize_release_notes(self.release_notes.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
}

impl DownloadProgress {
    /// Builds a progress sample from byte counters; `total == 0` means unknown size.
    pub fn from_bytes(transferred: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (transferred as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };
        Self {
            percent,
            transferred,
            total,
        }
    }
}

pub fn normalize_release_notes(notes: Option<&ReleaseNotes>) -> String {
    let joined = match notes {
        Some(ReleaseNotes::Text(text)) => text.clone(),
        Some(ReleaseNotes::Entries(entries)) => entries.join("\n"),
        None => String::new(),
    };

    if joined.trim().is_empty() {
        NO_RELEASE_NOTES_PLACEHOLDER.to_string()
    } else {
        joined
    }
}

fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

/// Whether `remote` should be offered to a build running `current`.
pub fn is_newer_release(current: &str, remote: &str, allow_prerelease: bool) -> bool {
    match (parse_version(current), parse_version(remote)) {
        (Some(current), Some(remote)) => {
            if !allow_prerelease && !remote.pre.is_empty() {
                return false;
            }
            remote > current
        }
        _ => {
            let remote = remote.trim();
            !remote.is_empty() && remote != current.trim()
        }
    }
}

/// The mechanism that actually talks to the release server.
///
/// `download_update` must publish `Progress` and `Downloaded` on [`events`]
/// while it runs; the coordinator publishes everything else itself.
///
/// [`events`]: UpdateTransport::events
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    fn configure(&self, config: &UpdaterConfig);

    fn events(&self) -> &TransportEmitter;

    /// Latest release the server offers, `None` when it offers nothing new.
    async fn check_for_updates(&self) -> Result<Option<RemoteRelease>, TransportError>;

    async fn download_update(&self) -> Result<(), TransportError>;

    fn quit_and_install(&self, silent: bool, force_run_after: bool) -> Result<(), TransportError>;

    /// Applies a staged update while the app exits. `Ok(false)` when nothing is staged.
    fn install_on_quit(&self) -> Result<bool, TransportError> {
        Ok(false)
    }
}
