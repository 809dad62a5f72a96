use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::{
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub(crate) const DESKTOP_LOG_FILE: &str = "desktop.log";
const DEFAULT_LOG_FILTER: &str = "info";

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

pub fn resolve_desktop_log_path(log_dir: Option<PathBuf>, log_file_name: &str) -> PathBuf {
    match log_dir {
        Some(dir) => dir.join(log_file_name),
        None => std::env::temp_dir().join("update-shell").join(log_file_name),
    }
}

fn open_log_file(path: &Path) -> Result<File, String> {
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir).map_err(|error| {
            format!(
                "Failed to create log directory {}: {}",
                parent_dir.display(),
                error
            )
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|error| format!("Failed to open log file {}: {}", path.display(), error))
}

/// Installs the global subscriber: stderr plus an append-only `desktop.log`.
///
/// A log file that cannot be opened downgrades to stderr only.
pub(crate) fn init_logging(log_dir: Option<PathBuf>) -> PathBuf {
    let log_path = resolve_desktop_log_path(log_dir, DESKTOP_LOG_FILE);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimer);

    let (file_layer, file_error) = match open_log_file(&log_path) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_timer(LocalTimer),
            ),
            None,
        ),
        Err(error) => (None, Some(error)),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if let Err(error) = installed {
        eprintln!("failed to install log subscriber: {error}");
    }
    if let Some(error) = file_error {
        tracing::warn!(%error, "desktop log file unavailable, logging to stderr only");
    }
    log_path
}
