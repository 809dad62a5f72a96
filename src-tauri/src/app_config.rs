use std::{env, path::PathBuf};

use update_coordinator::{parse_bool_flag, BuildProfile, UpdaterConfig};

use crate::shell_locale;

pub(crate) const PROFILE_ENV: &str = "UPDATE_SHELL_PROFILE";
pub(crate) const STARTUP_CHECK_ENV: &str = "UPDATE_SHELL_STARTUP_CHECK";
pub(crate) const LOCALE_ENV: &str = "UPDATE_SHELL_LOCALE";
pub(crate) const LOG_DIR_ENV: &str = "UPDATE_SHELL_LOG_DIR";

#[derive(Debug, Clone)]
pub(crate) struct ShellConfig {
    pub(crate) profile: BuildProfile,
    pub(crate) startup_check: bool,
    pub(crate) locale: &'static str,
    pub(crate) log_dir: Option<PathBuf>,
    pub(crate) updater: UpdaterConfig,
}

impl ShellConfig {
    pub(crate) fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = BuildProfile::resolve(
            lookup(PROFILE_ENV).as_deref(),
            cfg!(debug_assertions),
        );
        let startup_check = lookup(STARTUP_CHECK_ENV)
            .as_deref()
            .and_then(parse_bool_flag)
            .unwrap_or(true);
        let locale = shell_locale::resolve_shell_locale(&lookup);
        let log_dir = lookup(LOG_DIR_ENV)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Self {
            profile,
            startup_check,
            locale,
            log_dir,
            updater: UpdaterConfig::default(),
        }
    }
}
