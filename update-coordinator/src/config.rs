use serde::Serialize;

/// Knobs pushed into the update transport once, when the coordinator is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdaterConfig {
    pub auto_download: bool,
    pub allow_prerelease: bool,
    pub auto_install_on_quit: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            auto_download: false,
            allow_prerelease: false,
            auto_install_on_quit: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildProfile {
    Packaged,
    Development,
}

impl BuildProfile {
    pub fn resolve(override_value: Option<&str>, debug_build: bool) -> Self {
        if let Some(profile) = override_value.and_then(parse_profile_override) {
            return profile;
        }

        if debug_build {
            Self::Development
        } else {
            Self::Packaged
        }
    }

    pub fn is_packaged(self) -> bool {
        matches!(self, Self::Packaged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Packaged => "packaged",
            Self::Development => "development",
        }
    }
}

fn parse_profile_override(raw: &str) -> Option<BuildProfile> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "packaged" | "production" | "release" => Some(BuildProfile::Packaged),
        "development" | "dev" | "debug" => Some(BuildProfile::Development),
        other => parse_bool_flag(other).map(|packaged| {
            if packaged {
                BuildProfile::Packaged
            } else {
                BuildProfile::Development
            }
        }),
    }
}

pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updater_config_defaults_to_manual_download_stable_channel() {
        let config = UpdaterConfig::default();
        assert!(!config.auto_download);
        assert!(!config.allow_prerelease);
        assert!(config.auto_install_on_quit);
    }

    #[test]
    fn build_profile_follows_debug_assertions_without_override() {
        assert_eq!(BuildProfile::resolve(None, true), BuildProfile::Development);
        assert_eq!(BuildProfile::resolve(None, false), BuildProfile::Packaged);
    }

    #[test]
    fn build_profile_override_wins_over_build_kind() {
        assert_eq!(
            BuildProfile::resolve(Some(" Packaged "), true),
            BuildProfile::Packaged
        );
        assert_eq!(
            BuildProfile::resolve(Some("dev"), false),
            BuildProfile::Development
        );
        assert_eq!(BuildProfile::resolve(Some("1"), true), BuildProfile::Packaged);
        assert_eq!(
            BuildProfile::resolve(Some("off"), false),
            BuildProfile::Development
        );
    }

    #[test]
    fn build_profile_ignores_unknown_override() {
        assert_eq!(
            BuildProfile::resolve(Some("staging"), true),
            BuildProfile::Development
        );
    }

    #[test]
    fn parse_bool_flag_rejects_garbage() {
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag("0"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
        assert_eq!(parse_bool_flag(""), None);
    }
}
