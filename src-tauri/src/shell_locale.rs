use crate::app_config::LOCALE_ENV;

pub(crate) const DEFAULT_SHELL_LOCALE: &str = "en-US";

#[derive(Debug, Clone, Copy)]
pub struct ShellTexts {
    pub window_title: &'static str,
    pub update_ready_title: &'static str,
    update_ready_template: &'static str,
    pub update_failed_title: &'static str,
}

impl ShellTexts {
    pub fn update_ready_message(&self, version: &str) -> String {
        self.update_ready_template.replace("{version}", version)
    }
}

pub fn shell_texts_for_locale(locale: &str) -> ShellTexts {
    if locale == "zh-CN" {
        return ShellTexts {
            window_title: "桌面应用",
            update_ready_title: "更新已就绪",
            update_ready_template: "新版本 {version} 已下载完成，是否立即重启并安装？\n选择“否”将在退出应用时安装。",
            update_failed_title: "更新失败",
        };
    }

    ShellTexts {
        window_title: "Desktop App",
        update_ready_title: "Update Ready",
        update_ready_template: "Version {version} has been downloaded. Restart now to install it?\nChoose \"No\" to install it when the app quits.",
        update_failed_title: "Update Failed",
    }
}

pub(crate) fn resolve_shell_locale<F>(lookup: &F) -> &'static str
where
    F: Fn(&str) -> Option<String>,
{
    for env_key in [LOCALE_ENV, "LC_ALL", "LANG"] {
        if let Some(value) = lookup(env_key) {
            if let Some(locale) = normalize_shell_locale(&value) {
                return locale;
            }
        }
    }

    DEFAULT_SHELL_LOCALE
}

pub(crate) fn normalize_shell_locale(raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw == "zh-CN" {
        return Some("zh-CN");
    }
    if raw == "en-US" {
        return Some("en-US");
    }

    let lowered = raw.to_ascii_lowercase();
    if lowered.starts_with("zh") {
        return Some("zh-CN");
    }
    if lowered.starts_with("en") {
        return Some("en-US");
    }
    None
}
