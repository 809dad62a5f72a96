use std::sync::Arc;

use tauri::{webview::PageLoadEvent, AppHandle, Manager, RunEvent, WindowEvent};
use update_coordinator::{
    CoordinatorOptions, HandlerRegistry, TaskSpawner, UpdateCoordinator, UpdatePrompter,
    WindowHost,
};

use crate::{
    logging, shell_locale, update_prompt::DialogPrompter, window_actions, ShellConfig,
    ShellState, TauriUpdateTransport, MAIN_WINDOW_LABEL,
};

fn tauri_spawner() -> TaskSpawner {
    Arc::new(|task| {
        tauri::async_runtime::spawn(task);
    })
}

fn focus_primary_window(app_handle: &AppHandle) {
    let Some(state) = app_handle.try_state::<ShellState>() else {
        tracing::warn!("primary window requested before the shell finished setup");
        return;
    };

    match state.host.create_or_focus() {
        Ok(presence) => tracing::info!(?presence, "primary window requested"),
        Err(error) => tracing::error!(%error, "failed to create or focus primary window"),
    }
}

pub(crate) fn run() {
    let config = ShellConfig::from_env();

    tauri::Builder::default()
        // 必须最先注册，第二个实例才能在其他插件初始化前被拦截
        .plugin(tauri_plugin_single_instance::init(|app, args, _cwd| {
            tracing::info!(?args, "second instance launched");
            focus_primary_window(app);
        }))
        .plugin(tauri_plugin_updater::Builder::new().build())
        .plugin(tauri_plugin_dialog::init())
        .invoke_handler(tauri::generate_handler![
            crate::desktop_bridge_commands::update_bridge_is_desktop_runtime,
            crate::desktop_bridge_commands::update_bridge_invoke,
        ])
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                let app_handle = window.app_handle();
                if let Some(state) = app_handle.try_state::<ShellState>() {
                    state.host.on_window_closed(window.label());
                }
            }
        })
        .on_page_load(|webview, payload| {
            if !matches!(payload.event(), PageLoadEvent::Finished) {
                return;
            }
            if webview.label() != MAIN_WINDOW_LABEL {
                return;
            }

            tracing::debug!(url = %payload.url(), "page-load finished");
            let app_handle = webview.app_handle();
            let Some(state) = app_handle.try_state::<ShellState>() else {
                return;
            };
            match window_actions::MainWindow::from_app(app_handle, webview.label()) {
                Some(window) => {
                    state.host.on_window_ready(&window);
                }
                None => tracing::warn!(
                    window = webview.label(),
                    "page loaded but its window is not registered"
                ),
            }
        })
        .setup(move |app| {
            let app_handle = app.handle().clone();
            let log_dir = config
                .log_dir
                .clone()
                .or_else(|| app_handle.path().app_log_dir().ok());
            let log_path = logging::init_logging(log_dir);

            let current_version = app_handle.package_info().version.to_string();
            tracing::info!(
                log_path = %log_path.display(),
                profile = config.profile.as_str(),
                locale = config.locale,
                startup_check = config.startup_check,
                %current_version,
                "desktop process starting"
            );

            let texts = shell_locale::shell_texts_for_locale(config.locale);
            let prompter: Arc<dyn UpdatePrompter> =
                Arc::new(DialogPrompter::new(app_handle.clone(), texts));
            let coordinator = Arc::new(UpdateCoordinator::new(
                Arc::new(TauriUpdateTransport::new(app_handle.clone())),
                CoordinatorOptions {
                    profile: config.profile,
                    current_version,
                    config: config.updater,
                    spawner: tauri_spawner(),
                    prompter: Some(prompter),
                },
            ));

            let registry = Arc::new(HandlerRegistry::new());
            let host = Arc::new(WindowHost::new(
                window_actions::TauriWindowBackend::new(app_handle.clone(), texts.window_title),
                coordinator,
                registry.clone(),
                config.startup_check,
            ));
            app.manage(ShellState {
                host: host.clone(),
                registry,
            });

            host.create_or_focus()?;
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| match event {
            RunEvent::Exit => {
                if let Some(state) = app_handle.try_state::<ShellState>() {
                    let installed = state.coordinator().handle_app_quit();
                    tracing::info!(installed, "desktop process exiting");
                }
            }
            #[cfg(target_os = "macos")]
            RunEvent::Reopen { .. } => focus_primary_window(app_handle),
            _ => {}
        });
}
