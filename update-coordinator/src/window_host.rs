use std::sync::{Arc, Mutex};

use crate::{lock_or_recover, HandlerRegistry, HostError, UpdateCoordinator, UpdateEventSink};

pub trait PrimaryWindow: UpdateEventSink + Clone + 'static {
    fn show(&self) -> Result<(), String>;

    fn focus(&self) -> Result<(), String>;
}

pub trait WindowBackend: Send + Sync {
    type Window: PrimaryWindow;

    fn create_primary_window(&self) -> Result<Self::Window, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPresence {
    Created,
    Focused,
}

struct PrimarySlot<W> {
    window: W,
    ready: bool,
}

/// Owns the single primary window and hooks the coordinator up once it is ready.
pub struct WindowHost<B: WindowBackend> {
    backend: B,
    coordinator: Arc<UpdateCoordinator>,
    registry: Arc<HandlerRegistry>,
    startup_check: bool,
    primary: Mutex<Option<PrimarySlot<B::Window>>>,
}

fn reveal_window<W: PrimaryWindow>(window: &W) {
    if let Err(error) = window.show() {
        tracing::warn!(window = window.label(), %error, "failed to show primary window");
    }
    if let Err(error) = window.focus() {
        tracing::warn!(window = window.label(), %error, "failed to focus primary window");
    }
}

impl<B: WindowBackend> WindowHost<B> {
    pub fn new(
        backend: B,
        coordinator: Arc<UpdateCoordinator>,
        registry: Arc<HandlerRegistry>,
        startup_check: bool,
    ) -> Self {
        Self {
            backend,
            coordinator,
            registry,
            startup_check,
            primary: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<UpdateCoordinator> {
        &self.coordinator
    }

    pub fn primary_label(&self) -> Option<String> {
        lock_or_recover(&self.primary)
            .as_ref()
            .map(|slot| slot.window.label().to_string())
    }

    pub fn create_or_focus(&self) -> Result<WindowPresence, HostError> {
        let mut primary = lock_or_recover(&self.primary);
        if let Some(slot) = primary.as_ref() {
            let window = slot.window.clone();
            drop(primary);
            tracing::info!(window = window.label(), "primary window exists, focusing it");
            reveal_window(&window);
            return Ok(WindowPresence::Focused);
        }

        let window = self
            .backend
            .create_primary_window()
            .map_err(HostError::WindowCreation)?;
        tracing::info!(window = window.label(), "primary window created");
        *primary = Some(PrimarySlot {
            window,
            ready: false,
        });
        Ok(WindowPresence::Created)
    }

    /// Handles the window's ready-to-show signal. Only the first signal of the
    /// current primary window counts; returns whether it was acted on.
    pub fn on_window_ready(&self, window: &B::Window) -> bool {
        {
            let mut primary = lock_or_recover(&self.primary);
            let Some(slot) = primary.as_mut() else {
                tracing::debug!(window = window.label(), "ready signal without a primary window");
                return false;
            };
            if slot.window.label() != window.label() || slot.ready {
                return false;
            }
            slot.ready = true;
        }

        if let Err(error) = window.show() {
            tracing::warn!(window = window.label(), %error, "failed to show primary window");
        }

        if let Err(error) = self
            .coordinator
            .register_handlers(&self.registry, Arc::new(window.clone()))
        {
            tracing::error!(%error, "failed to register update handlers");
        }

        if self.coordinator.profile().is_packaged() && self.startup_check {
            tracing::info!("primary window ready, running startup update check");
            self.coordinator.spawn_background_check();
        }
        true
    }

    pub fn on_window_closed(&self, label: &str) -> bool {
        let closed = {
            let mut primary = lock_or_recover(&self.primary);
            match primary.as_ref() {
                Some(slot) if slot.window.label() == label => {
                    *primary = None;
                    true
                }
                _ => false,
            }
        };

        if closed {
            self.coordinator.unbind_window(label);
            tracing::info!(window = label, "primary window closed");
        }
        closed
    }
}
