use std::sync::{Arc, Mutex};

use crate::{lock_or_recover, DownloadProgress, RemoteRelease};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Available(RemoteRelease),
    NotAvailable,
    Progress(DownloadProgress),
    Downloaded(RemoteRelease),
    Error(String),
}

impl TransportEvent {
    pub fn kind(&self) -> TransportEventKind {
        match self {
            Self::Available(_) => TransportEventKind::Available,
            Self::NotAvailable => TransportEventKind::NotAvailable,
            Self::Progress(_) => TransportEventKind::Progress,
            Self::Downloaded(_) => TransportEventKind::Downloaded,
            Self::Error(_) => TransportEventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    Available,
    NotAvailable,
    Progress,
    Downloaded,
    Error,
}

impl TransportEventKind {
    pub const ALL: [TransportEventKind; 5] = [
        TransportEventKind::Available,
        TransportEventKind::NotAvailable,
        TransportEventKind::Progress,
        TransportEventKind::Downloaded,
        TransportEventKind::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::NotAvailable => "not-available",
            Self::Progress => "progress",
            Self::Downloaded => "downloaded",
            Self::Error => "error",
        }
    }
}

pub type TransportListener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Named listener table owned by a transport.
///
/// Listeners run synchronously on the emitting task, in registration order,
/// and outside the table lock so a listener may touch the table itself.
#[derive(Default)]
pub struct TransportEmitter {
    listeners: Mutex<Vec<(TransportEventKind, TransportListener)>>,
}

impl TransportEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: TransportEventKind, listener: TransportListener) {
        lock_or_recover(&self.listeners).push((kind, listener));
    }

    pub fn remove_all_listeners(&self, kind: TransportEventKind) -> usize {
        let mut listeners = lock_or_recover(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != kind);
        before - listeners.len()
    }

    pub fn listener_count(&self, kind: TransportEventKind) -> usize {
        lock_or_recover(&self.listeners)
            .iter()
            .filter(|(registered, _)| *registered == kind)
            .count()
    }

    /// Returns how many listeners saw the event.
    pub fn emit(&self, event: &TransportEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<TransportListener> = lock_or_recover(&self.listeners)
            .iter()
            .filter(|(registered, _)| *registered == kind)
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }
}

impl std::fmt::Debug for TransportEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(&'static str, usize)> = TransportEventKind::ALL
            .iter()
            .map(|kind| (kind.name(), self.listener_count(*kind)))
            .collect();
        f.debug_struct("TransportEmitter")
            .field("listeners", &counts)
            .finish()
    }
}
