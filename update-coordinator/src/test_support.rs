use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::{
    lock_or_recover, BuildProfile, CoordinatorOptions, PrimaryWindow, RemoteRelease,
    TaskSpawner, TransportEmitter, TransportError, TransportEvent, UpdateCoordinator,
    UpdateEventSink, UpdatePrompter, UpdateTransport, UpdaterConfig, WindowBackend,
};

pub(crate) const TEST_CURRENT_VERSION: &str = "1.0.0";

pub(crate) fn tokio_spawner() -> TaskSpawner {
    Arc::new(|task| {
        tokio::spawn(task);
    })
}

pub(crate) fn coordinator_with(
    transport: Arc<StubTransport>,
    profile: BuildProfile,
    prompter: Option<Arc<RecordingPrompter>>,
) -> Arc<UpdateCoordinator> {
    Arc::new(UpdateCoordinator::new(
        transport,
        CoordinatorOptions {
            profile,
            current_version: TEST_CURRENT_VERSION.to_string(),
            config: UpdaterConfig::default(),
            spawner: tokio_spawner(),
            prompter: prompter.map(|prompter| prompter as Arc<dyn UpdatePrompter>),
        },
    ))
}

pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never became true");
}

pub(crate) async fn recv_event(rx: &mut mpsc::UnboundedReceiver<(String, Value)>) -> (String, Value) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for update event")
        .expect("event channel closed")
}

/// Scripted transport: checks return a canned outcome, downloads replay events.
pub(crate) struct StubTransport {
    events: TransportEmitter,
    configured: Mutex<Option<UpdaterConfig>>,
    check_outcome: Mutex<Result<Option<RemoteRelease>, TransportError>>,
    check_calls: AtomicUsize,
    check_gate: Mutex<Option<oneshot::Receiver<()>>>,
    check_release: Mutex<Option<oneshot::Sender<()>>>,
    download_script: Mutex<Vec<TransportEvent>>,
    download_outcome: Mutex<Result<(), TransportError>>,
    download_gate: Mutex<Option<oneshot::Receiver<()>>>,
    held_gate: Mutex<Option<oneshot::Sender<()>>>,
    download_calls: AtomicUsize,
    install_calls: Mutex<Vec<(bool, bool)>>,
    install_outcome: Mutex<Result<(), TransportError>>,
    quit_installs: AtomicUsize,
}

impl StubTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: TransportEmitter::new(),
            configured: Mutex::new(None),
            check_outcome: Mutex::new(Ok(None)),
            check_calls: AtomicUsize::new(0),
            check_gate: Mutex::new(None),
            check_release: Mutex::new(None),
            download_script: Mutex::new(Vec::new()),
            download_outcome: Mutex::new(Ok(())),
            download_gate: Mutex::new(None),
            held_gate: Mutex::new(None),
            download_calls: AtomicUsize::new(0),
            install_calls: Mutex::new(Vec::new()),
            install_outcome: Mutex::new(Ok(())),
            quit_installs: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_check_outcome(&self, outcome: Result<Option<RemoteRelease>, TransportError>) {
        *lock_or_recover(&self.check_outcome) = outcome;
    }

    pub(crate) fn set_download_script(&self, script: Vec<TransportEvent>) {
        *lock_or_recover(&self.download_script) = script;
    }

    pub(crate) fn set_download_outcome(&self, outcome: Result<(), TransportError>) {
        *lock_or_recover(&self.download_outcome) = outcome;
    }

    pub(crate) fn set_install_outcome(&self, outcome: Result<(), TransportError>) {
        *lock_or_recover(&self.install_outcome) = outcome;
    }

    /// Makes the next check wait until [`StubTransport::release_check`].
    pub(crate) fn hold_check(&self) {
        let (tx, rx) = oneshot::channel();
        *lock_or_recover(&self.check_gate) = Some(rx);
        *lock_or_recover(&self.check_release) = Some(tx);
    }

    pub(crate) fn release_check(&self) {
        if let Some(tx) = lock_or_recover(&self.check_release).take() {
            let _ = tx.send(());
        }
    }

    /// Makes the next download hang until the transport is dropped.
    pub(crate) fn hold_download(&self) {
        let (tx, rx) = oneshot::channel();
        *lock_or_recover(&self.download_gate) = Some(rx);
        *lock_or_recover(&self.held_gate) = Some(tx);
    }

    pub(crate) fn configured(&self) -> Option<UpdaterConfig> {
        *lock_or_recover(&self.configured)
    }

    pub(crate) fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn install_calls(&self) -> Vec<(bool, bool)> {
        lock_or_recover(&self.install_calls).clone()
    }

    pub(crate) fn quit_installs(&self) -> usize {
        self.quit_installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateTransport for StubTransport {
    fn configure(&self, config: &UpdaterConfig) {
        *lock_or_recover(&self.configured) = Some(*config);
    }

    fn events(&self) -> &TransportEmitter {
        &self.events
    }

    async fn check_for_updates(&self) -> Result<Option<RemoteRelease>, TransportError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        let gate = lock_or_recover(&self.check_gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        lock_or_recover(&self.check_outcome).clone()
    }

    async fn download_update(&self) -> Result<(), TransportError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let gate = lock_or_recover(&self.download_gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let script = lock_or_recover(&self.download_script).clone();
        for event in &script {
            self.events.emit(event);
        }
        lock_or_recover(&self.download_outcome).clone()
    }

    fn quit_and_install(&self, silent: bool, force_run_after: bool) -> Result<(), TransportError> {
        lock_or_recover(&self.install_calls).push((silent, force_run_after));
        lock_or_recover(&self.install_outcome).clone()
    }

    fn install_on_quit(&self) -> Result<bool, TransportError> {
        self.quit_installs.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Window sink that forwards every delivery into a channel the test drains.
pub(crate) struct RecordingWindow {
    label: String,
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl RecordingWindow {
    pub(crate) fn new(label: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                label: label.to_string(),
                tx,
            }),
            rx,
        )
    }
}

impl UpdateEventSink for RecordingWindow {
    fn label(&self) -> &str {
        &self.label
    }

    fn deliver(&self, channel: &str, payload: Value) -> Result<(), String> {
        self.tx
            .send((channel.to_string(), payload))
            .map_err(|_| format!("window {} is gone", self.label))
    }
}

/// Prompter that records questions and, when configured, answers them immediately.
pub(crate) struct RecordingPrompter {
    answer: Option<bool>,
    asked: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingPrompter {
    pub(crate) fn new(answer: Option<bool>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn asked_versions(&self) -> Vec<String> {
        lock_or_recover(&self.asked).clone()
    }

    pub(crate) fn failures(&self) -> Vec<String> {
        lock_or_recover(&self.failures).clone()
    }
}

impl UpdatePrompter for RecordingPrompter {
    fn confirm_restart(&self, version: &str, respond: Box<dyn FnOnce(bool) + Send>) {
        lock_or_recover(&self.asked).push(version.to_string());
        if let Some(answer) = self.answer {
            respond(answer);
        }
    }

    fn notify_failure(&self, message: &str) {
        lock_or_recover(&self.failures).push(message.to_string());
    }
}

#[derive(Default)]
pub(crate) struct FakeWindowState {
    pub(crate) shows: AtomicUsize,
    pub(crate) focuses: AtomicUsize,
    pub(crate) delivered: Mutex<Vec<(String, Value)>>,
}

#[derive(Clone)]
pub(crate) struct FakeWindow {
    label: String,
    pub(crate) state: Arc<FakeWindowState>,
}

impl FakeWindow {
    pub(crate) fn detached(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Arc::new(FakeWindowState::default()),
        }
    }

    pub(crate) fn delivered_channels(&self) -> Vec<String> {
        lock_or_recover(&self.state.delivered)
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    pub(crate) fn shows(&self) -> usize {
        self.state.shows.load(Ordering::SeqCst)
    }

    pub(crate) fn focuses(&self) -> usize {
        self.state.focuses.load(Ordering::SeqCst)
    }
}

impl UpdateEventSink for FakeWindow {
    fn label(&self) -> &str {
        &self.label
    }

    fn deliver(&self, channel: &str, payload: Value) -> Result<(), String> {
        lock_or_recover(&self.state.delivered).push((channel.to_string(), payload));
        Ok(())
    }
}

impl PrimaryWindow for FakeWindow {
    fn show(&self) -> Result<(), String> {
        self.state.shows.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn focus(&self) -> Result<(), String> {
        self.state.focuses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates `main`, `main-2`, ... and remembers every window it built.
#[derive(Default)]
pub(crate) struct FakeBackend {
    created: Mutex<Vec<FakeWindow>>,
    fail_next: Mutex<bool>,
}

impl FakeBackend {
    pub(crate) fn created(&self) -> Vec<FakeWindow> {
        lock_or_recover(&self.created).clone()
    }

    pub(crate) fn fail_next_creation(&self) {
        *lock_or_recover(&self.fail_next) = true;
    }
}

impl WindowBackend for FakeBackend {
    type Window = FakeWindow;

    fn create_primary_window(&self) -> Result<FakeWindow, String> {
        if std::mem::take(&mut *lock_or_recover(&self.fail_next)) {
            return Err("display unavailable".to_string());
        }

        let mut created = lock_or_recover(&self.created);
        let label = if created.is_empty() {
            "main".to_string()
        } else {
            format!("main-{}", created.len() + 1)
        };
        let window = FakeWindow::detached(&label);
        created.push(window.clone());
        Ok(window)
    }
}
