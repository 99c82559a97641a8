//! Shared fakes for monitor tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camera_capture::VideoFrame;
use dispatch::{Backend, BackendReply, CheckRequest, DispatchConfig, DispatchController, DispatchError};
use notification::NullNotifier;
use plate_tracker::{PauseGate, RecognitionError, Recognizer};
use storage::Repository;
use tokio::sync::mpsc;

use crate::events::MonitorEvent;
use crate::reporter::Reporter;
use crate::worker::{SnapshotSettings, WorkerContext};

/// Backend answering from a script, then with a default success
#[derive(Clone, Default)]
pub struct StubBackend {
    replies: Arc<Mutex<VecDeque<Result<BackendReply, DispatchError>>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl StubBackend {
    pub fn failing(reason: &str) -> Self {
        let backend = Self::default();
        backend
            .replies
            .lock()
            .unwrap()
            .push_back(Err(DispatchError::Transport(reason.to_string())));
        backend
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Backend for StubBackend {
    async fn check_vehicle(&self, _request: &CheckRequest) -> Result<BackendReply, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(BackendReply {
                status: 200,
                body: r#"{"message":"Welcome","approved":true}"#.to_string(),
            })
        })
    }
}

/// Recognizer reporting whatever plates the test currently shows
#[derive(Clone, Default)]
pub struct SharedRecognizer {
    plates: Arc<Mutex<Vec<String>>>,
    fatal: Arc<Mutex<Option<String>>>,
}

impl SharedRecognizer {
    pub fn show(&self, plates: &[&str]) {
        *self.plates.lock().unwrap() = plates.iter().map(|p| p.to_string()).collect();
    }

    pub fn fail(&self, reason: &str) {
        *self.fatal.lock().unwrap() = Some(reason.to_string());
    }
}

impl Recognizer for SharedRecognizer {
    fn recognize(&mut self, _frame: &VideoFrame) -> Result<Vec<String>, RecognitionError> {
        if let Some(reason) = self.fatal.lock().unwrap().clone() {
            return Err(RecognitionError::ModelUnavailable(reason));
        }
        Ok(self.plates.lock().unwrap().clone())
    }
}

pub fn context(backend: StubBackend) -> WorkerContext<StubBackend> {
    context_with_ledger(backend, Arc::new(Repository::default()))
}

pub fn context_with_ledger(backend: StubBackend, ledger: Arc<Repository>) -> WorkerContext<StubBackend> {
    WorkerContext {
        controller: DispatchController::new(backend, DispatchConfig::default()),
        gate: PauseGate::new(),
        ledger,
        min_dwell: Duration::from_secs(3),
        snapshot: SnapshotSettings {
            max_side: 120,
            quality: 5,
        },
    }
}

pub fn reporter(gate: &PauseGate) -> (Reporter, mpsc::UnboundedReceiver<MonitorEvent>) {
    review_reporter(gate, true)
}

pub fn review_reporter(
    gate: &PauseGate,
    pause_on_outcome: bool,
) -> (Reporter, mpsc::UnboundedReceiver<MonitorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Reporter::new("gate-1", gate.clone(), pause_on_outcome, tx, Arc::new(NullNotifier)),
        rx,
    )
}

/// Everything published so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
