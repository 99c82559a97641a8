//! Supervisor
//!
//! Owns the worker tasks and the command loop. Operator commands arrive
//! over a channel and are applied here; the periodic sweep keeps the
//! response cache from growing while no camera is asking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use camera_capture::FrameSource;
use dispatch::{Backend, DispatchController};
use plate_tracker::{Panel, PauseGate, Recognizer};
use storage::Repository;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{MonitorCommand, MonitorStatus, PanelStatus};
use crate::worker::{CameraWorker, WorkerExit};

/// Interval of the background cache sweep
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub struct Monitor<B> {
    controller: DispatchController<B>,
    gate: PauseGate,
    ledger: Arc<Repository>,
    commands: mpsc::Receiver<MonitorCommand>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<WorkerExit>>,
    sweep_interval: Duration,
    /// Stop once every worker has finished
    exit_when_idle: bool,
}

impl<B: Backend> Monitor<B> {
    pub fn new(
        controller: DispatchController<B>,
        gate: PauseGate,
        ledger: Arc<Repository>,
        commands: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            controller,
            gate,
            ledger,
            commands,
            shutdown,
            workers: Vec::new(),
            sweep_interval: SWEEP_INTERVAL,
            exit_when_idle: false,
        }
    }

    pub fn exit_when_idle(mut self, enabled: bool) -> Self {
        self.exit_when_idle = enabled;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Receiver that flips to true when the monitor shuts down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn spawn_worker<S, R>(&mut self, worker: CameraWorker<S, R, B>)
    where
        S: FrameSource + 'static,
        R: Recognizer + 'static,
    {
        info!("Spawning worker for camera {} ({})", worker.camera(), worker.panel());
        let shutdown = self.shutdown.subscribe();
        self.workers.push(tokio::spawn(worker.run(shutdown)));
    }

    pub fn workers_running(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            panels: self
                .gate
                .snapshot()
                .into_iter()
                .map(|(panel, paused)| PanelStatus { panel, paused })
                .collect(),
            dispatch: self.controller.stats(Instant::now()),
            ledger_records: self.ledger.len(),
            workers_running: self.workers_running(),
        }
    }

    /// Apply one command. Returns false when the monitor should stop.
    pub fn handle(&mut self, command: MonitorCommand) -> bool {
        match command {
            MonitorCommand::Pause(panel) => {
                self.gate.pause(panel);
            }
            MonitorCommand::Resume(panel) => self.resume(panel),
            MonitorCommand::Rescan(panel) => {
                self.controller.reset_panel(panel);
                self.gate.request_rescan(panel);
                self.resume(panel);
            }
            MonitorCommand::ClearCache { reply } => {
                let cleared = self.controller.clear_cache();
                let _ = reply.send(cleared);
            }
            MonitorCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            MonitorCommand::Shutdown => return false,
        }
        true
    }

    /// Resume confirmations and drop the panel's pending markers so a
    /// fresh scan is not blocked by a call still in flight
    fn resume(&self, panel: Panel) {
        self.gate.resume(panel);
        let released = self.controller.release_pending(panel);
        if released > 0 {
            debug!("Released {} pending dispatches on {}", released, panel);
        }
    }

    /// Serve commands until shutdown, then stop and join every worker
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.controller.sweep(Instant::now());
                    if self.exit_when_idle && self.workers_running() == 0 {
                        info!("All camera workers finished");
                        break;
                    }
                }
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        info!("Stopping {} camera workers", self.workers.len());
        let _ = self.shutdown.send(true);
        for worker in self.workers.drain(..) {
            match worker.await {
                Ok(exit) => debug!("Worker exited: {:?}", exit),
                Err(e) => tracing::warn!("Worker task panicked: {}", e),
            }
        }
    }
}
