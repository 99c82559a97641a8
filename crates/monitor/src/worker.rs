//! Camera worker
//!
//! One per camera. Pulls frames, runs recognition and confirmation on its
//! own loop, and hands confirmations to the shared dispatch controller.
//! Network calls run on detached tasks; the frame loop never waits on them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use camera_capture::{CameraError, FrameSource, VideoFrame};
use chrono::Utc;
use dispatch::{Backend, CooldownTracker, DispatchController, DispatchRequest, Submission};
use metrics::counter;
use plate_tracker::{
    read_plates, Panel, PauseGate, PlateConfirmationTracker, PlateReadout, PlateText, RecognitionError,
    Recognizer,
};
use storage::SightingLedger;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::reporter::Reporter;

/// Snapshot settings for the backend image payload
#[derive(Debug, Clone, Copy)]
pub struct SnapshotSettings {
    pub max_side: u32,
    pub quality: u8,
}

/// Collaborators shared by every worker
pub struct WorkerContext<B> {
    pub controller: DispatchController<B>,
    pub gate: PauseGate,
    pub ledger: Arc<dyn SightingLedger>,
    pub min_dwell: Duration,
    pub snapshot: SnapshotSettings,
}

impl<B> Clone for WorkerContext<B> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            gate: self.gate.clone(),
            ledger: Arc::clone(&self.ledger),
            min_dwell: self.min_dwell,
            snapshot: self.snapshot,
        }
    }
}

/// How a worker's loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Source exhausted
    EndOfStream,
    /// Shutdown requested
    Shutdown,
    /// Frame source or recognizer failed; not retried
    Failed(String),
}

/// Frame source and recognizer, lent to the blocking pool once per frame
struct Devices<S, R> {
    source: S,
    recognizer: R,
}

pub struct CameraWorker<S, R, B> {
    panel: Panel,
    devices: Arc<Mutex<Devices<S, R>>>,
    tracker: PlateConfirmationTracker,
    local_cooldowns: CooldownTracker,
    context: WorkerContext<B>,
    reporter: Reporter,
    /// Plates already written to the ledger since the last rescan
    recorded: HashSet<PlateText>,
    rescan_epoch: u64,
    frame_interval: Duration,
    frames: u64,
}

impl<S, R, B> CameraWorker<S, R, B>
where
    S: FrameSource,
    R: Recognizer,
    B: Backend,
{
    pub fn new(
        panel: Panel,
        source: S,
        recognizer: R,
        frame_interval: Duration,
        context: WorkerContext<B>,
        reporter: Reporter,
    ) -> Self {
        Self {
            panel,
            devices: Arc::new(Mutex::new(Devices { source, recognizer })),
            tracker: PlateConfirmationTracker::new(panel, context.min_dwell, context.gate.clone()),
            local_cooldowns: context.controller.local_cooldowns(),
            rescan_epoch: context.gate.rescan_epoch(panel),
            context,
            reporter,
            recorded: HashSet::new(),
            frame_interval,
            frames: 0,
        }
    }

    pub fn camera(&self) -> &str {
        self.reporter.camera()
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }

    /// Run recognition, confirmation and dispatch for one frame.
    ///
    /// Only fatal recognition errors are returned; everything on the
    /// dispatch path ends up as an outcome.
    pub fn process_frame(
        &mut self,
        frame: &VideoFrame,
        now: Instant,
    ) -> Result<Vec<Submission>, RecognitionError> {
        let readout = {
            let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
            read_plates(&mut devices.recognizer, frame)?
        };
        Ok(self.process_readout(frame, readout, now))
    }

    /// Confirmation and dispatch for plates already read from `frame`
    pub fn process_readout(&mut self, frame: &VideoFrame, readout: PlateReadout, now: Instant) -> Vec<Submission> {
        let epoch = self.context.gate.rescan_epoch(self.panel);
        if epoch != self.rescan_epoch {
            debug!(
                "Camera {}: rescan, forgetting {} local cooldowns",
                self.camera(),
                self.local_cooldowns.len()
            );
            self.local_cooldowns.clear();
            self.recorded.clear();
            self.rescan_epoch = epoch;
        }

        if let Some(fallback) = &readout.fallback {
            debug!(
                "Camera {}: plate read by fallback '{}'",
                self.camera(),
                fallback.method
            );
        }

        let confirmed = self.tracker.observe(&readout.plates, now);
        let mut submissions = Vec::with_capacity(confirmed.len());
        let mut snapshot: Option<Option<Vec<u8>>> = None;

        for event in confirmed {
            // An outcome surfaced for an earlier plate of this frame may
            // have paused the panel
            if self.context.gate.is_paused(self.panel) {
                debug!("Camera {}: panel paused, holding {}", self.camera(), event.plate);
                break;
            }

            self.reporter.confirmed(&event);
            self.record_sighting(&event.plate);

            let image_jpeg = snapshot
                .get_or_insert_with(|| encode_snapshot(frame, self.context.snapshot))
                .clone();
            let plate = event.plate.clone();
            let panel = event.panel;
            let reporter = self.reporter.clone();
            let completed_plate = plate.clone();

            let submission = self.context.controller.submit(
                DispatchRequest { event, image_jpeg },
                &mut self.local_cooldowns,
                now,
                move |outcome| reporter.surface(&completed_plate, panel, outcome),
            );

            if let Submission::Cached(outcome) | Submission::RateLimited(outcome) = &submission {
                self.reporter.surface(&plate, panel, outcome.clone());
            }
            submissions.push(submission);
        }

        submissions
    }

    fn record_sighting(&mut self, plate: &PlateText) {
        if !self.recorded.insert(plate.clone()) {
            return;
        }
        if let Err(e) = self.context.ledger.record(plate.as_str(), self.panel, Utc::now()) {
            warn!("Camera {}: failed to record {}: {}", self.camera(), plate, e);
        }
    }

    /// Pace through the source until it ends, fails, or shutdown is signalled.
    ///
    /// Frame reads and recognition block, so each frame's capture runs on
    /// the blocking pool; the runtime stays free for dispatch and the
    /// control API.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerExit
    where
        S: 'static,
        R: 'static,
    {
        let described = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .source
            .describe();
        info!("Camera {} ({}) started on {}", self.camera(), self.panel, described);

        let exit = loop {
            if *shutdown.borrow() {
                break WorkerExit::Shutdown;
            }

            let devices = Arc::clone(&self.devices);
            let capture = match tokio::task::spawn_blocking(move || {
                let mut devices = devices.lock().unwrap_or_else(PoisonError::into_inner);
                let Devices { source, recognizer } = &mut *devices;
                capture_frame(source, recognizer)
            })
            .await
            {
                Ok(capture) => capture,
                Err(e) => {
                    error!("Camera {}: capture task failed: {}", self.camera(), e);
                    self.reporter.failed(e.to_string());
                    return WorkerExit::Failed(e.to_string());
                }
            };

            let (frame, readout) = match capture {
                Capture::Frame(frame, readout) => (frame, readout),
                Capture::EndOfStream => {
                    info!("Camera {}: source exhausted", self.camera());
                    break WorkerExit::EndOfStream;
                }
                Capture::SourceFailed(e) => {
                    error!("Camera {}: frame source failed: {}", self.camera(), e);
                    self.reporter.failed(e.to_string());
                    return WorkerExit::Failed(e.to_string());
                }
                Capture::RecognizerFailed(e) => {
                    error!("Camera {}: recognizer unavailable: {}", self.camera(), e);
                    self.reporter.failed(e.to_string());
                    return WorkerExit::Failed(e.to_string());
                }
            };

            self.frames += 1;
            counter!("plate_frames_processed_total", "panel" => self.panel.as_str()).increment(1);

            let now = tokio::time::Instant::now().into_std();
            self.process_readout(&frame, readout, now);

            tokio::select! {
                _ = tokio::time::sleep(self.frame_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break WorkerExit::Shutdown;
                    }
                }
            }
        };

        info!("Camera {} stopped after {} frames", self.camera(), self.frames);
        self.reporter.stopped(self.frames);
        exit
    }
}

/// Result of one blocking capture step
enum Capture {
    Frame(VideoFrame, PlateReadout),
    EndOfStream,
    SourceFailed(CameraError),
    RecognizerFailed(RecognitionError),
}

fn capture_frame<S: FrameSource, R: Recognizer>(source: &mut S, recognizer: &mut R) -> Capture {
    let frame = match source.next_frame() {
        Ok(Some(frame)) => frame,
        Ok(None) => return Capture::EndOfStream,
        Err(e) => return Capture::SourceFailed(e),
    };
    match read_plates(recognizer, &frame) {
        Ok(readout) => Capture::Frame(frame, readout),
        Err(e) => Capture::RecognizerFailed(e),
    }
}

fn encode_snapshot(frame: &VideoFrame, settings: SnapshotSettings) -> Option<Vec<u8>> {
    match frame.thumbnail(settings.max_side).to_jpeg(settings.quality) {
        Ok(jpeg) => Some(jpeg),
        Err(e) => {
            warn!("Frame {}: snapshot encoding failed: {}", frame.sequence, e);
            None
        }
    }
}
