//! Surfacing results to the operator

use std::sync::Arc;

use dispatch::Outcome;
use notification::Notifier;
use plate_tracker::{ConfirmedEvent, Panel, PauseGate, PlateText};
use tracing::debug;

use crate::events::{EventSender, MonitorEvent};

/// Per-camera publisher for events and announcements
#[derive(Clone)]
pub struct Reporter {
    camera: String,
    gate: PauseGate,
    pause_on_outcome: bool,
    events: EventSender,
    notifier: Arc<dyn Notifier>,
}

impl Reporter {
    pub fn new(
        camera: impl Into<String>,
        gate: PauseGate,
        pause_on_outcome: bool,
        events: EventSender,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            camera: camera.into(),
            gate,
            pause_on_outcome,
            events,
            notifier,
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    fn publish(&self, event: MonitorEvent) {
        if self.events.send(event).is_err() {
            debug!("Camera {}: event consumer gone", self.camera);
        }
    }

    pub fn confirmed(&self, event: &ConfirmedEvent) {
        self.publish(MonitorEvent::Confirmed {
            camera: self.camera.clone(),
            plate: event.plate.to_string(),
            panel: event.panel,
            dwell_ms: event.dwell.as_millis() as u64,
        });
    }

    /// Show an outcome for review. The panel is paused before anything
    /// reaches the operator so frames of the same tick cannot confirm again.
    pub fn surface(&self, plate: &PlateText, panel: Panel, outcome: Outcome) {
        if self.pause_on_outcome {
            self.gate.pause(panel);
        }
        self.notifier.notify(plate.as_str(), panel, &outcome);
        self.publish(MonitorEvent::Outcome {
            camera: self.camera.clone(),
            plate: plate.to_string(),
            panel,
            kind: outcome.kind(),
            outcome,
        });
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.publish(MonitorEvent::WorkerFailed {
            camera: self.camera.clone(),
            reason: reason.into(),
        });
    }

    pub fn stopped(&self, frames: u64) {
        self.publish(MonitorEvent::WorkerStopped {
            camera: self.camera.clone(),
            frames,
        });
    }
}
