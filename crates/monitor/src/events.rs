//! Messages between workers, the supervisor and the presentation layer
//!
//! Workers and dispatch completions publish [`MonitorEvent`]s. The
//! presentation layer never touches worker state; it sends
//! [`MonitorCommand`]s to the supervisor instead.

use dispatch::{DispatchStats, Outcome, OutcomeKind};
use plate_tracker::Panel;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Something the operator should see
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Confirmed {
        camera: String,
        plate: String,
        panel: Panel,
        dwell_ms: u64,
    },
    Outcome {
        camera: String,
        plate: String,
        panel: Panel,
        kind: OutcomeKind,
        outcome: Outcome,
    },
    WorkerFailed {
        camera: String,
        reason: String,
    },
    WorkerStopped {
        camera: String,
        frames: u64,
    },
}

/// Operator actions, answered by the supervisor
#[derive(Debug)]
pub enum MonitorCommand {
    Pause(Panel),
    Resume(Panel),
    Rescan(Panel),
    ClearCache { reply: oneshot::Sender<usize> },
    Status { reply: oneshot::Sender<MonitorStatus> },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PanelStatus {
    pub panel: Panel,
    pub paused: bool,
}

/// Point-in-time view of the running monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub panels: Vec<PanelStatus>,
    pub dispatch: DispatchStats,
    pub ledger_records: usize,
    pub workers_running: usize,
}

pub type EventSender = mpsc::UnboundedSender<MonitorEvent>;
pub type CommandSender = mpsc::Sender<MonitorCommand>;

/// Headless presentation layer: logs every event
pub async fn run_event_log(mut rx: mpsc::UnboundedReceiver<MonitorEvent>) {
    while let Some(event) = rx.recv().await {
        let line = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));
        match &event {
            MonitorEvent::WorkerFailed { .. } => error!(target: "events", "{}", line),
            MonitorEvent::Outcome { outcome, .. } if !outcome.success => {
                warn!(target: "events", "{}", line)
            }
            _ => info!(target: "events", "{}", line),
        }
    }
    debug!("Event log stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_tag() {
        let event = MonitorEvent::Outcome {
            camera: "gate-1".into(),
            plate: "51A-12345".into(),
            panel: Panel::Entry,
            kind: OutcomeKind::Cached,
            outcome: Outcome::success("Welcome").as_cached(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "outcome");
        assert_eq!(json["panel"], "entry");
        assert_eq!(json["kind"], "cached");
        assert_eq!(json["outcome"]["message"], "[CACHED] Welcome");
    }
}
