//! Plate Confirmation Tracking
//!
//! Turns noisy per-frame recognition output into confirmation events:
//! - Plate text validation (the recognizer's "unknown" sentinel is dropped)
//! - Dwell-time confirmation per continuous-visibility episode
//! - Per-panel pause/resume/rescan control shared with the dispatch path

pub mod pause;
pub mod recognition;
pub mod tracker;
pub mod types;

pub use pause::PauseGate;
pub use recognition::{read_plates, BoundingBox, FallbackReading, PlateReadout, Recognizer};
pub use tracker::PlateConfirmationTracker;
pub use types::{ConfirmedEvent, Panel, PlateSighting, PlateText, UNKNOWN_PLATE};

use thiserror::Error;

/// Recognition error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Nothing readable in this frame; treated like an "unknown" reading
    #[error("Recognition miss: {0}")]
    Miss(String),

    /// The recognition model cannot run at all; halts the camera worker
    #[error("Recognition model unavailable: {0}")]
    ModelUnavailable(String),
}

impl RecognitionError {
    /// Whether the worker must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecognitionError::ModelUnavailable(_))
    }
}

/// Tracker error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Unknown panel: {0} (expected \"entry\" or \"exit\")")]
    UnknownPanel(String),
}
