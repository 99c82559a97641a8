//! Replay harness
//!
//! Drives a camera worker from a JSON manifest instead of live capture
//! and model inference. One manifest yields both the frame source and a
//! recognizer that answers for the frames it produced.
//!
//! ```json
//! {
//!   "frame_interval_ms": 33,
//!   "frames": [
//!     { "plates": ["51A-12345"] },
//!     { "plates": [], "fallback": { "text": "30F-11111", "method": "hsv-yellow" } },
//!     { "plates": ["unknown"], "image": "frames/0003.jpg" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use camera_capture::{CameraError, FrameSource, VideoFrame};
use plate_tracker::{FallbackReading, RecognitionError, Recognizer};
use serde::Deserialize;
use tracing::{debug, info};

use crate::MonitorError;

/// Size of the placeholder frame used when an entry has no image
const BLANK_WIDTH: u32 = 160;
const BLANK_HEIGHT: u32 = 120;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayFrame {
    #[serde(default)]
    pub plates: Vec<String>,
    /// Image path, relative to the manifest
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub fallback: Option<FallbackReading>,
    /// Simulates the recognition model becoming unavailable
    #[serde(default)]
    pub model_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayManifest {
    pub frames: Vec<ReplayFrame>,
    /// Overrides the camera's fps pacing when present
    #[serde(default)]
    pub frame_interval_ms: Option<u64>,
}

impl ReplayManifest {
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e)))?;
        let manifest: ReplayManifest = serde_json::from_str(&raw)
            .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded replay manifest {} ({} frames)", path.display(), manifest.frames.len());
        Ok(manifest)
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval_ms.map(Duration::from_millis)
    }

    /// Split into a frame source and its matching recognizer
    pub fn into_parts(self, base_dir: impl Into<PathBuf>, looping: bool) -> (ReplaySource, ReplayRecognizer) {
        let interval_ms = self.frame_interval_ms.unwrap_or(33);
        let frames: Arc<[ReplayFrame]> = self.frames.into();
        (
            ReplaySource {
                frames: Arc::clone(&frames),
                base_dir: base_dir.into(),
                looping,
                cursor: 0,
                sequence: 0,
                interval_ms,
            },
            ReplayRecognizer { frames },
        )
    }
}

/// Frame source over manifest entries
pub struct ReplaySource {
    frames: Arc<[ReplayFrame]>,
    base_dir: PathBuf,
    looping: bool,
    cursor: usize,
    sequence: u32,
    interval_ms: u64,
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return Ok(None);
            }
            debug!("Replay wrapped around after {} frames", self.sequence);
            self.cursor = 0;
        }

        let entry = &self.frames[self.cursor];
        let sequence = self.sequence;
        let timestamp_ns = u64::from(sequence) * self.interval_ms * 1_000_000;

        let frame = match &entry.image {
            Some(path) => {
                let img = image::open(self.base_dir.join(path))?;
                VideoFrame::from_image(&img, timestamp_ns, sequence)
            }
            None => VideoFrame {
                timestamp_ns,
                ..VideoFrame::blank(BLANK_WIDTH, BLANK_HEIGHT, sequence)
            },
        };

        self.cursor += 1;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!(
            "replay of {} frames{}",
            self.frames.len(),
            if self.looping { " (looping)" } else { "" }
        )
    }
}

/// Recognizer answering from manifest entries by frame sequence
pub struct ReplayRecognizer {
    frames: Arc<[ReplayFrame]>,
}

impl ReplayRecognizer {
    fn entry(&self, frame: &VideoFrame) -> Result<&ReplayFrame, RecognitionError> {
        if self.frames.is_empty() {
            return Err(RecognitionError::Miss("empty replay".into()));
        }
        Ok(&self.frames[frame.sequence as usize % self.frames.len()])
    }
}

impl Recognizer for ReplayRecognizer {
    fn recognize(&mut self, frame: &VideoFrame) -> Result<Vec<String>, RecognitionError> {
        let entry = self.entry(frame)?;
        if let Some(reason) = &entry.model_error {
            return Err(RecognitionError::ModelUnavailable(reason.clone()));
        }
        Ok(entry.plates.clone())
    }

    fn recognize_fallback(&mut self, frame: &VideoFrame) -> Result<Option<FallbackReading>, RecognitionError> {
        Ok(self.entry(frame)?.fallback.clone())
    }
}
