//! Camera Capture Library for Gate Monitoring
//!
//! Frame acquisition itself (local webcams, RTSP streams) lives outside
//! this workspace. This crate provides the pieces the detection engine
//! needs from it:
//! - A pull-based [`FrameSource`] trait
//! - The decoded RGB [`VideoFrame`] type
//! - JPEG thumbnail encoding for the backend image payload

pub mod frame;
pub mod source;

pub use frame::VideoFrame;
pub use source::{BufferedSource, FrameSource};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

impl From<image::ImageError> for CameraError {
    fn from(err: image::ImageError) -> Self {
        CameraError::Format(err.to_string())
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Source locator (device index, device path or stream URL)
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl CameraConfig {
    /// Create a local webcam config
    pub fn webcam(index: u32) -> Self {
        Self {
            device: index.to_string(),
            ..Default::default()
        }
    }

    /// Create a network stream config (RTSP/HTTP)
    pub fn stream(url: &str) -> Self {
        Self {
            device: url.to_string(),
            width: 1280,
            height: 720,
            fps: 25,
        }
    }

    /// Pacing interval between two frame reads
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}
