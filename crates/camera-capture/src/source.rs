//! Pull-based frame sources

use std::collections::VecDeque;

use tracing::debug;

use crate::{CameraError, VideoFrame};

/// A source of frames pulled by a camera worker.
///
/// `Ok(None)` signals end of stream; errors are treated as fatal by the
/// worker that owns the source.
pub trait FrameSource: Send {
    /// Pull the next frame
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Human-readable description for logs
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// In-memory frame queue
#[derive(Debug, Default)]
pub struct BufferedSource {
    frames: VecDeque<VideoFrame>,
}

impl BufferedSource {
    /// Create a source that yields the given frames in order
    pub fn new(frames: impl IntoIterator<Item = VideoFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Append a frame
    pub fn push(&mut self, frame: VideoFrame) {
        self.frames.push_back(frame);
    }

    /// Frames left
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for BufferedSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let frame = self.frames.pop_front();
        if frame.is_none() {
            debug!("Buffered source exhausted");
        }
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("buffered source ({} frames)", self.frames.len())
    }
}
