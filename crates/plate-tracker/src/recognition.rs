//! Recognizer interface
//!
//! The plate recognizer (detector + OCR models) is an external
//! collaborator. Camera workers only depend on this trait.

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::{PlateText, RecognitionError};

/// Axis-aligned plate region in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of the fallback path used on non-standard plate backgrounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackReading {
    /// Plate text or the "unknown" sentinel
    pub text: String,
    /// Name of the fallback method that produced the reading
    pub method: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub polygon: Option<Vec<(i32, i32)>>,
}

/// Plate recognizer
pub trait Recognizer: Send {
    /// Read every plate visible in the frame.
    ///
    /// Readings may contain the "unknown" sentinel; callers filter it.
    fn recognize(&mut self, frame: &VideoFrame) -> Result<Vec<String>, RecognitionError>;

    /// Secondary path tried only when the primary path read nothing
    fn recognize_fallback(
        &mut self,
        _frame: &VideoFrame,
    ) -> Result<Option<FallbackReading>, RecognitionError> {
        Ok(None)
    }
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn recognize(&mut self, frame: &VideoFrame) -> Result<Vec<String>, RecognitionError> {
        (**self).recognize(frame)
    }

    fn recognize_fallback(
        &mut self,
        frame: &VideoFrame,
    ) -> Result<Option<FallbackReading>, RecognitionError> {
        (**self).recognize_fallback(frame)
    }
}

/// Valid plates read from one frame
#[derive(Debug, Clone, Default)]
pub struct PlateReadout {
    pub plates: HashSet<PlateText>,
    /// Set when the plates came from the fallback path
    pub fallback: Option<FallbackReading>,
}

/// Run the primary path, then the fallback path if it read nothing.
///
/// Misses are swallowed; only fatal errors are returned.
pub fn read_plates<R: Recognizer + ?Sized>(
    recognizer: &mut R,
    frame: &VideoFrame,
) -> Result<PlateReadout, RecognitionError> {
    let readings = match recognizer.recognize(frame) {
        Ok(readings) => readings,
        Err(RecognitionError::Miss(reason)) => {
            debug!("Frame {}: primary recognition miss ({})", frame.sequence, reason);
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let plates: HashSet<PlateText> = readings.iter().filter_map(|r| PlateText::parse(r)).collect();
    if !plates.is_empty() {
        return Ok(PlateReadout {
            plates,
            fallback: None,
        });
    }

    match recognizer.recognize_fallback(frame) {
        Ok(Some(reading)) => match PlateText::parse(&reading.text) {
            Some(plate) => {
                debug!(
                    "Frame {}: fallback '{}' read {}",
                    frame.sequence, reading.method, plate
                );
                Ok(PlateReadout {
                    plates: HashSet::from([plate]),
                    fallback: Some(reading),
                })
            }
            None => Ok(PlateReadout::default()),
        },
        Ok(None) | Err(RecognitionError::Miss(_)) => Ok(PlateReadout::default()),
        Err(e) => Err(e),
    }
}
