//! Video frame types and processing

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a black frame (used when a replay entry carries no image)
    pub fn blank(width: u32, height: u32, sequence: u32) -> Self {
        Self::new(vec![0; (width * height * 3) as usize], width, height, 0, sequence)
    }

    /// Build a frame from a decoded image
    pub fn from_image(img: &DynamicImage, timestamp_ns: u64, sequence: u32) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Whether the buffer length matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Resize frame (nearest neighbour). An empty source yields a black frame.
    pub fn resize(&self, new_width: u32, new_height: u32) -> VideoFrame {
        if self.width == 0 || self.height == 0 {
            return VideoFrame {
                timestamp_ns: self.timestamp_ns,
                ..VideoFrame::blank(new_width, new_height, self.sequence)
            };
        }

        let mut resized = Vec::with_capacity((new_width * new_height * 3) as usize);

        let x_ratio = self.width as f32 / new_width as f32;
        let y_ratio = self.height as f32 / new_height as f32;

        for y in 0..new_height {
            for x in 0..new_width {
                let x0 = (x as f32 * x_ratio).floor() as u32;
                let y0 = (y as f32 * y_ratio).floor() as u32;

                match self.get_pixel(x0.min(self.width - 1), y0.min(self.height - 1)) {
                    Some(pixel) => resized.extend_from_slice(&pixel),
                    None => resized.extend_from_slice(&[0, 0, 0]),
                }
            }
        }

        VideoFrame {
            data: resized,
            width: new_width,
            height: new_height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        }
    }

    /// Downscale so that neither side exceeds `max_side`, keeping aspect ratio.
    /// Frames already small enough are returned unchanged.
    pub fn thumbnail(&self, max_side: u32) -> VideoFrame {
        let max_side = max_side.max(1);
        if self.width == 0 || self.height == 0 {
            return self.clone();
        }
        if self.width <= max_side && self.height <= max_side {
            return self.clone();
        }

        let scale = max_side as f32 / self.width.max(self.height) as f32;
        let new_width = ((self.width as f32 * scale).round() as u32).clamp(1, max_side);
        let new_height = ((self.height as f32 * scale).round() as u32).clamp(1, max_side);
        self.resize(new_width, new_height)
    }

    /// Encode to JPEG at the given quality (1-100)
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        if self.width == 0 || self.height == 0 || !self.is_well_formed() {
            return Err(CameraError::Format(format!(
                "{}x{} frame with {} bytes",
                self.width,
                self.height,
                self.data.len()
            )));
        }

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(buffer)
    }
}
