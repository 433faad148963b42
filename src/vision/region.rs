//! Region of interest extraction
//!
//! Crops a fixed-size window from the center of the latest frame. The model
//! code is expected to sit inside the on-screen guide box.

use image::RgbaImage;
use std::time::Instant;
use thiserror::Error;

use crate::capture::frame::CapturedFrame;
use crate::capture::FrameSource;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("frame source not ready")]
    NotReady,
    #[error("malformed frame: {width}x{height} with {len} bytes")]
    MalformedFrame { width: u32, height: u32, len: usize },
}

/// One sampled region plus the capture time of its frame
#[derive(Debug, Clone)]
pub struct ScanSample {
    pub image: RgbaImage,
    pub captured_at: Instant,
}

/// Crops the center region of interest
#[derive(Debug, Clone, Copy)]
pub struct RegionExtractor {
    width: u32,
    height: u32,
}

impl RegionExtractor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Sample the source's current frame
    pub fn extract(&self, source: &dyn FrameSource) -> Result<ScanSample, RegionError> {
        let frame = source.latest_frame().ok_or(RegionError::NotReady)?;
        self.crop(&frame)
    }

    /// Crop the centered region from a frame.
    ///
    /// Frames smaller than the region are cropped to their full extent along
    /// the short axis instead of being rejected.
    pub fn crop(&self, frame: &CapturedFrame) -> Result<ScanSample, RegionError> {
        if !frame.is_well_formed() {
            return Err(RegionError::MalformedFrame {
                width: frame.width,
                height: frame.height,
                len: frame.data.len(),
            });
        }

        let width = self.width.min(frame.width);
        let height = self.height.min(frame.height);
        let x = (frame.width - width) / 2;
        let y = (frame.height - height) / 2;

        let data = extract_region(&frame.data, frame.width, x, y, width, height);
        let image = RgbaImage::from_raw(width, height, data).ok_or(RegionError::MalformedFrame {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        })?;

        Ok(ScanSample {
            image,
            captured_at: frame.timestamp,
        })
    }
}

/// Copy a rectangle out of RGBA image data. Bounds must already be clamped.
fn extract_region(data: &[u8], img_width: u32, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
    let mut region = Vec::with_capacity((width * height * 4) as usize);

    for row in y..(y + height) {
        let start = ((row * img_width + x) * 4) as usize;
        let end = start + (width * 4) as usize;
        region.extend_from_slice(&data[start..end]);
    }

    region
}
