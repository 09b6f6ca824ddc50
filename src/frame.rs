//! Captured frames and defect crops.
//!
//! A `Frame` is a packed RGB24 buffer. Cameras produce them, detectors read
//! them, and the session crops the defect region out of them for the report.

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::BoundingBox;

/// Byte length of a `width`x`height` RGB24 buffer, `None` if it overflows.
pub(crate) fn rgb_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
}

pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails if the length does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected =
            rgb_len(width, height).ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn from_image(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Copy out the region covered by `bbox`, clamped to the frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Result<RgbImage> {
        let (x0, y0, x1, y1) = bbox.clamp_to(self.width, self.height);
        if x1 <= x0 || y1 <= y0 {
            return Err(anyhow!(
                "bounding box ({:.1},{:.1})-({:.1},{:.1}) lies outside {}x{} frame",
                bbox.x1,
                bbox.y1,
                bbox.x2,
                bbox.y2,
                self.width,
                self.height
            ));
        }
        let (w, h) = (x1 - x0, y1 - y0);
        let mut out = Vec::with_capacity(w as usize * h as usize * 3);
        let stride = self.width as usize * 3;
        for y in y0..y1 {
            let start = y as usize * stride + x0 as usize * 3;
            out.extend_from_slice(&self.data[start..start + w as usize * 3]);
        }
        RgbImage::from_raw(w, h, out).ok_or_else(|| anyhow!("crop buffer size mismatch"))
    }
}
