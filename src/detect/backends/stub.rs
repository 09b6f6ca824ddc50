use anyhow::Result;

use crate::detect::backend::DefectDetector;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

/// Pixels whose brightest channel is below this are treated as defect.
const DARK_LEVEL: u8 = 40;
/// Fewer dark pixels than this is sensor noise, not a defect.
const MIN_DARK_PIXELS: usize = 16;

/// Stub backend for testing and demo runs. Reports the bounding box of dark
/// pixels as a single "scratch" detection; confidence is how densely the box
/// is filled.
pub struct StubBackend {
    labels: Vec<String>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            labels: vec!["scratch".to_string()],
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DefectDetector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn infer(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
        let mut dark = 0usize;

        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let px = frame.pixel(x, y);
                if px.iter().all(|&c| c < DARK_LEVEL) {
                    dark += 1;
                    x0 = x0.min(x);
                    y0 = y0.min(y);
                    x1 = x1.max(x);
                    y1 = y1.max(y);
                }
            }
        }

        if dark < MIN_DARK_PIXELS {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(x0 as f32, y0 as f32, (x1 + 1) as f32, (y1 + 1) as f32);
        let confidence = (dark as f32 / bbox.area()).clamp(0.0, 1.0);
        if confidence < confidence_threshold {
            return Ok(Vec::new());
        }
        Ok(vec![RawDetection::new(&self.labels[0], confidence, bbox)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_block(dark: Option<(u32, u32, u32, u32)>) -> Frame {
        let (w, h) = (32u32, 16u32);
        let mut data = vec![150u8; (w * h * 3) as usize];
        if let Some((bx0, by0, bx1, by1)) = dark {
            for y in by0..by1 {
                for x in bx0..bx1 {
                    let idx = ((y * w + x) * 3) as usize;
                    data[idx..idx + 3].copy_from_slice(&[10, 10, 10]);
                }
            }
        }
        Frame::new(data, w, h).unwrap()
    }

    #[test]
    fn clean_frame_has_no_detections() {
        let mut backend = StubBackend::new();
        let dets = backend.infer(&frame_with_block(None), 0.4).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn dark_block_is_reported_as_scratch() {
        let mut backend = StubBackend::new();
        let dets = backend
            .infer(&frame_with_block(Some((4, 2, 12, 6))), 0.4)
            .unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "scratch");
        assert_eq!(dets[0].confidence, 1.0);
        assert_eq!(dets[0].bbox, BoundingBox::new(4.0, 2.0, 12.0, 6.0));
    }
}
