/// Axis-aligned box in frame pixel coordinates (top-left, bottom-right).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer pixel bounds `(x0, y0, x1, y1)` clipped to a `width`x`height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let clip = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        (
            clip(self.x1, width),
            clip(self.y1, height),
            clip(self.x2, width),
            clip(self.y2, height),
        )
    }
}

/// One detector output before thresholding.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Greedy non-max suppression, highest confidence first.
pub fn non_max_suppression(detections: &mut Vec<RawDetection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let overlaps = (0..kept).any(|prev| {
            detections[prev].label == detections[index].label
                && detections[prev].bbox.iou(&detections[index].bbox) > iou_threshold
        });
        if !overlaps {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(b.iou(&b), 1.0);
        assert_eq!(b.iou(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    }

    #[test]
    fn nms_keeps_best_of_overlapping_same_label() {
        let mut dets = vec![
            RawDetection::new("pit", 0.6, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            RawDetection::new("pit", 0.9, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
            RawDetection::new("scratch", 0.5, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
            RawDetection::new("pit", 0.7, BoundingBox::new(50.0, 50.0, 60.0, 60.0)),
        ];
        non_max_suppression(&mut dets, 0.45);

        let kept: Vec<(&str, f32)> = dets.iter().map(|d| (d.label.as_str(), d.confidence)).collect();
        assert_eq!(kept, vec![("pit", 0.9), ("pit", 0.7), ("scratch", 0.5)]);
    }

    #[test]
    fn clamp_rounds_and_clips() {
        let b = BoundingBox::new(-3.2, 4.6, 700.0, 10.4);
        assert_eq!(b.clamp_to(640, 480), (0, 5, 640, 10));
    }
}
