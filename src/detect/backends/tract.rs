#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DefectDetector;
use crate::detect::result::{non_max_suppression, BoundingBox, RawDetection};
use crate::frame::Frame;

const CXYWH_OFFSET: usize = 4;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLOv8 ONNX detection models.
///
/// Expects a single output of shape `[1, 4 + classes, anchors]`. Class names
/// are read from `<model>.names`, one per line, falling back to `class_<id>`.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    labels: Vec<String>,
    input_width: u32,
    input_height: u32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(anyhow!("model artifact not found at {}", model_path.display()));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let labels = read_labels(&model_path.with_extension("names"))?;
        log::info!(
            "TractBackend: loaded {} ({} labels)",
            model_path.display(),
            labels.len()
        );

        Ok(Self {
            model,
            labels,
            input_width,
            input_height,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    pub fn with_iou_threshold(mut self, iou: f32) -> Self {
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let img = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = imageops::resize(
            &img,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape();
        if shape.len() != 3 || shape[1] <= CXYWH_OFFSET {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let classes = shape[1] - CXYWH_OFFSET;
        let anchors = shape[2];

        let sx = frame.width() as f32 / self.input_width as f32;
        let sy = frame.height() as f32 / self.input_height as f32;

        let mut detections = Vec::new();
        for i in 0..anchors {
            let (class_id, confidence) = (0..classes)
                .map(|c| (c, preds[[0, CXYWH_OFFSET + c, i]]))
                .fold((0, f32::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best });
            if !confidence.is_finite() || confidence < confidence_threshold {
                continue;
            }
            let bbox = BoundingBox::from_center(
                preds[[0, 0, i]] * sx,
                preds[[0, 1, i]] * sy,
                preds[[0, 2, i]] * sx,
                preds[[0, 3, i]] * sy,
            );
            detections.push(RawDetection::new(self.label(class_id), confidence, bbox));
        }

        non_max_suppression(&mut detections, self.iou_threshold);
        Ok(detections)
    }

    fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl DefectDetector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn infer(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, confidence_threshold)
    }
}

fn read_labels(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        log::warn!(
            "TractBackend: no label file at {}, using numeric class names",
            path.display()
        );
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read label file {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
