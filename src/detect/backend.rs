use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Defect detector backend.
///
/// The model is a black box: it receives a frame and the session's
/// confidence threshold and returns zero or more labelled boxes. Backends may
/// pre-filter by the threshold but callers do not rely on it, and the order of
/// the returned detections carries no meaning.
pub trait DefectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class vocabulary, indexed by the model's class id.
    fn labels(&self) -> &[String];

    /// Run detection on a frame.
    fn infer(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
