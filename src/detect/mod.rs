mod backend;
mod backends;
mod result;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

pub use backend::DefectDetector;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{non_max_suppression, BoundingBox, RawDetection};

/// Build the configured detector backend.
///
/// A missing model artifact is a setup error and is returned here, before any
/// session starts.
pub fn open_detector(settings: &DetectorSettings) -> Result<Box<dyn DefectDetector>> {
    let mut detector: Box<dyn DefectDetector> = match settings.backend.as_str() {
        "stub" => Box::new(StubBackend::new()),
        #[cfg(feature = "backend-tract")]
        "tract" => Box::new(TractBackend::new(
            &settings.model_path,
            settings.input_width,
            settings.input_height,
        )?),
        #[cfg(not(feature = "backend-tract"))]
        "tract" => {
            return Err(anyhow!(
                "detector backend 'tract' requires the backend-tract feature"
            ))
        }
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };
    detector.warm_up()?;
    log::info!(
        "detector backend '{}' ready ({} labels)",
        detector.name(),
        detector.labels().len()
    );
    Ok(detector)
}
