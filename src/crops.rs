//! Defect crop images.
//!
//! Crops land in `<report_dir>/<sheet_id>/images/` and are named
//! `<sheet_id>_<defect_type>_<YYYYmmdd_HHMMSS>.jpg`. The name has one-second
//! resolution, so two defects of the same type in the same second share a
//! path and the later crop replaces the earlier one.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::detect::BoundingBox;
use crate::frame::Frame;
use crate::report::sheet_dir;

const CROP_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

pub struct CropStore {
    root: PathBuf,
}

impl CropStore {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: report_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic crop location for `(sheet_id, defect_type, timestamp)`.
    pub fn path_for(&self, sheet_id: &str, defect_type: &str, timestamp: NaiveDateTime) -> PathBuf {
        let file = format!(
            "{}_{}_{}.jpg",
            path_safe(sheet_id),
            path_safe(defect_type),
            timestamp.format(CROP_TIME_FORMAT)
        );
        sheet_dir(&self.root, sheet_id).join("images").join(file)
    }

    /// Crop `bbox` out of `frame` and write it as JPEG to `path`, replacing any
    /// existing file.
    ///
    /// On error nothing is written, but the session still records `path` on
    /// the event, so the report can name an image that does not exist.
    pub fn save(&self, frame: &Frame, bbox: &BoundingBox, path: &Path) -> Result<()> {
        let crop = frame.crop(bbox)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create crop directory {}", parent.display()))?;
        }
        crop.save_with_format(path, image::ImageFormat::Jpeg)
            .with_context(|| format!("write crop {}", path.display()))?;
        Ok(())
    }
}

fn path_safe(part: &str) -> String {
    part.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}
