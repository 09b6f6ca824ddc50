use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Wall-clock format stored in the defect log.
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Wall-clock format shown to the operator and written to reports.
pub const DISPLAY_TIME_FORMAT: &str = "%H:%M:%S";

/// One accepted defect detection.
///
/// Fields are private; an event cannot change after construction.
///
/// ```compile_fail
/// # use sheet_inspector::DetectionEvent;
/// fn tamper(ev: &mut DetectionEvent) {
///     ev.position_meters = 0.0;
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    sheet_id: String,
    defect_type: String,
    confidence: f32,
    position_meters: f64,
    timestamp: NaiveDateTime,
    image_path: PathBuf,
}

impl DetectionEvent {
    /// The timestamp is truncated to whole seconds.
    pub fn new(
        sheet_id: impl Into<String>,
        defect_type: impl Into<String>,
        confidence: f32,
        position_meters: f64,
        timestamp: NaiveDateTime,
        image_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sheet_id: sheet_id.into(),
            defect_type: defect_type.into(),
            confidence,
            position_meters,
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            image_path: image_path.into(),
        }
    }

    pub fn sheet_id(&self) -> &str {
        &self.sheet_id
    }

    pub fn defect_type(&self) -> &str {
        &self.defect_type
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn position_meters(&self) -> f64 {
        self.position_meters
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// `HH:MM:SS`
    pub fn display_time(&self) -> String {
        self.timestamp.format(DISPLAY_TIME_FORMAT).to_string()
    }

    /// `YYYY-MM-DD HH:MM:SS`
    pub fn log_time(&self) -> String {
        self.timestamp.format(LOG_TIME_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn timestamps_render_in_both_formats() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(14, 5, 9, 870)
            .unwrap();
        let ev = DetectionEvent::new("S-17", "scratch", 0.55, 50.0, ts, "reports/x.jpg");

        assert_eq!(ev.display_time(), "14:05:09");
        assert_eq!(ev.log_time(), "2024-03-01 14:05:09");
        assert_eq!(ev.timestamp().nanosecond(), 0);
    }

    #[test]
    fn serializes_with_second_resolution() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(14, 5, 9, 870)
            .unwrap();
        let ev = DetectionEvent::new("S-17", "pit", 0.5, 12.25, ts, "reports/S-17/images/a.jpg");
        let json = serde_json::to_value(&ev).unwrap();

        assert_eq!(json["sheet_id"], "S-17");
        assert_eq!(json["defect_type"], "pit");
        assert_eq!(json["position_meters"], 12.25);
        assert_eq!(json["timestamp"], "2024-03-01T14:05:09");
        assert_eq!(json["image_path"], "reports/S-17/images/a.jpg");
    }
}
