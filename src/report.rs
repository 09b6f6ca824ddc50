//! Per-sheet defect reports.
//!
//! One CSV per sheet at `<report_dir>/<sheet_id>/<sheet_id>.csv`, rows in the
//! order the events were given.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::event::DetectionEvent;
use crate::session::{SessionEnd, SessionOutcome};
use crate::storage::EventSink;

pub const REPORT_COLUMNS: [&str; 4] = ["Defect Type", "Timestamp", "Length (m)", "Defect Image"];

pub trait ReportBuilder {
    /// Write the report and return its path. Event order is preserved.
    fn build(&self, sheet_id: &str, events: &[DetectionEvent]) -> Result<PathBuf>;
}

pub struct CsvReportBuilder {
    root: PathBuf,
}

impl CsvReportBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn report_path(&self, sheet_id: &str) -> PathBuf {
        sheet_dir(&self.root, sheet_id).join(format!("{}.csv", sheet_id))
    }
}

impl ReportBuilder for CsvReportBuilder {
    fn build(&self, sheet_id: &str, events: &[DetectionEvent]) -> Result<PathBuf> {
        let path = self.report_path(sheet_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report directory {}", parent.display()))?;
        }

        let mut out = std::io::BufWriter::new(
            std::fs::File::create(&path)
                .with_context(|| format!("create report {}", path.display()))?,
        );
        write_row(&mut out, REPORT_COLUMNS.iter().copied())?;
        for ev in events {
            let length = format!("{:.2}", ev.position_meters());
            let image = ev.image_path().to_string_lossy();
            let time = ev.display_time();
            write_row(
                &mut out,
                [ev.defect_type(), time.as_str(), length.as_str(), &*image],
            )?;
        }
        out.flush()?;

        log::info!("report for sheet {} written to {}", sheet_id, path.display());
        Ok(path)
    }
}

/// Build the sheet report, then append every event to `sink` again.
///
/// Events handed in here were normally already persisted during detection,
/// so this writes them a second time; the defect log ends up with duplicate
/// rows per report. Append failures are logged and skipped.
pub fn generate_report(
    builder: &dyn ReportBuilder,
    sink: &mut dyn EventSink,
    sheet_id: &str,
    events: &[DetectionEvent],
) -> Result<PathBuf> {
    let path = builder.build(sheet_id, events)?;
    for ev in events {
        if let Err(e) = sink.append(ev) {
            log::warn!(
                "report re-persist failed for sheet {} ({} at {:.2} m): {}",
                sheet_id,
                ev.defect_type(),
                ev.position_meters(),
                e
            );
        }
    }
    Ok(path)
}

/// Report stage for a finished session.
///
/// A sheet whose camera never opened was not inspected, so no report is
/// written and any earlier report for that sheet is left as it was. Every
/// other outcome goes through `generate_report`, including an empty one.
pub fn report_for_outcome(
    builder: &dyn ReportBuilder,
    sink: &mut dyn EventSink,
    outcome: &SessionOutcome,
) -> Result<Option<PathBuf>> {
    if outcome.end == SessionEnd::CameraUnavailable {
        log::warn!(
            "sheet {} was not inspected; report left untouched",
            outcome.sheet_id
        );
        return Ok(None);
    }
    generate_report(builder, sink, &outcome.sheet_id, &outcome.events).map(Some)
}

fn write_row<'a, W: Write>(out: &mut W, fields: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let line = fields
        .into_iter()
        .map(escape_field)
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{}", line)?;
    Ok(())
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Report directory for a sheet, also the parent of its `images/` folder.
pub fn sheet_dir(root: &Path, sheet_id: &str) -> PathBuf {
    root.join(sheet_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryEventSink;
    use chrono::NaiveDate;

    fn event(kind: &str, pos: f64, sec: u32, image: &str) -> DetectionEvent {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(11, 0, sec)
            .unwrap();
        DetectionEvent::new("S-4", kind, 0.8, pos, ts, image)
    }

    #[test]
    fn csv_has_fixed_header_and_given_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let builder = CsvReportBuilder::new(dir.path());
        let events = vec![
            event("scratch", 75.0, 3, "img/b.jpg"),
            event("pit", 12.34, 1, "img/a.jpg"),
        ];

        let path = builder.build("S-4", &events)?;
        assert_eq!(path, dir.path().join("S-4").join("S-4.csv"));

        let body = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Defect Type,Timestamp,Length (m),Defect Image",
                "scratch,11:00:03,75.00,img/b.jpg",
                "pit,11:00:01,12.34,img/a.jpg",
            ]
        );
        Ok(())
    }

    #[test]
    fn csv_quotes_awkward_fields() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let builder = CsvReportBuilder::new(dir.path());
        let path = builder.build("S-4", &[event("edge \"crack\", wide", 1.0, 0, "a.jpg")])?;

        let body = std::fs::read_to_string(path)?;
        assert!(body.contains("\"edge \"\"crack\"\", wide\",11:00:00,1.00,a.jpg"));
        Ok(())
    }

    #[test]
    fn empty_event_list_still_writes_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = CsvReportBuilder::new(dir.path()).build("S-0", &[])?;
        assert_eq!(
            std::fs::read_to_string(path)?,
            "Defect Type,Timestamp,Length (m),Defect Image\n"
        );
        Ok(())
    }

    #[test]
    fn generate_report_appends_each_event_again() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let builder = CsvReportBuilder::new(dir.path());
        let sink = InMemoryEventSink::new();
        let mut writer = sink.clone();
        let events = vec![event("pit", 1.0, 0, "a.jpg"), event("pit", 2.0, 1, "b.jpg")];

        generate_report(&builder, &mut writer, "S-4", &events)?;
        generate_report(&builder, &mut writer, "S-4", &events)?;

        assert_eq!(sink.len(), 4);
        Ok(())
    }

    fn outcome(end: SessionEnd, events: Vec<DetectionEvent>) -> SessionOutcome {
        SessionOutcome {
            sheet_id: "S-4".to_string(),
            end,
            frames_processed: 0,
            events,
        }
    }

    #[test]
    fn uninspected_sheet_keeps_its_previous_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let builder = CsvReportBuilder::new(dir.path());
        let path = builder.build("S-4", &[event("pit", 12.0, 3, "a.jpg")])?;
        let before = std::fs::read_to_string(&path)?;

        let sink = InMemoryEventSink::new();
        let mut writer = sink.clone();
        let written = report_for_outcome(
            &builder,
            &mut writer,
            &outcome(SessionEnd::CameraUnavailable, Vec::new()),
        )?;

        assert!(written.is_none());
        assert_eq!(std::fs::read_to_string(&path)?, before);
        assert!(sink.is_empty());
        Ok(())
    }

    #[test]
    fn inspected_sheet_report_is_rewritten_even_when_clean() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let builder = CsvReportBuilder::new(dir.path());
        builder.build("S-4", &[event("pit", 12.0, 3, "a.jpg")])?;

        let mut sink = InMemoryEventSink::new();
        let written = report_for_outcome(
            &builder,
            &mut sink,
            &outcome(SessionEnd::FrameReadFailure, Vec::new()),
        )?;

        let path = written.expect("report path");
        assert_eq!(
            std::fs::read_to_string(path)?,
            "Defect Type,Timestamp,Length (m),Defect Image\n"
        );

        let written = report_for_outcome(
            &builder,
            &mut sink,
            &outcome(SessionEnd::Stopped, vec![event("scratch", 3.5, 9, "b.jpg")]),
        )?;
        assert!(written.is_some());
        assert_eq!(sink.len(), 1);
        Ok(())
    }
}
