//! Sheet Inspector
//!
//! Surface inspection for steel sheets on a moving line.
//!
//! # Architecture
//!
//! A detection session pulls frames from a camera, runs a pretrained defect
//! detector on each one, and records every detection at or above the
//! confidence threshold as a `DetectionEvent`. Each event carries the sheet's
//! linear position at the moment of detection, estimated from elapsed time and
//! the constant belt speed.
//!
//! # Module Structure
//!
//! - `clock`: monotonic and wall-clock time sources (system and manual)
//! - `tracker`: belt position estimate (`PositionTracker`)
//! - `frame`: RGB frames and defect crops
//! - `ingest`: camera sources (synthetic, directory replay, V4L2)
//! - `detect`: detector backends (stub, ONNX via tract)
//! - `session`: the capture/detect/log loop (`DetectionSession`)
//! - `storage`: append-only defect log (`EventSink`, SQLite)
//! - `report`: per-sheet CSV reports
//! - `config`: `InspectorConfig` loading and validation

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};

pub mod alert;
pub mod clock;
pub mod config;
pub mod crops;
pub mod detect;
pub mod event;
pub mod frame;
pub mod ingest;
pub mod report;
pub mod session;
pub mod storage;
pub mod tracker;

pub use alert::{DefectObserver, LogAlertObserver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::InspectorConfig;
pub use crops::CropStore;
pub use detect::{open_detector, BoundingBox, DefectDetector, RawDetection, StubBackend};
pub use event::DetectionEvent;
pub use frame::Frame;
pub use ingest::{open_camera, CameraSource, DirectorySource, SyntheticCamera};
pub use report::{generate_report, report_for_outcome, CsvReportBuilder, ReportBuilder};
pub use session::{
    DetectionSession, SessionEnd, SessionOutcome, SessionSettings, SessionState, StopSignal,
};
pub use storage::{EventSink, InMemoryEventSink, SqliteEventSink};
pub use tracker::PositionTracker;

/// URI for a private, shared-cache in-memory SQLite database.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:sheet_inspector_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}
