//! One inspection run over one sheet.
//!
//! The loop pulls a frame, asks the detector for defects, and turns every
//! detection at or above the confidence threshold into a `DetectionEvent`
//! tagged with the tracker's position. Each event is cropped to disk,
//! accumulated in detection order, written to the event sink and shown to the
//! observer. Sink, crop and observer failures are logged and the loop goes on;
//! a failed frame read or the stop signal ends it.
//!
//! The camera and tracker are held by a drop guard for the duration of the
//! loop, so the tracker is stopped and the camera released exactly once even
//! if a collaborator panics.

use anyhow::{anyhow, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::alert::DefectObserver;
use crate::clock::{Clock, SystemClock};
use crate::config::{validate_belt_speed, validate_confidence, InspectorConfig};
use crate::crops::CropStore;
use crate::detect::{DefectDetector, RawDetection};
use crate::event::DetectionEvent;
use crate::frame::Frame;
use crate::ingest::CameraSource;
use crate::storage::EventSink;
use crate::tracker::PositionTracker;

const PROGRESS_LOG_EVERY: u64 = 100;

/// Cooperative stop flag shared between the session and its control surface.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub sheet_id: String,
    /// Metres per second.
    pub belt_speed: f64,
    pub confidence_threshold: f32,
    /// Root for crop images (`<report_dir>/<sheet_id>/images`).
    pub report_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_config(cfg: &InspectorConfig, sheet_id: &str) -> Self {
        Self {
            sheet_id: sheet_id.to_string(),
            belt_speed: cfg.belt_speed,
            confidence_threshold: cfg.confidence_threshold,
            report_dir: cfg.report_dir.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_sheet_id(&self.sheet_id)?;
        validate_belt_speed(self.belt_speed)?;
        validate_confidence(self.confidence_threshold)?;
        Ok(())
    }
}

/// Sheet ids name report directories, so they must be a single path segment.
pub fn validate_sheet_id(sheet_id: &str) -> Result<()> {
    let trimmed = sheet_id.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("sheet id must not be empty"));
    }
    if trimmed != sheet_id {
        return Err(anyhow!("sheet id must not have leading or trailing spaces"));
    }
    if sheet_id == "." || sheet_id == ".." || sheet_id.contains(['/', '\\']) {
        return Err(anyhow!("sheet id '{}' is not a valid directory name", sheet_id));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The camera could not be opened; no frame was read.
    CameraUnavailable,
    /// The camera stopped delivering frames.
    FrameReadFailure,
    /// The stop signal was observed.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Running,
    Finished,
}

#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub sheet_id: String,
    pub end: SessionEnd,
    pub frames_processed: u64,
    /// Accepted events in detection order.
    pub events: Vec<DetectionEvent>,
}

/// Everything that turns detections into events.
struct EventPipeline {
    sheet_id: String,
    confidence_threshold: f32,
    clock: Arc<dyn Clock>,
    detector: Box<dyn DefectDetector>,
    sink: Box<dyn EventSink>,
    crops: CropStore,
    observer: Option<Box<dyn DefectObserver>>,
    events: Vec<DetectionEvent>,
    persist_failures: u64,
}

pub struct DetectionSession {
    pipeline: EventPipeline,
    tracker: PositionTracker,
    camera: Option<Box<dyn CameraSource>>,
    stop: StopSignal,
    state: SessionState,
}

impl DetectionSession {
    /// Validates settings; an invalid sheet id, speed or threshold is a setup
    /// error and no session is created.
    pub fn new(
        settings: SessionSettings,
        camera: Box<dyn CameraSource>,
        detector: Box<dyn DefectDetector>,
        sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        settings.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        Ok(Self {
            tracker: PositionTracker::new(settings.belt_speed, clock.clone()),
            pipeline: EventPipeline {
                sheet_id: settings.sheet_id,
                confidence_threshold: settings.confidence_threshold,
                clock,
                detector,
                sink,
                crops: CropStore::new(settings.report_dir),
                observer: None,
                events: Vec::new(),
                persist_failures: 0,
            },
            camera: Some(camera),
            stop: StopSignal::new(),
            state: SessionState::Ready,
        })
    }

    /// Replace the time source for both position and timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tracker = PositionTracker::new(self.tracker.speed(), clock.clone());
        self.pipeline.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn DefectObserver>) -> Self {
        self.pipeline.observer = Some(observer);
        self
    }

    /// Share an existing stop flag, e.g. one already wired to a signal handler.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Handle for requesting a stop from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn sheet_id(&self) -> &str {
        &self.pipeline.sheet_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn events(&self) -> &[DetectionEvent] {
        &self.pipeline.events
    }

    /// Sink failures seen so far; the affected events exist only in memory.
    pub fn persist_failures(&self) -> u64 {
        self.pipeline.persist_failures
    }

    pub fn sink_mut(&mut self) -> &mut dyn EventSink {
        self.pipeline.sink.as_mut()
    }

    /// Run the session to completion. A session runs once; a second call is
    /// an error.
    pub fn run(&mut self) -> Result<SessionOutcome> {
        let camera = self
            .camera
            .take()
            .ok_or_else(|| anyhow!("session for sheet {} already ran", self.pipeline.sheet_id))?;
        self.state = SessionState::Running;

        let Self {
            pipeline,
            tracker,
            stop,
            ..
        } = self;
        let mut guard = ActiveRun { camera, tracker };

        let (end, frames_processed) = match guard.camera.open() {
            Err(e) => {
                log::error!(
                    "camera {} unavailable, sheet {} not inspected: {}",
                    guard.camera.describe(),
                    pipeline.sheet_id,
                    e
                );
                (SessionEnd::CameraUnavailable, 0)
            }
            Ok(()) => {
                log::info!(
                    "inspecting sheet {} from {} (speed {} m/s, threshold {:.2})",
                    pipeline.sheet_id,
                    guard.camera.describe(),
                    guard.tracker.speed(),
                    pipeline.confidence_threshold
                );
                guard.tracker.start();
                drive(&mut guard, pipeline, stop)
            }
        };
        drop(guard);
        self.state = SessionState::Finished;

        log::info!(
            "sheet {} finished ({:?}): {} frames, {} defects, {} persist failures",
            self.pipeline.sheet_id,
            end,
            frames_processed,
            self.pipeline.events.len(),
            self.pipeline.persist_failures
        );

        Ok(SessionOutcome {
            sheet_id: self.pipeline.sheet_id.clone(),
            end,
            frames_processed,
            events: self.pipeline.events.clone(),
        })
    }
}

/// Owns the camera for the loop and releases it, with the tracker, on drop.
struct ActiveRun<'a> {
    camera: Box<dyn CameraSource>,
    tracker: &'a mut PositionTracker,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.tracker.stop();
        self.camera.release();
    }
}

fn drive(
    run: &mut ActiveRun<'_>,
    pipeline: &mut EventPipeline,
    stop: &StopSignal,
) -> (SessionEnd, u64) {
    let mut frames = 0u64;
    loop {
        if stop.is_requested() {
            return (SessionEnd::Stopped, frames);
        }
        let Some(frame) = run.camera.read_frame() else {
            log::warn!("camera {} failed to deliver a frame", run.camera.describe());
            return (SessionEnd::FrameReadFailure, frames);
        };

        pipeline.process_frame(&frame, &*run.tracker);
        frames += 1;

        if frames % PROGRESS_LOG_EVERY == 0 {
            log::info!(
                "sheet {}: {} frames, {} defects, {}",
                pipeline.sheet_id,
                frames,
                pipeline.events.len(),
                run.tracker.display()
            );
        }

        if stop.is_requested() {
            return (SessionEnd::Stopped, frames);
        }
    }
}

impl EventPipeline {
    fn process_frame(&mut self, frame: &Frame, tracker: &PositionTracker) {
        let detections = match self.detector.infer(frame, self.confidence_threshold) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!(
                    "detector '{}' failed on sheet {}, frame skipped: {}",
                    self.detector.name(),
                    self.sheet_id,
                    e
                );
                Vec::new()
            }
        };

        for det in detections {
            if det.confidence >= self.confidence_threshold {
                self.record(frame, det, tracker);
            }
        }
    }

    fn record(&mut self, frame: &Frame, det: RawDetection, tracker: &PositionTracker) {
        let position = tracker.get_length();
        let timestamp = self.clock.wall_now();

        let image_path = self.crops.path_for(&self.sheet_id, &det.label, timestamp);
        if let Err(e) = self.crops.save(frame, &det.bbox, &image_path) {
            log::warn!(
                "crop for {} at {:.2} m not saved, {} will be missing: {}",
                det.label,
                position,
                image_path.display(),
                e
            );
        }

        let event = DetectionEvent::new(
            self.sheet_id.as_str(),
            det.label,
            det.confidence,
            position,
            timestamp,
            image_path,
        );
        log::info!(
            "defect: {} at {:.2} m [{}] conf={:.2}",
            event.defect_type(),
            event.position_meters(),
            event.display_time(),
            event.confidence()
        );
        self.events.push(event.clone());

        if let Err(e) = self.sink.append(&event) {
            self.persist_failures += 1;
            log::warn!(
                "defect log write failed for sheet {} ({} at {:.2} m): {}",
                self.sheet_id,
                event.defect_type(),
                event.position_meters(),
                e
            );
        }

        if let Some(observer) = self.observer.as_mut() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_defect(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("defect alert failed: {}", e),
                Err(_) => log::error!("defect alert panicked; continuing detection"),
            }
        }
    }
}
