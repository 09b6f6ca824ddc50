//! Camera sources.
//!
//! This module provides the frame collaborators a detection session pulls
//! from:
//! - Synthetic line camera (`stub://`) for demos and tests
//! - Directory replay of recorded stills (`dir://`)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! A camera is owned exclusively by one session. The session calls `open`
//! once, `read_frame` until it stops, and `release` exactly once on the way
//! out, whatever the exit path.

pub mod dir;
pub mod stub;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::config::CameraSettings;
use crate::frame::Frame;

pub use dir::DirectorySource;
pub use stub::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

pub trait CameraSource: Send {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Acquire the device. An error here means the session never starts.
    fn open(&mut self) -> Result<()>;

    /// Next frame, or `None` when the source can no longer deliver one.
    fn read_frame(&mut self) -> Option<Frame>;

    /// Give the device back. Must tolerate being called on an unopened source.
    fn release(&mut self);
}

/// Build the camera named by `settings.uri`. Does not open it.
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn CameraSource>> {
    let uri = settings.uri.trim();
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(settings.clone())));
    }
    if let Some(path) = uri.strip_prefix("dir://") {
        return Ok(Box::new(DirectorySource::new(path, settings.target_fps)));
    }
    if uri.contains("://") {
        return Err(anyhow!("unsupported camera uri '{}'", uri));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(settings.clone())))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!(
            "camera device '{}' requires the ingest-v4l2 feature",
            uri
        ))
    }
}

/// Sleeps just long enough to hold a source at `target_fps`.
#[derive(Debug)]
pub(crate) struct FramePacer {
    interval: Option<std::time::Duration>,
    last: Option<std::time::Instant>,
}

impl FramePacer {
    pub(crate) fn new(target_fps: u32) -> Self {
        let interval = (target_fps > 0)
            .then(|| std::time::Duration::from_secs_f64(1.0 / target_fps as f64));
        Self {
            interval,
            last: None,
        }
    }

    pub(crate) fn wait(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last) {
            let since = last.elapsed();
            if since < interval {
                std::thread::sleep(interval - since);
            }
        }
        self.last = Some(std::time::Instant::now());
    }
}
