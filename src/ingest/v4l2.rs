//! Line camera attached as a local V4L2 device (e.g. /dev/video0).
//!
//! The device is asked for packed RGB24 at the configured size. A driver that
//! insists on another pixel layout fails `open`, so the session reports the
//! camera as unavailable instead of feeding garbage to the detector.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;

use super::{CameraSource, FramePacer};
use crate::config::CameraSettings;
use crate::frame::Frame;

const RGB24: &[u8; 4] = b"RGB3";
const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Source {
    settings: CameraSettings,
    pacer: FramePacer,
    capture: Option<DeviceStream>,
    frames_read: u64,
}

/// Open device plus the mmap stream borrowing it.
#[self_referencing]
struct DeviceStream {
    width: u32,
    height: u32,
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            pacer: FramePacer::new(settings.target_fps),
            settings,
            capture: None,
            frames_read: 0,
        }
    }
}

/// Negotiate RGB24 at the requested size; returns the size the driver chose.
fn negotiate(device: &mut v4l::Device, settings: &CameraSettings) -> Result<(u32, u32)> {
    let mut wanted = device.format().context("read v4l2 format")?;
    wanted.width = settings.width;
    wanted.height = settings.height;
    wanted.fourcc = v4l::FourCC::new(RGB24);

    let active = device
        .set_format(&wanted)
        .or_else(|e| {
            log::warn!("line camera {}: format not accepted: {}", settings.uri, e);
            device.format()
        })
        .context("read v4l2 format")?;
    if active.fourcc != v4l::FourCC::new(RGB24) {
        return Err(anyhow!(
            "line camera {} delivers {} instead of RGB24",
            settings.uri,
            active.fourcc
        ));
    }

    if settings.target_fps > 0 {
        let params = v4l::video::capture::Parameters::with_fps(settings.target_fps);
        if let Err(e) = device.set_params(&params) {
            log::warn!("line camera {}: frame rate not accepted: {}", settings.uri, e);
        }
    }
    Ok((active.width, active.height))
}

impl CameraSource for V4l2Source {
    fn describe(&self) -> String {
        self.settings.uri.clone()
    }

    fn open(&mut self) -> Result<()> {
        let mut device = v4l::Device::with_path(&self.settings.uri)
            .with_context(|| format!("open v4l2 device {}", self.settings.uri))?;
        let (width, height) = negotiate(&mut device, &self.settings)?;

        let capture = DeviceStreamTryBuilder {
            width,
            height,
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .context("create v4l2 buffer stream")
            },
        }
        .try_build()?;
        self.capture = Some(capture);

        log::info!("line camera {} streaming at {}x{}", self.settings.uri, width, height);
        Ok(())
    }

    fn read_frame(&mut self) -> Option<Frame> {
        self.pacer.wait();
        let capture = self.capture.as_mut()?;
        let (width, height) = (*capture.borrow_width(), *capture.borrow_height());
        let data = match capture.with_stream_mut(|stream| stream.next().map(|(buf, _)| buf.to_vec())) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("line camera {}: capture failed: {}", self.settings.uri, e);
                return None;
            }
        };
        self.frames_read += 1;

        Frame::new(data, width, height)
            .map_err(|e| log::warn!("line camera {}: unusable frame: {}", self.settings.uri, e))
            .ok()
    }

    fn release(&mut self) {
        if self.capture.take().is_some() {
            log::info!(
                "line camera {} released after {} frames",
                self.settings.uri,
                self.frames_read
            );
        }
    }
}
