//! Synthetic line camera.
//!
//! Produces brushed-steel grey frames with sensor noise and, every
//! `DEFECT_EVERY` frames, a dark scratch at a random spot. `stub://offline`
//! refuses to open, which exercises the camera-unavailable path.

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{CameraSource, FramePacer};
use crate::config::CameraSettings;
use crate::frame::{rgb_len, Frame};

const DEFECT_EVERY: u64 = 25;
const STEEL_LEVEL: u8 = 160;

pub struct SyntheticCamera {
    settings: CameraSettings,
    pacer: FramePacer,
    opened: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            pacer: FramePacer::new(settings.target_fps),
            settings,
            opened: false,
            frame_count: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    /// Caller guarantees `rgb_len(w, h)` fits; `open` checks it.
    fn generate_pixels(&self, len: usize) -> Vec<u8> {
        let (w, h) = (self.settings.width as usize, self.settings.height as usize);
        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; len];

        // Rolling direction gives horizontal grain.
        for y in 0..h {
            let grain = (y * 7 % 11) as u8;
            for x in 0..w {
                let idx = (y * w + x) * 3;
                let level = STEEL_LEVEL - grain + rng.gen_range(0..12);
                pixels[idx..idx + 3].copy_from_slice(&[level, level, level.saturating_add(4)]);
            }
        }

        if self.frame_count % DEFECT_EVERY == 0 {
            let bar_w = (w / 8).max(4);
            let bar_h = (h / 40).max(2);
            let x0 = rng.gen_range(0..w.saturating_sub(bar_w).max(1));
            let y0 = rng.gen_range(0..h.saturating_sub(bar_h).max(1));
            for y in y0..(y0 + bar_h).min(h) {
                for x in x0..(x0 + bar_w).min(w) {
                    let idx = (y * w + x) * 3;
                    pixels[idx..idx + 3].copy_from_slice(&[12, 12, 14]);
                }
            }
        }

        pixels
    }
}

impl CameraSource for SyntheticCamera {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.settings.uri)
    }

    fn open(&mut self) -> Result<()> {
        if self.settings.uri == "stub://offline" {
            return Err(anyhow!("camera {} is not connected", self.settings.uri));
        }
        if rgb_len(self.settings.width, self.settings.height).is_none() {
            return Err(anyhow!(
                "camera {} frame size {}x{} is too large",
                self.settings.uri,
                self.settings.width,
                self.settings.height
            ));
        }
        self.opened = true;
        log::info!(
            "SyntheticCamera: connected to {} ({}x{})",
            self.settings.uri,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if !self.opened {
            log::warn!("SyntheticCamera: read on closed camera {}", self.settings.uri);
            return None;
        }
        self.pacer.wait();
        self.frame_count += 1;
        let len = rgb_len(self.settings.width, self.settings.height)?;
        let pixels = self.generate_pixels(len);
        match Frame::new(pixels, self.settings.width, self.settings.height) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("SyntheticCamera: {}", e);
                None
            }
        }
    }

    fn release(&mut self) {
        if self.opened {
            log::info!(
                "SyntheticCamera: released {} after {} frames",
                self.settings.uri,
                self.frame_count
            );
        }
        self.opened = false;
    }
}
