//! Directory replay source.
//!
//! This module provides `DirectorySource` for re-inspecting stills recorded
//! from the line. Frames are the JPEG/PNG files of one local directory in
//! file-name order. When the last file has been read the source reports end of
//! stream, which ends the session like a camera read failure would.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{CameraSource, FramePacer};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct DirectorySource {
    dir: PathBuf,
    pacer: FramePacer,
    queue: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, target_fps: u32) -> Self {
        Self {
            dir: dir.into(),
            pacer: FramePacer::new(target_fps),
            queue: Vec::new(),
            next: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.next)
    }
}

impl CameraSource for DirectorySource {
    fn describe(&self) -> String {
        format!("dir://{}", self.dir.display())
    }

    fn open(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("open frame directory {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        files.sort();
        log::info!(
            "DirectorySource: {} frames queued from {}",
            files.len(),
            self.dir.display()
        );
        self.queue = files;
        self.next = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Option<Frame> {
        let path = self.queue.get(self.next)?.clone();
        self.next += 1;
        self.pacer.wait();
        match image::open(&path) {
            Ok(img) => Some(Frame::from_image(img.to_rgb8())),
            Err(e) => {
                log::warn!("DirectorySource: failed to decode {}: {}", path.display(), e);
                None
            }
        }
    }

    fn release(&mut self) {
        self.queue.clear();
        self.next = 0;
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn replays_images_in_name_order_then_ends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(8, 4, Rgb([1, 2, 3])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(6, 2, Rgb([9, 9, 9])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "not a frame")?;

        let mut source = DirectorySource::new(dir.path(), 0);
        source.open()?;
        assert_eq!(source.remaining(), 2);

        let first = source.read_frame().expect("first frame");
        assert_eq!((first.width(), first.height()), (6, 2));
        let second = source.read_frame().expect("second frame");
        assert_eq!(second.pixel(0, 0), [1, 2, 3]);
        assert!(source.read_frame().is_none());
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = DirectorySource::new(dir.path(), 0);
        assert!(source.open().is_err());
        Ok(())
    }
}
