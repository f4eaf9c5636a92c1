use std::path::PathBuf;

use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::CompositedFrame;

/// Writes every Nth composited frame to disk as a transparent PNG.
#[derive(Debug)]
pub struct PngSnapshotWriter {
    output_dir: PathBuf,
    filename_prefix: String,
    every: u64,
    seen: u64,
}

impl PngSnapshotWriter {
    pub fn new(output_dir: impl Into<PathBuf>, every: u64) -> Result<Self> {
        let output_dir = output_dir.into();
        if !output_dir.exists() {
            std::fs::create_dir_all(&output_dir)?;
        }
        Ok(Self {
            output_dir,
            filename_prefix: String::from("holocast-frame"),
            every: every.max(1),
            seen: 0,
        })
    }

    /// Returns the written path, or `None` when this frame was skipped.
    pub fn offer(&mut self, frame: &CompositedFrame) -> Result<Option<PathBuf>> {
        let index = self.seen;
        self.seen += 1;
        if index % self.every != 0 {
            return Ok(None);
        }

        let image = RgbaImage::from_raw(
            u32::from(frame.resolution.width),
            u32::from(frame.resolution.height),
            frame.rgba.clone(),
        )
        .ok_or_else(|| anyhow!("frame buffer does not match {}", frame.resolution))?;

        let path = self
            .output_dir
            .join(format!("{}-{:06}.png", self.filename_prefix, index));
        image.save(&path)?;
        Ok(Some(path))
    }
}
