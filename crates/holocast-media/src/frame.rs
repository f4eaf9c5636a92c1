//! Per-iteration pixel buffers.
//!
//! A [`FrameBuffer`] is built fresh from each decoded frame and consumed into a
//! [`CompositedFrame`]; nothing is carried over between iterations.

use anyhow::{anyhow, Result};

use crate::{FrameFormat, RawFrame, Resolution};

/// Tightly packed RGBA8 working copy of one decoded frame.
#[derive(Debug)]
pub struct FrameBuffer {
    resolution: Resolution,
    timestamp_us: u64,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Copy `frame` into a packed RGBA8 buffer, swizzling BGRA if needed.
    pub fn from_raw(frame: &RawFrame) -> Result<Self> {
        let resolution = frame.resolution();
        if resolution.is_empty() {
            return Err(anyhow!("frame has no pixels ({resolution})"));
        }

        let row_bytes = frame.width as usize * 4;
        let stride = frame.stride as usize;
        if stride < row_bytes {
            return Err(anyhow!(
                "stride {stride} shorter than row of {row_bytes} bytes"
            ));
        }
        let needed = stride * (frame.height as usize - 1) + row_bytes;
        if frame.data.len() < needed {
            return Err(anyhow!(
                "frame data too short: {} bytes, need {needed}",
                frame.data.len()
            ));
        }

        let mut data = Vec::with_capacity(resolution.pixel_count() * 4);
        for row in frame.data.chunks(stride).take(frame.height as usize) {
            let row = &row[..row_bytes];
            match frame.format {
                FrameFormat::Rgba8 => data.extend_from_slice(row),
                FrameFormat::Bgra8 => {
                    for px in row.chunks_exact(4) {
                        data.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
            }
        }

        Ok(Self {
            resolution,
            timestamp_us: frame.timestamp_us,
            data,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_frame(self) -> CompositedFrame {
        CompositedFrame {
            resolution: self.resolution,
            timestamp_us: self.timestamp_us,
            rgba: self.data,
        }
    }
}

/// A finished, transparent-background frame ready for the AR layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositedFrame {
    pub resolution: Resolution,
    pub timestamp_us: u64,
    pub rgba: Vec<u8>,
}

impl CompositedFrame {
    pub fn pixel(&self, x: u16, y: u16) -> Option<[u8; 4]> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        let idx = (y as usize * self.resolution.width as usize + x as usize) * 4;
        let px = self.rgba.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn transparent_pixels(&self) -> usize {
        self.rgba.chunks_exact(4).filter(|px| px[3] == 0).count()
    }
}
