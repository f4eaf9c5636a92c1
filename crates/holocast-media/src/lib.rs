#![forbid(unsafe_code)]

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod chroma;
pub mod compositor;
pub mod frame;
pub mod snapshot;

mod dummy;

pub use chroma::ChromaKey;
pub use compositor::{ChromaKeyCompositor, CompositorConfig, CompositorStats, Surface};
pub use dummy::{NullAudioSink, SilentAudioSource, TestPatternSource};
pub use frame::{CompositedFrame, FrameBuffer};
pub use snapshot::PngSnapshotWriter;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Rgba8,
    Bgra8,
}

/// One decoded video frame as handed over by a remote track.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u16,
    pub height: u16,
    pub format: FrameFormat,
    pub timestamp_us: u64,
    /// Bytes per row; at least `width * 4`.
    pub stride: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Decoded video coming from a remote track.
pub trait VideoSource: Send {
    /// Native resolution, if the decoder already knows it.
    fn resolution(&self) -> Option<Resolution>;

    /// The frame currently being displayed, or `None` while nothing is decoded yet.
    fn current_frame(&mut self) -> Option<RawFrame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Decoded PCM coming from a remote track.
pub trait AudioSource: Send {
    fn format(&self) -> AudioFormat;

    /// Fill `out` with interleaved samples, returning how many were written.
    fn read(&mut self, out: &mut [f32]) -> usize;
}

/// Playback device for remote audio tracks.
pub trait AudioSink: Send {
    fn attach(&mut self, sid: &str, source: Box<dyn AudioSource>) -> Result<()>;

    /// Returns `false` if nothing was attached under `sid`.
    fn detach(&mut self, sid: &str) -> bool;

    fn attached(&self) -> usize;
}

pub type AudioSinkFactory = Box<dyn Fn() -> Result<Box<dyn AudioSink>> + Send>;
