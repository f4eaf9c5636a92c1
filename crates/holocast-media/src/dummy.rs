use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::time::Instant;

use crate::{
    AudioFormat, AudioSink, AudioSource, FrameFormat, RawFrame, Resolution, VideoSource,
};

const GREEN_SCREEN: [u8; 4] = [0, 255, 0, 255];
const AVATAR_TONE: [u8; 4] = [224, 172, 105, 255];

/// Synthetic talking-head feed: a figure standing in front of a pure-green backdrop.
pub struct TestPatternSource {
    resolution: Resolution,
    start: Instant,
    seq: u64,
    warmup: u64,
}

impl TestPatternSource {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            start: Instant::now(),
            seq: 0,
            warmup: 0,
        }
    }

    /// Report no decoded frame for the first `polls` calls, like a video element still buffering.
    pub fn with_warmup(mut self, polls: u64) -> Self {
        self.warmup = polls;
        self
    }

    fn render(&self) -> Vec<u8> {
        let w = self.resolution.width as usize;
        let h = self.resolution.height as usize;
        // Slow bob so consecutive frames differ.
        let bob = ((self.seq / 15) % 2) as usize;
        let (x0, x1) = (w / 3, w - w / 3);
        let y0 = h / 4 + bob;

        let mut data = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                let inside = x >= x0 && x < x1 && y >= y0;
                data.extend_from_slice(if inside { &AVATAR_TONE } else { &GREEN_SCREEN });
            }
        }
        data
    }
}

impl VideoSource for TestPatternSource {
    fn resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    fn current_frame(&mut self) -> Option<RawFrame> {
        if self.warmup > 0 {
            self.warmup -= 1;
            return None;
        }
        let frame = RawFrame {
            width: self.resolution.width,
            height: self.resolution.height,
            format: FrameFormat::Rgba8,
            timestamp_us: self.start.elapsed().as_micros() as u64,
            stride: self.resolution.width as u32 * 4,
            data: self.render(),
        };
        self.seq += 1;
        Some(frame)
    }
}

pub struct SilentAudioSource {
    format: AudioFormat,
}

impl SilentAudioSource {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            format: AudioFormat {
                sample_rate,
                channels,
            },
        }
    }
}

impl AudioSource for SilentAudioSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        out.fill(0.0);
        out.len()
    }
}

/// Playback sink that holds on to attached tracks without producing sound.
#[derive(Default)]
pub struct NullAudioSink {
    tracks: HashMap<String, Box<dyn AudioSource>>,
}

impl NullAudioSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for NullAudioSink {
    fn attach(&mut self, sid: &str, source: Box<dyn AudioSource>) -> Result<()> {
        if sid.is_empty() {
            return Err(anyhow!("audio track has no sid"));
        }
        let format = source.format();
        tracing::debug!(
            "audio track {} attached ({} Hz, {} ch)",
            sid,
            format.sample_rate,
            format.channels
        );
        self.tracks.insert(sid.to_string(), source);
        Ok(())
    }

    fn detach(&mut self, sid: &str) -> bool {
        self.tracks.remove(sid).is_some()
    }

    fn attached(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_reports_not_ready() {
        let mut source = TestPatternSource::new(Resolution::new(8, 8)).with_warmup(2);
        assert!(source.current_frame().is_none());
        assert!(source.current_frame().is_none());
        let frame = source.current_frame().unwrap();
        assert_eq!(frame.data.len(), 8 * 8 * 4);
        assert_eq!(&frame.data[0..4], &GREEN_SCREEN);
    }

    #[test]
    fn null_sink_tracks_attachments() {
        let mut sink = NullAudioSink::new();
        sink.attach("a1", Box::new(SilentAudioSource::new(48_000, 2)))
            .unwrap();
        assert_eq!(sink.attached(), 1);
        assert!(sink.attach("", Box::new(SilentAudioSource::new(48_000, 2))).is_err());
        assert!(sink.detach("a1"));
        assert!(!sink.detach("a1"));
    }

    #[test]
    fn silence_fills_buffer() {
        let mut source = SilentAudioSource::new(16_000, 1);
        let mut buf = [1.0f32; 32];
        assert_eq!(source.read(&mut buf), 32);
        assert!(buf.iter().all(|s| *s == 0.0));
    }
}
