//! Frame-synchronous chroma-key compositor.
//!
//! The frame loop runs as one task that ticks at the display refresh rate, keys
//! the current decoded frame into the output [`Surface`], and at a fixed capture
//! rate publishes the latest surface frame to subscribers. The loop only keeps
//! going while its `live` gate reads `true`; once the gate drops it returns and
//! holds no timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::frame::{CompositedFrame, FrameBuffer};
use crate::{ChromaKey, Resolution, VideoSource};

pub const DEFAULT_SURFACE: Resolution = Resolution::new(512, 512);
const OUTPUT_CHANNEL_DEPTH: usize = 8;
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompositorConfig {
    /// Rate of the keying pass; stands in for the display refresh.
    pub refresh_hz: u32,
    /// Rate at which composited frames are published to subscribers.
    pub capture_fps: u32,
    /// Surface size used until the source reports its own.
    pub default_resolution: Resolution,
    pub key: ChromaKey,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60,
            capture_fps: 30,
            default_resolution: DEFAULT_SURFACE,
            key: ChromaKey::default(),
        }
    }
}

/// Tick period for a rate, never shorter than 1 ms (`interval` rejects zero).
fn period_for(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / hz.max(1) as f64).max(MIN_PERIOD)
}

#[derive(Debug, Default)]
pub struct CompositorStats {
    pub frames_composited: AtomicU64,
    pub frames_not_ready: AtomicU64,
    pub frames_captured: AtomicU64,
    pub pixels_keyed: AtomicU64,
}

/// Counter snapshot used to turn the cumulative stats into per-window rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateWindow {
    composited: u64,
    captured: u64,
}

impl RateWindow {
    fn starting_at(stats: &CompositorStats) -> Self {
        Self {
            composited: stats.frames_composited.load(Ordering::Relaxed),
            captured: stats.frames_captured.load(Ordering::Relaxed),
        }
    }

    /// Frames keyed and captured since the previous call.
    fn advance(&mut self, stats: &CompositorStats) -> (u64, u64) {
        let now = Self::starting_at(stats);
        let delta = (
            now.composited.saturating_sub(self.composited),
            now.captured.saturating_sub(self.captured),
        );
        *self = now;
        delta
    }
}

/// The displayed output: its current size and the most recent keyed frame.
#[derive(Debug, Clone)]
pub struct Surface {
    pub resolution: Resolution,
    pub frame: Option<Arc<CompositedFrame>>,
}

pub struct ChromaKeyCompositor {
    config: CompositorConfig,
    live: watch::Receiver<bool>,
    surface: Arc<watch::Sender<Surface>>,
    output: broadcast::Sender<Arc<CompositedFrame>>,
    stats: Arc<CompositorStats>,
    task: Option<JoinHandle<()>>,
}

impl ChromaKeyCompositor {
    /// `live` is the activation gate: the frame loop runs only while it reads `true`.
    pub fn new(config: CompositorConfig, live: watch::Receiver<bool>) -> Self {
        let (surface, _) = watch::channel(Surface {
            resolution: config.default_resolution,
            frame: None,
        });
        let (output, _) = broadcast::channel(OUTPUT_CHANNEL_DEPTH);
        Self {
            config,
            live,
            surface: Arc::new(surface),
            output,
            stats: Arc::new(CompositorStats::default()),
            task: None,
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Bind a new video source, replacing any previous one, and start the frame loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach_source(&mut self, source: Box<dyn VideoSource>) {
        if let Some(previous) = self.task.take() {
            debug!("replacing compositor source");
            previous.abort();
        }

        let resolution = source
            .resolution()
            .filter(|r| !r.is_empty())
            .unwrap_or(self.config.default_resolution);
        self.surface.send_replace(Surface {
            resolution,
            frame: None,
        });
        info!("compositor surface allocated at {}", resolution);

        let frame_loop = FrameLoop {
            source,
            key: self.config.key,
            refresh: period_for(self.config.refresh_hz),
            capture: period_for(self.config.capture_fps),
            live: self.live.clone(),
            surface: self.surface.clone(),
            output: self.output.clone(),
            stats: self.stats.clone(),
        };
        self.task = Some(tokio::spawn(frame_loop.run()));
    }

    /// Drop the current source. The surface keeps its size but loses its frame.
    pub fn detach_source(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.surface.send_modify(|s| s.frame = None);
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait until the frame loop has returned. Only meaningful once the gate reads `false`.
    pub async fn stopped(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Composited frames at the capture rate.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CompositedFrame>> {
        self.output.subscribe()
    }

    /// The surface as last written by the keying pass.
    pub fn surface(&self) -> watch::Receiver<Surface> {
        self.surface.subscribe()
    }

    pub fn stats(&self) -> Arc<CompositorStats> {
        self.stats.clone()
    }
}

impl Drop for ChromaKeyCompositor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct FrameLoop {
    source: Box<dyn VideoSource>,
    key: ChromaKey,
    refresh: Duration,
    capture: Duration,
    live: watch::Receiver<bool>,
    surface: Arc<watch::Sender<Surface>>,
    output: broadcast::Sender<Arc<CompositedFrame>>,
    stats: Arc<CompositorStats>,
}

impl FrameLoop {
    async fn run(mut self) {
        let mut refresh = time::interval(self.refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut capture = time::interval(self.capture);
        capture.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut report = time::interval(Duration::from_secs(1));
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut window = RateWindow::starting_at(&self.stats);

        debug!("frame loop started");
        loop {
            if !*self.live.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;
                changed = self.live.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = refresh.tick() => self.composite_once(),
                _ = capture.tick() => self.capture_once(),
                _ = report.tick() => {
                    let (keyed, captured) = window.advance(&self.stats);
                    debug!("compositor fps: keyed={} captured={}", keyed, captured);
                }
            }
        }
        debug!("frame loop stopped");
    }

    fn composite_once(&mut self) {
        let Some(raw) = self.source.current_frame() else {
            self.stats.frames_not_ready.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let mut buffer = match FrameBuffer::from_raw(&raw) {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!("dropping undecodable frame: {}", err);
                return;
            }
        };
        let keyed = self.key.apply(buffer.data_mut());
        let frame = Arc::new(buffer.into_frame());

        self.surface.send_modify(|surface| {
            if surface.resolution != frame.resolution {
                debug!(
                    "resizing surface {} -> {}",
                    surface.resolution, frame.resolution
                );
                surface.resolution = frame.resolution;
            }
            surface.frame = Some(frame);
        });
        self.stats.frames_composited.fetch_add(1, Ordering::Relaxed);
        self.stats
            .pixels_keyed
            .fetch_add(keyed as u64, Ordering::Relaxed);
    }

    fn capture_once(&mut self) {
        let latest = self.surface.borrow().frame.clone();
        if let Some(frame) = latest {
            // No subscribers is fine; the surface is still readable.
            let _ = self.output.send(frame);
            self.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
        }
    }
}
