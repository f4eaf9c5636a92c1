//! In-process room and microphone.
//!
//! `LoopbackRoom` stands in for a native media-room backend: it accepts any
//! URL/token, and can play a synthetic avatar feed (test pattern on a green
//! screen plus silence). Handles expose what happened so callers can inspect
//! and script the room from outside.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use holocast_media::{Resolution, SilentAudioSource, TestPatternSource};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::room::{
    AudioCaptureOptions, AudioDevices, MediaRoom, MicrophoneCapture, RemoteTrack, RoomEvent,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct RoomShared {
    events: Option<mpsc::UnboundedSender<RoomEvent>>,
    connects: usize,
    disconnects: usize,
    published: Vec<String>,
    unpublished: Vec<String>,
    last_url: Option<String>,
    fail_connect: Option<String>,
    fail_publish: Option<String>,
    fail_unpublish: Option<String>,
    fail_disconnect: Option<String>,
}

pub struct LoopbackRoom {
    shared: Arc<Mutex<RoomShared>>,
    feed: Option<Resolution>,
}

/// Remote control for a [`LoopbackRoom`].
#[derive(Clone)]
pub struct LoopbackRoomHandle {
    shared: Arc<Mutex<RoomShared>>,
}

impl LoopbackRoom {
    /// A room that only reports `Connected`; tracks are injected through the handle.
    pub fn new() -> (Self, LoopbackRoomHandle) {
        Self::build(None)
    }

    /// A room whose avatar publishes a test-pattern video and a silent audio track on join.
    pub fn with_avatar_feed(resolution: Resolution) -> (Self, LoopbackRoomHandle) {
        Self::build(Some(resolution))
    }

    fn build(feed: Option<Resolution>) -> (Self, LoopbackRoomHandle) {
        let shared = Arc::new(Mutex::new(RoomShared::default()));
        (
            Self {
                shared: shared.clone(),
                feed,
            },
            LoopbackRoomHandle { shared },
        )
    }
}

#[async_trait]
impl MediaRoom for LoopbackRoom {
    async fn connect(
        &mut self,
        url: &str,
        _access_token: &str,
    ) -> Result<mpsc::UnboundedReceiver<RoomEvent>> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = shared.fail_connect.take() {
            return Err(anyhow!(reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(RoomEvent::Connected);
        if let Some(resolution) = self.feed {
            let _ = tx.send(RoomEvent::TrackSubscribed(RemoteTrack::Video {
                sid: format!("TR_V{}", Uuid::new_v4().simple()),
                source: Box::new(TestPatternSource::new(resolution)),
            }));
            let _ = tx.send(RoomEvent::TrackSubscribed(RemoteTrack::Audio {
                sid: format!("TR_A{}", Uuid::new_v4().simple()),
                source: Box::new(SilentAudioSource::new(48_000, 1)),
            }));
        }

        shared.events = Some(tx);
        shared.connects += 1;
        shared.last_url = Some(url.to_string());
        debug!("loopback room joined at {}", url);
        Ok(rx)
    }

    async fn publish_audio(&mut self, capture: &mut dyn MicrophoneCapture) -> Result<String> {
        let mut shared = lock(&self.shared);
        if shared.events.is_none() {
            return Err(anyhow!("not connected"));
        }
        if let Some(reason) = shared.fail_publish.take() {
            return Err(anyhow!(reason));
        }
        let sid = format!("TR_L{}", Uuid::new_v4().simple());
        debug!("loopback room publishing {} as {}", capture.label(), sid);
        shared.published.push(sid.clone());
        Ok(sid)
    }

    async fn unpublish(&mut self, sid: &str) -> Result<()> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = shared.fail_unpublish.take() {
            return Err(anyhow!(reason));
        }
        shared.unpublished.push(sid.to_string());
        Ok(())
    }

    /// A scripted failure leaves the connection open, as a stuck signalling socket would.
    async fn disconnect(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = shared.fail_disconnect.take() {
            return Err(anyhow!(reason));
        }
        shared.events = None;
        shared.disconnects += 1;
        Ok(())
    }
}

impl LoopbackRoomHandle {
    /// Deliver an event to the current connection. Returns `false` if nobody is listening.
    pub fn emit(&self, event: RoomEvent) -> bool {
        match lock(&self.shared).events.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Simulate the server closing the room.
    pub fn drop_connection(&self, reason: &str) {
        let mut shared = lock(&self.shared);
        if let Some(tx) = shared.events.take() {
            let _ = tx.send(RoomEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    pub fn fail_next_connect(&self, reason: &str) {
        lock(&self.shared).fail_connect = Some(reason.to_string());
    }

    pub fn fail_next_publish(&self, reason: &str) {
        lock(&self.shared).fail_publish = Some(reason.to_string());
    }

    pub fn fail_next_unpublish(&self, reason: &str) {
        lock(&self.shared).fail_unpublish = Some(reason.to_string());
    }

    pub fn fail_next_disconnect(&self, reason: &str) {
        lock(&self.shared).fail_disconnect = Some(reason.to_string());
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).events.is_some()
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.shared).connects
    }

    pub fn disconnect_count(&self) -> usize {
        lock(&self.shared).disconnects
    }

    pub fn published(&self) -> Vec<String> {
        lock(&self.shared).published.clone()
    }

    pub fn unpublished(&self) -> Vec<String> {
        lock(&self.shared).unpublished.clone()
    }

    pub fn last_url(&self) -> Option<String> {
        lock(&self.shared).last_url.clone()
    }
}

#[derive(Default)]
struct DevicesShared {
    captures: Vec<Arc<AtomicBool>>,
    last_options: Option<AudioCaptureOptions>,
    fail_open: Option<String>,
}

pub struct LoopbackDevices {
    shared: Arc<Mutex<DevicesShared>>,
}

#[derive(Clone)]
pub struct LoopbackDevicesHandle {
    shared: Arc<Mutex<DevicesShared>>,
}

impl LoopbackDevices {
    pub fn new() -> (Self, LoopbackDevicesHandle) {
        let shared = Arc::new(Mutex::new(DevicesShared::default()));
        (
            Self {
                shared: shared.clone(),
            },
            LoopbackDevicesHandle { shared },
        )
    }
}

#[async_trait]
impl AudioDevices for LoopbackDevices {
    async fn open_microphone(
        &mut self,
        options: AudioCaptureOptions,
    ) -> Result<Box<dyn MicrophoneCapture>> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = shared.fail_open.take() {
            return Err(anyhow!(reason));
        }
        let live = Arc::new(AtomicBool::new(true));
        shared.captures.push(live.clone());
        shared.last_options = Some(options);
        Ok(Box::new(LoopbackCapture { live }))
    }
}

impl LoopbackDevicesHandle {
    /// Captures that have been opened and not yet stopped.
    pub fn live_captures(&self) -> usize {
        lock(&self.shared)
            .captures
            .iter()
            .filter(|live| live.load(Ordering::SeqCst))
            .count()
    }

    pub fn opened(&self) -> usize {
        lock(&self.shared).captures.len()
    }

    pub fn last_options(&self) -> Option<AudioCaptureOptions> {
        lock(&self.shared).last_options
    }

    pub fn fail_next_open(&self, reason: &str) {
        lock(&self.shared).fail_open = Some(reason.to_string());
    }
}

struct LoopbackCapture {
    live: Arc<AtomicBool>,
}

impl MicrophoneCapture for LoopbackCapture {
    fn label(&self) -> &str {
        "loopback-microphone"
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&mut self) -> Result<()> {
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }
}
