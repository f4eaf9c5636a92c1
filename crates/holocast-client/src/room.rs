//! Seams to the real-time media room and the local audio devices.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use holocast_media::{AudioSource, VideoSource};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Media pushed to us by the avatar participant.
pub enum RemoteTrack {
    Video {
        sid: String,
        source: Box<dyn VideoSource>,
    },
    Audio {
        sid: String,
        source: Box<dyn AudioSource>,
    },
}

impl RemoteTrack {
    pub fn sid(&self) -> &str {
        match self {
            Self::Video { sid, .. } | Self::Audio { sid, .. } => sid,
        }
    }

    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Video { .. } => TrackKind::Video,
            Self::Audio { .. } => TrackKind::Audio,
        }
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("sid", &self.sid())
            .field("kind", &self.kind())
            .finish()
    }
}

#[derive(Debug)]
pub enum RoomEvent {
    Connected,
    Disconnected { reason: String },
    TrackSubscribed(RemoteTrack),
    TrackUnsubscribed { sid: String, kind: TrackKind },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AudioCaptureOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioCaptureOptions {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A live microphone capture. Stopping it releases the device.
pub trait MicrophoneCapture: Send {
    fn label(&self) -> &str;

    fn is_live(&self) -> bool;

    fn stop(&mut self) -> Result<()>;
}

/// The user's microphone, published into the room.
///
/// Dropping a track that is still live stops the capture.
pub struct LocalAudioTrack {
    sid: String,
    capture: Box<dyn MicrophoneCapture>,
}

impl LocalAudioTrack {
    pub fn new(sid: impl Into<String>, capture: Box<dyn MicrophoneCapture>) -> Self {
        Self {
            sid: sid.into(),
            capture,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn is_live(&self) -> bool {
        self.capture.is_live()
    }

    /// Release the microphone. A no-op once stopped.
    pub fn stop(&mut self) -> Result<()> {
        if !self.capture.is_live() {
            return Ok(());
        }
        self.capture.stop()
    }
}

impl fmt::Debug for LocalAudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAudioTrack")
            .field("sid", &self.sid)
            .field("device", &self.capture.label())
            .field("live", &self.capture.is_live())
            .finish()
    }
}

impl Drop for LocalAudioTrack {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("failed to release microphone {}: {}", self.sid, err);
        }
    }
}

/// A real-time media room: one connection carrying local and remote tracks.
#[async_trait]
pub trait MediaRoom: Send {
    /// Join the room. Events for this connection arrive on the returned channel
    /// until the room is left or lost.
    async fn connect(
        &mut self,
        url: &str,
        access_token: &str,
    ) -> Result<mpsc::UnboundedReceiver<RoomEvent>>;

    /// Publish the capture as a local audio track, returning its sid.
    async fn publish_audio(&mut self, capture: &mut dyn MicrophoneCapture) -> Result<String>;

    async fn unpublish(&mut self, sid: &str) -> Result<()>;

    /// Leave the room. Must tolerate the room already being gone.
    async fn disconnect(&mut self) -> Result<()>;
}

#[async_trait]
pub trait AudioDevices: Send {
    async fn open_microphone(
        &mut self,
        options: AudioCaptureOptions,
    ) -> Result<Box<dyn MicrophoneCapture>>;
}
