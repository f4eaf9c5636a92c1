use std::fmt;

use holocast_common::{ProviderConfig, Quality};
use holocast_media::CompositorConfig;
use serde::{Deserialize, Serialize};

use crate::room::AudioCaptureOptions;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub provider: ProviderConfig,
    pub compositor: CompositorConfig,
    pub audio: AudioCaptureOptions,
}

/// Where the controller is in the session handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Idle,
    TokenAcquired,
    SessionCreated,
    Streaming,
    RoomConnected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TokenAcquired => "token-acquired",
            Self::SessionCreated => "session-created",
            Self::Streaming => "streaming",
            Self::RoomConnected => "room-connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Short-lived provider token. Lives in memory only and never prints its value.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// One allocated streaming session. Immutable once created.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub room_url: String,
    pub access_token: String,
    pub avatar_id: String,
}

impl fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInfo")
            .field("session_id", &self.session_id)
            .field("room_url", &self.room_url)
            .field("access_token", &"<redacted>")
            .field("avatar_id", &self.avatar_id)
            .finish()
    }
}

/// Avatar configuration sent with `streaming.new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub avatar_id: String,
    pub voice_id: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub quality: Quality,
    pub background: Option<String>,
}

impl From<&ProviderConfig> for SessionRequest {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            avatar_id: config.avatar_id.clone(),
            voice_id: config.voice_id.clone(),
            knowledge_base_id: config.knowledge_base_id.clone(),
            quality: config.quality,
            background: config.background.clone(),
        }
    }
}

/// Things the UI layer should hear about that are not errors of the call in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    StateChanged(ConnectionState),
    /// The provider allocated a different avatar than requested. The session continues.
    AvatarMismatch { requested: String, allocated: String },
    /// Microphone capture or publish failed; the session runs video-only.
    MicrophoneUnavailable(String),
    /// The room went away underneath a live session.
    RoomLost(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged(state) => write!(f, "state: {state}"),
            Self::AvatarMismatch {
                requested,
                allocated,
            } => write!(
                f,
                "provider allocated avatar {allocated} instead of {requested}"
            ),
            Self::MicrophoneUnavailable(reason) => write!(f, "microphone unavailable: {reason}"),
            Self::RoomLost(reason) => write!(f, "room connection lost: {reason}"),
        }
    }
}
