//! Common error types for Holocast.

use thiserror::Error;

/// Result type alias using Holocast's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Holocast operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider refused to exchange the API key for a session token.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The provider refused to allocate a streaming session.
    #[error("session create error: {0}")]
    SessionCreate(String),

    /// The provider refused to start media for a session.
    ///
    /// The body is kept verbatim; it is not guaranteed to be JSON.
    #[error("stream start failed (HTTP {status}): {body}")]
    StreamStart { status: u16, body: String },

    /// The real-time room could not be joined.
    #[error("room connect error: {0}")]
    RoomConnect(String),

    /// The provider did not acknowledge a session stop. Logged, never raised to the UI.
    #[error("session stop error: {0}")]
    SessionStop(String),

    /// The local microphone could not be captured or published. Non-fatal.
    #[error("microphone publish error: {0}")]
    MicrophonePublish(String),

    /// A text task could not be delivered to the avatar.
    #[error("message send error: {0}")]
    MessageSend(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an auth error from any displayable type.
    pub fn auth(msg: impl std::fmt::Display) -> Self {
        Self::Auth(msg.to_string())
    }

    /// Create a session create error from any displayable type.
    pub fn session_create(msg: impl std::fmt::Display) -> Self {
        Self::SessionCreate(msg.to_string())
    }

    /// Create a stream start error from a raw status and response body.
    pub fn stream_start(status: u16, body: impl Into<String>) -> Self {
        Self::StreamStart {
            status,
            body: body.into(),
        }
    }

    /// Create a room connect error from any displayable type.
    pub fn room_connect(msg: impl std::fmt::Display) -> Self {
        Self::RoomConnect(msg.to_string())
    }

    /// Create a session stop error from any displayable type.
    pub fn session_stop(msg: impl std::fmt::Display) -> Self {
        Self::SessionStop(msg.to_string())
    }

    /// Create a microphone publish error from any displayable type.
    pub fn microphone_publish(msg: impl std::fmt::Display) -> Self {
        Self::MicrophonePublish(msg.to_string())
    }

    /// Create a message send error from any displayable type.
    pub fn message_send(msg: impl std::fmt::Display) -> Self {
        Self::MessageSend(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a serialization error from any displayable type.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// True for the errors that abort a `connect()` handshake.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::SessionCreate(_) | Self::StreamStart { .. } | Self::RoomConnect(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
