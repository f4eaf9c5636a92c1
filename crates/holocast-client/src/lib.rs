//! Holocast client: drives one talking-avatar session from API key to live room.
//!
//! [`SessionController`] owns the handshake against the provider ([`SessionApi`]),
//! the real-time room ([`RealtimeTransport`]) and the chroma-key compositor that
//! turns the avatar's green-screen video into a transparent surface.

#![forbid(unsafe_code)]

pub mod api;
pub mod controller;
pub mod loopback;
pub mod room;
pub mod transport;
pub mod types;

pub use api::{RemoteSessionClient, SessionApi};
pub use controller::SessionController;
pub use loopback::{LoopbackDevices, LoopbackDevicesHandle, LoopbackRoom, LoopbackRoomHandle};
pub use room::{
    AudioCaptureOptions, AudioDevices, LocalAudioTrack, MediaRoom, MicrophoneCapture, RemoteTrack,
    RoomEvent, TrackKind,
};
pub use transport::{RealtimeTransport, TransportEvent};
pub use types::{ClientConfig, ConnectionState, Notice, SessionInfo, SessionRequest, SessionToken};
