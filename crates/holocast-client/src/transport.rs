use std::fmt;

use holocast_common::{Error, Result};
use holocast_media::{AudioSink, AudioSinkFactory, VideoSource};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::room::{
    AudioCaptureOptions, AudioDevices, LocalAudioTrack, MediaRoom, RemoteTrack, RoomEvent,
    TrackKind,
};
use crate::types::SessionInfo;

/// Room events after routing. Audio has already been handed to the playback sink.
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    VideoTrack {
        sid: String,
        source: Box<dyn VideoSource>,
    },
    VideoTrackEnded { sid: String },
    AudioTrack { sid: String },
    AudioTrackEnded { sid: String },
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("Connected"),
            Self::Disconnected { reason } => write!(f, "Disconnected({reason})"),
            Self::VideoTrack { sid, .. } => write!(f, "VideoTrack({sid})"),
            Self::VideoTrackEnded { sid } => write!(f, "VideoTrackEnded({sid})"),
            Self::AudioTrack { sid } => write!(f, "AudioTrack({sid})"),
            Self::AudioTrackEnded { sid } => write!(f, "AudioTrackEnded({sid})"),
        }
    }
}

pub struct RealtimeTransport {
    room: Box<dyn MediaRoom>,
    devices: Box<dyn AudioDevices>,
    audio_options: AudioCaptureOptions,
    audio_sink_factory: AudioSinkFactory,
    audio_sink: Option<Box<dyn AudioSink>>,
    events: Option<mpsc::UnboundedReceiver<RoomEvent>>,
}

impl RealtimeTransport {
    /// Microphone capture uses [`AudioCaptureOptions::default`] until
    /// [`set_audio_options`](Self::set_audio_options) is called.
    pub fn new(
        room: Box<dyn MediaRoom>,
        devices: Box<dyn AudioDevices>,
        audio_sink_factory: AudioSinkFactory,
    ) -> Self {
        Self {
            room,
            devices,
            audio_options: AudioCaptureOptions::default(),
            audio_sink_factory,
            audio_sink: None,
            events: None,
        }
    }

    pub fn audio_options(&self) -> AudioCaptureOptions {
        self.audio_options
    }

    /// Applies to the next microphone opened.
    pub fn set_audio_options(&mut self, options: AudioCaptureOptions) {
        self.audio_options = options;
    }

    pub fn is_connected(&self) -> bool {
        self.events.is_some()
    }

    pub fn attached_audio_tracks(&self) -> usize {
        self.audio_sink.as_ref().map_or(0, |sink| sink.attached())
    }

    pub async fn connect(&mut self, session: &SessionInfo) -> Result<()> {
        if self.is_connected() {
            debug!("room already connected");
            return Ok(());
        }
        let events = self
            .room
            .connect(&session.room_url, &session.access_token)
            .await
            .map_err(Error::room_connect)?;
        self.events = Some(events);
        info!("room connected for session {}", session.session_id);
        Ok(())
    }

    /// Wait for the next routed room event.
    ///
    /// Pends forever while no room is connected, so it can sit in a `select!`.
    pub async fn next_event(&mut self) -> TransportEvent {
        loop {
            let Some(events) = self.events.as_mut() else {
                return std::future::pending().await;
            };
            let event = match events.recv().await {
                Some(event) => event,
                None => RoomEvent::Disconnected {
                    reason: "room event stream closed".to_string(),
                },
            };
            if let Some(routed) = self.route(event) {
                return routed;
            }
        }
    }

    fn route(&mut self, event: RoomEvent) -> Option<TransportEvent> {
        match event {
            RoomEvent::Connected => Some(TransportEvent::Connected),
            RoomEvent::Disconnected { reason } => {
                info!("room disconnected: {}", reason);
                self.events = None;
                self.audio_sink = None;
                Some(TransportEvent::Disconnected { reason })
            }
            RoomEvent::TrackSubscribed(RemoteTrack::Video { sid, source }) => {
                debug!("video track {} subscribed", sid);
                Some(TransportEvent::VideoTrack { sid, source })
            }
            RoomEvent::TrackSubscribed(RemoteTrack::Audio { sid, source }) => {
                debug!("audio track {} subscribed", sid);
                if self.audio_sink.is_none() {
                    match (self.audio_sink_factory)() {
                        Ok(sink) => self.audio_sink = Some(sink),
                        Err(err) => {
                            warn!("no audio playback for track {}: {}", sid, err);
                            return None;
                        }
                    }
                }
                let sink = self.audio_sink.as_mut()?;
                if let Err(err) = sink.attach(&sid, source) {
                    warn!("failed to play audio track {}: {}", sid, err);
                    return None;
                }
                Some(TransportEvent::AudioTrack { sid })
            }
            RoomEvent::TrackUnsubscribed {
                sid,
                kind: TrackKind::Video,
            } => Some(TransportEvent::VideoTrackEnded { sid }),
            RoomEvent::TrackUnsubscribed {
                sid,
                kind: TrackKind::Audio,
            } => {
                if let Some(sink) = self.audio_sink.as_mut() {
                    sink.detach(&sid);
                }
                Some(TransportEvent::AudioTrackEnded { sid })
            }
        }
    }

    /// Capture the microphone and publish it into the room.
    ///
    /// On failure nothing is left capturing.
    pub async fn publish_local_audio(&mut self) -> Result<LocalAudioTrack> {
        if !self.is_connected() {
            return Err(Error::microphone_publish("room is not connected"));
        }
        let mut capture = self
            .devices
            .open_microphone(self.audio_options)
            .await
            .map_err(Error::microphone_publish)?;

        match self.room.publish_audio(capture.as_mut()).await {
            Ok(sid) => {
                info!("microphone {} published as {}", capture.label(), sid);
                Ok(LocalAudioTrack::new(sid, capture))
            }
            Err(err) => {
                if let Err(stop_err) = capture.stop() {
                    warn!("failed to release unpublished microphone: {}", stop_err);
                }
                Err(Error::microphone_publish(err))
            }
        }
    }

    pub async fn unpublish_local_audio(&mut self, track: &LocalAudioTrack) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.room
            .unpublish(track.sid())
            .await
            .map_err(Error::microphone_publish)
    }

    /// Leave the room. Idempotent; a no-op when no room is connected.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.events.take().is_none() {
            debug!("room disconnect skipped: not connected");
            return Ok(());
        }
        self.audio_sink = None;
        self.room.disconnect().await.map_err(Error::room_connect)?;
        info!("room disconnected");
        Ok(())
    }
}
