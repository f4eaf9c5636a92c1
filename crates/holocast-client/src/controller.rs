//! Session lifecycle.
//!
//! ```text
//! Idle -> TokenAcquired -> SessionCreated -> Streaming -> RoomConnected
//!   ^                                                          |
//!   +------------------- Disconnecting <-----------------------+
//! ```
//!
//! A failed handshake step goes straight back to `Idle` with nothing retained.
//! The compositor's activation gate is `state == RoomConnected`, so every
//! transition out of `RoomConnected` also winds the frame loop down.

use std::sync::Arc;

use holocast_common::{Error, Result};
use holocast_media::ChromaKeyCompositor;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::SessionApi;
use crate::room::LocalAudioTrack;
use crate::transport::{RealtimeTransport, TransportEvent};
use crate::types::{
    ClientConfig, ConnectionState, Notice, SessionInfo, SessionRequest, SessionToken,
};

const NOTICE_CHANNEL_DEPTH: usize = 32;

struct StateCell {
    state: watch::Sender<ConnectionState>,
    live: watch::Sender<bool>,
    notices: broadcast::Sender<Notice>,
}

impl StateCell {
    fn get(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        self.live.send_replace(next == ConnectionState::RoomConnected);
        if previous != next {
            info!("session state {} -> {}", previous, next);
            let _ = self.notices.send(Notice::StateChanged(next));
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }
}

/// Rolls a half-finished handshake back unless committed.
///
/// Covers both an `Err` returned mid-handshake and the `connect` future being
/// dropped while a request is in flight.
struct HandshakeGuard {
    cell: Arc<StateCell>,
    api: Arc<dyn SessionApi>,
    token: Option<SessionToken>,
    session_id: Option<String>,
    committed: bool,
}

impl HandshakeGuard {
    fn new(cell: Arc<StateCell>, api: Arc<dyn SessionApi>) -> Self {
        Self {
            cell,
            api,
            token: None,
            session_id: None,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let (Some(token), Some(session_id)) = (self.token.take(), self.session_id.take()) {
            warn!("handshake aborted; releasing session {}", session_id);
            self.api.stop_session_nowait(token, session_id);
        }
        self.cell.set(ConnectionState::Idle);
    }
}

pub struct SessionController {
    request: SessionRequest,
    api: Arc<dyn SessionApi>,
    transport: RealtimeTransport,
    compositor: ChromaKeyCompositor,
    cell: Arc<StateCell>,
    token: Option<SessionToken>,
    session: Option<SessionInfo>,
    local_audio: Option<LocalAudioTrack>,
    video_sid: Option<String>,
}

impl SessionController {
    /// The transport's microphone options are taken from `config.audio`.
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn SessionApi>,
        mut transport: RealtimeTransport,
    ) -> Self {
        transport.set_audio_options(config.audio);
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (live, live_rx) = watch::channel(false);
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_DEPTH);
        Self {
            request: SessionRequest::from(&config.provider),
            api,
            transport,
            compositor: ChromaKeyCompositor::new(config.compositor, live_rx),
            cell: Arc::new(StateCell {
                state,
                live,
                notices,
            }),
            token: None,
            session: None,
            local_audio: None,
            video_sid: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.cell.get()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.cell.state.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.cell.notices.subscribe()
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn local_audio(&self) -> Option<&LocalAudioTrack> {
        self.local_audio.as_ref()
    }

    pub fn transport(&self) -> &RealtimeTransport {
        &self.transport
    }

    pub fn compositor(&self) -> &ChromaKeyCompositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut ChromaKeyCompositor {
        &mut self.compositor
    }

    /// Run the full handshake: token, session, stream start, room.
    ///
    /// A no-op unless `Idle`. On failure the state is `Idle` again and the
    /// controller holds no token, session, room or microphone.
    pub async fn connect(&mut self, api_key: &str) -> Result<()> {
        let state = self.cell.get();
        if state != ConnectionState::Idle {
            debug!("connect ignored while {}", state);
            return Ok(());
        }
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(Error::auth("an API key is required"));
        }

        info!("connecting to avatar {}", self.request.avatar_id);
        let mut guard = HandshakeGuard::new(self.cell.clone(), self.api.clone());

        let token = self.api.acquire_token(api_key).await?;
        guard.token = Some(token.clone());
        self.cell.set(ConnectionState::TokenAcquired);

        let session = self.api.create_session(&token, &self.request).await?;
        guard.session_id = Some(session.session_id.clone());
        self.cell.set(ConnectionState::SessionCreated);
        if session.avatar_id != self.request.avatar_id {
            self.cell.notify(Notice::AvatarMismatch {
                requested: self.request.avatar_id.clone(),
                allocated: session.avatar_id.clone(),
            });
        }

        self.api.start_stream(&token, &session.session_id).await?;
        self.cell.set(ConnectionState::Streaming);

        self.transport.connect(&session).await?;
        guard.commit();
        self.token = Some(token);
        self.session = Some(session);
        self.cell.set(ConnectionState::RoomConnected);

        match self.transport.publish_local_audio().await {
            Ok(track) => self.local_audio = Some(track),
            Err(err) => {
                warn!("continuing without microphone: {}", err);
                self.cell.notify(Notice::MicrophoneUnavailable(err.to_string()));
            }
        }
        Ok(())
    }

    /// Tear the session down. Safe from any state and idempotent.
    ///
    /// Steps run in order and each runs even if an earlier one failed:
    /// local audio, room, remote session stop, then local fields.
    pub async fn disconnect(&mut self) {
        let holds_resources = self.session.is_some()
            || self.token.is_some()
            || self.local_audio.is_some()
            || self.transport.is_connected();
        if self.cell.get() == ConnectionState::Idle && !holds_resources {
            debug!("disconnect: already idle");
            return;
        }

        self.cell.set(ConnectionState::Disconnecting);
        self.compositor.stopped().await;
        self.video_sid = None;

        if let Some(mut track) = self.local_audio.take() {
            if let Err(err) = self.transport.unpublish_local_audio(&track).await {
                warn!("failed to unpublish microphone: {}", err);
            }
            if let Err(err) = track.stop() {
                warn!("failed to stop microphone: {}", err);
            }
        }

        if let Err(err) = self.transport.disconnect().await {
            warn!("failed to leave room: {}", err);
        }

        let token = self.token.take();
        if let Some(session) = self.session.take() {
            match token.as_ref() {
                Some(token) => {
                    if let Err(err) = self.api.stop_session(token, &session.session_id).await {
                        warn!("failed to stop session {}: {}", session.session_id, err);
                    }
                }
                None => warn!("no token to stop session {}", session.session_id),
            }
        }

        self.cell.set(ConnectionState::Idle);
        info!("disconnected");
    }

    /// Ask the avatar to speak. Silently ignored unless `RoomConnected` or if `text` is blank.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let state = self.cell.get();
        if state != ConnectionState::RoomConnected {
            debug!("message dropped while {}", state);
            return Ok(());
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let (Some(token), Some(session)) = (self.token.as_ref(), self.session.as_ref()) else {
            return Ok(());
        };
        self.api.send_task(token, &session.session_id, text).await
    }

    /// Next event from the room. Pends while no room is connected.
    pub async fn next_event(&mut self) -> TransportEvent {
        self.transport.next_event().await
    }

    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => debug!("room reports connected"),
            TransportEvent::Disconnected { reason } => {
                if self.cell.get() == ConnectionState::Idle {
                    return;
                }
                warn!("room lost: {}", reason);
                self.cell.notify(Notice::RoomLost(reason));
                self.disconnect().await;
            }
            TransportEvent::VideoTrack { sid, source } => {
                if self.cell.get() != ConnectionState::RoomConnected {
                    debug!("ignoring video track {} outside a live room", sid);
                    return;
                }
                if let Some(previous) = self.video_sid.replace(sid.clone()) {
                    info!("video track {} replaces {}", sid, previous);
                }
                self.compositor.attach_source(source);
            }
            TransportEvent::VideoTrackEnded { sid } => {
                if self.video_sid.as_deref() == Some(sid.as_str()) {
                    debug!("video track {} ended", sid);
                    self.video_sid = None;
                    self.compositor.detach_source();
                }
            }
            TransportEvent::AudioTrack { sid } => debug!("playing audio track {}", sid),
            TransportEvent::AudioTrackEnded { sid } => debug!("audio track {} ended", sid),
        }
    }

    /// Wait for and handle one room event.
    pub async fn process_next_event(&mut self) {
        let event = self.next_event().await;
        self.handle_event(event).await;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let (Some(token), Some(session)) = (self.token.take(), self.session.take()) {
            debug!("controller dropped with live session {}", session.session_id);
            self.api.stop_session_nowait(token, session.session_id);
        }
    }
}
