//! Shared fixtures: a mock provider over HTTP, a scripted in-memory `SessionApi`,
//! and a controller wired to the loopback room.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use holocast_client::api::{
    CREATE_TOKEN_PATH, NEW_SESSION_PATH, SEND_TASK_PATH, START_STREAM_PATH, STOP_SESSION_PATH,
};
use holocast_client::{
    ClientConfig, LoopbackDevices, LoopbackDevicesHandle, LoopbackRoom, LoopbackRoomHandle,
    RealtimeTransport, SessionApi, SessionController, SessionInfo, SessionRequest, SessionToken,
};
use holocast_common::{Error, Result};
use holocast_media::{AudioSink, AudioSinkFactory, NullAudioSink, Resolution};

pub const SESSION_ID: &str = "sess-1";
pub const ROOM_URL: &str = "wss://room.test/sess-1";
pub const TOKEN: &str = "tok-0123456789";

// ---------------------------------------------------------------------------
// HTTP mock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub api_key: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct MockState {
    calls: Vec<RecordedCall>,
    failures: HashMap<String, (u16, String)>,
    allocated_avatar: Option<String>,
}

/// Provider stand-in serving the streaming endpoints on a loopback port.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Bind on an ephemeral port and serve in the background. Returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route(CREATE_TOKEN_PATH, post(handle))
            .route(NEW_SESSION_PATH, post(handle))
            .route(START_STREAM_PATH, post(handle))
            .route(STOP_SESSION_PATH, post(handle))
            .route(SEND_TASK_PATH, post(handle))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock provider");
        let addr: SocketAddr = listener.local_addr().expect("mock provider addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock provider");
        });
        format!("http://{addr}")
    }

    pub fn fail(&self, path: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn allocate_avatar(&self, avatar_id: &str) {
        self.state.lock().unwrap().allocated_avatar = Some(avatar_id.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.path).collect()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn handle(
    State(mock): State<MockProvider>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let mut state = mock.state.lock().unwrap();
    state.calls.push(RecordedCall {
        path: path.clone(),
        api_key: header(&headers, "x-api-key"),
        authorization: header(&headers, "authorization"),
        body: body.clone(),
    });

    if let Some((status, text)) = state.failures.get(&path) {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, text.clone()).into_response();
    }

    let payload = match path.as_str() {
        CREATE_TOKEN_PATH => json!({ "error": null, "data": { "token": TOKEN } }),
        NEW_SESSION_PATH => {
            let avatar_id = state
                .allocated_avatar
                .clone()
                .unwrap_or_else(|| body["avatar_id"].as_str().unwrap_or_default().to_string());
            json!({
                "code": 100,
                "data": {
                    "session_id": SESSION_ID,
                    "url": ROOM_URL,
                    "access_token": "room-access",
                    "avatar_id": avatar_id,
                }
            })
        }
        _ => json!({ "code": 100, "message": "success" }),
    };
    Json(payload).into_response()
}

// ---------------------------------------------------------------------------
// Scripted SessionApi
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Token,
    Create,
    Start,
    Stop,
    Task,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Step>,
    failing: HashSet<Step>,
    hanging: Option<Step>,
    allocated_avatar: Option<String>,
    messages: Vec<String>,
    nowait_stops: Vec<String>,
}

/// In-memory provider whose steps can be made to fail or never answer.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn fail_at(&self, step: Step) {
        self.state.lock().unwrap().failing.insert(step);
    }

    pub fn hang_at(&self, step: Step) {
        self.state.lock().unwrap().hanging = Some(step);
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing.clear();
        state.hanging = None;
    }

    pub fn allocate_avatar(&self, avatar_id: &str) {
        self.state.lock().unwrap().allocated_avatar = Some(avatar_id.to_string());
    }

    pub fn calls(&self) -> Vec<Step> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, step: Step) -> usize {
        self.calls().into_iter().filter(|s| *s == step).count()
    }

    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn nowait_stops(&self) -> Vec<String> {
        self.state.lock().unwrap().nowait_stops.clone()
    }

    /// Record the call, then either hang or report whether it should fail.
    async fn enter(&self, step: Step) -> bool {
        let (hang, fail) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(step);
            (state.hanging == Some(step), state.failing.contains(&step))
        };
        if hang {
            std::future::pending::<()>().await;
        }
        fail
    }
}

#[async_trait]
impl SessionApi for FakeApi {
    async fn acquire_token(&self, _api_key: &str) -> Result<SessionToken> {
        if self.enter(Step::Token).await {
            return Err(Error::auth("invalid api key"));
        }
        Ok(SessionToken::new(TOKEN))
    }

    async fn create_session(
        &self,
        _token: &SessionToken,
        request: &SessionRequest,
    ) -> Result<SessionInfo> {
        if self.enter(Step::Create).await {
            return Err(Error::session_create("no capacity"));
        }
        let avatar_id = self
            .state
            .lock()
            .unwrap()
            .allocated_avatar
            .clone()
            .unwrap_or_else(|| request.avatar_id.clone());
        Ok(SessionInfo {
            session_id: SESSION_ID.to_string(),
            room_url: ROOM_URL.to_string(),
            access_token: "room-access".to_string(),
            avatar_id,
        })
    }

    async fn start_stream(&self, _token: &SessionToken, _session_id: &str) -> Result<()> {
        if self.enter(Step::Start).await {
            return Err(Error::stream_start(400, r#"{"message":"quota exceeded"}"#));
        }
        Ok(())
    }

    async fn stop_session(&self, _token: &SessionToken, _session_id: &str) -> Result<()> {
        if self.enter(Step::Stop).await {
            return Err(Error::session_stop("already gone"));
        }
        Ok(())
    }

    fn stop_session_nowait(&self, _token: SessionToken, session_id: String) {
        self.state.lock().unwrap().nowait_stops.push(session_id);
    }

    async fn send_task(&self, _token: &SessionToken, _session_id: &str, text: &str) -> Result<()> {
        if self.enter(Step::Task).await {
            return Err(Error::message_send("busy"));
        }
        self.state.lock().unwrap().messages.push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub controller: SessionController,
    pub room: LoopbackRoomHandle,
    pub devices: LoopbackDevicesHandle,
}

pub fn null_sink_factory() -> AudioSinkFactory {
    Box::new(|| -> anyhow::Result<Box<dyn AudioSink>> { Ok(Box::new(NullAudioSink::new())) })
}

pub fn controller_with(
    api: Arc<dyn SessionApi>,
    config: ClientConfig,
    feed: Option<Resolution>,
) -> Harness {
    controller_with_sinks(api, config, feed, null_sink_factory())
}

pub fn controller_with_sinks(
    api: Arc<dyn SessionApi>,
    config: ClientConfig,
    feed: Option<Resolution>,
    sinks: AudioSinkFactory,
) -> Harness {
    let (room, room_handle) = match feed {
        Some(resolution) => LoopbackRoom::with_avatar_feed(resolution),
        None => LoopbackRoom::new(),
    };
    let (devices, devices_handle) = LoopbackDevices::new();
    let transport = RealtimeTransport::new(Box::new(room), Box::new(devices), sinks);
    Harness {
        controller: SessionController::new(config, api, transport),
        room: room_handle,
        devices: devices_handle,
    }
}

pub fn fake_controller(feed: Option<Resolution>) -> (Harness, Arc<FakeApi>) {
    let api = Arc::new(FakeApi::default());
    let harness = controller_with(api.clone(), ClientConfig::default(), feed);
    (harness, api)
}
