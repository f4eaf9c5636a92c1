//! REST handshake against the avatar streaming provider.
//!
//! `acquire_token` -> `create_session` -> `start_stream` must run strictly in
//! that order; each request needs a field from the previous response. No call
//! carries its own timeout or retry.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use holocast_common::helpers::{provider_message, redact_secret};
use holocast_common::{Error, ProviderConfig, Result};

use crate::types::{SessionInfo, SessionRequest, SessionToken};

pub const CREATE_TOKEN_PATH: &str = "/v1/streaming.create_token";
pub const NEW_SESSION_PATH: &str = "/v1/streaming.new";
pub const START_STREAM_PATH: &str = "/v1/streaming.start";
pub const STOP_SESSION_PATH: &str = "/v1/streaming.stop";
pub const SEND_TASK_PATH: &str = "/v1/streaming.task";

#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Exchange a long-lived API key for a short-lived session token.
    async fn acquire_token(&self, api_key: &str) -> Result<SessionToken>;

    async fn create_session(
        &self,
        token: &SessionToken,
        request: &SessionRequest,
    ) -> Result<SessionInfo>;

    async fn start_stream(&self, token: &SessionToken, session_id: &str) -> Result<()>;

    async fn stop_session(&self, token: &SessionToken, session_id: &str) -> Result<()>;

    /// Fire-and-forget stop for when the process may be going away. Never blocks,
    /// never retries, never reports failure.
    fn stop_session_nowait(&self, token: SessionToken, session_id: String);

    /// Make the avatar speak `text`.
    async fn send_task(&self, token: &SessionToken, session_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    token: String,
}

#[derive(Debug, Deserialize)]
struct NewSessionPayload {
    session_id: String,
    url: String,
    access_token: String,
    #[serde(default)]
    avatar_id: Option<String>,
}

/// Providers answer either flat or wrapped as `{"code":..,"data":{..}}`.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(data @ Value::Object(_)) => data,
            Some(other) => {
                map.insert("data".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

fn failure_message(status: u16, body: &str, fallback: &str) -> String {
    provider_message(body).unwrap_or_else(|| format!("{fallback} (HTTP {status})"))
}

async fn read_failure(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    (status, body)
}

#[derive(Debug, Clone)]
pub struct RemoteSessionClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl RemoteSessionClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let config = config.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn post(&self, path: &str, token: &SessionToken) -> reqwest::RequestBuilder {
        self.http
            .post(self.config.endpoint(path))
            .bearer_auth(token.as_str())
    }
}

#[async_trait]
impl SessionApi for RemoteSessionClient {
    async fn acquire_token(&self, api_key: &str) -> Result<SessionToken> {
        debug!("requesting session token with key {}", redact_secret(api_key));
        let response = self
            .http
            .post(self.config.endpoint(CREATE_TOKEN_PATH))
            .header("x-api-key", api_key)
            .send()
            .await
            .map_err(|e| Error::auth(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let (status, body) = read_failure(response).await;
            return Err(Error::auth(failure_message(
                status,
                &body,
                "failed to acquire session token",
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("unreadable token response: {e}")))?;
        let payload: TokenPayload = serde_json::from_value(unwrap_envelope(value))
            .map_err(|e| Error::auth(format!("token response missing `token`: {e}")))?;
        if payload.token.trim().is_empty() {
            return Err(Error::auth("provider returned an empty session token"));
        }
        Ok(SessionToken::new(payload.token))
    }

    async fn create_session(
        &self,
        token: &SessionToken,
        request: &SessionRequest,
    ) -> Result<SessionInfo> {
        let mut body = json!({
            "version": "v2",
            "avatar_id": request.avatar_id,
            "quality": request.quality.as_str(),
        });
        if let Some(voice_id) = &request.voice_id {
            body["voice"] = json!({ "voice_id": voice_id });
        }
        if let Some(kb) = &request.knowledge_base_id {
            body["knowledge_base_id"] = json!(kb);
        }
        if let Some(background) = &request.background {
            body["background"] = json!(background);
        }

        let response = self
            .post(NEW_SESSION_PATH, token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::session_create(format!("session request failed: {e}")))?;

        if !response.status().is_success() {
            let (status, body) = read_failure(response).await;
            return Err(Error::session_create(failure_message(
                status,
                &body,
                "failed to create session",
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::session_create(format!("unreadable session response: {e}")))?;
        let payload: NewSessionPayload = serde_json::from_value(unwrap_envelope(value))
            .map_err(|e| Error::session_create(format!("incomplete session response: {e}")))?;

        let info = SessionInfo {
            session_id: payload.session_id,
            room_url: payload.url,
            access_token: payload.access_token,
            avatar_id: payload
                .avatar_id
                .unwrap_or_else(|| request.avatar_id.clone()),
        };
        if info.avatar_id != request.avatar_id {
            warn!(
                "session {} runs avatar {} (requested {})",
                info.session_id, info.avatar_id, request.avatar_id
            );
        }
        info!("session {} created", info.session_id);
        Ok(info)
    }

    async fn start_stream(&self, token: &SessionToken, session_id: &str) -> Result<()> {
        let response = self
            .post(START_STREAM_PATH, token)
            .json(&json!({ "session_id": session_id }))
            .send()
            .await
            .map_err(|e| Error::stream_start(0, e.to_string()))?;

        if !response.status().is_success() {
            let (status, body) = read_failure(response).await;
            return Err(Error::stream_start(status, body));
        }
        info!("stream started for session {}", session_id);
        Ok(())
    }

    async fn stop_session(&self, token: &SessionToken, session_id: &str) -> Result<()> {
        let response = self
            .post(STOP_SESSION_PATH, token)
            .json(&json!({ "session_id": session_id }))
            .send()
            .await
            .map_err(Error::session_stop)?;

        if !response.status().is_success() {
            let (status, body) = read_failure(response).await;
            return Err(Error::session_stop(failure_message(
                status,
                &body,
                "failed to stop session",
            )));
        }
        info!("session {} stopped", session_id);
        Ok(())
    }

    fn stop_session_nowait(&self, token: SessionToken, session_id: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime available; session {} left to expire", session_id);
            return;
        };
        let request = self
            .post(STOP_SESSION_PATH, &token)
            .json(&json!({ "session_id": session_id }));
        runtime.spawn(async move {
            let _ = request.send().await;
        });
    }

    async fn send_task(&self, token: &SessionToken, session_id: &str, text: &str) -> Result<()> {
        let response = self
            .post(SEND_TASK_PATH, token)
            .json(&json!({
                "session_id": session_id,
                "text": text,
                "task_type": "talk",
            }))
            .send()
            .await
            .map_err(Error::message_send)?;

        if !response.status().is_success() {
            let (status, body) = read_failure(response).await;
            return Err(Error::message_send(failure_message(
                status,
                &body,
                "failed to send message",
            )));
        }
        debug!("task delivered to session {}", session_id);
        Ok(())
    }
}
