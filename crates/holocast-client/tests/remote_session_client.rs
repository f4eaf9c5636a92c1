//! REST handshake against a mock provider.

mod common;

use common::{MockProvider, ROOM_URL, SESSION_ID, TOKEN};
use holocast_client::api::{
    CREATE_TOKEN_PATH, NEW_SESSION_PATH, SEND_TASK_PATH, START_STREAM_PATH, STOP_SESSION_PATH,
};
use holocast_client::{RemoteSessionClient, SessionApi, SessionRequest, SessionToken};
use holocast_common::config::DEFAULT_AVATAR_ID;
use holocast_common::{Error, ProviderConfig, Quality};
use serde_json::json;

async fn client() -> (RemoteSessionClient, MockProvider) {
    let mock = MockProvider::default();
    let base = mock.spawn().await;
    let client = RemoteSessionClient::new(ProviderConfig {
        server_url: format!("{base}/"),
        voice_id: Some("voice-7".into()),
        background: Some("#00FF00".into()),
        ..Default::default()
    })
    .unwrap();
    (client, mock)
}

fn request(client: &RemoteSessionClient) -> SessionRequest {
    SessionRequest::from(client.config())
}

#[tokio::test]
async fn token_is_requested_with_api_key_header() {
    let (client, mock) = client().await;

    let token = client.acquire_token("key-abc").await.unwrap();
    assert_eq!(token.as_str(), TOKEN);

    let calls = mock.calls_to(CREATE_TOKEN_PATH);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].api_key.as_deref(), Some("key-abc"));
    assert!(calls[0].authorization.is_none());
}

#[tokio::test]
async fn token_rejection_is_an_auth_error_with_provider_message() {
    let (client, mock) = client().await;
    mock.fail(CREATE_TOKEN_PATH, 401, r#"{"message":"invalid api key"}"#);

    let err = client.acquire_token("bad").await.unwrap_err();
    assert!(matches!(err, Error::Auth(ref msg) if msg == "invalid api key"), "{err}");
}

#[tokio::test]
async fn session_request_carries_avatar_settings() {
    let (client, mock) = client().await;
    let token = SessionToken::new(TOKEN);

    let session = client
        .create_session(&token, &request(&client))
        .await
        .unwrap();
    assert_eq!(session.session_id, SESSION_ID);
    assert_eq!(session.room_url, ROOM_URL);
    assert_eq!(session.access_token, "room-access");
    assert_eq!(session.avatar_id, DEFAULT_AVATAR_ID);

    let calls = mock.calls_to(NEW_SESSION_PATH);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].authorization.as_deref(),
        Some(format!("Bearer {TOKEN}").as_str())
    );
    let body = &calls[0].body;
    assert_eq!(body["avatar_id"], DEFAULT_AVATAR_ID);
    assert_eq!(body["quality"], Quality::High.as_str());
    assert_eq!(body["version"], "v2");
    assert_eq!(body["voice"], json!({ "voice_id": "voice-7" }));
    assert_eq!(body["background"], "#00FF00");
    assert!(body.get("knowledge_base_id").is_none());
}

#[tokio::test]
async fn allocated_avatar_is_reported_as_returned() {
    let (client, mock) = client().await;
    mock.allocate_avatar("fallback-avatar");

    let session = client
        .create_session(&SessionToken::new(TOKEN), &request(&client))
        .await
        .unwrap();
    assert_eq!(session.avatar_id, "fallback-avatar");
}

#[tokio::test]
async fn session_failure_is_a_session_create_error() {
    let (client, mock) = client().await;
    mock.fail(NEW_SESSION_PATH, 503, "<html>busy</html>");

    let err = client
        .create_session(&SessionToken::new(TOKEN), &request(&client))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionCreate(_)), "{err}");
    assert!(err.to_string().contains("HTTP 503"), "{err}");
}

#[tokio::test]
async fn stream_start_failure_keeps_status_and_raw_body() {
    let (client, mock) = client().await;
    mock.fail(START_STREAM_PATH, 400, r#"{"message":"quota exceeded"}"#);

    let err = client
        .start_stream(&SessionToken::new(TOKEN), SESSION_ID)
        .await
        .unwrap_err();
    match &err {
        Error::StreamStart { status, body } => {
            assert_eq!(*status, 400);
            assert_eq!(body, r#"{"message":"quota exceeded"}"#);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("quota exceeded"));
}

#[tokio::test]
async fn start_stop_and_task_address_the_session() {
    let (client, mock) = client().await;
    let token = SessionToken::new(TOKEN);

    client.start_stream(&token, SESSION_ID).await.unwrap();
    client.send_task(&token, SESSION_ID, "hello").await.unwrap();
    client.stop_session(&token, SESSION_ID).await.unwrap();

    assert_eq!(
        mock.paths(),
        vec![START_STREAM_PATH, SEND_TASK_PATH, STOP_SESSION_PATH]
    );
    let task = &mock.calls_to(SEND_TASK_PATH)[0].body;
    assert_eq!(task["session_id"], SESSION_ID);
    assert_eq!(task["text"], "hello");
    assert_eq!(task["task_type"], "talk");
    assert_eq!(
        mock.calls_to(STOP_SESSION_PATH)[0].body["session_id"],
        SESSION_ID
    );
}

#[tokio::test]
async fn nowait_stop_reaches_the_provider() {
    let (client, mock) = client().await;

    client.stop_session_nowait(SessionToken::new(TOKEN), SESSION_ID.to_string());

    for _ in 0..100 {
        if !mock.calls_to(STOP_SESSION_PATH).is_empty() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("stop request never arrived");
}

#[tokio::test]
async fn unreachable_provider_fails_the_step() {
    let client = RemoteSessionClient::new(ProviderConfig {
        server_url: "http://127.0.0.1:1".into(),
        ..Default::default()
    })
    .unwrap();

    let err = client.acquire_token("key").await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "{err}");

    let err = client
        .start_stream(&SessionToken::new(TOKEN), SESSION_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StreamStart { status: 0, .. }), "{err}");
}
