//! Backend REST client against a wiremock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use duo_vodcast::{BackendClient, BackendError, status_text};

fn client_for(server: &MockServer) -> BackendClient {
    BackendClient::new(&server.uri(), Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn test_get_env_vars_tolerates_missing_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_env_vars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "API_KEY": "key-123",
            "FACE_ID_SPEAKER_00": "face-a",
            "FACE_ID_SPEAKER_01": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let env = client_for(&server).get_env_vars().await.unwrap();

    assert_eq!(env.api_key.as_deref(), Some("key-123"));
    assert_eq!(env.face_id_speaker_00.as_deref(), Some("face-a"));
    assert_eq!(env.face_id_speaker_01, None);
}

#[tokio::test]
async fn test_get_env_vars_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_env_vars"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = client_for(&server).get_env_vars().await;
    assert!(matches!(
        result,
        Err(BackendError::Rejected { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_sync_reports_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync_audio_video"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": "Audio and video synced successfully"})),
        )
        .mount(&server)
        .await;

    let result = client_for(&server).sync_audio_video().await;
    assert_eq!(status_text(&result), "Audio and video synced successfully");
}

#[tokio::test]
async fn test_sync_error_detail_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync_audio_video"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Recording not found"})),
        )
        .mount(&server)
        .await;

    let result = client_for(&server).sync_audio_video().await;
    assert!(matches!(
        &result,
        Err(BackendError::Rejected { status: 404, detail }) if detail == "Recording not found"
    ));
    assert_eq!(status_text(&result), "Error: Recording not found");
}

#[tokio::test]
async fn test_delete_previous_recording() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/delete_previous_recording"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Previous recording deleted"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let message = client_for(&server)
        .delete_previous_recording()
        .await
        .unwrap();
    assert_eq!(message, "Previous recording deleted");
}

#[tokio::test]
async fn test_diarize_uploads_multipart_audio_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/diarize_audio"))
        .and(body_string_contains("name=\"audio\""))
        .and(body_string_contains("filename=\"interview.wav\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Diarization complete"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("interview.wav");
    std::fs::write(&audio, b"RIFF\0\0\0\0WAVEfmt ").unwrap();

    let result = client_for(&server).diarize_audio(&audio).await;
    assert_eq!(status_text(&result), "Diarization complete");
}

#[tokio::test]
async fn test_diarize_rejects_unsupported_extension_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/diarize_audio"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("interview.ogg");
    std::fs::write(&audio, b"OggS").unwrap();

    let result = client_for(&server).diarize_audio(&audio).await;
    assert!(matches!(result, Err(BackendError::InvalidConfiguration(_))));
}

#[tokio::test]
async fn test_unreachable_backend_status_text() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client =
        BackendClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();

    let result = client.sync_audio_video().await;
    assert!(matches!(result, Err(BackendError::ConnectionFailed(_))));
    assert_eq!(status_text(&result), "Failed to connect to server.");
}
