//! Rendering service client against a wiremock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use duo_vodcast::core::rendering::SessionDescription;
use duo_vodcast::{RenderingClient, RenderingError};

fn client_for(server: &MockServer) -> RenderingClient {
    RenderingClient::new(&server.uri(), Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn test_offer_is_exchanged_for_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/StartWebRTCSession"))
        .and(body_json(json!({"sdp": "v=0 offer", "type": "offer"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"sdp": "v=0 answer", "type": "answer"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let answer = client_for(&server)
        .start_webrtc_session(&SessionDescription::offer("v=0 offer"))
        .await
        .unwrap();

    assert!(answer.is_answer());
    assert_eq!(answer.sdp, "v=0 answer");
}

#[tokio::test]
async fn test_non_answer_reply_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/StartWebRTCSession"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"sdp": "v=0", "type": "offer"})),
        )
        .mount(&server)
        .await;

    let result = client_for(&server)
        .start_webrtc_session(&SessionDescription::offer("v=0"))
        .await;
    assert!(matches!(result, Err(RenderingError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_session_token_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/startAudioToVideoSession"))
        .and(body_json(json!({
            "faceId": "face-a",
            "isJPG": false,
            "apiKey": "key-123",
            "syncAudio": true
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"session_token": "token-xyz"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = client_for(&server)
        .start_audio_to_video_session("face-a", "key-123")
        .await
        .unwrap();
    assert_eq!(token, "token-xyz");
}

#[tokio::test]
async fn test_session_token_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/startAudioToVideoSession"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .start_audio_to_video_session("face-a", "wrong")
        .await;
    assert!(matches!(
        result,
        Err(RenderingError::Rejected { status: 401, ref body }) if body == "invalid api key"
    ));
}
