//! Wire types for the rendering service.

use serde::{Deserialize, Serialize};

/// An SDP offer or answer as exchanged with `/StartWebRTCSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: "offer".to_string(),
        }
    }

    pub fn is_answer(&self) -> bool {
        self.kind.eq_ignore_ascii_case("answer")
    }
}

/// Body of `/startAudioToVideoSession`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioToVideoSessionRequest {
    pub face_id: String,
    #[serde(rename = "isJPG")]
    pub is_jpg: bool,
    pub api_key: String,
    pub sync_audio: bool,
}

/// Response of `/startAudioToVideoSession`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTokenResponse {
    pub session_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_field_names() {
        let request = AudioToVideoSessionRequest {
            face_id: "face-1".to_string(),
            is_jpg: false,
            api_key: "key".to_string(),
            sync_audio: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "faceId": "face-1",
                "isJPG": false,
                "apiKey": "key",
                "syncAudio": true
            })
        );
    }

    #[test]
    fn test_session_description_type_field() {
        let offer = SessionDescription::offer("v=0");
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["type"], "offer");

        let answer: SessionDescription =
            serde_json::from_str(r#"{"sdp": "v=0", "type": "Answer"}"#).unwrap();
        assert!(answer.is_answer());
    }
}
