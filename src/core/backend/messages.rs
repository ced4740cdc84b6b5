//! Wire types for the coordination backend.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Response of `GET /get_env_vars`. Any key may be missing or null when the
/// backend's environment is incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvVars {
    #[serde(rename = "API_KEY", default)]
    pub api_key: Option<String>,
    #[serde(rename = "FACE_ID_SPEAKER_00", default)]
    pub face_id_speaker_00: Option<String>,
    #[serde(rename = "FACE_ID_SPEAKER_01", default)]
    pub face_id_speaker_01: Option<String>,
}

/// Success body: `{"message": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendMessage {
    pub message: String,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendDetail {
    pub detail: String,
}

/// A request for the audio of one segment, sent over the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentRequest {
    pub start_time: f64,
    pub end_time: f64,
}

impl SegmentRequest {
    /// The zero-length request sent before the first segment so both
    /// avatars start rendering immediately.
    pub const PRIMING: SegmentRequest = SegmentRequest {
        start_time: 0.00,
        end_time: 0.01,
    };

    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time,
        }
    }
}

/// A payload received from the event stream, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFrame {
    Text(String),
    Binary(Bytes),
}

impl EventFrame {
    pub fn len(&self) -> usize {
        match self {
            EventFrame::Text(text) => text.len(),
            EventFrame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_vars_partial() {
        let env: EnvVars =
            serde_json::from_str(r#"{"API_KEY": "k", "FACE_ID_SPEAKER_00": null}"#).unwrap();
        assert_eq!(env.api_key.as_deref(), Some("k"));
        assert!(env.face_id_speaker_00.is_none());
        assert!(env.face_id_speaker_01.is_none());
    }

    #[test]
    fn test_segment_request_wire_format() {
        let json = serde_json::to_value(SegmentRequest::new(2.5, 5.0)).unwrap();
        assert_eq!(json, serde_json::json!({"start_time": 2.5, "end_time": 5.0}));

        let priming = serde_json::to_value(SegmentRequest::PRIMING).unwrap();
        assert_eq!(priming["end_time"], 0.01);
    }
}
