use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{ConfigError, ConfigResult};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables and defaults.
///
/// # Example YAML structure
/// ```yaml
/// backend:
///   url: "http://127.0.0.1:8080"
///   ws_url: "ws://127.0.0.1:8080/"
///   request_timeout_seconds: 30
///
/// rendering:
///   url: "https://api.simli.ai"
///   api_key: "your-api-key"
///
/// avatars:
///   face_id_speaker_00: "face-a"
///   face_id_speaker_01: "face-b"
///
/// diarization:
///   source: "diarization_results.txt"
///
/// webrtc:
///   ice_servers:
///     - "stun:stun.l.google.com:19302"
///   gather_poll_ms: 250
///   gather_deadline_ms: 5000
///   connect_timeout_seconds: 10
///
/// playback:
///   warmup_ms: 750
///   ready_poll_ms: 500
///   ready_timeout_seconds: 60
///   setup_deadline_seconds: 30
///
/// retry:
///   max_attempts: 5
///   base_ms: 100
///   jitter_ms: 500
///   cap_ms: 2500
///
/// recording:
///   downloads_dir: "/home/user/Downloads"
///   file_name: "avatar_recording.webm"
///   width: 1920
///   height: 1080
///   fps: 30
///   sample_rate: 48000
///   ffmpeg_path: "/usr/bin/ffmpeg"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub backend: Option<BackendYaml>,
    pub rendering: Option<RenderingYaml>,
    pub avatars: Option<AvatarsYaml>,
    pub diarization: Option<DiarizationYaml>,
    pub webrtc: Option<WebRtcYaml>,
    pub playback: Option<PlaybackYaml>,
    pub retry: Option<RetryYaml>,
    pub recording: Option<RecordingYaml>,
}

/// Coordination backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub url: Option<String>,
    pub ws_url: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

/// Rendering service settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RenderingYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

/// Face id overrides from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AvatarsYaml {
    pub face_id_speaker_00: Option<String>,
    pub face_id_speaker_01: Option<String>,
}

/// Diarization source from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DiarizationYaml {
    pub source: Option<String>,
}

/// WebRTC settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WebRtcYaml {
    pub ice_servers: Option<Vec<String>>,
    pub gather_poll_ms: Option<u64>,
    pub gather_deadline_ms: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
}

/// Playback timing from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlaybackYaml {
    pub warmup_ms: Option<u64>,
    pub ready_poll_ms: Option<u64>,
    pub ready_timeout_seconds: Option<u64>,
    pub setup_deadline_seconds: Option<u64>,
}

/// Retry backoff from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetryYaml {
    pub max_attempts: Option<u32>,
    pub base_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub cap_ms: Option<u64>,
}

/// Recording output from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RecordingYaml {
    pub downloads_dir: Option<PathBuf>,
    pub file_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub ffmpeg_path: Option<PathBuf>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
