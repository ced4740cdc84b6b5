//! Configuration module for the vodcast driver
//!
//! Configuration comes from three sources. Priority: YAML > ENV vars > .env
//! values > defaults. The `.env` file is loaded in `main` before any of this
//! runs, so it simply shows up as environment variables here.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides
//!
//! # Example
//! ```rust,no_run
//! use duo_vodcast::config::DuoConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = DuoConfig::from_env()?;
//!
//! // Load from YAML file with environment variables as the base
//! let config = DuoConfig::from_file(Path::new("duo.yaml"))?;
//!
//! println!("Backend at {}", config.backend_url);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::backend::EnvVars;
use crate::core::participant::ParticipantId;
use crate::core::recorder::RecorderSettings;
use crate::core::retry::RetryPolicy;
use crate::core::session::WebRtcSettings;

mod env;
mod merge;
mod yaml;

pub use yaml::YamlConfig;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML
    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    /// A value has the wrong format
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Driver configuration
///
/// Contains everything needed to run a vodcast:
/// - Coordination backend endpoints and request timeout
/// - Rendering service endpoint and optional API key override
/// - Face id overrides per speaker
/// - Diarization source, WebRTC and playback timing
/// - Retry backoff and recording output
#[derive(Debug, Clone)]
pub struct DuoConfig {
    pub backend_url: String,
    pub backend_ws_url: String,
    pub request_timeout: Duration,

    pub rendering_url: String,
    /// Overrides the key served by the backend when set.
    pub rendering_api_key: Option<String>,

    pub face_id_speaker_00: Option<String>,
    pub face_id_speaker_01: Option<String>,

    /// Local path or http(s) URL of the diarization text.
    pub diarization_source: String,

    pub ice_servers: Vec<String>,
    pub gather_poll: Duration,
    pub gather_deadline: Duration,
    pub connect_timeout: Duration,

    /// Pause between both avatars being ready and playback starting.
    pub warmup: Duration,
    pub ready_poll: Duration,
    pub ready_timeout: Duration,
    /// Upper bound on one participant setup attempt.
    pub setup_deadline: Duration,

    pub retry: RetryPolicy,
    pub recording: RecorderSettings,
}

fn default_downloads_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for DuoConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8080".to_string(),
            backend_ws_url: "ws://localhost:8080/".to_string(),
            request_timeout: Duration::from_secs(30),
            rendering_url: crate::core::rendering::RENDERING_DEFAULT_URL.to_string(),
            rendering_api_key: None,
            face_id_speaker_00: None,
            face_id_speaker_01: None,
            diarization_source: "diarization_results.txt".to_string(),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            gather_poll: Duration::from_millis(250),
            gather_deadline: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            warmup: Duration::from_millis(750),
            ready_poll: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(60),
            setup_deadline: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            recording: RecorderSettings {
                downloads_dir: default_downloads_dir(),
                ..RecorderSettings::default()
            },
        }
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for DuoConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.rendering_api_key {
            key.zeroize();
        }
    }
}

impl DuoConfig {
    /// Load configuration from environment variables over defaults.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variables as the base.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        env::apply_env(&mut config)?;
        merge::apply_yaml(&mut config, yaml_config);
        config.validate()?;
        Ok(config)
    }

    /// Check URLs, timings, and recording parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_url("backend.url", &self.backend_url, &["http", "https"])?;
        validate_url("backend.ws_url", &self.backend_ws_url, &["ws", "wss"])?;
        validate_url("rendering.url", &self.rendering_url, &["http", "https"])?;

        if self.request_timeout.is_zero() {
            return Err(invalid("backend.request_timeout_seconds", "must be positive"));
        }
        if self.ice_servers.is_empty() {
            return Err(invalid("webrtc.ice_servers", "at least one server is required"));
        }
        if self.gather_poll.is_zero() || self.ready_poll.is_zero() {
            return Err(invalid("poll intervals", "must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.cap_ms < self.retry.base_ms {
            return Err(invalid("retry.cap_ms", "must not be below retry.base_ms"));
        }

        let recording = &self.recording;
        if recording.width < 2 || recording.height == 0 {
            return Err(invalid("recording.width/height", "canvas is too small"));
        }
        if recording.fps == 0 || recording.sample_rate == 0 {
            return Err(invalid("recording.fps/sample_rate", "must be positive"));
        }
        if recording.file_name.trim().is_empty() {
            return Err(invalid("recording.file_name", "must not be empty"));
        }
        if recording.ffmpeg_path.as_os_str().is_empty() {
            return Err(invalid("recording.ffmpeg_path", "must not be empty"));
        }
        Ok(())
    }

    /// Face id for `participant`: configured override first, then the backend's value.
    pub fn face_id(&self, participant: ParticipantId, env: &EnvVars) -> Option<String> {
        let (configured, served) = match participant {
            ParticipantId::Speaker00 => (&self.face_id_speaker_00, &env.face_id_speaker_00),
            ParticipantId::Speaker01 => (&self.face_id_speaker_01, &env.face_id_speaker_01),
        };
        configured
            .clone()
            .or_else(|| served.clone())
            .filter(|id| !id.is_empty())
    }

    /// API key for the rendering service: configured override first, then the backend's value.
    pub fn api_key(&self, env: &EnvVars) -> Option<String> {
        self.rendering_api_key
            .clone()
            .or_else(|| env.api_key.clone())
            .filter(|key| !key.is_empty())
    }

    pub fn webrtc_settings(&self) -> WebRtcSettings {
        WebRtcSettings {
            ice_servers: self.ice_servers.clone(),
            gather_poll: self.gather_poll,
            gather_deadline: self.gather_deadline,
            event_stream_url: self.backend_ws_url.clone(),
            connect_timeout: self.connect_timeout,
            ..WebRtcSettings::default()
        }
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn validate_url(key: &str, value: &str, schemes: &[&str]) -> ConfigResult<()> {
    let parsed = url::Url::parse(value).map_err(|e| invalid(key, &format!("'{value}': {e}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(invalid(
            key,
            &format!("scheme '{}' is not one of {}", parsed.scheme(), schemes.join(", ")),
        ));
    }
    Ok(())
}
