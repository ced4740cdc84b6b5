//! Environment variable loading.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::{ConfigError, ConfigResult, DuoConfig};

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64(name: &str, value: &str) -> ConfigResult<u64> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key: name.to_string(),
        message: format!("expected a non-negative integer, got '{value}'"),
    })
}

/// Split a comma separated list, dropping empty entries.
pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Overlay environment variables onto `config`.
pub(super) fn apply_env(config: &mut DuoConfig) -> ConfigResult<()> {
    if let Some(url) = var("BACKEND_URL") {
        config.backend_url = url;
    }
    if let Some(url) = var("BACKEND_WS_URL") {
        config.backend_ws_url = url;
    }
    if let Some(url) = var("RENDERING_URL") {
        config.rendering_url = url;
    }
    if let Some(key) = var("SIMLI_API_KEY") {
        config.rendering_api_key = Some(key);
    }
    if let Some(face) = var("FACE_ID_SPEAKER_00") {
        config.face_id_speaker_00 = Some(face);
    }
    if let Some(face) = var("FACE_ID_SPEAKER_01") {
        config.face_id_speaker_01 = Some(face);
    }
    if let Some(source) = var("DIARIZATION_SOURCE") {
        config.diarization_source = source;
    }
    if let Some(servers) = var("ICE_SERVERS") {
        config.ice_servers = parse_list(&servers);
    }
    if let Some(dir) = var("DOWNLOADS_DIR") {
        config.recording.downloads_dir = PathBuf::from(dir);
    }
    if let Some(ffmpeg) = var("FFMPEG_PATH") {
        config.recording.ffmpeg_path = PathBuf::from(ffmpeg);
    }
    if let Some(timeout) = var("REQUEST_TIMEOUT_SECONDS") {
        config.request_timeout =
            Duration::from_secs(parse_u64("REQUEST_TIMEOUT_SECONDS", &timeout)?);
    }
    if let Some(attempts) = var("RETRY_MAX_ATTEMPTS") {
        let attempts = parse_u64("RETRY_MAX_ATTEMPTS", &attempts)?;
        config.retry.max_attempts =
            u32::try_from(attempts).map_err(|_| ConfigError::InvalidValue {
                key: "RETRY_MAX_ATTEMPTS".to_string(),
                message: format!("{attempts} is out of range"),
            })?;
    }
    Ok(())
}
