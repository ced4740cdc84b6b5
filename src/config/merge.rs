//! Applying YAML overrides.

use std::time::Duration;

use super::DuoConfig;
use super::yaml::YamlConfig;

/// Overlay every value present in `yaml` onto `config`.
pub(super) fn apply_yaml(config: &mut DuoConfig, yaml: YamlConfig) {
    if let Some(backend) = yaml.backend {
        if let Some(url) = backend.url {
            config.backend_url = url;
        }
        if let Some(url) = backend.ws_url {
            config.backend_ws_url = url;
        }
        if let Some(secs) = backend.request_timeout_seconds {
            config.request_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(rendering) = yaml.rendering {
        if let Some(url) = rendering.url {
            config.rendering_url = url;
        }
        if rendering.api_key.is_some() {
            config.rendering_api_key = rendering.api_key;
        }
    }

    if let Some(avatars) = yaml.avatars {
        if avatars.face_id_speaker_00.is_some() {
            config.face_id_speaker_00 = avatars.face_id_speaker_00;
        }
        if avatars.face_id_speaker_01.is_some() {
            config.face_id_speaker_01 = avatars.face_id_speaker_01;
        }
    }

    if let Some(source) = yaml.diarization.and_then(|d| d.source) {
        config.diarization_source = source;
    }

    if let Some(webrtc) = yaml.webrtc {
        if let Some(servers) = webrtc.ice_servers {
            config.ice_servers = servers;
        }
        if let Some(ms) = webrtc.gather_poll_ms {
            config.gather_poll = Duration::from_millis(ms);
        }
        if let Some(ms) = webrtc.gather_deadline_ms {
            config.gather_deadline = Duration::from_millis(ms);
        }
        if let Some(secs) = webrtc.connect_timeout_seconds {
            config.connect_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(playback) = yaml.playback {
        if let Some(ms) = playback.warmup_ms {
            config.warmup = Duration::from_millis(ms);
        }
        if let Some(ms) = playback.ready_poll_ms {
            config.ready_poll = Duration::from_millis(ms);
        }
        if let Some(secs) = playback.ready_timeout_seconds {
            config.ready_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = playback.setup_deadline_seconds {
            config.setup_deadline = Duration::from_secs(secs);
        }
    }

    if let Some(retry) = yaml.retry {
        if let Some(n) = retry.max_attempts {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = retry.base_ms {
            config.retry.base_ms = ms;
        }
        if let Some(ms) = retry.jitter_ms {
            config.retry.jitter_ms = ms;
        }
        if let Some(ms) = retry.cap_ms {
            config.retry.cap_ms = ms;
        }
    }

    if let Some(recording) = yaml.recording {
        if let Some(dir) = recording.downloads_dir {
            config.recording.downloads_dir = dir;
        }
        if let Some(name) = recording.file_name {
            config.recording.file_name = name;
        }
        if let Some(width) = recording.width {
            config.recording.width = width;
        }
        if let Some(height) = recording.height {
            config.recording.height = height;
        }
        if let Some(fps) = recording.fps {
            config.recording.fps = fps;
        }
        if let Some(rate) = recording.sample_rate {
            config.recording.sample_rate = rate;
        }
        if let Some(ffmpeg) = recording.ffmpeg_path {
            config.recording.ffmpeg_path = ffmpeg;
        }
    }
}
