//! REST client for the coordination backend.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, error, info};

use super::messages::{BackendDetail, BackendMessage, EnvVars};
use super::{BackendError, BackendResult};

/// HTTP client for the coordination backend's REST endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Build a client with its own connection pool and a per-request timeout.
    pub fn new(base_url: &str, request_timeout: Duration) -> BackendResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::InvalidConfiguration(e.to_string()))?;
        Ok(Self::with_client(base_url, http))
    }

    /// Build a client that shares an existing `reqwest::Client`.
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET /get_env_vars`: API key and face identifiers.
    pub async fn get_env_vars(&self) -> BackendResult<EnvVars> {
        let response = self
            .http
            .get(self.endpoint("get_env_vars"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                detail: "Failed to load environment variables".to_string(),
            });
        }

        let env = response
            .json::<EnvVars>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        info!("Environment variables loaded successfully");
        Ok(env)
    }

    /// `POST /sync_audio_video`: trims the recording's leading black frames and
    /// muxes the original audio back in. Returns the backend's status message.
    pub async fn sync_audio_video(&self) -> BackendResult<String> {
        let response = self
            .http
            .post(self.endpoint("sync_audio_video"))
            .send()
            .await
            .map_err(transport_error)?;
        read_message(response).await
    }

    /// `POST /delete_previous_recording`.
    pub async fn delete_previous_recording(&self) -> BackendResult<String> {
        let response = self
            .http
            .post(self.endpoint("delete_previous_recording"))
            .send()
            .await
            .map_err(transport_error)?;
        let message = read_message(response).await?;
        debug!("{message}");
        Ok(message)
    }

    /// `POST /diarize_audio`: upload a WAV or MP3 file for two-speaker diarization.
    pub async fn diarize_audio(&self, audio_path: &Path) -> BackendResult<String> {
        let mime = audio_mime_type(audio_path).ok_or_else(|| {
            BackendError::InvalidConfiguration(format!(
                "Unsupported audio file {}: only WAV and MP3 files are accepted",
                audio_path.display()
            ))
        })?;

        let data = tokio::fs::read(audio_path).await.map_err(|e| {
            BackendError::InvalidConfiguration(format!(
                "Failed to read {}: {e}",
                audio_path.display()
            ))
        })?;

        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| BackendError::InvalidConfiguration(e.to_string()))?;
        let form = Form::new().part("audio", part);

        info!("Uploading {} for diarization", audio_path.display());
        let response = self
            .http
            .post(self.endpoint("diarize_audio"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        read_message(response).await
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::ConnectionFailed(e.to_string())
    }
}

/// Decode `{message}` on success and `{detail}` on failure.
async fn read_message(response: reqwest::Response) -> BackendResult<String> {
    let status = response.status();
    if status.is_success() {
        let body = response
            .json::<BackendMessage>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        return Ok(body.message);
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<BackendDetail>(&text)
        .map(|d| d.detail)
        .unwrap_or(text);
    error!("Server error ({}): {}", status, detail);
    Err(BackendError::Rejected {
        status: status.as_u16(),
        detail,
    })
}

fn audio_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_string_lossy().to_lowercase();
    match extension.as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        _ => None,
    }
}

/// Text for the user-visible status line after a backend call.
pub fn status_text(result: &BackendResult<String>) -> String {
    match result {
        Ok(message) => message.clone(),
        Err(BackendError::Rejected { detail, .. }) => format!("Error: {detail}"),
        Err(_) => "Failed to connect to server.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = BackendClient::with_client("http://127.0.0.1:8080/", reqwest::Client::new());
        assert_eq!(
            client.endpoint("/get_env_vars"),
            "http://127.0.0.1:8080/get_env_vars"
        );
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_audio_mime_type() {
        assert_eq!(audio_mime_type(Path::new("a.wav")), Some("audio/wav"));
        assert_eq!(audio_mime_type(Path::new("b.MP3")), Some("audio/mpeg"));
        assert_eq!(audio_mime_type(Path::new("c.ogg")), None);
        assert_eq!(audio_mime_type(Path::new("noext")), None);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(&Ok("Sync complete".to_string())), "Sync complete");
        assert_eq!(
            status_text(&Err(BackendError::Rejected {
                status: 404,
                detail: "Video file not found".to_string()
            })),
            "Error: Video file not found"
        );
        assert_eq!(
            status_text(&Err(BackendError::ConnectionFailed("refused".to_string()))),
            "Failed to connect to server."
        );
    }

    #[tokio::test]
    async fn test_diarize_rejects_unsupported_extension() {
        let client = BackendClient::with_client("http://127.0.0.1:1", reqwest::Client::new());
        let result = client.diarize_audio(Path::new("talk.flac")).await;
        assert!(matches!(result, Err(BackendError::InvalidConfiguration(_))));
    }
}
