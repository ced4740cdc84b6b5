//! HTTP client for the rendering service.

use std::time::Duration;

use tracing::{debug, info};

use super::messages::{AudioToVideoSessionRequest, SessionDescription, SessionTokenResponse};
use super::{RenderingError, RenderingResult};

/// Production endpoint of the rendering service.
pub const RENDERING_DEFAULT_URL: &str = "https://api.simli.ai";

/// Client for session negotiation and token issuance.
#[derive(Debug, Clone)]
pub struct RenderingClient {
    http: reqwest::Client,
    base_url: String,
}

impl RenderingClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> RenderingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RenderingError::ConnectionFailed(e.to_string()))?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Submit the local offer and return the service's answer.
    pub async fn start_webrtc_session(
        &self,
        offer: &SessionDescription,
    ) -> RenderingResult<SessionDescription> {
        debug!("Submitting offer ({} bytes of SDP)", offer.sdp.len());
        let response = self
            .http
            .post(self.endpoint("StartWebRTCSession"))
            .json(offer)
            .send()
            .await
            .map_err(transport_error)?;

        let answer = decode::<SessionDescription>(response).await?;
        if !answer.is_answer() {
            return Err(RenderingError::InvalidResponse(format!(
                "Unexpected SDP type from server: {}",
                answer.kind
            )));
        }
        Ok(answer)
    }

    /// Request the session token that binds `face_id` to the negotiated session.
    pub async fn start_audio_to_video_session(
        &self,
        face_id: &str,
        api_key: &str,
    ) -> RenderingResult<String> {
        if api_key.is_empty() {
            return Err(RenderingError::AuthenticationFailed(
                "No API key available for the rendering service".to_string(),
            ));
        }

        let request = AudioToVideoSessionRequest {
            face_id: face_id.to_string(),
            is_jpg: false,
            api_key: api_key.to_string(),
            sync_audio: true,
        };

        let response = self
            .http
            .post(self.endpoint("startAudioToVideoSession"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let token = decode::<SessionTokenResponse>(response).await?;
        info!(face_id, "Session token issued");
        Ok(token.session_token)
    }
}

fn transport_error(e: reqwest::Error) -> RenderingError {
    if e.is_timeout() {
        RenderingError::Timeout(e.to_string())
    } else {
        RenderingError::ConnectionFailed(e.to_string())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> RenderingResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RenderingError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| RenderingError::InvalidResponse(e.to_string()))
}
