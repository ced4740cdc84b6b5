//! Avatar rendering service client.
//!
//! The rendering service is an opaque WebRTC endpoint: it answers an SDP offer
//! with an SDP answer, and issues a session token that binds a face to the
//! negotiated session once the control channel is open.
//!
//! # API Reference
//!
//! - `POST /StartWebRTCSession` with `{sdp, type}` returns `{sdp, type}`
//! - `POST /startAudioToVideoSession` with `{faceId, isJPG, apiKey, syncAudio}`
//!   returns `{session_token}`

mod client;
mod messages;

pub use client::{RENDERING_DEFAULT_URL, RenderingClient};
pub use messages::{AudioToVideoSessionRequest, SessionDescription, SessionTokenResponse};

use thiserror::Error;

/// Errors that can occur while talking to the rendering service.
#[derive(Debug, Error)]
pub enum RenderingError {
    /// The service could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The service answered with an error status
    #[error("Rendering service rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No API key is available for token requests
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for rendering service operations.
pub type RenderingResult<T> = Result<T, RenderingError>;
