//! Coordination backend clients.
//!
//! The local coordination backend serves the environment secrets, manages the
//! recording files, runs diarization, and streams segment audio over a
//! WebSocket. This module provides:
//!
//! - [`BackendClient`] for the REST endpoints
//! - [`EventStream`] / [`EventStreamHandle`] for the per-participant socket
//!
//! # Example
//!
//! ```rust,ignore
//! use duo_vodcast::core::backend::BackendClient;
//! use std::time::Duration;
//!
//! let client = BackendClient::new("http://127.0.0.1:8080", Duration::from_secs(30))?;
//! let env = client.get_env_vars().await?;
//! println!("face for speaker 00: {:?}", env.face_id_speaker_00);
//! ```

mod client;
mod event_stream;
mod messages;

pub use client::{BackendClient, status_text};
pub use event_stream::{EventStream, EventStreamHandle, SegmentRequestSink};
pub use messages::{BackendDetail, BackendMessage, EnvVars, EventFrame, SegmentRequest};

use thiserror::Error;

/// Errors that can occur while talking to the coordination backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached or the request failed in transit
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The backend answered with an error status
    #[error("Backend rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The event stream is not open
    #[error("Not connected")]
    NotConnected,

    /// Invalid configuration (bad URL, unreadable upload)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
