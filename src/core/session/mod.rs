//! Media session establishment.
//!
//! A participant session is one peer connection to the rendering service
//! (receive-only audio and video plus an ordered control channel) and one
//! event-stream socket to the coordination backend. Establishment either
//! yields the full [`SessionHandles`] bundle or an error; partial handles
//! never escape.

mod ice;
mod media;
mod peer;

pub use ice::{GatheringOutcome, GatheringTracker};
pub use media::{MediaElement, MediaStats, TrackInfo};
pub use peer::{CONTROL_CHANNEL_LABEL, WebRtcEstablisher, WebRtcSettings};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::core::backend::{BackendError, EventStreamHandle};
use crate::core::events::EventSender;
use crate::core::participant::ParticipantId;
use crate::core::rendering::RenderingError;

/// Errors that can occur while establishing or using a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Creating or configuring the peer connection failed
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// Offer/answer exchange failed
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The rendering service rejected or failed a request
    #[error(transparent)]
    Rendering(#[from] RenderingError),

    /// The event stream could not be opened
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The control channel is not open
    #[error("Control channel closed")]
    ChannelClosed,

    /// Sending over the control channel failed
    #[error("Control channel send failed: {0}")]
    Send(String),

    /// Establishment did not finish in time
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// The ordered data channel to the rendering service.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    fn is_open(&self) -> bool;

    async fn send_text(&self, text: &str) -> SessionResult<()>;

    async fn send_binary(&self, data: Bytes) -> SessionResult<()>;

    async fn close(&self);
}

/// The media session itself.
#[async_trait]
pub trait PeerSession: Send + Sync {
    async fn close(&self);
}

/// Everything a successful establishment produces.
#[derive(Clone)]
pub struct SessionHandles {
    pub control_channel: Arc<dyn ControlChannel>,
    pub peer_connection: Arc<dyn PeerSession>,
    pub event_stream: EventStreamHandle,
}

impl std::fmt::Debug for SessionHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandles")
            .field("control_channel_open", &self.control_channel.is_open())
            .field("event_stream", &self.event_stream)
            .finish()
    }
}

impl SessionHandles {
    /// Close all three handles.
    pub async fn close(&self) {
        self.event_stream.close();
        self.control_channel.close().await;
        self.peer_connection.close().await;
    }
}

/// Inputs to one establishment.
pub struct EstablishRequest {
    pub participant: ParticipantId,
    pub face_id: String,
    pub video_sink: Arc<MediaElement>,
    pub audio_sink: Arc<MediaElement>,
    pub events: EventSender,
}

/// Something that can bring up a participant session.
#[async_trait]
pub trait SessionEstablisher: Send + Sync {
    async fn establish(&self, request: EstablishRequest) -> SessionResult<SessionHandles>;
}
