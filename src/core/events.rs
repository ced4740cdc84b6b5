//! Per-participant event queue.
//!
//! Transport callbacks (data channel open, socket open, track arrival, inbound
//! frames) never touch shared state directly. They push a [`ParticipantEvent`]
//! into the participant's channel and a single coordinating task consumes it.

use tokio::sync::mpsc;

use crate::core::backend::EventFrame;

/// Kind of media track delivered by the rendering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Something that happened on one of a participant's transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantEvent {
    ControlChannelOpen,
    ControlChannelClosed,
    EventStreamOpen,
    EventStreamClosed,
    TrackArrived(TrackKind),
    /// A payload from the coordination backend, to be forwarded verbatim.
    BackendFrame(EventFrame),
}

pub type EventSender = mpsc::UnboundedSender<ParticipantEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ParticipantEvent>;

/// Create the event queue for one participant session.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
