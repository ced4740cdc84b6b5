pub mod backend;
pub mod events;
pub mod participant;
pub mod player;
pub mod readiness;
pub mod recorder;
pub mod rendering;
pub mod retry;
pub mod segments;
pub mod session;

// Re-export commonly used types for convenience
pub use backend::{
    BackendClient, BackendError, BackendResult, EnvVars, EventFrame, EventStream,
    EventStreamHandle, SegmentRequest, SegmentRequestSink, status_text,
};

pub use events::{EventReceiver, EventSender, ParticipantEvent, TrackKind, event_channel};

pub use participant::ParticipantId;

pub use player::{PlaybackState, PlayerError, PlayerResult, SegmentPlayer};

pub use readiness::{
    AvatarStatus, GateOutcome, ReadinessBoard, ReadinessGate, ReadinessSignal, ReadinessState,
    StatusIndicator, TracingStatusIndicator,
};

pub use recorder::{
    ComposeJob, FfmpegComposer, MediaComposer, Recorder, RecorderError, RecorderResult,
    RecorderSettings, RecorderSources,
};

pub use rendering::{RENDERING_DEFAULT_URL, RenderingClient, RenderingError, RenderingResult};

pub use retry::{ParticipantSetup, RetryPolicy, RetryReport, run_until_ready};

pub use segments::{SegmentError, SegmentResult, SegmentSource, TimeRange, parse_segments};

pub use session::{
    ControlChannel, EstablishRequest, MediaElement, PeerSession, SessionError,
    SessionEstablisher, SessionHandles, SessionResult, TrackInfo, WebRtcEstablisher,
    WebRtcSettings,
};
