//! The vodcast coordinator.
//!
//! Owns one session per participant, the readiness board, the persistent
//! media elements, and the recorder. Each live session has a single event
//! task that consumes the participant's event queue: it feeds the readiness
//! gate, requests the session token once the control channel opens, and
//! forwards every backend frame into the control channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DuoConfig;
use crate::core::backend::{
    BackendClient, BackendError, EnvVars, EventFrame, SegmentRequestSink, status_text,
};
use crate::core::events::{EventReceiver, ParticipantEvent, TrackKind, event_channel};
use crate::core::participant::ParticipantId;
use crate::core::player::{PlaybackState, PlayerResult, SegmentPlayer};
use crate::core::readiness::{
    ReadinessBoard, ReadinessGate, ReadinessSignal, ReadinessState, StatusIndicator,
    TracingStatusIndicator,
};
use crate::core::recorder::{Recorder, RecorderError, RecorderSources};
use crate::core::rendering::{RenderingClient, RenderingError};
use crate::core::retry::{ParticipantSetup, RetryReport, run_until_ready};
use crate::core::segments::{SegmentSource, TimeRange};
use crate::core::session::{
    EstablishRequest, MediaElement, SessionError, SessionEstablisher, SessionHandles,
    WebRtcEstablisher,
};

/// Errors surfaced by coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Rendering(#[from] RenderingError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    /// Neither the configuration nor the backend supplied a face id
    #[error("No face id configured for {0}")]
    MissingFaceId(ParticipantId),

    /// Session setup did not finish within the per-attempt deadline
    #[error("Setup of {0} timed out")]
    SetupTimeout(ParticipantId),
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Snapshot of one participant for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantStatus {
    pub participant: ParticipantId,
    pub ready: bool,
    pub has_session: bool,
    pub control_channel_open: bool,
    pub event_stream_open: bool,
    pub playback: Option<PlaybackState>,
    pub last_completed: Option<usize>,
    pub segments: usize,
}

/// Outcome of [`Coordinator::combined_play`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombinedPlayReport {
    pub retry: RetryReport,
    pub ready: bool,
    pub recording: bool,
    pub playing: bool,
}

struct ParticipantMedia {
    video: Arc<MediaElement>,
    audio: Arc<MediaElement>,
}

struct ParticipantSession {
    handles: SessionHandles,
    gate: Arc<Mutex<ReadinessGate>>,
    player: SegmentPlayer,
    shutdown: CancellationToken,
    playback: Option<JoinHandle<PlayerResult<PlaybackState>>>,
}

impl ParticipantSession {
    async fn close(self) {
        self.player.pause();
        self.shutdown.cancel();
        self.handles.close().await;
        if let Some(playback) = self.playback {
            playback.abort();
        }
    }
}

/// Everything an event task needs, cloned out of the coordinator.
struct EventContext {
    participant: ParticipantId,
    face_id: String,
    handles: SessionHandles,
    gate: Arc<Mutex<ReadinessGate>>,
    readiness: Arc<ReadinessBoard>,
    rendering: RenderingClient,
    config: Arc<DuoConfig>,
    env_vars: Arc<RwLock<EnvVars>>,
}

/// Top-level driver for a two-avatar vodcast.
pub struct Coordinator {
    config: Arc<DuoConfig>,
    backend: BackendClient,
    rendering: RenderingClient,
    http: reqwest::Client,
    establisher: Arc<dyn SessionEstablisher>,
    readiness: Arc<ReadinessBoard>,
    sessions: DashMap<ParticipantId, ParticipantSession>,
    media: [ParticipantMedia; 2],
    env_vars: Arc<RwLock<EnvVars>>,
    env_loaded: AtomicBool,
    recorder: Recorder,
}

impl Coordinator {
    /// Build a coordinator with the HTTP clients and WebRTC establisher from `config`.
    pub fn new(config: DuoConfig) -> CoordinatorResult<Self> {
        let backend = BackendClient::new(&config.backend_url, config.request_timeout)?;
        let rendering = RenderingClient::new(&config.rendering_url, config.request_timeout)?;
        let establisher = Arc::new(WebRtcEstablisher::new(
            rendering.clone(),
            config.webrtc_settings(),
        ));
        Ok(Self::with_parts(
            config,
            backend,
            rendering,
            establisher,
            Arc::new(TracingStatusIndicator),
        ))
    }

    /// Build a coordinator from explicit collaborators.
    pub fn with_parts(
        config: DuoConfig,
        backend: BackendClient,
        rendering: RenderingClient,
        establisher: Arc<dyn SessionEstablisher>,
        indicator: Arc<dyn StatusIndicator>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        let media = ParticipantId::ALL.map(|participant| ParticipantMedia {
            video: Arc::new(MediaElement::new(participant, TrackKind::Video)),
            audio: Arc::new(MediaElement::new(participant, TrackKind::Audio)),
        });

        let recorder = Recorder::new(config.recording.clone());

        Self {
            config: Arc::new(config),
            backend,
            rendering,
            http,
            establisher,
            readiness: Arc::new(ReadinessBoard::new(indicator)),
            sessions: DashMap::new(),
            media,
            env_vars: Arc::new(RwLock::new(EnvVars::default())),
            env_loaded: AtomicBool::new(false),
            recorder,
        }
    }

    /// Replace the recorder built from the configuration.
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> &DuoConfig {
        &self.config
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn readiness_state(&self) -> ReadinessState {
        self.readiness.snapshot()
    }

    pub fn is_ready(&self, participant: ParticipantId) -> bool {
        self.readiness.is_ready(participant)
    }

    fn media_of(&self, participant: ParticipantId) -> &ParticipantMedia {
        match participant {
            ParticipantId::Speaker00 => &self.media[0],
            ParticipantId::Speaker01 => &self.media[1],
        }
    }

    /// Video and audio sinks of `participant`. They outlive sessions.
    pub fn media(&self, participant: ParticipantId) -> (Arc<MediaElement>, Arc<MediaElement>) {
        let media = self.media_of(participant);
        (media.video.clone(), media.audio.clone())
    }

    /// Fetch the environment secrets from the backend.
    ///
    /// Failures are logged and swallowed; later setups then fail for lack of
    /// face ids and the retry loop runs to exhaustion.
    pub async fn load_env_vars(&self) -> bool {
        match self.backend.get_env_vars().await {
            Ok(env) => {
                *self.env_vars.write() = env;
                self.env_loaded.store(true, Ordering::SeqCst);
                info!("Environment variables loaded successfully");
                true
            }
            Err(e) => {
                error!("Error loading environment variables: {e}");
                false
            }
        }
    }

    async fn ensure_env_vars(&self) {
        if !self.env_loaded.load(Ordering::SeqCst) {
            self.load_env_vars().await;
        }
    }

    async fn load_segments(&self, participant: ParticipantId) -> Vec<TimeRange> {
        let source = SegmentSource::parse(&self.config.diarization_source);
        match source
            .segments_for_speaker(&self.http, participant.speaker_label())
            .await
        {
            Ok(segments) => {
                if segments.is_empty() {
                    warn!(participant = %participant, "No segments found for {}", participant.speaker_label());
                }
                segments
            }
            Err(e) => {
                warn!(participant = %participant, "Failed to load segments: {e}");
                Vec::new()
            }
        }
    }

    /// Run one full setup for `participant`, replacing any previous session.
    pub async fn setup_participant(&self, participant: ParticipantId) -> CoordinatorResult<()> {
        let face_id = {
            let env = self.env_vars.read();
            self.config.face_id(participant, &env)
        }
        .ok_or(CoordinatorError::MissingFaceId(participant))?;

        if let Some((_, previous)) = self.sessions.remove(&participant) {
            debug!(participant = %participant, "Closing previous session");
            previous.close().await;
        }

        let (video_sink, audio_sink) = self.media(participant);
        let (events_tx, events_rx) = event_channel();

        let request = EstablishRequest {
            participant,
            face_id: face_id.clone(),
            video_sink,
            audio_sink,
            events: events_tx,
        };

        let handles = tokio::time::timeout(
            self.config.setup_deadline,
            self.establisher.establish(request),
        )
        .await
        .map_err(|_| CoordinatorError::SetupTimeout(participant))??;

        let segments = self.load_segments(participant).await;
        let player = SegmentPlayer::new(participant, segments);

        let gate = Arc::new(Mutex::new(ReadinessGate::new()));
        let shutdown = CancellationToken::new();

        let context = EventContext {
            participant,
            face_id,
            handles: handles.clone(),
            gate: gate.clone(),
            readiness: self.readiness.clone(),
            rendering: self.rendering.clone(),
            config: self.config.clone(),
            env_vars: self.env_vars.clone(),
        };
        tokio::spawn(run_event_loop(context, events_rx, shutdown.clone()));

        self.sessions.insert(
            participant,
            ParticipantSession {
                handles,
                gate,
                player,
                shutdown,
                playback: None,
            },
        );
        info!(participant = %participant, "Avatar set up");
        Ok(())
    }

    async fn try_setup(&self, participant: ParticipantId) {
        if let Err(e) = self.setup_participant(participant).await {
            error!(participant = %participant, "Error setting up avatar: {e}");
        }
    }

    /// Start both avatars from scratch, retrying until both are ready.
    pub async fn start_both(&self) -> RetryReport {
        self.ensure_env_vars().await;
        self.readiness.reset();
        info!("Starting avatar setup with automatic retries");
        run_until_ready(&self.config.retry, self).await
    }

    /// Wait until both avatars are ready, bounded by the configured timeout.
    pub async fn wait_until_ready(&self) -> bool {
        info!("Waiting for both avatars to be ready");
        let ready = tokio::time::timeout(
            self.config.ready_timeout,
            self.readiness.wait_until_both_ready(),
        )
        .await
        .is_ok();
        if ready {
            info!("Both avatars are now ready");
        } else {
            warn!(
                timeout_secs = self.config.ready_timeout.as_secs(),
                "Avatars did not become ready in time"
            );
        }
        ready
    }

    /// Set up any participant that is not ready (once), then, if both are
    /// ready, wait for the warmup and start both players.
    pub async fn play_both(&self) -> bool {
        self.ensure_env_vars().await;
        for participant in ParticipantId::ALL {
            if !self.readiness.is_ready(participant) {
                self.try_setup(participant).await;
            }
        }
        // Give freshly opened channels one settle window to report in.
        self.settle().await;

        if !self.readiness.snapshot().both() {
            warn!("Avatars are not ready, playback not started");
            return false;
        }

        tokio::time::sleep(self.config.warmup).await;

        for participant in ParticipantId::ALL {
            self.start_player(participant);
        }
        info!("Playback started for both avatars");
        true
    }

    fn start_player(&self, participant: ParticipantId) {
        let Some(mut session) = self.sessions.get_mut(&participant) else {
            return;
        };
        if session
            .playback
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            debug!(participant = %participant, "Playback already running");
            return;
        }

        let player = session.player.clone();
        let sink: Arc<dyn SegmentRequestSink> = Arc::new(session.handles.event_stream.clone());
        session.playback = Some(tokio::spawn(async move { player.start_playback(sink).await }));
    }

    /// Pause both players at their next checkpoint.
    pub fn pause_both(&self) {
        for session in self.sessions.iter() {
            session.player.pause();
        }
    }

    /// Wait for running playback loops and return their final states.
    pub async fn wait_for_playback(&self) -> HashMap<ParticipantId, PlaybackState> {
        let handles: Vec<_> = ParticipantId::ALL
            .into_iter()
            .filter_map(|participant| {
                let mut session = self.sessions.get_mut(&participant)?;
                session.playback.take().map(|handle| (participant, handle))
            })
            .collect();

        let mut states = HashMap::new();
        for (participant, handle) in handles {
            let state = match handle.await {
                Ok(Ok(state)) => state,
                Ok(Err(e)) => {
                    warn!(participant = %participant, "Playback stopped: {e}");
                    PlaybackState::Paused
                }
                Err(e) => {
                    warn!(participant = %participant, "Playback task ended abnormally: {e}");
                    PlaybackState::Paused
                }
            };
            states.insert(participant, state);
        }
        states
    }

    /// Delete the previous recording, start both avatars, wait for them,
    /// start recording, and play.
    pub async fn combined_play(&self) -> CombinedPlayReport {
        info!("Combined play started");
        match self.backend.delete_previous_recording().await {
            Ok(message) => info!("{message}"),
            Err(e) => error!("Error deleting previous recording: {e}"),
        }

        let retry = self.start_both().await;
        let ready = retry.all_ready() || self.wait_until_ready().await;

        let recording = match self.start_recording() {
            Ok(started) => started,
            Err(e) => {
                error!("Failed to start recording: {e}");
                false
            }
        };

        let playing = self.play_both().await;
        CombinedPlayReport {
            retry,
            ready,
            recording,
            playing,
        }
    }

    /// Bind the recorder to the media elements (first call only) and start
    /// capturing their tracks.
    pub fn start_recording(&self) -> CoordinatorResult<bool> {
        let left = self.media_of(ParticipantId::Speaker00);
        let right = self.media_of(ParticipantId::Speaker01);

        self.recorder.setup(RecorderSources {
            left_video: left.video.clone(),
            right_video: right.video.clone(),
            left_audio: left.audio.clone(),
            right_audio: right.audio.clone(),
        });
        Ok(self.recorder.start()?)
    }

    /// Stop recording and compose the file, if recording.
    pub async fn stop_recording(&self) -> CoordinatorResult<Option<std::path::PathBuf>> {
        Ok(self.recorder.stop().await?)
    }

    /// Full reset: pause players, save any recording, close every session,
    /// and mark both avatars not ready.
    pub async fn cancel(&self) {
        info!("Stopping playback and resetting");
        self.pause_both();

        match self.stop_recording().await {
            Ok(Some(path)) => info!(path = %path.display(), "Recording stopped"),
            Ok(None) => {}
            Err(e) => error!("Failed to save recording: {e}"),
        }

        for participant in ParticipantId::ALL {
            if let Some((_, session)) = self.sessions.remove(&participant) {
                session.close().await;
            }
        }
        self.readiness.reset();
    }

    /// Ask the backend to mux the recording with the source audio.
    pub async fn sync(&self) -> String {
        let result = self.backend.sync_audio_video().await;
        let text = status_text(&result);
        match &result {
            Ok(_) => info!("{text}"),
            Err(e) => error!("Sync failed: {e}"),
        }
        text
    }

    pub fn status(&self) -> Vec<ParticipantStatus> {
        ParticipantId::ALL
            .into_iter()
            .map(|participant| {
                let ready = self.readiness.is_ready(participant);
                match self.sessions.get(&participant) {
                    Some(session) => {
                        let gate = *session.gate.lock();
                        ParticipantStatus {
                            participant,
                            ready,
                            has_session: true,
                            control_channel_open: gate.control_channel_open(),
                            event_stream_open: session.handles.event_stream.is_open(),
                            playback: Some(session.player.state()),
                            last_completed: session.player.last_completed_index(),
                            segments: session.player.segments().len(),
                        }
                    }
                    None => ParticipantStatus {
                        participant,
                        ready,
                        has_session: false,
                        control_channel_open: false,
                        event_stream_open: false,
                        playback: None,
                        last_completed: None,
                        segments: 0,
                    },
                }
            })
            .collect()
    }

    /// Close everything and stop background tasks.
    pub async fn shutdown(&self) {
        self.cancel().await;
        self.recorder.shutdown();
    }
}

#[async_trait]
impl ParticipantSetup for Coordinator {
    fn readiness(&self) -> ReadinessState {
        self.readiness.snapshot()
    }

    async fn setup(&self, participant: ParticipantId) {
        self.try_setup(participant).await;
    }

    async fn settle(&self) {
        let _ = tokio::time::timeout(
            self.config.ready_poll,
            self.readiness.wait_until_both_ready(),
        )
        .await;
    }
}

async fn run_event_loop(ctx: EventContext, mut events: EventReceiver, shutdown: CancellationToken) {
    let participant = ctx.participant;
    loop {
        // Events still queued from a session being replaced must not mark it ready.
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            ParticipantEvent::ControlChannelOpen => {
                let outcome = {
                    let mut gate = ctx.gate.lock();
                    ctx.readiness
                        .apply(participant, &mut gate, ReadinessSignal::ControlChannelOpen)
                };
                debug!(participant = %participant, ?outcome, "Control channel flag set");
                send_session_token(&ctx).await;
            }
            ParticipantEvent::EventStreamOpen => {
                let mut gate = ctx.gate.lock();
                ctx.readiness
                    .apply(participant, &mut gate, ReadinessSignal::EventStreamOpen);
            }
            ParticipantEvent::ControlChannelClosed => {
                warn!(participant = %participant, "Control channel closed");
            }
            ParticipantEvent::EventStreamClosed => {
                warn!(participant = %participant, "Event stream closed");
            }
            ParticipantEvent::TrackArrived(kind) => {
                debug!(participant = %participant, %kind, "Track arrived");
            }
            ParticipantEvent::BackendFrame(frame) => forward_frame(&ctx, frame).await,
        }
    }
    debug!(participant = %participant, "Event loop stopped");
}

async fn send_session_token(ctx: &EventContext) {
    let api_key = {
        let env = ctx.env_vars.read();
        ctx.config.api_key(&env)
    }
    .unwrap_or_default();

    let token = match ctx
        .rendering
        .start_audio_to_video_session(&ctx.face_id, &api_key)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            error!(participant = %ctx.participant, "Session token request failed: {e}");
            return;
        }
    };

    if let Err(e) = ctx.handles.control_channel.send_text(&token).await {
        error!(participant = %ctx.participant, "Failed to send session token: {e}");
    }
}

/// Forward one backend payload, text as text and binary as binary.
async fn forward_frame(ctx: &EventContext, frame: EventFrame) {
    let channel = &ctx.handles.control_channel;
    if !channel.is_open() {
        debug!(participant = %ctx.participant, bytes = frame.len(), "Control channel not open, dropping frame");
        return;
    }
    let result = match frame {
        EventFrame::Text(text) => {
            warn!(participant = %ctx.participant, "Backend reported: {text}");
            channel.send_text(&text).await
        }
        EventFrame::Binary(data) => channel.send_binary(data).await,
    };
    if let Err(e) = result {
        warn!(participant = %ctx.participant, "Failed to forward frame: {e}");
    }
}
