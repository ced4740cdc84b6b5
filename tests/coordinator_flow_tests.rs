//! End-to-end coordinator flows with a fake media session.
//!
//! The peer connection is replaced by an in-memory control channel; the
//! event stream, backend REST endpoints and rendering token endpoint are real
//! sockets against local mocks.

mod mock_providers;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use duo_vodcast::{
    BackendClient, ComposeJob, ControlChannel, Coordinator, DuoConfig, EstablishRequest,
    EventStream, MediaComposer, ParticipantEvent, ParticipantId, PeerSession, PlaybackState,
    Recorder, RecorderResult, RenderingClient, RetryPolicy, SegmentRequest, SessionEstablisher,
    SessionError, SessionHandles, SessionResult, TracingStatusIndicator,
};
use mock_providers::{EventStreamMock, ScriptedFrame};

const DIARIZATION: &str = "\
SPEAKER_00: 0.0 to 0.1
SPEAKER_01: 0.1 to 0.2
SPEAKER_00: 0.2 to 0.3
";

#[derive(Default)]
struct FakeControlChannel {
    closed: AtomicBool,
    texts: Mutex<Vec<String>>,
    binaries: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl ControlChannel for FakeControlChannel {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: &str) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::ChannelClosed);
        }
        self.texts.lock().push(text.to_string());
        Ok(())
    }

    async fn send_binary(&self, data: Bytes) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::ChannelClosed);
        }
        self.binaries.lock().push(data);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct FakePeer;

#[async_trait]
impl PeerSession for FakePeer {
    async fn close(&self) {}
}

/// Opens a real event stream and an in-memory control channel.
struct FakeEstablisher {
    event_stream_url: String,
    calls: AtomicU32,
    channels: Mutex<Vec<(ParticipantId, Arc<FakeControlChannel>)>>,
}

impl FakeEstablisher {
    fn new(event_stream_url: String) -> Self {
        Self {
            event_stream_url,
            calls: AtomicU32::new(0),
            channels: Mutex::new(Vec::new()),
        }
    }

    fn channel(&self, participant: ParticipantId) -> Arc<FakeControlChannel> {
        self.channels
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| *p == participant)
            .map(|(_, channel)| channel.clone())
            .expect("channel for participant")
    }
}

#[async_trait]
impl SessionEstablisher for FakeEstablisher {
    async fn establish(&self, request: EstablishRequest) -> SessionResult<SessionHandles> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let event_stream = EventStream::connect(
            &self.event_stream_url,
            request.participant,
            request.events.clone(),
            Duration::from_secs(5),
        )
        .await?;

        let channel = Arc::new(FakeControlChannel::default());
        self.channels
            .lock()
            .push((request.participant, channel.clone()));
        let _ = request.events.send(ParticipantEvent::ControlChannelOpen);

        Ok(SessionHandles {
            control_channel: channel,
            peer_connection: Arc::new(FakePeer),
            event_stream,
        })
    }
}

async fn mount_backend(server: &MockServer, env_status: u16, env_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/get_env_vars"))
        .respond_with(ResponseTemplate::new(env_status).set_body_json(json!({
            "API_KEY": "key-123",
            "FACE_ID_SPEAKER_00": "face-a",
            "FACE_ID_SPEAKER_01": "face-b"
        })))
        .expect(env_calls)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/startAudioToVideoSession"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"session_token": "token-xyz"})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/delete_previous_recording"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Previous recording deleted"})),
        )
        .mount(server)
        .await;
}

fn test_config(server: &MockServer, diarization: &Path, downloads: &Path) -> DuoConfig {
    let mut config = DuoConfig::default();
    config.backend_url = server.uri();
    config.rendering_url = server.uri();
    config.diarization_source = diarization.display().to_string();
    config.warmup = Duration::from_millis(10);
    config.ready_poll = Duration::from_secs(2);
    config.ready_timeout = Duration::from_secs(5);
    config.retry = RetryPolicy {
        max_attempts: 5,
        base_ms: 1,
        jitter_ms: 0,
        cap_ms: 10,
    };
    config.recording.downloads_dir = downloads.to_path_buf();
    config.recording.width = 64;
    config.recording.height = 36;
    config.recording.fps = 10;
    config
}

fn coordinator(config: DuoConfig, establisher: Arc<FakeEstablisher>) -> Coordinator {
    let backend = BackendClient::new(&config.backend_url, config.request_timeout).unwrap();
    let rendering = RenderingClient::new(&config.rendering_url, config.request_timeout).unwrap();
    Coordinator::with_parts(
        config,
        backend,
        rendering,
        establisher,
        Arc::new(TracingStatusIndicator),
    )
}

/// Writes a placeholder recording and keeps the jobs it was given.
#[derive(Default)]
struct WritingComposer {
    jobs: Mutex<Vec<ComposeJob>>,
}

#[async_trait]
impl MediaComposer for WritingComposer {
    async fn compose(&self, job: &ComposeJob) -> RecorderResult<()> {
        std::fs::write(&job.output, b"webm").unwrap();
        self.jobs.lock().push(job.clone());
        Ok(())
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(5) {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_start_both_then_play_sends_priming_and_segments() {
    let server = MockServer::start().await;
    mount_backend(&server, 200, 1).await;
    let events = EventStreamMock::start(vec![ScriptedFrame::Binary(vec![7; 4])]).await;

    let dir = tempfile::tempdir().unwrap();
    let diarization = dir.path().join("diarization_results.txt");
    std::fs::write(&diarization, DIARIZATION).unwrap();

    let establisher = Arc::new(FakeEstablisher::new(events.url()));
    let coordinator = coordinator(
        test_config(&server, &diarization, dir.path()),
        establisher.clone(),
    );

    let report = coordinator.start_both().await;
    assert!(report.all_ready());
    assert_eq!(report.attempts, 1);
    assert_eq!(establisher.calls.load(Ordering::SeqCst), 2);

    // Each control channel gets its session token and the backend's PCM chunk.
    for participant in ParticipantId::ALL {
        let channel = establisher.channel(participant);
        assert!(
            wait_until(|| {
                channel.texts.lock().len() == 1 && channel.binaries.lock().len() == 1
            })
            .await
        );
        assert_eq!(channel.texts.lock()[0], "token-xyz");
        assert_eq!(channel.binaries.lock()[0], Bytes::from_static(&[7, 7, 7, 7]));
    }

    assert!(coordinator.play_both().await);
    let states = coordinator.wait_for_playback().await;
    assert_eq!(states[&ParticipantId::Speaker00], PlaybackState::Finished);
    assert_eq!(states[&ParticipantId::Speaker01], PlaybackState::Finished);
    // Ready avatars are not set up again.
    assert_eq!(establisher.calls.load(Ordering::SeqCst), 2);

    // Priming plus two segments for one speaker, priming plus one for the other.
    let received = events.wait_for_messages(5, Duration::from_secs(5)).await;
    assert_eq!(received.len(), 5);
    let requests: Vec<SegmentRequest> = received
        .iter()
        .map(|text| serde_json::from_str(text).unwrap())
        .collect();
    assert_eq!(
        requests
            .iter()
            .filter(|r| **r == SegmentRequest::PRIMING)
            .count(),
        2
    );
    assert!(requests.contains(&SegmentRequest::new(0.2, 0.3)));
    assert!(requests.contains(&SegmentRequest::new(0.1, 0.2)));

    let status = coordinator.status();
    assert!(status.iter().all(|s| s.playback == Some(PlaybackState::Finished)));
    assert_eq!(status[0].last_completed, Some(1));
    assert_eq!(status[1].last_completed, Some(0));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_env_vars_failure_exhausts_retries() {
    let server = MockServer::start().await;
    // Not cached after a failure, so play_both asks again.
    mount_backend(&server, 500, 2).await;
    let events = EventStreamMock::start(Vec::new()).await;

    let dir = tempfile::tempdir().unwrap();
    let diarization = dir.path().join("diarization_results.txt");
    std::fs::write(&diarization, DIARIZATION).unwrap();

    let establisher = Arc::new(FakeEstablisher::new(events.url()));
    let mut config = test_config(&server, &diarization, dir.path());
    config.ready_poll = Duration::from_millis(10);
    let coordinator = coordinator(config, establisher.clone());

    let report = coordinator.start_both().await;

    assert_eq!(report.attempts, 5);
    assert!(!report.all_ready());
    // Without face ids no session is ever attempted.
    assert_eq!(establisher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(events.connection_count(), 0);
    assert!(!coordinator.play_both().await);
}

#[tokio::test]
async fn test_cancel_closes_sessions_and_resets_readiness() {
    let server = MockServer::start().await;
    mount_backend(&server, 200, 1).await;
    let events = EventStreamMock::start(Vec::new()).await;

    let dir = tempfile::tempdir().unwrap();
    let diarization = dir.path().join("diarization_results.txt");
    std::fs::write(&diarization, DIARIZATION).unwrap();

    let establisher = Arc::new(FakeEstablisher::new(events.url()));
    let coordinator = coordinator(
        test_config(&server, &diarization, dir.path()),
        establisher.clone(),
    );

    assert!(coordinator.start_both().await.all_ready());
    assert!(coordinator.status().iter().all(|s| s.has_session));

    coordinator.cancel().await;

    assert!(!coordinator.is_ready(ParticipantId::Speaker00));
    assert!(!coordinator.is_ready(ParticipantId::Speaker01));
    assert!(coordinator.status().iter().all(|s| !s.has_session));
    for participant in ParticipantId::ALL {
        assert!(!establisher.channel(participant).is_open());
    }
}

#[tokio::test]
async fn test_combined_play_records_to_downloads() {
    let server = MockServer::start().await;
    mount_backend(&server, 200, 1).await;
    let events = EventStreamMock::start(Vec::new()).await;

    let dir = tempfile::tempdir().unwrap();
    let diarization = dir.path().join("diarization_results.txt");
    std::fs::write(&diarization, DIARIZATION).unwrap();

    let establisher = Arc::new(FakeEstablisher::new(events.url()));
    let config = test_config(&server, &diarization, dir.path());
    let output = config.recording.output_path();
    let capture_dir = config.recording.capture_dir();
    let composer = Arc::new(WritingComposer::default());
    let recorder = Recorder::with_composer(config.recording.clone(), composer.clone());
    let coordinator = coordinator(config, establisher).with_recorder(recorder);

    let report = coordinator.combined_play().await;
    assert!(report.ready);
    assert!(report.recording);
    assert!(report.playing);
    assert!(coordinator.recorder().is_recording());

    coordinator.wait_for_playback().await;
    coordinator.shutdown().await;

    assert!(!coordinator.recorder().is_recording());
    assert_eq!(std::fs::read(&output).unwrap(), b"webm");

    let jobs = composer.jobs.lock();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.output, output);
    assert_eq!((job.format.width, job.format.height, job.format.fps), (64, 36, 10));
    // The fake sessions carry no media, so every slot is filled in.
    assert!(job.left_video.is_none() && job.right_video.is_none());
    assert!(job.left_audio.is_none() && job.right_audio.is_none());
    assert!(!capture_dir.exists());
}
