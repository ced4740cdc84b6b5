//! Per-participant segment pacing.
//!
//! The player walks a speaker's segments in index order and sends one
//! segment request per range over the event stream, each at the moment the
//! range starts relative to a reference instant taken when playback begins.
//! A pause is honoured at three checkpoints per segment and also preempts the
//! wait, so a pause never loses or duplicates a segment: resuming continues
//! at the first index after the last one sent.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::backend::{BackendError, SegmentRequest, SegmentRequestSink};
use crate::core::participant::ParticipantId;
use crate::core::segments::TimeRange;

/// Errors from starting playback.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// A playback loop is already running for this participant
    #[error("Playback already running for {0}")]
    AlreadyPlaying(ParticipantId),

    /// Sending a segment request failed
    #[error("Failed to send segment {index}: {source}")]
    Send {
        index: usize,
        #[source]
        source: BackendError,
    },
}

pub type PlayerResult<T> = Result<T, PlayerError>;

/// Playback state of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug)]
struct PlayerProgress {
    state: PlaybackState,
    last_completed: Option<usize>,
    current: Option<usize>,
    pause: CancellationToken,
}

/// Where a pause was observed.
#[derive(Debug, Clone, Copy)]
enum Checkpoint {
    BeforeSend,
    AfterWait,
    AfterSend,
}

/// Segment pacing state machine for one participant.
#[derive(Clone)]
pub struct SegmentPlayer {
    participant: ParticipantId,
    segments: Arc<Vec<TimeRange>>,
    progress: Arc<Mutex<PlayerProgress>>,
}

impl std::fmt::Debug for SegmentPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentPlayer")
            .field("participant", &self.participant)
            .field("segments", &self.segments.len())
            .field("state", &self.state())
            .finish()
    }
}

impl SegmentPlayer {
    pub fn new(participant: ParticipantId, segments: Vec<TimeRange>) -> Self {
        Self {
            participant,
            segments: Arc::new(segments),
            progress: Arc::new(Mutex::new(PlayerProgress {
                state: PlaybackState::Idle,
                last_completed: None,
                current: None,
                pause: CancellationToken::new(),
            })),
        }
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn segments(&self) -> &[TimeRange] {
        &self.segments
    }

    pub fn state(&self) -> PlaybackState {
        self.progress.lock().state
    }

    /// Index of the last segment whose request was sent.
    pub fn last_completed_index(&self) -> Option<usize> {
        self.progress.lock().last_completed
    }

    /// Index of the segment being waited on or sent.
    pub fn current_index(&self) -> Option<usize> {
        self.progress.lock().current
    }

    /// Request a pause. The running loop stops at its next checkpoint, or
    /// immediately if it is waiting.
    pub fn pause(&self) {
        let progress = self.progress.lock();
        if progress.state == PlaybackState::Playing {
            debug!(participant = %self.participant, "Pause requested");
        }
        progress.pause.cancel();
    }

    /// Run the playback loop until it finishes or is paused.
    ///
    /// Resumes at `last_completed + 1`. Returns the final state.
    pub async fn start_playback(&self, sink: Arc<dyn SegmentRequestSink>) -> PlayerResult<PlaybackState> {
        let (pause, first) = {
            let mut progress = self.progress.lock();
            if progress.state == PlaybackState::Playing {
                return Err(PlayerError::AlreadyPlaying(self.participant));
            }
            progress.state = PlaybackState::Playing;
            progress.pause = CancellationToken::new();
            let first = progress.last_completed.map_or(0, |i| i + 1);
            (progress.pause.clone(), first)
        };

        info!(
            participant = %self.participant,
            from_index = first,
            total = self.segments.len(),
            "Starting playback"
        );

        let reference = Instant::now();

        for segment in self.segments.iter().skip(first) {
            let index = segment.index;
            self.progress.lock().current = Some(index);

            if pause.is_cancelled() {
                return Ok(self.paused(Checkpoint::BeforeSend, index));
            }

            if index == 0 {
                if let Err(source) = sink.send_segment(SegmentRequest::PRIMING) {
                    return Err(self.failed(index, source));
                }
            }

            let target = Duration::from_secs_f64(segment.start_time.max(0.0));
            let elapsed = reference.elapsed();
            if target > elapsed {
                tokio::select! {
                    _ = pause.cancelled() => {}
                    _ = tokio::time::sleep(target - elapsed) => {}
                }
            }

            if pause.is_cancelled() {
                return Ok(self.paused(Checkpoint::AfterWait, index));
            }

            debug!(
                participant = %self.participant,
                index,
                start_time = segment.start_time,
                end_time = segment.end_time,
                "Sending segment"
            );
            if let Err(source) =
                sink.send_segment(SegmentRequest::new(segment.start_time, segment.end_time))
            {
                return Err(self.failed(index, source));
            }
            self.progress.lock().last_completed = Some(index);

            if pause.is_cancelled() {
                return Ok(self.paused(Checkpoint::AfterSend, index));
            }
        }

        let mut progress = self.progress.lock();
        progress.state = PlaybackState::Finished;
        progress.current = None;
        info!(participant = %self.participant, "Playback finished");
        Ok(PlaybackState::Finished)
    }

    fn paused(&self, checkpoint: Checkpoint, index: usize) -> PlaybackState {
        let mut progress = self.progress.lock();
        progress.state = PlaybackState::Paused;
        info!(
            participant = %self.participant,
            index,
            ?checkpoint,
            last_completed = ?progress.last_completed,
            "Playback paused"
        );
        PlaybackState::Paused
    }

    fn failed(&self, index: usize, source: BackendError) -> PlayerError {
        self.progress.lock().state = PlaybackState::Paused;
        error!(participant = %self.participant, index, "Segment request failed: {source}");
        PlayerError::Send { index, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::BackendResult;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(Duration, SegmentRequest)>>,
        started: Mutex<Option<Instant>>,
        fail: Mutex<bool>,
    }

    impl RecordingSink {
        fn requests(&self) -> Vec<SegmentRequest> {
            self.sent.lock().iter().map(|(_, r)| *r).collect()
        }
    }

    impl SegmentRequestSink for RecordingSink {
        fn send_segment(&self, request: SegmentRequest) -> BackendResult<()> {
            if *self.fail.lock() {
                return Err(BackendError::NotConnected);
            }
            let started = *self.started.lock().get_or_insert_with(Instant::now);
            self.sent.lock().push((started.elapsed(), request));
            Ok(())
        }
    }

    fn ranges(pairs: &[(f64, f64)]) -> Vec<TimeRange> {
        pairs
            .iter()
            .enumerate()
            .map(|(index, (start_time, end_time))| TimeRange {
                start_time: *start_time,
                end_time: *end_time,
                index,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_all_segments_in_order_with_priming() {
        let player = SegmentPlayer::new(
            ParticipantId::Speaker00,
            ranges(&[(0.0, 2.5), (2.5, 5.0), (6.0, 7.0)]),
        );
        let sink = Arc::new(RecordingSink::default());

        let state = player.start_playback(sink.clone()).await.unwrap();

        assert_eq!(state, PlaybackState::Finished);
        assert_eq!(
            sink.requests(),
            vec![
                SegmentRequest::PRIMING,
                SegmentRequest::new(0.0, 2.5),
                SegmentRequest::new(2.5, 5.0),
                SegmentRequest::new(6.0, 7.0),
            ]
        );
        let sent = sink.sent.lock();
        assert_eq!(sent[2].0, Duration::from_millis(2500));
        assert_eq!(sent[3].0, Duration::from_secs(6));
        assert_eq!(player.last_completed_index(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_before_segment_one_then_resume() {
        let player = SegmentPlayer::new(
            ParticipantId::Speaker00,
            ranges(&[(0.0, 2.5), (2.5, 5.0)]),
        );
        let sink = Arc::new(RecordingSink::default());

        let running = {
            let player = player.clone();
            let sink = sink.clone();
            tokio::spawn(async move { player.start_playback(sink).await })
        };

        // Segment 0 goes out at t=0; the loop is now waiting for segment 1.
        tokio::time::sleep(Duration::from_secs(1)).await;
        player.pause();
        let state = running.await.unwrap().unwrap();

        assert_eq!(state, PlaybackState::Paused);
        assert_eq!(player.last_completed_index(), Some(0));
        assert_eq!(
            sink.requests(),
            vec![SegmentRequest::PRIMING, SegmentRequest::new(0.0, 2.5)]
        );

        let state = player.start_playback(sink.clone()).await.unwrap();
        assert_eq!(state, PlaybackState::Finished);
        assert_eq!(
            sink.requests(),
            vec![
                SegmentRequest::PRIMING,
                SegmentRequest::new(0.0, 2.5),
                SegmentRequest::new(2.5, 5.0),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_before_start_sends_nothing_then_resumes_at_zero() {
        let player = SegmentPlayer::new(ParticipantId::Speaker01, ranges(&[(1.0, 2.0)]));
        let sink = Arc::new(RecordingSink::default());

        let running = {
            let player = player.clone();
            let sink = sink.clone();
            tokio::spawn(async move { player.start_playback(sink).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        player.pause();
        assert_eq!(running.await.unwrap().unwrap(), PlaybackState::Paused);

        // Priming went out, the range itself did not.
        assert_eq!(sink.requests(), vec![SegmentRequest::PRIMING]);
        assert_eq!(player.last_completed_index(), None);

        player.start_playback(sink.clone()).await.unwrap();
        assert_eq!(sink.requests().last(), Some(&SegmentRequest::new(1.0, 2.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_while_playing_is_rejected() {
        let player = SegmentPlayer::new(ParticipantId::Speaker00, ranges(&[(10.0, 11.0)]));
        let sink = Arc::new(RecordingSink::default());

        let running = {
            let player = player.clone();
            let sink = sink.clone();
            tokio::spawn(async move { player.start_playback(sink).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = player.start_playback(sink.clone()).await;
        assert!(matches!(second, Err(PlayerError::AlreadyPlaying(_))));

        player.pause();
        running.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_segments_finish_immediately() {
        let player = SegmentPlayer::new(ParticipantId::Speaker00, Vec::new());
        let sink = Arc::new(RecordingSink::default());
        let state = player.start_playback(sink.clone()).await.unwrap();
        assert_eq!(state, PlaybackState::Finished);
        assert!(sink.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_leaves_player_resumable() {
        let player = SegmentPlayer::new(
            ParticipantId::Speaker00,
            ranges(&[(0.0, 1.0), (1.0, 2.0)]),
        );
        let sink = Arc::new(RecordingSink::default());
        *sink.fail.lock() = true;

        let result = player.start_playback(sink.clone()).await;
        assert!(matches!(result, Err(PlayerError::Send { index: 0, .. })));
        assert_eq!(player.state(), PlaybackState::Paused);

        *sink.fail.lock() = false;
        let state = player.start_playback(sink.clone()).await.unwrap();
        assert_eq!(state, PlaybackState::Finished);
        assert_eq!(sink.requests().len(), 3);
    }
}
