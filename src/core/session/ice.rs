//! ICE candidate gathering wait.
//!
//! The offer is only submitted once gathering has settled. Settled means the
//! peer connection reported the end of gathering, or, failing that, the
//! candidate count was non-zero and did not change across one poll interval.
//! A hard deadline bounds the whole wait.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Why the gathering wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringOutcome {
    /// The end-of-candidates signal was received.
    Complete,
    /// The candidate count stopped changing.
    Stabilized,
    /// Neither happened before the deadline.
    DeadlineElapsed,
}

/// Candidate counter and completion flag for one peer connection.
#[derive(Debug)]
pub struct GatheringTracker {
    candidates: AtomicUsize,
    complete: watch::Sender<bool>,
}

impl Default for GatheringTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GatheringTracker {
    pub fn new() -> Self {
        let (complete, _) = watch::channel(false);
        Self {
            candidates: AtomicUsize::new(0),
            complete,
        }
    }

    pub fn record_candidate(&self) {
        self.candidates.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_complete(&self) {
        self.complete.send_replace(true);
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        *self.complete.borrow()
    }

    /// Wait until gathering settles or `deadline` elapses.
    pub async fn wait(&self, poll: Duration, deadline: Duration) -> GatheringOutcome {
        let mut complete = self.complete.subscribe();
        let deadline_at = Instant::now() + deadline;
        let mut previous = self.candidate_count();

        loop {
            if *complete.borrow_and_update() {
                return GatheringOutcome::Complete;
            }

            tokio::select! {
                changed = complete.changed() => {
                    if changed.is_ok() && *complete.borrow() {
                        return GatheringOutcome::Complete;
                    }
                }
                _ = tokio::time::sleep(poll) => {
                    let current = self.candidate_count();
                    if current > 0 && current == previous {
                        debug!(candidates = current, "Candidate count stable");
                        return GatheringOutcome::Stabilized;
                    }
                    previous = current;
                }
                _ = tokio::time::sleep_until(deadline_at) => {
                    debug!(candidates = self.candidate_count(), "Gathering deadline elapsed");
                    return GatheringOutcome::DeadlineElapsed;
                }
            }
        }
    }
}
