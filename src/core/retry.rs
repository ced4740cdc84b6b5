//! Bounded retry of participant setup.
//!
//! Each attempt re-runs setup for every participant that is not yet ready.
//! Between attempts the orchestrator sleeps for a randomized exponential
//! backoff; it never sleeps after the final attempt or after both
//! participants became ready.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::participant::ParticipantId;
use crate::core::readiness::ReadinessState;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of setup attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds, doubled per attempt
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Upper bound of the random jitter added to each delay
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_cap_ms")]
    pub cap_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_ms() -> u64 {
    100
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_cap_ms() -> u64 {
    2500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_ms: default_base_ms(),
            jitter_ms: default_jitter_ms(),
            cap_ms: default_cap_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay after the attempt numbered `attempt` (1-based) has failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand_jitter(self.jitter_ms))
    }

    /// `min(base * 2^(attempt + 1) + jitter, cap)`.
    ///
    /// The exponent is one past the attempt just made, since the counter is
    /// bumped before the delay is computed.
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponent = attempt.saturating_add(1).min(32);
        let backoff = self.base_ms.saturating_mul(1u64 << exponent);
        let delay = backoff.saturating_add(jitter_ms).min(self.cap_ms);
        Duration::from_millis(delay)
    }

    /// Worst-case total sleep across all attempts.
    pub fn max_total_delay(&self) -> Duration {
        Duration::from_millis(self.cap_ms.saturating_mul(self.max_attempts as u64))
    }
}

/// Pseudo-random jitter in `0..range_ms` from a simple LCG seeded by the clock.
fn rand_jitter(range_ms: u64) -> u64 {
    use std::time::SystemTime;
    if range_ms == 0 {
        return 0;
    }
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = seed.wrapping_mul(1103515245).wrapping_add(12345) % (1 << 31);
    random % range_ms
}

/// What the orchestrator drives: a readiness query and a per-participant setup.
#[async_trait]
pub trait ParticipantSetup: Send + Sync {
    fn readiness(&self) -> ReadinessState;

    /// Run one full setup for `participant`. Failures are logged by the
    /// implementation; readiness is observed through [`Self::readiness`].
    async fn setup(&self, participant: ParticipantId);

    /// Give in-flight setups a moment to report readiness before the next check.
    async fn settle(&self) {}
}

/// Outcome of [`run_until_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    pub attempts: u32,
    pub state: ReadinessState,
}

impl RetryReport {
    pub fn all_ready(&self) -> bool {
        self.state.both()
    }
}

/// Retry setup until both participants are ready or attempts run out.
pub async fn run_until_ready<T: ParticipantSetup + ?Sized>(
    policy: &RetryPolicy,
    target: &T,
) -> RetryReport {
    let mut attempts = 0;

    while attempts < policy.max_attempts {
        let state = target.readiness();
        if state.both() {
            break;
        }

        attempts += 1;
        info!(attempt = attempts, "Setting up avatars");

        for participant in ParticipantId::ALL {
            if !state.get(participant) {
                target.setup(participant).await;
            }
        }
        target.settle().await;

        if target.readiness().both() || attempts >= policy.max_attempts {
            break;
        }

        let delay = policy.delay_for(attempts);
        debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Backing off");
        tokio::time::sleep(delay).await;
    }

    let state = target.readiness();
    if state.both() {
        info!(attempts, "Both avatars are ready");
    } else {
        warn!(
            attempts,
            speaker_00 = state.speaker_00,
            speaker_01 = state.speaker_01,
            "Failed to set up both avatars after {} attempts",
            attempts
        );
    }

    RetryReport { attempts, state }
}
