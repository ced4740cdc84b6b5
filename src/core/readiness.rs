//! Readiness gate and status board.
//!
//! A participant is ready once both its control channel and its event stream
//! have opened. The gate is a pure merge over the two flags; the board holds
//! the per-participant ready bits, drives the status indicators, and lets
//! callers wait for both participants without polling.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::core::participant::ParticipantId;

/// Which of the two preconditions just became true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessSignal {
    ControlChannelOpen,
    EventStreamOpen,
}

/// Result of feeding a signal to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// At least one flag is still false.
    Waiting,
    /// Both flags are now true and this call made the participant ready.
    BecameReady,
    /// The participant was already ready.
    AlreadyReady,
}

/// The two open-flags of one participant session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessGate {
    control_channel_open: bool,
    event_stream_open: bool,
    ready: bool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that one flag transitioned to true.
    pub fn record(&mut self, signal: ReadinessSignal) -> GateOutcome {
        match signal {
            ReadinessSignal::ControlChannelOpen => self.control_channel_open = true,
            ReadinessSignal::EventStreamOpen => self.event_stream_open = true,
        }

        if self.ready {
            return GateOutcome::AlreadyReady;
        }
        if self.control_channel_open && self.event_stream_open {
            self.ready = true;
            GateOutcome::BecameReady
        } else {
            GateOutcome::Waiting
        }
    }

    pub fn control_channel_open(&self) -> bool {
        self.control_channel_open
    }

    pub fn event_stream_open(&self) -> bool {
        self.event_stream_open
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Text and colour shown on a status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarStatus {
    Ready,
    NotReady,
}

impl AvatarStatus {
    pub fn color(&self) -> &'static str {
        match self {
            AvatarStatus::Ready => "green",
            AvatarStatus::NotReady => "red",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AvatarStatus::Ready => "Ready",
            AvatarStatus::NotReady => "Not Ready",
        }
    }
}

/// A visible per-participant status light.
pub trait StatusIndicator: Send + Sync {
    fn update(&self, participant: ParticipantId, status: AvatarStatus);
}

/// Status indicator that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusIndicator;

impl StatusIndicator for TracingStatusIndicator {
    fn update(&self, participant: ParticipantId, status: AvatarStatus) {
        info!(
            participant = %participant,
            color = status.color(),
            "{}: {}",
            participant.display_name(),
            status.label()
        );
    }
}

/// Ready bits for both participants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessState {
    pub speaker_00: bool,
    pub speaker_01: bool,
}

impl ReadinessState {
    pub fn get(&self, participant: ParticipantId) -> bool {
        match participant {
            ParticipantId::Speaker00 => self.speaker_00,
            ParticipantId::Speaker01 => self.speaker_01,
        }
    }

    fn set(&mut self, participant: ParticipantId) {
        match participant {
            ParticipantId::Speaker00 => self.speaker_00 = true,
            ParticipantId::Speaker01 => self.speaker_01 = true,
        }
    }

    pub fn both(&self) -> bool {
        self.speaker_00 && self.speaker_01
    }
}

/// Process-wide readiness of both participants.
pub struct ReadinessBoard {
    state: watch::Sender<ReadinessState>,
    indicator: Arc<dyn StatusIndicator>,
}

impl ReadinessBoard {
    pub fn new(indicator: Arc<dyn StatusIndicator>) -> Self {
        let (state, _) = watch::channel(ReadinessState::default());
        Self { state, indicator }
    }

    /// Mark `participant` ready. Idempotent; returns true only on the transition.
    pub fn mark_ready(&self, participant: ParticipantId) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if state.get(participant) {
                false
            } else {
                state.set(participant);
                true
            }
        });
        if changed {
            self.indicator.update(participant, AvatarStatus::Ready);
        }
        changed
    }

    /// Feed a flag transition through `gate` and mark the participant ready
    /// when the gate opens.
    pub fn apply(
        &self,
        participant: ParticipantId,
        gate: &mut ReadinessGate,
        signal: ReadinessSignal,
    ) -> GateOutcome {
        let outcome = gate.record(signal);
        debug!(participant = %participant, ?signal, ?outcome, "Readiness signal");
        if outcome == GateOutcome::BecameReady {
            self.mark_ready(participant);
        }
        outcome
    }

    pub fn is_ready(&self, participant: ParticipantId) -> bool {
        self.state.borrow().get(participant)
    }

    pub fn snapshot(&self) -> ReadinessState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state.subscribe()
    }

    /// Clear both ready bits and show "Not Ready". Only a full reset does this.
    pub fn reset(&self) {
        self.state.send_replace(ReadinessState::default());
        for participant in ParticipantId::ALL {
            self.indicator.update(participant, AvatarStatus::NotReady);
        }
    }

    /// Wait until both participants are ready.
    pub async fn wait_until_both_ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as self, so this cannot fail while borrowed.
        let _ = rx.wait_for(|state| state.both()).await;
    }
}
