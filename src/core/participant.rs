//! The two fixed participants of a vodcast.

use serde::{Deserialize, Serialize};

/// One of the two speakers in the diarized conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParticipantId {
    Speaker00,
    Speaker01,
}

impl ParticipantId {
    /// Both participants, in display order.
    pub const ALL: [ParticipantId; 2] = [ParticipantId::Speaker00, ParticipantId::Speaker01];

    /// Label used by the diarization output.
    pub fn speaker_label(&self) -> &'static str {
        match self {
            ParticipantId::Speaker00 => "SPEAKER_00",
            ParticipantId::Speaker01 => "SPEAKER_01",
        }
    }

    /// Human-facing name used on the status indicators.
    pub fn display_name(&self) -> &'static str {
        match self {
            ParticipantId::Speaker00 => "Avatar 1",
            ParticipantId::Speaker01 => "Avatar 2",
        }
    }

    /// Parse a diarization speaker label (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "SPEAKER_00" => Some(ParticipantId::Speaker00),
            "SPEAKER_01" => Some(ParticipantId::Speaker01),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.speaker_label())
    }
}
