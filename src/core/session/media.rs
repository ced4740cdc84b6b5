//! Media elements: the sinks remote tracks are attached to.
//!
//! A media element records which track it is bound to and how much RTP it has
//! received. While a capture is active, every packet of the bound track is
//! also written to the capture file; the file is opened on the first packet,
//! once the codec is known.

use parking_lot::Mutex;
use tracing::{debug, warn};
use webrtc::rtp::packet::Packet;

use crate::core::events::TrackKind;
use crate::core::participant::ParticipantId;
use crate::core::recorder::{CaptureTarget, CapturedTrack, TrackCapture};

/// Description of a remote track bound to an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub codec: String,
    pub ssrc: u32,
    pub clock_rate: u32,
    pub channels: u16,
}

/// Counters reported by [`MediaElement::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStats {
    pub track: Option<TrackInfo>,
    pub packets: u64,
    pub payload_bytes: u64,
    pub captured_packets: u64,
    pub capturing: bool,
}

#[derive(Debug, Default)]
struct ElementState {
    track: Option<TrackInfo>,
    packets: u64,
    payload_bytes: u64,
    target: Option<CaptureTarget>,
    capture: Option<TrackCapture>,
}

/// Video or audio sink for one participant.
#[derive(Debug)]
pub struct MediaElement {
    participant: ParticipantId,
    kind: TrackKind,
    state: Mutex<ElementState>,
}

impl MediaElement {
    pub fn new(participant: ParticipantId, kind: TrackKind) -> Self {
        Self {
            participant,
            kind,
            state: Mutex::new(ElementState::default()),
        }
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Bind a remote track, replacing any previous one.
    pub fn attach(&self, track: TrackInfo) {
        let mut state = self.state.lock();
        state.track = Some(track);
        state.packets = 0;
        state.payload_bytes = 0;
    }

    pub fn has_track(&self) -> bool {
        self.state.lock().track.is_some()
    }

    /// Count one received packet and write it to the active capture, if any.
    pub fn record_rtp(&self, packet: &Packet) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.packets += 1;
        state.payload_bytes += packet.payload.len() as u64;

        if state.capture.is_none() {
            let (Some(target), Some(track)) = (state.target.as_ref(), state.track.as_ref()) else {
                return;
            };
            match TrackCapture::create(target, self.kind, track) {
                Ok(capture) => state.capture = Some(capture),
                Err(e) => {
                    warn!(participant = %self.participant, kind = %self.kind, "Cannot capture track: {e}");
                    state.target = None;
                    return;
                }
            }
        }

        if let Some(capture) = state.capture.as_mut() {
            if let Err(e) = capture.write(packet) {
                debug!(participant = %self.participant, kind = %self.kind, "Dropped packet from capture: {e}");
            }
        }
    }

    /// Start writing received packets under `target`. Replaces any earlier capture.
    pub fn begin_capture(&self, target: CaptureTarget) {
        let previous = {
            let mut state = self.state.lock();
            state.target = Some(target);
            state.capture.take()
        };
        if let Some(previous) = previous {
            if let Err(e) = previous.finish() {
                debug!(participant = %self.participant, "Error closing replaced capture: {e}");
            }
        }
    }

    /// Stop capturing. Returns the finished file, or `None` if no packet was written.
    pub fn end_capture(&self) -> Option<CapturedTrack> {
        let capture = {
            let mut state = self.state.lock();
            state.target = None;
            state.capture.take()
        }?;
        match capture.finish() {
            Ok(track) => Some(track),
            Err(e) => {
                warn!(participant = %self.participant, kind = %self.kind, "Failed to finalize capture: {e}");
                None
            }
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().target.is_some()
    }

    pub fn stats(&self) -> MediaStats {
        let state = self.state.lock();
        MediaStats {
            track: state.track.clone(),
            packets: state.packets,
            payload_bytes: state.payload_bytes,
            captured_packets: state.capture.as_ref().map_or(0, TrackCapture::packets),
            capturing: state.target.is_some(),
        }
    }

    /// Drop the track binding and any unfinished capture.
    pub fn clear(&self) {
        let capture = std::mem::take(&mut *self.state.lock()).capture;
        if let Some(capture) = capture {
            let _ = capture.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use webrtc::rtp::header::Header;

    fn opus_track(ssrc: u32) -> TrackInfo {
        TrackInfo {
            id: "audio0".to_string(),
            codec: "audio/opus".to_string(),
            ssrc,
            clock_rate: 48_000,
            channels: 2,
        }
    }

    fn opus_packet(ssrc: u32, sequence_number: u16) -> Packet {
        Packet {
            header: Header {
                version: 2,
                payload_type: 111,
                sequence_number,
                timestamp: 960 * (u32::from(sequence_number) + 1),
                ssrc,
                ..Default::default()
            },
            payload: Bytes::from_static(&[0xf8, 0xff, 0xfe, 0x00]),
        }
    }

    fn target(dir: &std::path::Path) -> CaptureTarget {
        CaptureTarget {
            stem: dir.join("left_audio"),
            width: 960,
            height: 1080,
            fps: 30,
        }
    }

    #[test]
    fn test_attach_resets_counters() {
        let element = MediaElement::new(ParticipantId::Speaker01, TrackKind::Audio);
        element.record_rtp(&opus_packet(42, 0));
        element.attach(opus_track(42));
        element.record_rtp(&opus_packet(42, 1));

        let stats = element.stats();
        assert_eq!(stats.packets, 1);
        assert_eq!(stats.payload_bytes, 4);
        assert_eq!(stats.track.map(|t| t.ssrc), Some(42));
    }

    #[test]
    fn test_packets_outside_capture_are_only_counted() {
        let dir = tempfile::tempdir().unwrap();
        let element = MediaElement::new(ParticipantId::Speaker00, TrackKind::Audio);
        element.attach(opus_track(5));

        element.record_rtp(&opus_packet(5, 0));
        assert!(element.end_capture().is_none());

        element.begin_capture(target(dir.path()));
        assert!(element.is_capturing());
        for seq in 1..4 {
            element.record_rtp(&opus_packet(5, seq));
        }
        assert_eq!(element.stats().captured_packets, 3);

        let captured = element.end_capture().unwrap();
        assert_eq!(captured.packets, 3);
        assert_eq!(captured.path, dir.path().join("left_audio.ogg"));
        assert!(!element.is_capturing());

        // After the capture ends the file no longer grows.
        let size = std::fs::metadata(&captured.path).unwrap().len();
        element.record_rtp(&opus_packet(5, 4));
        assert_eq!(std::fs::metadata(&captured.path).unwrap().len(), size);
        assert_eq!(element.stats().packets, 5);
    }

    #[test]
    fn test_capture_without_track_stays_pending() {
        let dir = tempfile::tempdir().unwrap();
        let element = MediaElement::new(ParticipantId::Speaker00, TrackKind::Audio);
        element.begin_capture(target(dir.path()));

        element.record_rtp(&opus_packet(5, 0));
        assert!(element.is_capturing());
        assert_eq!(element.stats().captured_packets, 0);

        element.attach(opus_track(5));
        element.record_rtp(&opus_packet(5, 1));
        assert_eq!(element.end_capture().map(|t| t.packets), Some(1));
    }

    #[test]
    fn test_unsupported_codec_abandons_capture() {
        let dir = tempfile::tempdir().unwrap();
        let element = MediaElement::new(ParticipantId::Speaker01, TrackKind::Audio);
        element.attach(TrackInfo {
            codec: "audio/PCMU".to_string(),
            ..opus_track(9)
        });
        element.begin_capture(target(dir.path()));

        element.record_rtp(&opus_packet(9, 0));
        assert!(!element.is_capturing());
        assert!(element.end_capture().is_none());
    }
}
