//! WebRTC session establishment against the rendering service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::ice::{GatheringOutcome, GatheringTracker};
use super::media::{MediaElement, TrackInfo};
use super::{
    ControlChannel, EstablishRequest, PeerSession, SessionError, SessionEstablisher,
    SessionHandles, SessionResult,
};
use crate::core::backend::EventStream;
use crate::core::events::{EventSender, ParticipantEvent, TrackKind};
use crate::core::participant::ParticipantId;
use crate::core::rendering::{RenderingClient, SessionDescription};

/// Label of the control channel the rendering service expects.
pub const CONTROL_CHANNEL_LABEL: &str = "datachannel";

/// Connection settings for [`WebRtcEstablisher`].
#[derive(Debug, Clone)]
pub struct WebRtcSettings {
    pub ice_servers: Vec<String>,
    pub gather_poll: Duration,
    pub gather_deadline: Duration,
    pub event_stream_url: String,
    pub connect_timeout: Duration,
    /// Offer loopback host candidates, for a rendering service on this machine.
    pub include_loopback_candidates: bool,
}

impl Default for WebRtcSettings {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            gather_poll: Duration::from_millis(250),
            gather_deadline: Duration::from_secs(5),
            event_stream_url: "ws://127.0.0.1:8080/".to_string(),
            connect_timeout: Duration::from_secs(10),
            include_loopback_candidates: false,
        }
    }
}

/// Establishes participant sessions with the `webrtc` stack.
pub struct WebRtcEstablisher {
    rendering: RenderingClient,
    settings: WebRtcSettings,
    open_connections: Arc<AtomicUsize>,
}

impl WebRtcEstablisher {
    pub fn new(rendering: RenderingClient, settings: WebRtcSettings) -> Self {
        Self {
            rendering,
            settings,
            open_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Peer connections created and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    async fn new_peer_connection(&self) -> SessionResult<Arc<RTCPeerConnection>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| SessionError::PeerConnection(e.to_string()))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| SessionError::PeerConnection(e.to_string()))?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_include_loopback_candidate(self.settings.include_loopback_candidates);

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let ice_servers = if self.settings.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.settings.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(config)
            .await
            .map_err(|e| SessionError::PeerConnection(e.to_string()))?;
        self.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(pc))
    }

    async fn negotiate(
        &self,
        pc: &Arc<RTCPeerConnection>,
        request: &EstablishRequest,
    ) -> SessionResult<SessionHandles> {
        let participant = request.participant;

        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| SessionError::PeerConnection(e.to_string()))?;
        }

        attach_track_handler(
            pc,
            participant,
            request.video_sink.clone(),
            request.audio_sink.clone(),
            request.events.clone(),
        );

        let gathering = Arc::new(GatheringTracker::new());
        {
            let gathering = gathering.clone();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                match candidate {
                    Some(_) => gathering.record_candidate(),
                    None => gathering.mark_complete(),
                }
                Box::pin(async {})
            }));
        }

        let data_channel = pc
            .create_data_channel(
                CONTROL_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| SessionError::PeerConnection(e.to_string()))?;
        wire_control_channel(&data_channel, participant, request.events.clone());

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;
        pc.set_local_description(offer)
            .await
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;

        let outcome = gathering
            .wait(self.settings.gather_poll, self.settings.gather_deadline)
            .await;
        match outcome {
            GatheringOutcome::DeadlineElapsed => warn!(
                participant = %participant,
                candidates = gathering.candidate_count(),
                "ICE gathering did not settle before the deadline, sending offer anyway"
            ),
            _ => debug!(
                participant = %participant,
                ?outcome,
                candidates = gathering.candidate_count(),
                "ICE gathering settled"
            ),
        }

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| SessionError::Negotiation("No local description".to_string()))?;

        let answer = self
            .rendering
            .start_webrtc_session(&SessionDescription::offer(local.sdp))
            .await?;

        let remote = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;
        pc.set_remote_description(remote)
            .await
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;
        info!(participant = %participant, "Remote description applied");

        let event_stream = EventStream::connect(
            &self.settings.event_stream_url,
            participant,
            request.events.clone(),
            self.settings.connect_timeout,
        )
        .await?;

        Ok(SessionHandles {
            control_channel: Arc::new(DataChannelHandle {
                channel: data_channel,
            }),
            peer_connection: Arc::new(PeerConnectionHandle {
                pc: pc.clone(),
                open_connections: self.open_connections.clone(),
                closed: AtomicBool::new(false),
            }),
            event_stream,
        })
    }
}

#[async_trait]
impl SessionEstablisher for WebRtcEstablisher {
    async fn establish(&self, request: EstablishRequest) -> SessionResult<SessionHandles> {
        let participant = request.participant;
        info!(participant = %participant, face_id = %request.face_id, "Establishing session");

        let pc = self.new_peer_connection().await?;
        match self.negotiate(&pc, &request).await {
            Ok(handles) => Ok(handles),
            Err(e) => {
                error!(participant = %participant, "Session establishment failed: {e}");
                if let Err(close_err) = pc.close().await {
                    debug!(participant = %participant, "Error closing peer connection: {close_err}");
                }
                self.open_connections.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

/// Route each remote track to the sink of its kind and feed it the track's RTP.
fn attach_track_handler(
    pc: &Arc<RTCPeerConnection>,
    participant: ParticipantId,
    video_sink: Arc<MediaElement>,
    audio_sink: Arc<MediaElement>,
    events: EventSender,
) {
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
            let routed = match track.kind() {
                RTPCodecType::Video => Some((TrackKind::Video, video_sink.clone())),
                RTPCodecType::Audio => Some((TrackKind::Audio, audio_sink.clone())),
                other => {
                    debug!(participant = %participant, "Ignoring track of kind {other:?}");
                    None
                }
            };
            let events = events.clone();

            Box::pin(async move {
                let Some((kind, sink)) = routed else {
                    return;
                };

                let capability = track.codec().capability;
                sink.attach(TrackInfo {
                    id: track.id(),
                    codec: capability.mime_type,
                    ssrc: track.ssrc(),
                    clock_rate: capability.clock_rate,
                    channels: capability.channels,
                });
                info!(participant = %participant, %kind, "Track attached");
                let _ = events.send(ParticipantEvent::TrackArrived(kind));

                tokio::spawn(read_track(track, sink));
            })
        },
    ));
}

/// Hand every packet of `track` to `sink` until the track ends.
async fn read_track(track: Arc<TrackRemote>, sink: Arc<MediaElement>) {
    let mut packets = 0u64;
    while let Ok((packet, _)) = track.read_rtp().await {
        sink.record_rtp(&packet);
        packets += 1;
    }
    trace!(
        participant = %sink.participant(),
        kind = %sink.kind(),
        packets,
        "Track ended"
    );
}

fn wire_control_channel(
    channel: &Arc<RTCDataChannel>,
    participant: ParticipantId,
    events: EventSender,
) {
    let on_open = events.clone();
    channel.on_open(Box::new(move || {
        info!(participant = %participant, "Control channel open");
        let _ = on_open.send(ParticipantEvent::ControlChannelOpen);
        Box::pin(async {})
    }));

    channel.on_close(Box::new(move || {
        info!(participant = %participant, "Control channel closed");
        let _ = events.send(ParticipantEvent::ControlChannelClosed);
        Box::pin(async {})
    }));
}

struct DataChannelHandle {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl ControlChannel for DataChannelHandle {
    fn is_open(&self) -> bool {
        self.channel.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: &str) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::ChannelClosed);
        }
        self.channel
            .send_text(text.to_string())
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Send(e.to_string()))
    }

    async fn send_binary(&self, data: Bytes) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::ChannelClosed);
        }
        self.channel
            .send(&data)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Send(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close().await {
            debug!("Error closing control channel: {e}");
        }
    }
}

struct PeerConnectionHandle {
    pc: Arc<RTCPeerConnection>,
    open_connections: Arc<AtomicUsize>,
    closed: AtomicBool,
}

#[async_trait]
impl PeerSession for PeerConnectionHandle {
    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.pc.close().await {
            debug!("Error closing peer connection: {e}");
        }
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}
