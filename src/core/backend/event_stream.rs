//! Event-stream WebSocket to the coordination backend.
//!
//! Each participant holds one connection. Outgoing segment requests are queued
//! on an unbounded channel and written by a background task; inbound frames
//! (binary PCM chunks and JSON error objects) are pushed into the
//! participant's event queue in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::messages::{EventFrame, SegmentRequest};
use super::{BackendError, BackendResult};
use crate::core::events::{EventSender, ParticipantEvent};
use crate::core::participant::ParticipantId;

/// Anything the segment player can send segment requests through.
pub trait SegmentRequestSink: Send + Sync {
    fn send_segment(&self, request: SegmentRequest) -> BackendResult<()>;
}

/// Connector for the event-stream socket.
pub struct EventStream;

impl EventStream {
    /// Open the socket and spawn its I/O task.
    ///
    /// `EventStreamOpen` is emitted once the handshake completes;
    /// `EventStreamClosed` is emitted when the task ends for any reason.
    pub async fn connect(
        url: &str,
        participant: ParticipantId,
        events: EventSender,
        connect_timeout: Duration,
    ) -> BackendResult<EventStreamHandle> {
        debug!(participant = %participant, "Connecting event stream to {url}");

        let (ws_stream, response) = match timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                return Err(BackendError::WebSocketError(format!(
                    "WebSocket connection failed: {e}"
                )));
            }
            Err(_) => {
                return Err(BackendError::Timeout(
                    "Event stream connection timed out".to_string(),
                ));
            }
        };

        info!(
            participant = %participant,
            "WebSocket connected (status: {})",
            response.status()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        let _ = events.send(ParticipantEvent::EventStreamOpen);

        tokio::spawn(Self::io_loop(
            ws_stream,
            rx,
            participant,
            events,
            open.clone(),
            shutdown.clone(),
        ));

        Ok(EventStreamHandle {
            participant,
            outgoing: tx,
            open,
            shutdown,
        })
    }

    async fn io_loop(
        ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        mut rx: mpsc::UnboundedReceiver<Message>,
        participant: ParticipantId,
        events: EventSender,
        open: Arc<AtomicBool>,
        shutdown: CancellationToken,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_write.close().await;
                    break;
                }

                outgoing = rx.recv() => match outgoing {
                    Some(msg) => {
                        if let Err(e) = ws_write.send(msg).await {
                            error!(participant = %participant, "Failed to send WebSocket message: {e}");
                            break;
                        }
                    }
                    None => {
                        let _ = ws_write.close().await;
                        break;
                    }
                },

                incoming = ws_read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        trace!(participant = %participant, "Received text frame: {}", text.chars().take(100).collect::<String>());
                        let _ = events.send(ParticipantEvent::BackendFrame(EventFrame::Text(text.as_str().to_owned())));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        trace!(participant = %participant, "Received binary frame: {} bytes", data.len());
                        let _ = events.send(ParticipantEvent::BackendFrame(EventFrame::Binary(data)));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(participant = %participant, "WebSocket close frame: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(participant = %participant, "WebSocket error: {e}");
                        break;
                    }
                    None => break,
                },
            }
        }

        open.store(false, Ordering::SeqCst);
        let _ = events.send(ParticipantEvent::EventStreamClosed);
        info!(participant = %participant, "WebSocket closed");
    }
}

/// Cloneable handle to an open event-stream connection.
#[derive(Debug, Clone)]
pub struct EventStreamHandle {
    participant: ParticipantId,
    outgoing: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl EventStreamHandle {
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.outgoing.is_closed()
    }

    /// Close the socket. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// A closed handle with no socket behind it.
    #[cfg(test)]
    pub(crate) fn detached(participant: ParticipantId) -> Self {
        let (outgoing, _) = mpsc::unbounded_channel();
        Self {
            participant,
            outgoing,
            open: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }
}

impl SegmentRequestSink for EventStreamHandle {
    fn send_segment(&self, request: SegmentRequest) -> BackendResult<()> {
        if !self.is_open() {
            return Err(BackendError::NotConnected);
        }
        let json = serde_json::to_string(&request)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        self.outgoing
            .send(Message::Text(json.into()))
            .map_err(|_| BackendError::NotConnected)
    }
}
