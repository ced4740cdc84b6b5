//! WebSocket mock of the backend event stream.
//!
//! Every accepted connection first plays the configured script (PCM chunks,
//! JSON error objects, or a close), then records each text frame the client
//! sends until the client goes away.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// A frame the mock sends right after the handshake.
#[derive(Debug, Clone)]
pub enum ScriptedFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Send a close frame and drop the connection.
    Close,
}

#[derive(Default)]
struct EventStreamMockState {
    script: Vec<ScriptedFrame>,
    received: Mutex<Vec<String>>,
    connection_count: AtomicU64,
}

/// Running mock server. Lives until the test's runtime shuts down.
pub struct EventStreamMock {
    addr: SocketAddr,
    state: Arc<EventStreamMockState>,
}

impl EventStreamMock {
    pub async fn start(script: Vec<ScriptedFrame>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().expect("mock listener address");
        let state = Arc::new(EventStreamMockState {
            script,
            ..Default::default()
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn connection_count(&self) -> u64 {
        self.state.connection_count.load(Ordering::SeqCst)
    }

    /// Text frames received so far, across all connections.
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().clone()
    }

    /// Poll until at least `count` text frames arrived or `deadline` passes.
    pub async fn wait_for_messages(&self, count: usize, deadline: Duration) -> Vec<String> {
        let started = Instant::now();
        loop {
            let received = self.received();
            if received.len() >= count || started.elapsed() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<EventStreamMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    state.connection_count.fetch_add(1, Ordering::SeqCst);

    for frame in &state.script {
        match frame {
            ScriptedFrame::Text(text) => write.send(Message::Text(text.clone().into())).await?,
            ScriptedFrame::Binary(data) => {
                write
                    .send(Message::Binary(Bytes::from(data.clone())))
                    .await?
            }
            ScriptedFrame::Close => {
                write.send(Message::Close(None)).await?;
                return Ok(());
            }
        }
    }

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => state.received.lock().push(text.as_str().to_owned()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}
