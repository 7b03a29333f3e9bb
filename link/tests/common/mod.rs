//! In-process WebSocket server used by the integration tests.
//!
//! Records every frame a client sends (tagged with the connection it arrived
//! on), can push frames to the newest connection, drop or close connections,
//! refuse new ones to simulate an unreachable backend, and stall new ones
//! (TCP accepted, handshake never answered) to simulate a hung backend.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

pub const WS_PATH: &str = "/realtime/v1/websocket";

/// Install a test logger once; output shows up with `--nocapture`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

/// A frame received by the server.
#[derive(Debug, Clone)]
pub struct Received {
    /// 0-based index of the connection the frame arrived on.
    pub conn: usize,
    pub frame: Value,
}

impl Received {
    pub fn event(&self) -> &str {
        self.frame["event"].as_str().unwrap_or_default()
    }

    pub fn topic(&self) -> &str {
        self.frame["topic"].as_str().unwrap_or_default()
    }

    pub fn is(&self, event: &str, topic: &str) -> bool {
        self.event() == event && self.topic() == topic
    }
}

enum PeerCmd {
    Push(String),
    /// Drop the socket without a close handshake.
    Drop,
    Close(u16),
}

#[derive(Default)]
struct ServerState {
    accepting: AtomicBool,
    stalling: AtomicBool,
    accepted: AtomicUsize,
    refused: AtomicUsize,
    stalled: Mutex<Vec<TcpStream>>,
    stalled_total: AtomicUsize,
    uris: Mutex<Vec<String>>,
    peers: Mutex<Vec<mpsc::UnboundedSender<PeerCmd>>>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    frames: tokio::sync::Mutex<mpsc::UnboundedReceiver<Received>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        state.accepting.store(true, Ordering::SeqCst);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if !accept_state.accepting.load(Ordering::SeqCst) {
                    accept_state.refused.fetch_add(1, Ordering::SeqCst);
                    drop(stream);
                    continue;
                }
                if accept_state.stalling.load(Ordering::SeqCst) {
                    accept_state.stalled_total.fetch_add(1, Ordering::SeqCst);
                    accept_state.stalled.lock().unwrap().push(stream);
                    continue;
                }
                let state = accept_state.clone();
                let frames_tx = frames_tx.clone();
                tokio::spawn(async move {
                    serve_connection(stream, state, frames_tx).await;
                });
            }
        });

        Self {
            addr,
            state,
            frames: tokio::sync::Mutex::new(frames_rx),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}{}", self.addr, WS_PATH)
    }

    /// Number of completed WebSocket handshakes.
    pub fn connection_count(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// TCP connections dropped while not accepting.
    pub fn refused_count(&self) -> usize {
        self.state.refused.load(Ordering::SeqCst)
    }

    /// Request URIs (path and query) in connection order.
    pub fn uris(&self) -> Vec<String> {
        self.state.uris.lock().unwrap().clone()
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.state.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Hold new TCP connections open without answering the handshake.
    /// Turning it off releases the held connections.
    pub fn set_stalling(&self, stalling: bool) {
        self.state.stalling.store(stalling, Ordering::SeqCst);
        if !stalling {
            self.state.stalled.lock().unwrap().clear();
        }
    }

    /// TCP connections held without a handshake so far.
    pub fn stalled_count(&self) -> usize {
        self.state.stalled_total.load(Ordering::SeqCst)
    }

    /// Send a text frame on the newest connection.
    pub fn push(&self, frame: Value) {
        let peers = self.state.peers.lock().unwrap();
        if let Some(peer) = peers.last() {
            let _ = peer.send(PeerCmd::Push(frame.to_string()));
        }
    }

    pub fn drop_connections(&self) {
        for peer in self.state.peers.lock().unwrap().drain(..) {
            let _ = peer.send(PeerCmd::Drop);
        }
    }

    pub fn close_connections(&self, code: u16) {
        for peer in self.state.peers.lock().unwrap().drain(..) {
            let _ = peer.send(PeerCmd::Close(code));
        }
    }

    /// Next received frame, or `None` after `within`.
    pub async fn next_frame(&self, within: Duration) -> Option<Received> {
        let mut frames = self.frames.lock().await;
        timeout(within, frames.recv()).await.ok().flatten()
    }

    /// Skip frames until one matches; panics after `within`.
    pub async fn wait_for<F>(&self, within: Duration, mut pred: F) -> Received
    where
        F: FnMut(&Received) -> bool,
    {
        let deadline = Instant::now() + within;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.next_frame(left).await {
                Some(received) if pred(&received) => return received,
                Some(_) => continue,
                None => panic!("no matching frame within {:?}", within),
            }
        }
    }

    /// Every frame received during `window`.
    pub async fn collect_for(&self, window: Duration) -> Vec<Received> {
        let deadline = Instant::now() + window;
        let mut out = Vec::new();
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return out;
            }
            match self.next_frame(left).await {
                Some(received) => out.push(received),
                None => return out,
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: Arc<ServerState>,
    frames_tx: mpsc::UnboundedSender<Received>,
) {
    let uri = Arc::new(Mutex::new(String::new()));
    let uri_slot = uri.clone();
    let callback = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        *uri_slot.lock().unwrap() = req.uri().to_string();
        Ok(response)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
    let conn = {
        // Register under the peers lock so indexes follow handshake order.
        let mut peers = state.peers.lock().unwrap();
        state.uris.lock().unwrap().push(uri.lock().unwrap().clone());
        peers.push(peer_tx);
        state.accepted.fetch_add(1, Ordering::SeqCst)
    };

    loop {
        tokio::select! {
            cmd = peer_rx.recv() => match cmd {
                Some(PeerCmd::Push(text)) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                },
                Some(PeerCmd::Close(code)) => {
                    let _ = ws
                        .close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: Utf8Bytes::from_static("server closing"),
                        }))
                        .await;
                    // Drain until the client answers the close.
                    while let Some(Ok(_)) = ws.next().await {}
                    return;
                },
                Some(PeerCmd::Drop) | None => return,
            },
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) {
                        let _ = frames_tx.send(Received { conn, frame });
                    }
                },
                Some(Ok(_)) => {},
                Some(Err(_)) | None => return,
            },
        }
    }
}

/// Poll `cond` every 10ms; panics after `within`.
pub async fn wait_until<F>(within: Duration, what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + within;
    while !cond() {
        if Instant::now() >= deadline {
            panic!("timed out after {:?} waiting for {}", within, what);
        }
        sleep(Duration::from_millis(10)).await;
    }
}
