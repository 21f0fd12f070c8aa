//! Mock Engine.IO long-polling server for integration tests.
//!
//! Plain HTTP only, so a WebSocket upgrade attempt against it fails and the
//! client has to fall back to polling. Speaks just enough to:
//! - Answer the open GET with a handshake
//! - Queue packets for long-poll GETs, joined with the record separator
//! - Record packets POSTed by the client
//! - Acknowledge namespace connects (optionally)

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Behaviour of the polling mock.
#[derive(Debug, Clone)]
pub struct PollScript {
    /// Answer `40` with a connect ack followed by `frames`.
    pub ack_namespace: bool,
    /// Packets queued right after the connect ack.
    pub frames: Vec<String>,
    /// Ping interval advertised in the handshake.
    pub ping_interval_ms: u64,
    /// How long a GET is held open when nothing is queued.
    pub hold_ms: u64,
    /// Packet returned when a held GET expires.
    pub idle_packet: String,
}

impl Default for PollScript {
    fn default() -> Self {
        Self {
            ack_namespace: true,
            frames: Vec::new(),
            ping_interval_ms: 25000,
            hold_ms: 200,
            idle_packet: "6".to_string(),
        }
    }
}

#[derive(Default)]
struct Inner {
    outbound: VecDeque<String>,
    received: Vec<String>,
    sessions: u32,
}

#[derive(Clone)]
struct PollState {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    script: Arc<PollScript>,
}

pub struct MockPollingServer {
    addr: SocketAddr,
    state: PollState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockPollingServer {
    pub async fn start(script: PollScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = PollState {
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
            script: Arc::new(script),
        };

        let app = Router::new()
            .route("/socket.io/", get(handle_get).post(handle_post))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Packets POSTed by the client, in arrival order.
    pub async fn received(&self) -> Vec<String> {
        self.state.inner.lock().await.received.clone()
    }

    /// Polling sessions opened so far.
    pub async fn sessions(&self) -> u32 {
        self.state.inner.lock().await.sessions
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

async fn handle_get(
    State(state): State<PollState>,
    Query(query): Query<HashMap<String, String>>,
) -> String {
    if !query.contains_key("sid") {
        if query.get("transport").map(String::as_str) == Some("polling") {
            state.inner.lock().await.sessions += 1;
        }
        return format!(
            r#"0{{"sid":"mock-poll","upgrades":[],"pingInterval":{},"pingTimeout":20000,"maxPayload":1000000}}"#,
            state.script.ping_interval_ms
        );
    }

    let deadline = Instant::now() + Duration::from_millis(state.script.hold_ms);
    loop {
        {
            let mut inner = state.inner.lock().await;
            if !inner.outbound.is_empty() {
                return inner.outbound.drain(..).collect::<Vec<_>>().join("\u{1e}");
            }
        }
        if tokio::time::timeout_at(deadline, state.notify.notified())
            .await
            .is_err()
        {
            return state.script.idle_packet.clone();
        }
    }
}

async fn handle_post(State(state): State<PollState>, body: String) -> &'static str {
    {
        let mut inner = state.inner.lock().await;
        for packet in body.split('\u{1e}') {
            inner.received.push(packet.to_string());
            if packet.starts_with("40") && state.script.ack_namespace {
                inner
                    .outbound
                    .push_back(r#"40{"sid":"poll-socket"}"#.to_string());
                inner.outbound.extend(state.script.frames.iter().cloned());
            }
        }
    }
    state.notify.notify_one();
    "ok"
}
