//! Socket.IO connection manager.
//!
//! Handles connection lifecycle over WebSocket with HTTP long-polling as the
//! fallback transport, fixed-delay reconnection, and delivery of decoded
//! socket events to a channel.

use crate::error::{WsError, WsResult};
use crate::frame::{EnginePacket, SocketPacket, DEFAULT_NAMESPACE};
use crate::heartbeat::HeartbeatManager;
use crate::polling::PollingSession;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigdesk_telemetry::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Transport used to carry Engine.IO packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Websocket,
    Polling,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server URL (`http(s)://` or `ws(s)://`). A path component selects the namespace.
    pub url: String,
    /// Engine.IO endpoint path.
    pub path: String,
    /// Socket.IO namespace.
    pub namespace: String,
    /// Transports tried in order on every attempt.
    pub transports: Vec<Transport>,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnect_delay_ms: u64,
    /// Ping interval used until the server handshake says otherwise.
    pub ping_interval_ms: u64,
    /// Ping timeout used until the server handshake says otherwise.
    pub ping_timeout_ms: u64,
    /// Deadline for transport open plus namespace connect.
    pub connection_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            path: "/socket.io".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            transports: vec![Transport::Websocket, Transport::Polling],
            max_reconnect_attempts: 15,
            reconnect_delay_ms: 5000,
            ping_interval_ms: 30000,
            ping_timeout_ms: 20000,
            connection_timeout_ms: 10000,
        }
    }
}

impl ConnectionConfig {
    /// Namespace to join: a path in the URL wins over `namespace`.
    pub fn resolved_namespace(&self) -> String {
        let path = self
            .url
            .split_once("://")
            .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
            .map(|p| p.split(['?', '#']).next().unwrap_or_default())
            .map(|p| p.trim_end_matches('/'))
            .unwrap_or_default();

        if path.is_empty() {
            self.namespace.clone()
        } else {
            path.to_string()
        }
    }
}

/// Build the Engine.IO endpoint URL for a transport.
pub fn engine_url(config: &ConnectionConfig, transport: Transport) -> WsResult<String> {
    let (scheme, rest) = config
        .url
        .split_once("://")
        .ok_or_else(|| WsError::InvalidUrl(config.url.clone()))?;

    let secure = match scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => true,
        "http" | "ws" => false,
        _ => return Err(WsError::InvalidUrl(config.url.clone())),
    };

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(WsError::InvalidUrl(config.url.clone()));
    }

    let scheme = match (transport, secure) {
        (Transport::Websocket, true) => "wss",
        (Transport::Websocket, false) => "ws",
        (Transport::Polling, true) => "https",
        (Transport::Polling, false) => "http",
    };

    let path = config.path.trim_matches('/');
    let path = if path.is_empty() {
        String::new()
    } else {
        format!("/{path}")
    };

    Ok(format!(
        "{scheme}://{host}{path}/?EIO=4&transport={}",
        transport.as_str()
    ))
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Socket-level event delivered to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Namespace joined.
    Connect { sid: String },
    /// Session lost. `reason` follows socket.io naming (`transport close`, `ping timeout`, ...).
    Disconnect { reason: String },
    /// Transport or namespace connect failed.
    ConnectError { message: String },
    /// Application event with its payload (single argument, or an array of all arguments).
    Event { name: String, payload: Value },
}

impl SocketEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ConnectError { .. } => "connect_error",
            Self::Event { name, .. } => name,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Transport closed; reconnect.
    Closed,
    /// Server disconnected the namespace; do not reconnect.
    ServerDisconnect,
    /// Local shutdown.
    Shutdown,
}

/// What the session loop should do after a frame.
#[derive(Debug, Clone, PartialEq)]
enum FrameAction {
    None,
    Reply(String),
    Close,
    ServerDisconnect,
    Rejected(String),
}

/// Socket.IO connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    namespace: String,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: Arc<HeartbeatManager>,
    event_tx: mpsc::Sender<SocketEvent>,
    reconnect_count: Arc<RwLock<u32>>,
    /// Set once the namespace connect ack arrives in the current attempt.
    established: AtomicBool,
    http: reqwest::Client,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, event_tx: mpsc::Sender<SocketEvent>) -> Self {
        let namespace = config.resolved_namespace();
        Self {
            heartbeat: Arc::new(HeartbeatManager::new(
                config.ping_interval_ms,
                config.ping_timeout_ms,
            )),
            namespace,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
            reconnect_count: Arc::new(RwLock::new(0)),
            established: AtomicBool::new(false),
            http: reqwest::Client::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Signal graceful shutdown.
    ///
    /// Cancels the shutdown token; the session loop sends a namespace
    /// disconnect and the reconnect loop exits.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run until shutdown, server disconnect, or attempts run out.
    pub async fn connect(&self) -> WsResult<()> {
        self.connect_with_retry().await
    }

    async fn connect_with_retry(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;
            self.established.store(false, Ordering::SeqCst);

            let result = self.try_transports().await;
            let was_established = self.established.swap(false, Ordering::SeqCst);

            let reason = match &result {
                Ok(SessionEnd::Shutdown) => {
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
                Ok(SessionEnd::ServerDisconnect) => {
                    info!("Server disconnected the namespace, not reconnecting");
                    *self.state.write() = ConnectionState::Disconnected;
                    Metrics::ws_disconnected();
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => {
                    info!("Socket.IO session closed");
                    "transport close"
                }
                Err(e) => {
                    error!(error = %e, "Socket.IO connection error");
                    disconnect_reason(e)
                }
            };

            if was_established {
                Metrics::ws_disconnected();
                self.emit(SocketEvent::Disconnect {
                    reason: reason.to_string(),
                })
                .await;
                attempt = 0;
            }

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt > self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                *self.state.write() = ConnectionState::Disconnected;
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;
            Metrics::ws_reconnect(reason);

            let delay = Duration::from_millis(self.config.reconnect_delay_ms);
            warn!(attempt, delay_ms = delay.as_millis() as u64, reason, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during reconnect delay, exiting");
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    /// Try each configured transport in order.
    async fn try_transports(&self) -> WsResult<SessionEnd> {
        let mut last_err = WsError::ConnectionFailed("no transports configured".to_string());

        for transport in &self.config.transports {
            let result = match transport {
                Transport::Websocket => self.run_websocket().await,
                Transport::Polling => self.run_polling().await,
            };

            match result {
                Ok(end) => return Ok(end),
                Err(e) if self.established.load(Ordering::SeqCst) => return Err(e),
                Err(e) => {
                    warn!(transport = transport.as_str(), error = %e, "Transport failed");
                    self.emit(SocketEvent::ConnectError {
                        message: e.to_string(),
                    })
                    .await;
                    if self.is_shutdown() {
                        return Ok(SessionEnd::Shutdown);
                    }
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn run_websocket(&self) -> WsResult<SessionEnd> {
        let url = engine_url(&self.config, Transport::Websocket)?;
        info!(url = %url, namespace = %self.namespace, "Connecting over WebSocket");

        let timeout_ms = self.config.connection_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        let (ws_stream, _response) = tokio::select! {
            res = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                connect_async_tls_with_config(&url, None, true, None),
            ) => res.map_err(|_| WsError::ConnectTimeout(timeout_ms))??,
            () = self.shutdown_token.cancelled() => return Ok(SessionEnd::Shutdown),
        };
        let (mut write, mut read) = ws_stream.split();

        self.heartbeat.reset();

        loop {
            let connected = self.established.load(Ordering::SeqCst);

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in session loop");
                    let disconnect = SocketPacket::Disconnect { namespace: self.namespace.clone() };
                    if let Err(e) = write.send(Message::Text(disconnect.to_frame())).await {
                        warn!(?e, "Failed to send namespace disconnect during shutdown");
                    }
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    if connected {
                        Metrics::ws_disconnected();
                    }
                    return Ok(SessionEnd::Shutdown);
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_frame(&text).await {
                                FrameAction::None => {}
                                FrameAction::Reply(reply) => {
                                    write.send(Message::Text(reply)).await?;
                                }
                                FrameAction::Close => return Ok(SessionEnd::Closed),
                                FrameAction::ServerDisconnect => return Ok(SessionEnd::ServerDisconnect),
                                FrameAction::Rejected(message) => {
                                    return Err(WsError::ConnectRejected(message));
                                }
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            debug!("Ignoring binary frame");
                            Metrics::event_dropped("binary_frame");
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "WebSocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(SessionEnd::Closed);
                        }
                        _ => {}
                    }
                }

                () = tokio::time::sleep_until(deadline), if !connected => {
                    warn!(timeout_ms, "Namespace connect timed out");
                    return Err(WsError::ConnectTimeout(timeout_ms));
                }

                _ = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!(window_ms = self.heartbeat.timeout_window_ms(), "Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                }
            }
        }
    }

    async fn run_polling(&self) -> WsResult<SessionEnd> {
        let url = engine_url(&self.config, Transport::Polling)?;
        info!(url = %url, namespace = %self.namespace, "Connecting over HTTP long-polling");

        let timeout_ms = self.config.connection_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        let session = tokio::select! {
            res = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                PollingSession::open(self.http.clone(), url),
            ) => res.map_err(|_| WsError::ConnectTimeout(timeout_ms))??,
            () = self.shutdown_token.cancelled() => return Ok(SessionEnd::Shutdown),
        };

        self.heartbeat.reset();
        self.heartbeat.configure(
            session.handshake().ping_interval,
            session.handshake().ping_timeout,
        );
        session.send(&self.connect_frame()).await?;

        loop {
            let window = Duration::from_millis(self.heartbeat.timeout_window_ms());
            let connected = self.established.load(Ordering::SeqCst);

            let frames = tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in polling loop");
                    let disconnect = SocketPacket::Disconnect { namespace: self.namespace.clone() };
                    if let Err(e) = session.send(&disconnect.to_frame()).await {
                        warn!(error = %e, "Failed to send namespace disconnect during shutdown");
                    }
                    if self.established.load(Ordering::SeqCst) {
                        Metrics::ws_disconnected();
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                res = tokio::time::timeout(window, session.poll()) => {
                    res.map_err(|_| WsError::HeartbeatTimeout)??
                }
                () = tokio::time::sleep_until(deadline), if !connected => {
                    warn!(timeout_ms, "Namespace connect timed out");
                    return Err(WsError::ConnectTimeout(timeout_ms));
                }
            };

            for frame in frames {
                match self.handle_frame(&frame).await {
                    FrameAction::None => {}
                    FrameAction::Reply(reply) => session.send(&reply).await?,
                    FrameAction::Close => return Ok(SessionEnd::Closed),
                    FrameAction::ServerDisconnect => return Ok(SessionEnd::ServerDisconnect),
                    FrameAction::Rejected(message) => {
                        return Err(WsError::ConnectRejected(message));
                    }
                }
            }

            if !self.established.load(Ordering::SeqCst) && Instant::now() >= deadline {
                warn!(timeout_ms, "Namespace connect timed out");
                return Err(WsError::ConnectTimeout(timeout_ms));
            }
        }
    }

    fn connect_frame(&self) -> String {
        SocketPacket::Connect {
            namespace: self.namespace.clone(),
            data: None,
        }
        .to_frame()
    }

    /// Handle one Engine.IO text frame.
    ///
    /// Malformed frames are logged and dropped; they never end the session.
    async fn handle_frame(&self, text: &str) -> FrameAction {
        self.heartbeat.record_message();

        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, frame = %truncate(text), "Dropping malformed frame");
                Metrics::event_dropped("malformed_frame");
                return FrameAction::None;
            }
        };

        match packet {
            EnginePacket::Open(handshake) => {
                debug!(sid = %handshake.sid, "Engine.IO open");
                self.heartbeat
                    .configure(handshake.ping_interval, handshake.ping_timeout);
                FrameAction::Reply(self.connect_frame())
            }
            EnginePacket::Ping => {
                self.heartbeat.record_ping();
                FrameAction::Reply(EnginePacket::Pong.encode())
            }
            EnginePacket::Close => {
                info!("Engine.IO close received");
                FrameAction::Close
            }
            EnginePacket::Pong | EnginePacket::Upgrade | EnginePacket::Noop => FrameAction::None,
            EnginePacket::Message(body) => self.handle_socket_packet(&body).await,
        }
    }

    async fn handle_socket_packet(&self, body: &str) -> FrameAction {
        let packet = match SocketPacket::decode(body) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, frame = %truncate(body), "Dropping malformed socket packet");
                Metrics::event_dropped("malformed_frame");
                return FrameAction::None;
            }
        };

        if packet.namespace() != self.namespace {
            debug!(namespace = packet.namespace(), "Ignoring packet for other namespace");
            return FrameAction::None;
        }

        match packet {
            SocketPacket::Connect { data, .. } => {
                let sid = data
                    .as_ref()
                    .and_then(|d| d.get("sid"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.established.store(true, Ordering::SeqCst);
                *self.state.write() = ConnectionState::Connected;
                *self.reconnect_count.write() = 0;
                Metrics::ws_connected();
                info!(sid = %sid, namespace = %self.namespace, "Socket.IO connected");
                self.emit(SocketEvent::Connect { sid }).await;
                FrameAction::None
            }
            SocketPacket::Disconnect { .. } => {
                self.emit(SocketEvent::Disconnect {
                    reason: "io server disconnect".to_string(),
                })
                .await;
                FrameAction::ServerDisconnect
            }
            SocketPacket::Event { name, mut args, .. } => {
                let payload = match args.len() {
                    0 => Value::Null,
                    1 => args.remove(0),
                    _ => Value::Array(args),
                };
                self.emit(SocketEvent::Event { name, payload }).await;
                FrameAction::None
            }
            SocketPacket::Ack { ack_id, .. } => {
                debug!(ack_id, "Ignoring ack");
                FrameAction::None
            }
            SocketPacket::ConnectError { data, .. } => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string());
                warn!(%message, "Namespace connect rejected");
                FrameAction::Rejected(message)
            }
        }
    }

    async fn emit(&self, event: SocketEvent) {
        if self.event_tx.send(event).await.is_err() {
            warn!("Socket event receiver dropped");
        }
    }
}

fn disconnect_reason(err: &WsError) -> &'static str {
    match err {
        WsError::HeartbeatTimeout => "ping timeout",
        WsError::ConnectionClosed { .. } => "transport close",
        WsError::ConnectTimeout(_) => "connect timeout",
        WsError::ConnectRejected(_) => "connect rejected",
        _ => "transport error",
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
