//! Socket.IO client for sigdesk signal feeds.
//!
//! Provides the transport side of the live signal desk:
//! - Engine.IO v4 / Socket.IO v5 packet framing
//! - WebSocket transport with HTTP long-polling fallback
//! - Fixed-delay reconnection with an attempt cap (no backoff, no jitter)
//! - Server-driven heartbeat (ping → pong, ping timeout detection)
//! - Channel-based event delivery (`SocketEvent`)

pub mod connection;
pub mod error;
pub mod frame;
pub mod heartbeat;
mod polling;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, SocketEvent, Transport};
pub use error::{WsError, WsResult};
pub use frame::{EnginePacket, Handshake, SocketPacket};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
