//! Heartbeat tracking for Socket.IO sessions.
//!
//! Engine.IO v4 heartbeats are server driven: the server sends `2` every
//! `pingInterval` and expects `3` back. The client only watches for the
//! server going quiet, declaring the session dead when no ping arrived
//! within `pingInterval + pingTimeout`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Heartbeat manager for a Socket.IO session.
pub struct HeartbeatManager {
    /// Server ping interval.
    interval_ms: Arc<RwLock<u64>>,
    /// Grace period after a missed ping.
    timeout_ms: Arc<RwLock<u64>>,
    /// Last ping received from the server.
    last_ping: Arc<RwLock<Option<DateTime<Utc>>>>,
    /// Last frame received (any frame).
    last_message: Arc<RwLock<DateTime<Utc>>>,
    /// Session start, used as the reference before the first ping.
    session_start: Arc<RwLock<DateTime<Utc>>>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            interval_ms: Arc::new(RwLock::new(interval_ms)),
            timeout_ms: Arc::new(RwLock::new(timeout_ms)),
            last_ping: Arc::new(RwLock::new(None)),
            last_message: Arc::new(RwLock::new(now)),
            session_start: Arc::new(RwLock::new(now)),
        }
    }

    /// Reset heartbeat state (called on every new session).
    pub fn reset(&self) {
        let now = Utc::now();
        *self.last_ping.write() = None;
        *self.last_message.write() = now;
        *self.session_start.write() = now;
    }

    /// Apply the timings advertised in the open handshake.
    pub fn configure(&self, interval_ms: Option<u64>, timeout_ms: Option<u64>) {
        if let Some(interval) = interval_ms.filter(|v| *v > 0) {
            *self.interval_ms.write() = interval;
        }
        if let Some(timeout) = timeout_ms.filter(|v| *v > 0) {
            *self.timeout_ms.write() = timeout;
        }
        debug!(
            interval_ms = *self.interval_ms.read(),
            timeout_ms = *self.timeout_ms.read(),
            "Heartbeat configured"
        );
    }

    /// Record a ping from the server.
    pub fn record_ping(&self) {
        let now = Utc::now();
        *self.last_ping.write() = Some(now);
        *self.last_message.write() = now;
    }

    /// Record that any frame was received.
    pub fn record_message(&self) {
        *self.last_message.write() = Utc::now();
    }

    /// Window after the last ping (or session start) before the session is dead.
    pub fn timeout_window_ms(&self) -> u64 {
        *self.interval_ms.read() + *self.timeout_ms.read()
    }

    /// Whether the server stopped pinging.
    pub fn is_timed_out(&self) -> bool {
        let reference = self
            .last_ping
            .read()
            .unwrap_or_else(|| *self.session_start.read());
        let elapsed_ms = (Utc::now() - reference).num_milliseconds();
        elapsed_ms > self.timeout_window_ms() as i64
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - *self.last_message.read()).num_milliseconds()
    }

    /// Wait for the next heartbeat check.
    pub async fn wait_for_check(&self) {
        let half = (*self.interval_ms.read() / 2).max(1);
        tokio::time::sleep(Duration::from_millis(half)).await;
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            interval_ms: *self.interval_ms.read(),
            timeout_ms: *self.timeout_ms.read(),
            last_ping: *self.last_ping.read(),
            last_message: *self.last_message.read(),
            time_since_last_message_ms: self.time_since_last_message_ms(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_message: DateTime<Utc>,
    pub time_since_last_message_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_initial_state() {
        let hb = HeartbeatManager::new(30000, 20000);
        assert!(!hb.is_timed_out());
        assert!(hb.stats().last_ping.is_none());
        assert_eq!(hb.timeout_window_ms(), 50000);
    }

    #[test]
    fn test_configure_from_handshake() {
        let hb = HeartbeatManager::new(30000, 20000);
        hb.configure(Some(25000), None);
        let stats = hb.stats();
        assert_eq!(stats.interval_ms, 25000);
        assert_eq!(stats.timeout_ms, 20000);

        hb.configure(Some(0), Some(5000));
        assert_eq!(hb.stats().interval_ms, 25000);
        assert_eq!(hb.stats().timeout_ms, 5000);
    }

    #[test]
    fn test_times_out_without_ping() {
        let hb = HeartbeatManager::new(1, 1);
        std::thread::sleep(Duration::from_millis(10));
        assert!(hb.is_timed_out());

        hb.record_ping();
        assert!(!hb.is_timed_out());
        assert!(hb.stats().last_ping.is_some());
    }

    #[test]
    fn test_reset_clears_ping() {
        let hb = HeartbeatManager::new(30000, 20000);
        hb.record_ping();
        hb.reset();
        assert!(hb.stats().last_ping.is_none());
        assert!(!hb.is_timed_out());
    }
}
