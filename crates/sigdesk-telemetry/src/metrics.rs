//! Prometheus metrics for sigdesk.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric names,
//! a static configuration error that should crash at first use.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_int_gauge_vec, CounterVec, Encoder, Gauge,
    IntGaugeVec, TextEncoder,
};

/// Socket connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "sigdesk_ws_connected",
        "Socket.IO connection state (1=connected)"
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigdesk_ws_reconnect_total",
        "Total Socket.IO reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Signals normalized and handed to the store.
pub static SIGNALS_INGESTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigdesk_signals_ingested_total",
        "Normalized signal updates per category",
        &["category"]
    )
    .unwrap()
});

/// Inbound events dropped by the ingestion adapter.
pub static INGEST_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigdesk_ingest_dropped_total",
        "Inbound events dropped during normalization",
        &["reason"]
    )
    .unwrap()
});

/// Current length of each live buffer.
pub static BUFFER_LEN: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "sigdesk_buffer_len",
        "Current number of entries per live buffer",
        &["category"]
    )
    .unwrap()
});

/// Signals hidden by the regime gate in served views.
pub static GATE_FILTERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigdesk_gate_filtered_total",
        "Signals filtered out by the regime gate",
        &["regime"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn signal_ingested(category: &str) {
        SIGNALS_INGESTED_TOTAL.with_label_values(&[category]).inc();
    }

    /// Record a dropped inbound event (`unknown_type`, `malformed`, `channel_closed`).
    pub fn event_dropped(reason: &str) {
        INGEST_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn buffer_len(category: &str, len: usize) {
        BUFFER_LEN
            .with_label_values(&[category])
            .set(len as i64);
    }

    pub fn gate_filtered(regime: &str, count: usize) {
        if count > 0 {
            GATE_FILTERED_TOTAL
                .with_label_values(&[regime])
                .inc_by(count as f64);
        }
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buf = Vec::new();
        encoder
            .encode(&families, &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
