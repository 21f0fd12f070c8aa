//! Dashboard API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use serde::Serialize;
use sigdesk_core::{ConnectionStatus, RegimeState, Signal, SignalCategory};
use sigdesk_gate::FilterStats;
use std::collections::BTreeMap;

/// Full store snapshot (sent on WebSocket connect, on change, and via REST).
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    /// Timestamp when snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    /// Store revision the snapshot reflects.
    pub revision: u64,
    pub connection: ConnectionStatus,
    pub regime: Option<RegimeState>,
    /// Newest entries per category, up to the display window.
    pub signals: BTreeMap<SignalCategory, Vec<Signal>>,
    /// Gate statistics per category under the current regime.
    pub filter_stats: BTreeMap<SignalCategory, FilterStats>,
}

/// One buffer, raw or filtered.
#[derive(Debug, Clone, Serialize)]
pub struct SignalsView {
    pub category: SignalCategory,
    pub filtered: bool,
    /// Regime applied, if any.
    pub regime: Option<String>,
    pub stats: FilterStats,
    pub signals: Vec<Signal>,
}

/// Result of an ad-hoc gate check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateCheck {
    pub regime: Option<String>,
    pub recognized: bool,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub side: Option<String>,
    pub allowed: bool,
    pub reason: Option<String>,
}

/// WebSocket message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    Snapshot(DashboardSnapshot),
}
