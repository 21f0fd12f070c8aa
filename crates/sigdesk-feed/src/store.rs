//! Live signal store.
//!
//! One bounded, newest-first buffer per [`SignalCategory`]. Each mutation
//! builds a fresh list and swaps it in whole, so a reader holding a
//! [`SignalList`] never observes a partial update. Items are shared between
//! generations through `Arc`.
//!
//! There is exactly one [`StoreWriter`], owned by the consumer task draining
//! the update channel; [`StoreReader`] handles are cheap to clone.

use crate::adapter::SignalUpdate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sigdesk_core::{ConnectionStatus, Regime, RegimeState, Signal, SignalCategory};
use sigdesk_gate::{allow, filter_signals_by_regime, get_filter_stats, FilterStats};
use sigdesk_telemetry::Metrics;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Immutable snapshot of one buffer, newest first.
pub type SignalList = Arc<Vec<Arc<Signal>>>;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum entries kept per category.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Entries shown by default in UI windows.
    #[serde(default = "default_display_window")]
    pub display_window: usize,
    /// Drop the regime on disconnect instead of flagging it stale.
    #[serde(default)]
    pub clear_regime_on_disconnect: bool,
}

fn default_capacity() -> usize {
    100
}

fn default_display_window() -> usize {
    50
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            display_window: default_display_window(),
            clear_regime_on_disconnect: false,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    buffers: HashMap<SignalCategory, SignalList>,
    regime: Option<RegimeState>,
    connection: ConnectionStatus,
}

/// Shared store state.
#[derive(Debug)]
pub struct LiveSignalStore {
    config: StoreConfig,
    state: RwLock<StoreState>,
    revision: AtomicU64,
}

impl LiveSignalStore {
    /// Create a store and return its single writer and a reader.
    pub fn create(config: StoreConfig) -> (StoreWriter, StoreReader) {
        let buffers = SignalCategory::ALL
            .into_iter()
            .map(|category| (category, SignalList::default()))
            .collect();

        let store = Arc::new(Self {
            config,
            state: RwLock::new(StoreState {
                buffers,
                ..Default::default()
            }),
            revision: AtomicU64::new(0),
        });

        (
            StoreWriter {
                store: store.clone(),
                live_categories: HashSet::new(),
                live_regime: false,
            },
            StoreReader { store },
        )
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::Release);
    }
}

/// The only mutating handle. Not `Clone`.
#[derive(Debug)]
pub struct StoreWriter {
    store: Arc<LiveSignalStore>,
    // Keys the live feed has written; REST hydration must not overwrite them.
    live_categories: HashSet<SignalCategory>,
    live_regime: bool,
}

impl StoreWriter {
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            store: self.store.clone(),
        }
    }

    /// Prepend a record, keeping at most `capacity` entries. No dedup.
    ///
    /// Records the current regime would block are counted once here, at
    /// arrival, not on every read.
    pub fn push(&mut self, category: SignalCategory, signal: Signal) {
        let capacity = self.store.config.capacity;
        let len = {
            let mut state = self.store.state.write();
            if let Some(regime) = state.regime.as_ref().and_then(|r| r.regime) {
                if !allow(Some(regime), &signal) {
                    Metrics::gate_filtered(regime.as_str(), 1);
                }
            }
            let current = state.buffers.get(&category).cloned().unwrap_or_default();

            let mut next = Vec::with_capacity(capacity.min(current.len() + 1));
            if capacity > 0 {
                next.push(Arc::new(signal));
                next.extend(current.iter().take(capacity - 1).cloned());
            }
            let len = next.len();
            state.buffers.insert(category, Arc::new(next));
            len
        };
        self.store.bump();
        Metrics::buffer_len(category.as_str(), len);
    }

    /// Replace a whole buffer (truncated to `capacity`).
    pub fn replace_all(&mut self, category: SignalCategory, signals: Vec<Signal>) {
        let capacity = self.store.config.capacity;
        let next: Vec<Arc<Signal>> = signals.into_iter().take(capacity).map(Arc::new).collect();
        let len = next.len();
        self.store
            .state
            .write()
            .buffers
            .insert(category, Arc::new(next));
        self.store.bump();
        Metrics::buffer_len(category.as_str(), len);
    }

    /// Store the regime as given, `stale` flag included.
    pub fn set_regime(&mut self, regime: RegimeState) {
        if !regime.is_recognized() {
            debug!(raw = %regime.raw, "Unrecognized regime, gate fails open");
        }
        self.store.state.write().regime = Some(regime);
        self.store.bump();
    }

    /// Record the connection status. Losing the connection ages the regime.
    pub fn set_connection(&mut self, status: ConnectionStatus) {
        {
            let mut state = self.store.state.write();
            if !status.is_connected() {
                if self.store.config.clear_regime_on_disconnect {
                    state.regime = None;
                } else if let Some(regime) = state.regime.as_mut() {
                    regime.stale = true;
                }
            }
            state.connection = status;
        }
        self.store.bump();
    }

    pub fn apply(&mut self, update: SignalUpdate) {
        match update {
            SignalUpdate::Push { category, signal } => {
                self.live_categories.insert(category);
                self.push(category, signal);
            }
            SignalUpdate::Replace { category, signals } => {
                self.live_categories.insert(category);
                self.replace_all(category, signals);
            }
            SignalUpdate::Regime(regime) => {
                self.live_regime = true;
                self.set_regime(regime);
            }
            SignalUpdate::Connection(status) => self.set_connection(status),
            SignalUpdate::Hydrate(inner) => self.apply_hydrated(*inner),
        }
    }

    /// Apply a REST snapshot update unless the live feed got there first.
    ///
    /// A hydrated regime is stale until the socket is connected.
    fn apply_hydrated(&mut self, update: SignalUpdate) {
        match update {
            SignalUpdate::Regime(_) if self.live_regime => {
                debug!("Live regime present, skipping snapshot regime");
            }
            SignalUpdate::Regime(mut regime) => {
                regime.stale = !self.store.state.read().connection.is_connected();
                self.set_regime(regime);
            }
            SignalUpdate::Push { category, .. } | SignalUpdate::Replace { category, .. }
                if self.live_categories.contains(&category) =>
            {
                debug!(category = category.as_str(), "Live data present, skipping snapshot");
            }
            SignalUpdate::Push { category, signal } => self.push(category, signal),
            SignalUpdate::Replace { category, signals } => self.replace_all(category, signals),
            SignalUpdate::Connection(status) => self.set_connection(status),
            SignalUpdate::Hydrate(inner) => self.apply_hydrated(*inner),
        }
    }
}

/// Read-only store handle.
#[derive(Debug, Clone)]
pub struct StoreReader {
    store: Arc<LiveSignalStore>,
}

/// One buffer and the gate applied to it, all taken from a single read.
#[derive(Debug, Clone)]
pub struct GatedSnapshot {
    pub regime: Option<Regime>,
    pub signals: SignalList,
    pub allowed: Vec<Arc<Signal>>,
    pub stats: FilterStats,
}

/// Every buffer with the connection and regime, taken under one lock.
#[derive(Debug, Clone)]
pub struct StoreView {
    pub revision: u64,
    pub connection: ConnectionStatus,
    pub regime: Option<RegimeState>,
    pub buffers: BTreeMap<SignalCategory, SignalList>,
}

/// Aggregate view used by dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub revision: u64,
    pub connection: ConnectionStatus,
    pub regime: Option<RegimeState>,
    pub counts: BTreeMap<SignalCategory, usize>,
}

impl StoreReader {
    pub fn config(&self) -> &StoreConfig {
        &self.store.config
    }

    /// Consistent snapshot of a buffer, newest first.
    pub fn snapshot(&self, category: SignalCategory) -> SignalList {
        self.store
            .state
            .read()
            .buffers
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every buffer taken under one lock.
    pub fn view(&self) -> StoreView {
        let state = self.store.state.read();
        StoreView {
            revision: self.revision(),
            connection: state.connection.clone(),
            regime: state.regime.clone(),
            buffers: state
                .buffers
                .iter()
                .map(|(category, list)| (*category, list.clone()))
                .collect(),
        }
    }

    /// The `n` newest entries.
    pub fn window(&self, category: SignalCategory, n: usize) -> Vec<Arc<Signal>> {
        self.snapshot(category).iter().take(n).cloned().collect()
    }

    /// The newest entries up to the configured display window.
    pub fn display_window(&self, category: SignalCategory) -> Vec<Arc<Signal>> {
        self.window(category, self.store.config.display_window)
    }

    /// Monotonic counter, bumped on every applied update.
    pub fn revision(&self) -> u64 {
        self.store.revision.load(Ordering::Acquire)
    }

    pub fn regime(&self) -> Option<RegimeState> {
        self.store.state.read().regime.clone()
    }

    /// Regime fed to the gate; `None` when absent or unrecognized.
    pub fn current_regime(&self) -> Option<Regime> {
        self.store
            .state
            .read()
            .regime
            .as_ref()
            .and_then(|r| r.regime)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.store.state.read().connection.clone()
    }

    /// Buffer and gate regime read under one lock.
    fn buffer_with_regime(&self, category: SignalCategory) -> (SignalList, Option<Regime>) {
        let state = self.store.state.read();
        (
            state.buffers.get(&category).cloned().unwrap_or_default(),
            state.regime.as_ref().and_then(|r| r.regime),
        )
    }

    /// Buffer, gated subset and stats computed from the same regime.
    pub fn gated(&self, category: SignalCategory) -> GatedSnapshot {
        let (signals, regime) = self.buffer_with_regime(category);
        let allowed = filter_signals_by_regime(signals.as_slice(), regime).into_owned();
        let stats = get_filter_stats(signals.as_slice(), regime);
        GatedSnapshot {
            regime,
            signals,
            allowed,
            stats,
        }
    }

    /// Buffer with the regime gate applied under the current regime.
    pub fn filtered(&self, category: SignalCategory) -> Vec<Arc<Signal>> {
        let (signals, regime) = self.buffer_with_regime(category);
        filter_signals_by_regime(signals.as_slice(), regime).into_owned()
    }

    pub fn filter_stats(&self, category: SignalCategory) -> FilterStats {
        let (signals, regime) = self.buffer_with_regime(category);
        get_filter_stats(signals.as_slice(), regime)
    }

    pub fn summary(&self) -> StoreSummary {
        let state = self.store.state.read();
        StoreSummary {
            revision: self.revision(),
            connection: state.connection.clone(),
            regime: state.regime.clone(),
            counts: state
                .buffers
                .iter()
                .map(|(category, list)| (*category, list.len()))
                .collect(),
        }
    }
}

/// Apply updates in channel order until cancelled or every sender is gone.
pub async fn run_store_consumer(
    mut writer: StoreWriter,
    mut rx: mpsc::Receiver<SignalUpdate>,
    shutdown_token: CancellationToken,
) {
    info!("Store consumer started");
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => {
                debug!("Store consumer cancelled");
                break;
            }
            update = rx.recv() => {
                match update {
                    Some(update) => writer.apply(update),
                    None => {
                        debug!("Update channel closed");
                        break;
                    }
                }
            }
        }
    }
    info!(revision = writer.reader().revision(), "Store consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigdesk_core::{TimeframeCoin, VolumeSignal};

    fn volume(ts: i64) -> Signal {
        Signal::Volume(VolumeSignal {
            symbol: format!("SYM{ts}"),
            timestamp: ts,
            volume: ts as f64,
            interval: "1m".to_string(),
        })
    }

    fn mover(symbol: &str) -> Signal {
        Signal::Mover(TimeframeCoin {
            symbol: symbol.to_string(),
            change: "+1%".to_string(),
            value: None,
            volume: None,
        })
    }

    #[test]
    fn test_buffer_keeps_newest_hundred() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        for ts in 0..150 {
            writer.push(SignalCategory::VolumeSpikes, volume(ts));
        }

        let list = reader.snapshot(SignalCategory::VolumeSpikes);
        assert_eq!(list.len(), 100);
        let timestamps: Vec<i64> = list.iter().filter_map(|s| s.timestamp()).collect();
        let expected: Vec<i64> = (50..150).rev().collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn test_snapshot_is_not_mutated_by_later_pushes() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.push(SignalCategory::VolumeSpikes, volume(1));
        let before = reader.snapshot(SignalCategory::VolumeSpikes);

        writer.push(SignalCategory::VolumeSpikes, volume(2));
        let after = reader.snapshot(SignalCategory::VolumeSpikes);

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&before[0], &after[1]));
    }

    #[test]
    fn test_push_does_not_dedup() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.push(SignalCategory::VolumeSpikes, volume(7));
        writer.push(SignalCategory::VolumeSpikes, volume(7));
        assert_eq!(reader.snapshot(SignalCategory::VolumeSpikes).len(), 2);
    }

    #[test]
    fn test_replace_all_truncates_and_replaces() {
        let config = StoreConfig {
            capacity: 3,
            ..Default::default()
        };
        let (mut writer, reader) = LiveSignalStore::create(config);
        writer.replace_all(
            SignalCategory::TopGainers,
            vec![mover("A"), mover("B"), mover("C"), mover("D")],
        );
        let list = reader.snapshot(SignalCategory::TopGainers);
        let symbols: Vec<&str> = list.iter().map(|s| s.symbol()).collect();
        assert_eq!(symbols, vec!["A", "B", "C"]);

        writer.replace_all(SignalCategory::TopGainers, vec![mover("Z")]);
        assert_eq!(reader.snapshot(SignalCategory::TopGainers).len(), 1);
    }

    #[test]
    fn test_window_and_revision() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        assert_eq!(reader.revision(), 0);
        for ts in 0..60 {
            writer.push(SignalCategory::VolumeSpikes, volume(ts));
        }
        assert_eq!(reader.revision(), 60);
        assert_eq!(reader.window(SignalCategory::VolumeSpikes, 10).len(), 10);
        assert_eq!(reader.display_window(SignalCategory::VolumeSpikes).len(), 50);
        assert_eq!(
            reader.window(SignalCategory::VolumeSpikes, 1)[0].timestamp(),
            Some(59)
        );
    }

    #[test]
    fn test_regime_goes_stale_on_disconnect() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.set_connection(ConnectionStatus::Connected);
        writer.set_regime(RegimeState::new("squeeze", 1));
        writer.set_connection(ConnectionStatus::Disconnected);

        let regime = reader.regime().unwrap();
        assert!(regime.stale);
        assert_eq!(reader.current_regime(), Some(Regime::Squeeze));

        writer.set_regime(RegimeState::new("range", 2));
        assert!(!reader.regime().unwrap().stale);
    }

    #[test]
    fn test_regime_cleared_on_disconnect_when_configured() {
        let config = StoreConfig {
            clear_regime_on_disconnect: true,
            ..Default::default()
        };
        let (mut writer, reader) = LiveSignalStore::create(config);
        writer.set_regime(RegimeState::new("squeeze", 1));
        writer.set_connection(ConnectionStatus::Error("refused".into()));
        assert!(reader.regime().is_none());
        assert_eq!(
            reader.connection_status(),
            ConnectionStatus::Error("refused".into())
        );
    }

    #[test]
    fn test_filtered_view_uses_current_regime() {
        use sigdesk_core::{PriceChangeSignal, VolatilitySignal};

        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.push(SignalCategory::VolumeSpikes, volume(1));
        writer.push(
            SignalCategory::VolumeSpikes,
            Signal::PriceChange(PriceChangeSignal {
                symbol: "BTCUSDT".into(),
                timestamp: 2,
                price_change: 1.0,
                price_change_percent: 0.5,
                interval: "1h".into(),
            }),
        );
        writer.push(
            SignalCategory::VolumeSpikes,
            Signal::Volatility(VolatilitySignal {
                symbol: "BTCUSDT".into(),
                timestamp: 3,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volatility: 0.1,
                interval: "1h".into(),
                range: None,
                avg_range: None,
            }),
        );

        assert_eq!(reader.filtered(SignalCategory::VolumeSpikes).len(), 3);

        writer.set_regime(RegimeState::new("squeeze", 1));
        assert_eq!(reader.filtered(SignalCategory::VolumeSpikes).len(), 2);

        let stats = reader.filter_stats(SignalCategory::VolumeSpikes);
        assert_eq!((stats.total, stats.allowed, stats.filtered), (3, 2, 1));
        assert_eq!(stats.percentage, 33.33);
    }

    #[test]
    fn test_gated_snapshot_is_internally_consistent() {
        use sigdesk_core::PriceChangeSignal;

        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.set_regime(RegimeState::new("squeeze", 1));
        writer.push(SignalCategory::PriceChanges, volume(1));
        writer.push(
            SignalCategory::PriceChanges,
            Signal::PriceChange(PriceChangeSignal {
                symbol: "ETHUSDT".into(),
                timestamp: 2,
                price_change: -3.0,
                price_change_percent: -1.2,
                interval: "1h".into(),
            }),
        );

        let gated = reader.gated(SignalCategory::PriceChanges);
        assert_eq!(gated.regime, Some(Regime::Squeeze));
        assert_eq!(gated.signals.len(), 2);
        assert_eq!(gated.allowed.len(), 1);
        assert_eq!(gated.stats.total, gated.signals.len());
        assert_eq!(gated.stats.allowed, gated.allowed.len());
        assert_eq!(gated.stats.filtered, 1);

        // Reads leave the store untouched.
        let revision = reader.revision();
        reader.filtered(SignalCategory::PriceChanges);
        reader.filter_stats(SignalCategory::PriceChanges);
        assert_eq!(reader.revision(), revision);
    }

    #[test]
    fn test_hydrated_updates_never_override_live_data() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.apply(SignalUpdate::Connection(ConnectionStatus::Connected));
        writer.apply(SignalUpdate::Regime(RegimeState::new("squeeze", 2)));
        writer.apply(SignalUpdate::Replace {
            category: SignalCategory::TopGainers,
            signals: vec![mover("LIVE")],
        });

        writer.apply(SignalUpdate::Hydrate(Box::new(SignalUpdate::Regime(
            RegimeState::new("trending_bull", 1),
        ))));
        writer.apply(SignalUpdate::Hydrate(Box::new(SignalUpdate::Replace {
            category: SignalCategory::TopGainers,
            signals: vec![mover("REST")],
        })));
        writer.apply(SignalUpdate::Hydrate(Box::new(SignalUpdate::Replace {
            category: SignalCategory::TopLosers,
            signals: vec![mover("REST")],
        })));

        assert_eq!(reader.current_regime(), Some(Regime::Squeeze));
        assert_eq!(reader.snapshot(SignalCategory::TopGainers)[0].symbol(), "LIVE");
        assert_eq!(reader.snapshot(SignalCategory::TopLosers)[0].symbol(), "REST");
    }

    #[test]
    fn test_hydrated_regime_is_stale_until_socket_connects() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.apply(SignalUpdate::Hydrate(Box::new(SignalUpdate::Regime(
            RegimeState::new("range", 1),
        ))));
        let regime = reader.regime().unwrap();
        assert!(regime.stale);
        assert_eq!(regime.regime, Some(Regime::Range));

        writer.apply(SignalUpdate::Connection(ConnectionStatus::Connected));
        writer.apply(SignalUpdate::Regime(RegimeState::new("range", 2)));
        assert!(!reader.regime().unwrap().stale);

        // Live regime wins even after a hydrated one arrives late.
        writer.apply(SignalUpdate::Hydrate(Box::new(SignalUpdate::Regime(
            RegimeState::new("squeeze", 3),
        ))));
        assert_eq!(reader.current_regime(), Some(Regime::Range));
    }

    #[test]
    fn test_summary_counts_every_category() {
        let (mut writer, reader) = LiveSignalStore::create(StoreConfig::default());
        writer.push(SignalCategory::PriceChanges, volume(1));
        let summary = reader.summary();
        assert_eq!(summary.counts.len(), SignalCategory::ALL.len());
        assert_eq!(summary.counts[&SignalCategory::PriceChanges], 1);
        assert_eq!(summary.revision, 1);
    }

    #[tokio::test]
    async fn test_consumer_applies_in_order_and_stops() {
        let (writer, reader) = LiveSignalStore::create(StoreConfig::default());
        let (tx, rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_store_consumer(writer, rx, token.clone()));

        for ts in 0..5 {
            tx.send(SignalUpdate::Push {
                category: SignalCategory::VolumeSpikes,
                signal: volume(ts),
            })
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let list = reader.snapshot(SignalCategory::VolumeSpikes);
        assert_eq!(list[0].timestamp(), Some(4));
        assert_eq!(list.len(), 5);
    }
}
