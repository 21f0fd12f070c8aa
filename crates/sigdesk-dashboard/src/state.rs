//! Dashboard state: read-side views over the live store.

use chrono::Utc;
use std::collections::BTreeMap;
use sigdesk_core::{FilterableSignal, Regime, Side, Signal, SignalCategory};
use sigdesk_feed::StoreReader;
use sigdesk_gate::{evaluate, get_filter_stats};

use crate::types::{DashboardSnapshot, GateCheck, SignalsView};

/// Dashboard state over a store reader.
#[derive(Clone)]
pub struct DashboardState {
    reader: StoreReader,
}

impl DashboardState {
    pub fn new(reader: StoreReader) -> Self {
        Self { reader }
    }

    pub fn revision(&self) -> u64 {
        self.reader.revision()
    }

    /// Collect a snapshot of every buffer, each limited to the display window.
    pub fn collect_snapshot(&self) -> DashboardSnapshot {
        let view = self.reader.view();
        let gate_regime = view.regime.as_ref().and_then(|r| r.regime);
        let window = self.reader.config().display_window;

        let mut signals = BTreeMap::new();
        let mut filter_stats = BTreeMap::new();
        for (category, list) in view.buffers {
            filter_stats.insert(category, get_filter_stats(list.as_slice(), gate_regime));
            signals.insert(category, list.iter().take(window).map(|s| s.for_display()).collect());
        }

        DashboardSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            revision: view.revision,
            connection: view.connection,
            regime: view.regime,
            signals,
            filter_stats,
        }
    }

    /// One buffer, optionally gated by the current regime.
    pub fn signals(&self, category: SignalCategory, filtered: bool, limit: Option<usize>) -> SignalsView {
        let limit = limit.unwrap_or(self.reader.config().display_window);
        let gated = self.reader.gated(category);
        let list = if filtered {
            gated.allowed.as_slice()
        } else {
            gated.signals.as_slice()
        };

        SignalsView {
            category,
            filtered,
            regime: filtered
                .then_some(gated.regime)
                .flatten()
                .map(|r| r.as_str().to_string()),
            stats: gated.stats,
            signals: list.iter().take(limit).map(|s| s.for_display()).collect::<Vec<Signal>>(),
        }
    }

    /// Run the gate for an arbitrary (regime, type, side) triple.
    ///
    /// Without an explicit regime the store's current regime is used.
    pub fn gate_check(&self, regime: Option<&str>, signal_type: &str, side: Option<Side>) -> GateCheck {
        let (raw, parsed) = match regime {
            Some(raw) => (Some(raw.to_string()), Regime::parse_lenient(raw)),
            None => {
                let current = self.reader.regime();
                (
                    current.as_ref().map(|r| r.raw.clone()),
                    current.and_then(|r| r.regime),
                )
            }
        };

        let mut candidate = FilterableSignal::new(signal_type);
        candidate.side = side;
        let decision = evaluate(parsed, &candidate);

        GateCheck {
            regime: raw,
            recognized: parsed.is_some(),
            signal_type: signal_type.to_string(),
            side: side.map(|s| s.to_string()),
            allowed: decision.is_allow(),
            reason: decision.into_reason(),
        }
    }
}
