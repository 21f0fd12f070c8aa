//! Signal ingestion adapter.
//!
//! Routes inbound payloads by kind, normalizes them into typed records and
//! hands the resulting [`SignalUpdate`] to the store channel. Unknown kinds
//! and malformed payloads are dropped at this boundary: logged, counted, and
//! never surfaced to the caller.

use crate::error::{FeedError, FeedResult};
use crate::extract::{self, INTERVAL_KEYS, MOVER_SYMBOL_KEYS, SYMBOL_KEYS, TIMESTAMP_KEYS};
use chrono::Utc;
use serde_json::Value;
use sigdesk_core::{
    coerce_f64, coerce_opt_f64, coerce_string, coerce_timestamp_ms, ConnectionStatus,
    FundingRate, PriceChangeSignal, RegimeAlert, RegimeState, Signal, SignalCategory,
    TimeframeCoin, VolatilitySignal, VolumeSignal,
};
use sigdesk_telemetry::Metrics;
use sigdesk_ws::SocketEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Known inbound event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Volatility,
    VolatilityRange,
    VolumeSpike,
    PriceChange,
    TopGainers,
    TopLosers,
    Funding,
    Regime,
    RegimeAlert,
}

impl EventKind {
    /// Routing table from event name to kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "signal:volatility" => Some(Self::Volatility),
            "signal:volatilityRange" | "volatilityRange" => Some(Self::VolatilityRange),
            "volumeSpike" => Some(Self::VolumeSpike),
            "priceChange" => Some(Self::PriceChange),
            "top:gainers" => Some(Self::TopGainers),
            "top:losers" => Some(Self::TopLosers),
            "funding" => Some(Self::Funding),
            "regime" => Some(Self::Regime),
            "regime:alert" => Some(Self::RegimeAlert),
            _ => None,
        }
    }

    /// Buffer this kind writes to; `None` for the regime, which is not buffered.
    pub fn category(&self) -> Option<SignalCategory> {
        match self {
            Self::Volatility => Some(SignalCategory::VolatilitySpikes),
            Self::VolatilityRange => Some(SignalCategory::VolatilityRanges),
            Self::VolumeSpike => Some(SignalCategory::VolumeSpikes),
            Self::PriceChange => Some(SignalCategory::PriceChanges),
            Self::TopGainers => Some(SignalCategory::TopGainers),
            Self::TopLosers => Some(SignalCategory::TopLosers),
            Self::Funding => Some(SignalCategory::Funding),
            Self::RegimeAlert => Some(SignalCategory::RegimeAlerts),
            Self::Regime => None,
        }
    }
}

/// A payload awaiting normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPayload {
    pub kind: String,
    pub body: Value,
}

impl InboundPayload {
    /// From a socket event (or a REST body routed as if it were one).
    pub fn from_event(name: impl Into<String>, body: Value) -> Self {
        Self {
            kind: name.into(),
            body,
        }
    }

    /// From a loose object carrying a `type` discriminator.
    pub fn from_object(object: Value) -> FeedResult<Self> {
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FeedError::MissingType)?
            .to_string();
        Ok(Self { kind, body: object })
    }
}

/// Normalized update applied by the store consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalUpdate {
    /// Prepend one record.
    Push {
        category: SignalCategory,
        signal: Signal,
    },
    /// Replace a whole snapshot buffer.
    Replace {
        category: SignalCategory,
        signals: Vec<Signal>,
    },
    Regime(RegimeState),
    Connection(ConnectionStatus),
    /// Loaded from the REST snapshot. Never overrides a buffer or regime the
    /// live feed has already written.
    Hydrate(Box<SignalUpdate>),
}

/// Ingestion counters.
#[derive(Debug, Default)]
pub struct IngestStats {
    ingested: AtomicU64,
    dropped_unknown: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_closed: AtomicU64,
}

impl IngestStats {
    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn dropped_unknown(&self) -> u64 {
        self.dropped_unknown.load(Ordering::Relaxed)
    }

    pub fn dropped_malformed(&self) -> u64 {
        self.dropped_malformed.load(Ordering::Relaxed)
    }

    pub fn dropped_closed(&self) -> u64 {
        self.dropped_closed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_unknown() + self.dropped_malformed() + self.dropped_closed()
    }
}

/// Signal ingestion adapter.
#[derive(Clone)]
pub struct IngestionAdapter {
    tx: mpsc::Sender<SignalUpdate>,
    stats: Arc<IngestStats>,
}

impl IngestionAdapter {
    pub fn new(tx: mpsc::Sender<SignalUpdate>) -> Self {
        Self {
            tx,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    /// Normalize a payload.
    ///
    /// `Ok(None)` for kinds outside the routing table, `Err` for a known kind
    /// whose body has the wrong shape.
    pub fn normalize(payload: &InboundPayload) -> FeedResult<Option<SignalUpdate>> {
        let Some(kind) = EventKind::from_name(&payload.kind) else {
            return Ok(None);
        };
        let name = payload.kind.as_str();
        let body = &payload.body;

        let Some(category) = kind.category() else {
            let raw = extract::regime_value(body)
                .ok_or_else(|| FeedError::malformed(name, "no regime value"))?;
            return Ok(Some(SignalUpdate::Regime(RegimeState::new(raw, now_ms()))));
        };

        let update = if category.is_snapshot() {
            let entries = extract::mover_list(body)
                .ok_or_else(|| FeedError::malformed(name, "no entry list"))?;
            SignalUpdate::Replace {
                category,
                signals: entries
                    .iter()
                    .filter_map(|entry| parse_snapshot_entry(kind, entry))
                    .collect(),
            }
        } else {
            SignalUpdate::Push {
                category,
                signal: parse_record(kind, name, extract::record(body))?,
            }
        };

        Ok(Some(update))
    }

    /// Normalize and forward a payload. Never fails; drops are logged and counted.
    pub async fn ingest(&self, payload: InboundPayload) {
        self.ingest_inner(payload, false).await;
    }

    /// Like [`ingest`](Self::ingest), for payloads fetched over REST at startup.
    pub async fn ingest_snapshot(&self, payload: InboundPayload) {
        self.ingest_inner(payload, true).await;
    }

    async fn ingest_inner(&self, payload: InboundPayload, hydrated: bool) {
        match Self::normalize(&payload) {
            Ok(Some(update)) => {
                let update = if hydrated {
                    SignalUpdate::Hydrate(Box::new(update))
                } else {
                    update
                };
                let label = update_label(&update);
                if self.send(update).await {
                    self.stats.ingested.fetch_add(1, Ordering::Relaxed);
                    Metrics::signal_ingested(label);
                }
            }
            Ok(None) => {
                debug!(kind = %payload.kind, "Dropping event of unknown type");
                self.stats.dropped_unknown.fetch_add(1, Ordering::Relaxed);
                Metrics::event_dropped("unknown_type");
            }
            Err(e) => {
                warn!(kind = %payload.kind, error = %e, "Dropping malformed payload");
                self.stats.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                Metrics::event_dropped("malformed");
            }
        }
    }

    /// Translate a socket event: lifecycle events become connection updates,
    /// application events go through [`ingest`](Self::ingest).
    pub async fn handle_socket_event(&self, event: SocketEvent) {
        let status = match event {
            SocketEvent::Event { name, payload } => {
                self.ingest(InboundPayload::from_event(name, payload)).await;
                return;
            }
            SocketEvent::Connect { sid } => {
                info!(sid = %sid, "Signal socket connected");
                ConnectionStatus::Connected
            }
            SocketEvent::Disconnect { reason } => {
                warn!(reason = %reason, "Signal socket disconnected");
                ConnectionStatus::Disconnected
            }
            SocketEvent::ConnectError { message } => {
                warn!(message = %message, "Signal socket connect error");
                ConnectionStatus::Error(message)
            }
        };
        self.send(SignalUpdate::Connection(status)).await;
    }

    async fn send(&self, update: SignalUpdate) -> bool {
        if self.tx.send(update).await.is_err() {
            warn!("Store channel closed, dropping update");
            self.stats.dropped_closed.fetch_add(1, Ordering::Relaxed);
            Metrics::event_dropped("channel_closed");
            return false;
        }
        true
    }
}

/// Drain socket events into the adapter until cancelled or the socket side hangs up.
pub async fn run_event_pump(
    adapter: IngestionAdapter,
    mut rx: mpsc::Receiver<SocketEvent>,
    shutdown_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => {
                debug!("Event pump cancelled");
                break;
            }
            event = rx.recv() => {
                match event {
                    Some(event) => adapter.handle_socket_event(event).await,
                    None => {
                        debug!("Socket event channel closed");
                        break;
                    }
                }
            }
        }
    }
}

fn parse_snapshot_entry(kind: EventKind, entry: &Value) -> Option<Signal> {
    match kind {
        EventKind::Funding => parse_funding(entry).map(Signal::Funding),
        _ => parse_mover(entry).map(Signal::Mover),
    }
}

fn parse_record(kind: EventKind, name: &str, record: &Value) -> FeedResult<Signal> {
    match kind {
        EventKind::Volatility | EventKind::VolatilityRange => {
            parse_volatility(name, record).map(Signal::Volatility)
        }
        EventKind::VolumeSpike => parse_volume(name, record).map(Signal::Volume),
        EventKind::PriceChange => parse_price_change(name, record).map(Signal::PriceChange),
        EventKind::RegimeAlert => parse_regime_alert(name, record).map(Signal::RegimeAlert),
        EventKind::TopGainers | EventKind::TopLosers | EventKind::Funding | EventKind::Regime => {
            Err(FeedError::malformed(name, "not a single-record event"))
        }
    }
}

fn update_label(update: &SignalUpdate) -> &'static str {
    match update {
        SignalUpdate::Push { category, .. } | SignalUpdate::Replace { category, .. } => {
            category.as_str()
        }
        SignalUpdate::Regime(_) => "regime",
        SignalUpdate::Connection(_) => "connection",
        SignalUpdate::Hydrate(inner) => update_label(inner),
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    extract::first_present(record, keys)
}

fn require_object<'a>(kind: &str, record: &'a Value) -> FeedResult<&'a Value> {
    if record.is_object() {
        Ok(record)
    } else {
        Err(FeedError::malformed(kind, "record is not an object"))
    }
}

fn require_symbol(kind: &str, record: &Value) -> FeedResult<String> {
    coerce_string(field(record, SYMBOL_KEYS))
        .ok_or_else(|| FeedError::malformed(kind, "missing symbol"))
}

fn timestamp(record: &Value) -> i64 {
    coerce_timestamp_ms(field(record, TIMESTAMP_KEYS)).unwrap_or_else(now_ms)
}

fn interval(record: &Value) -> String {
    coerce_string(field(record, INTERVAL_KEYS)).unwrap_or_default()
}

fn parse_volatility(kind: &str, record: &Value) -> FeedResult<VolatilitySignal> {
    let record = require_object(kind, record)?;
    Ok(VolatilitySignal {
        symbol: require_symbol(kind, record)?,
        timestamp: timestamp(record),
        open: coerce_f64(field(record, &["open", "o"])),
        high: coerce_f64(field(record, &["high", "h"])),
        low: coerce_f64(field(record, &["low", "l"])),
        close: coerce_f64(field(record, &["close", "c"])),
        volatility: coerce_f64(field(record, &["volatility", "vol"])),
        interval: interval(record),
        range: coerce_opt_f64(field(record, &["range"])),
        avg_range: coerce_opt_f64(field(record, &["avgRange", "avg_range"])),
    })
}

fn parse_volume(kind: &str, record: &Value) -> FeedResult<VolumeSignal> {
    let record = require_object(kind, record)?;
    Ok(VolumeSignal {
        symbol: require_symbol(kind, record)?,
        timestamp: timestamp(record),
        volume: coerce_f64(field(record, &["volume", "v"])),
        interval: interval(record),
    })
}

fn parse_price_change(kind: &str, record: &Value) -> FeedResult<PriceChangeSignal> {
    let record = require_object(kind, record)?;
    Ok(PriceChangeSignal {
        symbol: require_symbol(kind, record)?,
        timestamp: timestamp(record),
        price_change: coerce_f64(field(record, &["priceChange", "price_change"])),
        price_change_percent: coerce_f64(field(
            record,
            &["priceChangePercent", "price_change_percent", "changePercent"],
        )),
        interval: interval(record),
    })
}

fn parse_regime_alert(kind: &str, record: &Value) -> FeedResult<RegimeAlert> {
    let record = require_object(kind, record)?;
    let regime = coerce_string(field(record, &["regime", "state", "to"]))
        .ok_or_else(|| FeedError::malformed(kind, "missing regime"))?;
    Ok(RegimeAlert {
        symbol: coerce_string(field(record, SYMBOL_KEYS)),
        regime,
        previous: coerce_string(field(record, &["previous", "from"])),
        message: coerce_string(field(record, &["message", "msg"])),
        timestamp: timestamp(record),
    })
}

/// One gainers/losers entry; entries without a symbol are skipped.
fn parse_mover(entry: &Value) -> Option<TimeframeCoin> {
    let symbol = coerce_string(field(entry, MOVER_SYMBOL_KEYS))?;
    Some(TimeframeCoin {
        symbol,
        change: coerce_string(field(entry, &["change", "priceChangePercent"])).unwrap_or_default(),
        value: coerce_opt_f64(field(entry, &["value", "price", "lastPrice"])),
        volume: coerce_opt_f64(field(entry, &["volume"])),
    })
}

fn parse_funding(entry: &Value) -> Option<FundingRate> {
    let symbol = coerce_string(field(entry, MOVER_SYMBOL_KEYS))?;
    Some(FundingRate {
        symbol,
        rate: coerce_f64(field(entry, &["rate", "fundingRate", "funding"])),
        next_funding_time: coerce_timestamp_ms(field(
            entry,
            &["nextFundingTime", "next_funding_time"],
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sigdesk_core::Regime;

    fn normalize(kind: &str, body: Value) -> FeedResult<Option<SignalUpdate>> {
        IngestionAdapter::normalize(&InboundPayload::from_event(kind, body))
    }

    #[test]
    fn test_routing_table() {
        assert_eq!(
            EventKind::from_name("signal:volatility").and_then(|k| k.category()),
            Some(SignalCategory::VolatilitySpikes)
        );
        assert_eq!(
            EventKind::from_name("volatilityRange"),
            EventKind::from_name("signal:volatilityRange")
        );
        assert_eq!(EventKind::from_name("regime").unwrap().category(), None);
        assert_eq!(EventKind::from_name("orderflow:delta"), None);
    }

    #[test]
    fn test_top_gainers_payload_and_coins_normalize_the_same() {
        let coins = json!([
            {"symbol": "SOLUSDT", "change": "+8.20%", "value": 142.1},
            {"coin": "DOGEUSDT", "change": "+5.10%", "volume": "1200000"}
        ]);
        let via_payload = normalize("top:gainers", json!({"payload": coins.clone()})).unwrap();
        let via_coins = normalize("top:gainers", json!({"coins": coins.clone()})).unwrap();
        let via_bare = normalize("top:gainers", coins).unwrap();
        assert_eq!(via_payload, via_coins);
        assert_eq!(via_coins, via_bare);

        let Some(SignalUpdate::Replace { category, signals }) = via_payload else {
            panic!("expected replace");
        };
        assert_eq!(category, SignalCategory::TopGainers);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1].symbol(), "DOGEUSDT");
    }

    #[test]
    fn test_top_gainers_payload_preferred_over_coins() {
        let body = json!({
            "payload": [{"symbol": "FROMPAYLOAD", "change": "+1%"}],
            "coins": [{"symbol": "FROMCOINS", "change": "+2%"}]
        });
        let Some(SignalUpdate::Replace { signals, .. }) = normalize("top:gainers", body).unwrap()
        else {
            panic!("expected replace");
        };
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].symbol(), "FROMPAYLOAD");
    }

    #[test]
    fn test_top_losers_without_list_is_malformed() {
        assert!(matches!(
            normalize("top:losers", json!({"items": []})),
            Err(FeedError::Malformed { .. })
        ));
    }

    #[test]
    fn test_snapshot_categories_replace_and_streams_push() {
        let list = json!([{"symbol": "BTCUSDT", "change": "+1%", "rate": 0.0001}]);
        let record = json!({"symbol": "BTCUSDT", "volume": 1, "priceChange": 1.0});

        for name in ["top:gainers", "top:losers", "funding", "volumeSpike", "priceChange"] {
            let kind = EventKind::from_name(name).unwrap();
            let category = kind.category().unwrap();
            let body = if category.is_snapshot() { &list } else { &record };
            let update = normalize(name, body.clone()).unwrap().unwrap();
            match update {
                SignalUpdate::Replace { category: got, .. } => {
                    assert!(category.is_snapshot(), "{name} replaced");
                    assert_eq!(got, category);
                }
                SignalUpdate::Push { category: got, .. } => {
                    assert!(!category.is_snapshot(), "{name} pushed");
                    assert_eq!(got, category);
                }
                other => panic!("unexpected update for {name}: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_ingest_snapshot_marks_update_as_hydrated() {
        let (tx, mut rx) = mpsc::channel(8);
        let adapter = IngestionAdapter::new(tx);

        adapter
            .ingest_snapshot(InboundPayload::from_event("regime", json!("squeeze")))
            .await;

        let Some(SignalUpdate::Hydrate(inner)) = rx.recv().await else {
            panic!("expected hydrated update");
        };
        assert!(matches!(*inner, SignalUpdate::Regime(_)));
        assert_eq!(update_label(&SignalUpdate::Hydrate(inner)), "regime");
        assert_eq!(adapter.stats().ingested(), 1);
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        assert_eq!(normalize("orderflow:delta", json!({"x": 1})).unwrap(), None);
    }

    #[test]
    fn test_regime_normalization() {
        let Some(SignalUpdate::Regime(state)) = normalize("regime", json!("trending_bull")).unwrap()
        else {
            panic!("expected regime");
        };
        assert_eq!(state.regime, Some(Regime::TrendingBull));

        let Some(SignalUpdate::Regime(state)) =
            normalize("regime", json!({"regime": "sideways"})).unwrap()
        else {
            panic!("expected regime");
        };
        assert_eq!(state.raw, "sideways");
        assert_eq!(state.regime, None);

        assert!(normalize("regime", json!({"foo": 1})).is_err());
    }

    #[test]
    fn test_volatility_preserves_numbers_and_coerces_strings() {
        let body = json!({
            "payload": {
                "symbol": "BTCUSDT",
                "timestamp": 1_700_000_000_000_i64,
                "open": 42000.5,
                "high": "42100.25",
                "low": 41900,
                "close": 42050.125,
                "volatility": 0.0123456789,
                "interval": "5m",
                "avgRange": "150.5"
            }
        });
        let Some(SignalUpdate::Push { category, signal }) =
            normalize("signal:volatility", body).unwrap()
        else {
            panic!("expected push");
        };
        assert_eq!(category, SignalCategory::VolatilitySpikes);
        let Signal::Volatility(v) = signal else {
            panic!("expected volatility");
        };
        assert_eq!(v.timestamp, 1_700_000_000_000);
        assert_eq!(v.open, 42000.5);
        assert_eq!(v.high, 42100.25);
        assert_eq!(v.volatility, 0.0123456789);
        assert_eq!(v.avg_range, Some(150.5));
        assert_eq!(v.range, None);
    }

    #[test]
    fn test_missing_numbers_become_nan_and_missing_timestamp_defaults() {
        let before = now_ms();
        let Some(SignalUpdate::Push { signal, .. }) =
            normalize("volumeSpike", json!({"symbol": "ETHUSDT", "volume": "n/a"})).unwrap()
        else {
            panic!("expected push");
        };
        let Signal::Volume(v) = signal else {
            panic!("expected volume");
        };
        assert!(v.volume.is_nan());
        assert!(v.timestamp >= before);
    }

    #[test]
    fn test_record_without_symbol_is_malformed() {
        assert!(normalize("priceChange", json!({"priceChange": 1.0})).is_err());
        assert!(normalize("volumeSpike", json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_from_object_uses_type() {
        let payload = InboundPayload::from_object(json!({
            "type": "volatilityRange",
            "symbol": "XRPUSDT",
            "range": 0.02
        }))
        .unwrap();
        assert_eq!(payload.kind, "volatilityRange");
        let Some(SignalUpdate::Push { category, .. }) =
            IngestionAdapter::normalize(&payload).unwrap()
        else {
            panic!("expected push");
        };
        assert_eq!(category, SignalCategory::VolatilityRanges);

        assert!(matches!(
            InboundPayload::from_object(json!({"symbol": "X"})),
            Err(FeedError::MissingType)
        ));
    }

    #[tokio::test]
    async fn test_ingest_counts_drops() {
        let (tx, mut rx) = mpsc::channel(8);
        let adapter = IngestionAdapter::new(tx);

        adapter
            .ingest(InboundPayload::from_event("mystery", json!({})))
            .await;
        adapter
            .ingest(InboundPayload::from_event("volumeSpike", json!("bad")))
            .await;
        adapter
            .ingest(InboundPayload::from_event(
                "volumeSpike",
                json!({"symbol": "BTCUSDT", "volume": 10}),
            ))
            .await;

        let stats = adapter.stats();
        assert_eq!(stats.dropped_unknown(), 1);
        assert_eq!(stats.dropped_malformed(), 1);
        assert_eq!(stats.ingested(), 1);
        assert!(matches!(rx.recv().await, Some(SignalUpdate::Push { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_socket_lifecycle_becomes_connection_updates() {
        let (tx, mut rx) = mpsc::channel(8);
        let adapter = IngestionAdapter::new(tx);

        adapter
            .handle_socket_event(SocketEvent::Connect { sid: "s".into() })
            .await;
        adapter
            .handle_socket_event(SocketEvent::ConnectError {
                message: "refused".into(),
            })
            .await;

        assert_eq!(
            rx.recv().await,
            Some(SignalUpdate::Connection(ConnectionStatus::Connected))
        );
        assert_eq!(
            rx.recv().await,
            Some(SignalUpdate::Connection(ConnectionStatus::Error(
                "refused".into()
            )))
        );
    }

    #[tokio::test]
    async fn test_closed_channel_is_counted() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let adapter = IngestionAdapter::new(tx);
        adapter
            .ingest(InboundPayload::from_event("regime", json!("range")))
            .await;
        assert_eq!(adapter.stats().dropped_closed(), 1);
        assert_eq!(adapter.stats().ingested(), 0);
    }
}
