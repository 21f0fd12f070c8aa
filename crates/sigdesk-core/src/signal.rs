//! Signal records and the categories they are buffered under.

use crate::error::CoreError;
use crate::numeric::display_number;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// Concrete signal variants
// ============================================================================

/// Volatility spike or volatility range record (candle + volatility measure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilitySignal {
    pub symbol: String,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volatility: f64,
    pub interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_range: Option<f64>,
}

/// Volume spike record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSignal {
    pub symbol: String,
    pub timestamp: i64,
    pub volume: f64,
    pub interval: String,
}

/// Price change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceChangeSignal {
    pub symbol: String,
    pub timestamp: i64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub interval: String,
}

/// Ranked entry of a gainers/losers list.
///
/// `change` stays a string: upstream formats it ("+4.21%") and the ranking
/// is already applied by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeCoin {
    pub symbol: String,
    pub change: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Funding rate entry from the REST snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRate {
    pub symbol: String,
    pub rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_funding_time: Option<i64>,
}

/// Regime transition alert pushed on `regime:alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub regime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: i64,
}

/// Any record that can live in a category buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Signal {
    Volatility(VolatilitySignal),
    Volume(VolumeSignal),
    PriceChange(PriceChangeSignal),
    Mover(TimeframeCoin),
    Funding(FundingRate),
    RegimeAlert(RegimeAlert),
}

impl Signal {
    /// Symbol of the record, empty for symbol-less regime alerts.
    pub fn symbol(&self) -> &str {
        match self {
            Self::Volatility(s) => &s.symbol,
            Self::Volume(s) => &s.symbol,
            Self::PriceChange(s) => &s.symbol,
            Self::Mover(c) => &c.symbol,
            Self::Funding(f) => &f.symbol,
            Self::RegimeAlert(a) => a.symbol.as_deref().unwrap_or(""),
        }
    }

    /// Event time in ms. Snapshot entries (movers, funding) carry none.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Self::Volatility(s) => Some(s.timestamp),
            Self::Volume(s) => Some(s.timestamp),
            Self::PriceChange(s) => Some(s.timestamp),
            Self::RegimeAlert(a) => Some(a.timestamp),
            Self::Mover(_) | Self::Funding(_) => None,
        }
    }

    /// Copy with every non-finite number shown as `0`. The stored record keeps
    /// its `NaN`s.
    pub fn for_display(&self) -> Signal {
        let mut out = self.clone();
        match &mut out {
            Self::Volatility(s) => {
                for v in [&mut s.open, &mut s.high, &mut s.low, &mut s.close, &mut s.volatility] {
                    *v = display_number(*v);
                }
                s.range = s.range.map(display_number);
                s.avg_range = s.avg_range.map(display_number);
            }
            Self::Volume(s) => s.volume = display_number(s.volume),
            Self::PriceChange(s) => {
                s.price_change = display_number(s.price_change);
                s.price_change_percent = display_number(s.price_change_percent);
            }
            Self::Mover(c) => {
                c.value = c.value.map(display_number);
                c.volume = c.volume.map(display_number);
            }
            Self::Funding(f) => f.rate = display_number(f.rate),
            Self::RegimeAlert(_) => {}
        }
        out
    }

    /// Gate tag of this record.
    pub fn type_filter(&self) -> SignalTypeFilter {
        match self {
            Self::Volatility(_) => SignalTypeFilter::Volatility,
            Self::Volume(_) => SignalTypeFilter::VolumeSpike,
            Self::PriceChange(_) => SignalTypeFilter::Other("priceChange".to_string()),
            Self::Mover(_) => SignalTypeFilter::Other("topMover".to_string()),
            Self::Funding(_) => SignalTypeFilter::Other("funding".to_string()),
            Self::RegimeAlert(_) => SignalTypeFilter::Other("regime:alert".to_string()),
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

/// Key of a bounded live buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    VolatilitySpikes,
    VolatilityRanges,
    VolumeSpikes,
    PriceChanges,
    TopGainers,
    TopLosers,
    Funding,
    RegimeAlerts,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 8] = [
        SignalCategory::VolatilitySpikes,
        SignalCategory::VolatilityRanges,
        SignalCategory::VolumeSpikes,
        SignalCategory::PriceChanges,
        SignalCategory::TopGainers,
        SignalCategory::TopLosers,
        SignalCategory::Funding,
        SignalCategory::RegimeAlerts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VolatilitySpikes => "volatility_spikes",
            Self::VolatilityRanges => "volatility_ranges",
            Self::VolumeSpikes => "volume_spikes",
            Self::PriceChanges => "price_changes",
            Self::TopGainers => "top_gainers",
            Self::TopLosers => "top_losers",
            Self::Funding => "funding",
            Self::RegimeAlerts => "regime_alerts",
        }
    }

    /// Snapshot categories are replaced wholesale; the others are append-only.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::TopGainers | Self::TopLosers | Self::Funding)
    }
}

impl FromStr for SignalCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Gate projection
// ============================================================================

/// Trade direction of a structural signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl FromStr for Side {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Self::Long),
            "short" | "sell" => Ok(Self::Short),
            _ => Err(CoreError::InvalidSide(s.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => f.write_str("long"),
            Self::Short => f.write_str("short"),
        }
    }
}

/// Signal type tag as seen by the regime gate.
///
/// FVG / OB / breaker / SMT are opaque structural pattern tags; their
/// detection happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalTypeFilter {
    Fvg,
    Ob,
    Breaker,
    VolumeSpike,
    Volatility,
    Smt,
    Other(String),
}

impl SignalTypeFilter {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fvg => "fvg",
            Self::Ob => "ob",
            Self::Breaker => "breaker",
            Self::VolumeSpike => "volumeSpike",
            Self::Volatility => "volatility",
            Self::Smt => "smt",
            Self::Other(s) => s,
        }
    }

    /// Directional structural patterns (fair-value gap, order block, breaker).
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Fvg | Self::Ob | Self::Breaker)
    }
}

impl From<&str> for SignalTypeFilter {
    fn from(s: &str) -> Self {
        match s {
            "fvg" => Self::Fvg,
            "ob" => Self::Ob,
            "breaker" => Self::Breaker,
            "volumeSpike" => Self::VolumeSpike,
            "volatility" => Self::Volatility,
            "smt" => Self::Smt,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for SignalTypeFilter {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<SignalTypeFilter> for String {
    fn from(t: SignalTypeFilter) -> Self {
        match t {
            SignalTypeFilter::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Reduced projection of a signal used only for allow/deny decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterableSignal {
    #[serde(rename = "type")]
    pub signal_type: SignalTypeFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl FilterableSignal {
    pub fn new(signal_type: impl Into<SignalTypeFilter>) -> Self {
        Self {
            signal_type: signal_type.into(),
            side: None,
            symbol: None,
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

/// Anything the regime gate can judge.
pub trait Filterable {
    fn signal_type(&self) -> SignalTypeFilter;

    fn side(&self) -> Option<Side> {
        None
    }
}

impl Filterable for FilterableSignal {
    fn signal_type(&self) -> SignalTypeFilter {
        self.signal_type.clone()
    }

    fn side(&self) -> Option<Side> {
        self.side
    }
}

impl Filterable for Signal {
    fn signal_type(&self) -> SignalTypeFilter {
        self.type_filter()
    }
}

impl<T: Filterable + ?Sized> Filterable for Arc<T> {
    fn signal_type(&self) -> SignalTypeFilter {
        (**self).signal_type()
    }

    fn side(&self) -> Option<Side> {
        (**self).side()
    }
}

// ============================================================================
// Connection status
// ============================================================================

/// Socket connection status as last reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        for category in SignalCategory::ALL {
            assert_eq!(category.as_str().parse::<SignalCategory>().unwrap(), category);
        }
        assert!("nope".parse::<SignalCategory>().is_err());
    }

    #[test]
    fn test_type_filter_from_str() {
        assert_eq!(SignalTypeFilter::from("fvg"), SignalTypeFilter::Fvg);
        assert_eq!(
            SignalTypeFilter::from("liquiditySweep"),
            SignalTypeFilter::Other("liquiditySweep".to_string())
        );
        assert!(SignalTypeFilter::Breaker.is_structural());
        assert!(!SignalTypeFilter::Smt.is_structural());
    }

    #[test]
    fn test_filterable_signal_deserializes() {
        let s: FilterableSignal =
            serde_json::from_str(r#"{"type":"ob","side":"short","symbol":"BTCUSDT"}"#).unwrap();
        assert_eq!(s.signal_type, SignalTypeFilter::Ob);
        assert_eq!(s.side, Some(Side::Short));
        assert_eq!(s.symbol.as_deref(), Some("BTCUSDT"));
    }

    #[test]
    fn test_side_aliases() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("short".parse::<Side>().unwrap(), Side::Short);
        assert!("flat".parse::<Side>().is_err());
    }

    #[test]
    fn test_signal_serializes_with_type_tag() {
        let signal = Signal::Volume(VolumeSignal {
            symbol: "ETHUSDT".to_string(),
            timestamp: 1,
            volume: 10.0,
            interval: "5m".to_string(),
        });
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "volume");
        assert_eq!(json["symbol"], "ETHUSDT");
        assert_eq!(signal.type_filter(), SignalTypeFilter::VolumeSpike);
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let signal = VolumeSignal {
            symbol: "X".to_string(),
            timestamp: 1,
            volume: f64::NAN,
            interval: "1m".to_string(),
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert!(json["volume"].is_null());
    }

    #[test]
    fn test_for_display_zeroes_non_finite_numbers() {
        let stored = Signal::Volatility(VolatilitySignal {
            symbol: "BTCUSDT".to_string(),
            timestamp: 1,
            open: f64::NAN,
            high: 2.0,
            low: f64::NEG_INFINITY,
            close: 1.5,
            volatility: 0.1,
            interval: "1h".to_string(),
            range: Some(f64::NAN),
            avg_range: None,
        });

        let Signal::Volatility(shown) = stored.for_display() else {
            panic!("expected volatility");
        };
        assert_eq!(shown.open, 0.0);
        assert_eq!(shown.low, 0.0);
        assert_eq!(shown.high, 2.0);
        assert_eq!(shown.range, Some(0.0));
        assert_eq!(shown.avg_range, None);

        let Signal::Volatility(original) = &stored else {
            unreachable!()
        };
        assert!(original.open.is_nan());
    }
}
