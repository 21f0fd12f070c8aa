//! Market regime classification.
//!
//! The regime is computed by an upstream service and pushed over the socket.
//! It is treated as opaque state here: no transition logic, only parsing.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market regime as classified upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Price oscillating inside a band.
    Range,
    /// Compressed volatility awaiting a breakout.
    Squeeze,
    /// Directional up-trend.
    TrendingBull,
    /// Directional down-trend.
    TrendingBear,
    /// Volatility expanding out of a range.
    Expansion,
}

impl Regime {
    pub const ALL: [Regime; 5] = [
        Regime::Range,
        Regime::Squeeze,
        Regime::TrendingBull,
        Regime::TrendingBear,
        Regime::Expansion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Squeeze => "squeeze",
            Self::TrendingBull => "trending_bull",
            Self::TrendingBear => "trending_bear",
            Self::Expansion => "expansion",
        }
    }

    /// Parse leniently: returns `None` for anything unrecognized.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromStr for Regime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "range" => Ok(Self::Range),
            "squeeze" => Ok(Self::Squeeze),
            "trending_bull" => Ok(Self::TrendingBull),
            "trending_bear" => Ok(Self::TrendingBear),
            "expansion" => Ok(Self::Expansion),
            _ => Err(CoreError::UnknownRegime(s.to_string())),
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last regime value received from upstream.
///
/// `raw` keeps the string exactly as received so unrecognized values can
/// still be displayed; `regime` is `None` when it did not parse, which makes
/// the gate fail open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeState {
    pub raw: String,
    pub regime: Option<Regime>,
    pub received_at_ms: i64,
    /// Set when the socket dropped after this value was received.
    #[serde(default)]
    pub stale: bool,
}

impl RegimeState {
    pub fn new(raw: impl Into<String>, received_at_ms: i64) -> Self {
        let raw = raw.into();
        let regime = Regime::parse_lenient(&raw);
        Self {
            raw,
            regime,
            received_at_ms,
            stale: false,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.regime.is_some()
    }
}
