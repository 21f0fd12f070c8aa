//! Regime gate decision table.
//!
//! | Regime        | fvg/ob/breaker               | volumeSpike/volatility | smt     | other   |
//! |---------------|------------------------------|------------------------|---------|---------|
//! | trending_bull | only if side != short        | allowed                | allowed | allowed |
//! | trending_bear | only if side != long         | allowed                | allowed | allowed |
//! | squeeze       | blocked                      | allowed                | blocked | blocked |
//! | range         | fvg/ob blocked, breaker ok   | allowed                | allowed | allowed |
//! | expansion     | allowed                      | allowed                | allowed | allowed |
//! | none/unknown  | allowed                      | allowed                | allowed | allowed |

use serde::{Deserialize, Serialize};
use sigdesk_core::{Filterable, Regime, Side, SignalTypeFilter};
use std::borrow::Cow;

/// Result of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Signal is relevant under the regime.
    Allow,
    /// Signal is filtered, with a human-readable reason.
    Block(String),
}

impl GateDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }

    pub fn into_reason(self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::Block(reason) => Some(reason),
        }
    }
}

/// Evaluate a signal against a regime.
///
/// `None` stands for both "no regime received yet" and "regime string not
/// recognized"; both fail open.
pub fn evaluate<S: Filterable + ?Sized>(regime: Option<Regime>, signal: &S) -> GateDecision {
    let Some(regime) = regime else {
        return GateDecision::Allow;
    };

    let signal_type = signal.signal_type();
    let side = signal.side();

    match regime {
        Regime::TrendingBull => {
            if signal_type.is_structural() && side == Some(Side::Short) {
                return GateDecision::Block(format!(
                    "{} short against trending_bull regime",
                    signal_type.as_str()
                ));
            }
            GateDecision::Allow
        }
        Regime::TrendingBear => {
            if signal_type.is_structural() && side == Some(Side::Long) {
                return GateDecision::Block(format!(
                    "{} long against trending_bear regime",
                    signal_type.as_str()
                ));
            }
            GateDecision::Allow
        }
        Regime::Squeeze => match signal_type {
            SignalTypeFilter::VolumeSpike | SignalTypeFilter::Volatility => GateDecision::Allow,
            t if t.is_structural() => GateDecision::Block(format!(
                "{} unreliable in squeeze until breakout confirms",
                t.as_str()
            )),
            SignalTypeFilter::Smt => {
                GateDecision::Block("smt unreliable in squeeze until breakout confirms".to_string())
            }
            t => GateDecision::Block(format!(
                "squeeze only passes volume/volatility signals, got {}",
                t.as_str()
            )),
        },
        Regime::Range => match signal_type {
            SignalTypeFilter::Fvg | SignalTypeFilter::Ob => GateDecision::Block(format!(
                "{} breakout distrusted in range regime",
                signal_type.as_str()
            )),
            _ => GateDecision::Allow,
        },
        Regime::Expansion => GateDecision::Allow,
    }
}

/// Whether the signal is allowed under the regime.
pub fn allow<S: Filterable + ?Sized>(regime: Option<Regime>, signal: &S) -> bool {
    evaluate(regime, signal).is_allow()
}

/// Why the signal is blocked, `None` when allowed.
pub fn reason<S: Filterable + ?Sized>(regime: Option<Regime>, signal: &S) -> Option<String> {
    evaluate(regime, signal).into_reason()
}

/// Keep only signals allowed under the regime.
///
/// Without a regime the input slice is returned borrowed, untouched.
pub fn filter_signals_by_regime<T>(signals: &[T], regime: Option<Regime>) -> Cow<'_, [T]>
where
    T: Filterable + Clone,
{
    if regime.is_none() {
        return Cow::Borrowed(signals);
    }
    Cow::Owned(
        signals
            .iter()
            .filter(|s| allow(regime, *s))
            .cloned()
            .collect(),
    )
}

/// Counts of allowed/filtered signals under a regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    pub total: usize,
    pub allowed: usize,
    pub filtered: usize,
    /// Share of filtered signals in percent, rounded to 2 decimals.
    pub percentage: f64,
}

/// Compute filter statistics for a slice of signals.
pub fn get_filter_stats<T: Filterable>(signals: &[T], regime: Option<Regime>) -> FilterStats {
    let total = signals.len();
    if regime.is_none() || total == 0 {
        return FilterStats {
            total,
            allowed: total,
            filtered: 0,
            percentage: 0.0,
        };
    }

    let allowed = signals.iter().filter(|s| allow(regime, *s)).count();
    let filtered = total - allowed;
    let percentage = round2(filtered as f64 / total as f64 * 100.0);

    FilterStats {
        total,
        allowed,
        filtered,
        percentage,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
