//! Regime-based signal gate.
//!
//! Decides whether a signal is relevant under the current market regime:
//! - directional structural signals (fvg/ob/breaker) must agree with a trend
//! - squeeze only lets volume/volatility signals through
//! - range distrusts breakout-type signals (fvg/ob)
//! - an absent or unrecognized regime allows everything (fail-open)
//!
//! The gate is a pure function of `(regime, type, side)`.

pub mod gate;

pub use gate::{
    allow, evaluate, filter_signals_by_regime, get_filter_stats, reason, FilterStats,
    GateDecision,
};
