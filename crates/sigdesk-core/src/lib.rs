//! Core domain types for the sigdesk live signal desk.
//!
//! This crate provides the data model shared by every other crate:
//! - `Signal` and its concrete variants (volatility, volume, price change, movers)
//! - `Regime` / `RegimeState`: externally supplied market classification
//! - `SignalCategory`: keys of the bounded live buffers
//! - `FilterableSignal`: the reduced projection consumed by the regime gate
//! - Tolerant numeric coercion for loosely typed JSON payloads

pub mod error;
pub mod numeric;
pub mod regime;
pub mod signal;

pub use error::{CoreError, Result};
pub use numeric::{coerce_f64, coerce_opt_f64, coerce_string, coerce_timestamp_ms, display_number};
pub use regime::{Regime, RegimeState};
pub use signal::{
    ConnectionStatus, Filterable, FilterableSignal, FundingRate, PriceChangeSignal, RegimeAlert,
    Side, Signal, SignalCategory, SignalTypeFilter, TimeframeCoin, VolatilitySignal, VolumeSignal,
};
