//! Ordered field probing over loosely shaped JSON payloads.
//!
//! Producers wrap the same record in different envelopes (`{payload: [...]}`,
//! `{coins: [...]}`, a bare array, `{data: {...}}`). Each lookup is an explicit
//! candidate list tried in order; the first key that is present and not
//! `null` wins.

use serde_json::Value;

/// Envelope keys of a gainers/losers list, before falling back to a bare array.
pub const MOVER_LIST_KEYS: &[&str] = &["payload", "coins"];
/// Symbol keys of a gainers/losers entry.
pub const MOVER_SYMBOL_KEYS: &[&str] = &["symbol", "coin"];
/// Envelope keys of a single signal record, before falling back to the body.
pub const RECORD_KEYS: &[&str] = &["payload", "data"];
/// Keys carrying the regime value when the body is not a bare string.
pub const REGIME_KEYS: &[&str] = &["regime", "state"];

pub const SYMBOL_KEYS: &[&str] = &["symbol", "coin", "s"];
pub const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "ts", "t"];
pub const INTERVAL_KEYS: &[&str] = &["interval", "timeframe", "tf"];

/// First candidate key that is present and not `null`.
pub fn first_present<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = body.as_object()?;
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

/// Locate the entries of a gainers/losers list.
///
/// `None` when no candidate yields an array.
pub fn mover_list(body: &Value) -> Option<&Vec<Value>> {
    match first_present(body, MOVER_LIST_KEYS) {
        Some(list) => list.as_array(),
        None => body.as_array(),
    }
}

/// Unwrap a single signal record from its envelope.
pub fn record(body: &Value) -> &Value {
    first_present(body, RECORD_KEYS)
        .filter(|inner| inner.is_object())
        .unwrap_or(body)
}

/// Extract the regime string.
pub fn regime_value(body: &Value) -> Option<&str> {
    match body {
        Value::String(s) => Some(s.as_str()),
        other => first_present(other, REGIME_KEYS).and_then(Value::as_str),
    }
}
