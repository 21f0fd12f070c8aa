//! Tolerant numeric coercion for loosely typed JSON payloads.
//!
//! Upstream producers are inconsistent: the same field arrives as a JSON number
//! from one emitter and as a decimal string from another. Stored records keep
//! whatever number the source supplied (no rounding, no string round-trip);
//! absent or unparseable values become `NaN` and only turn into `0` at display
//! time via [`display_number`].

use chrono::DateTime;
use serde_json::Value;

/// Coerce a JSON value into `f64`.
///
/// - number: returned as-is
/// - numeric string (surrounding whitespace allowed): parsed
/// - anything else, including absent: `NaN`
pub fn coerce_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Like [`coerce_f64`] but keeps "field absent" distinct from "field invalid".
pub fn coerce_opt_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => None,
        v => Some(coerce_f64(v)),
    }
}

/// Map non-finite values (`NaN`, `±inf`) to `0` for display.
pub fn display_number(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Coerce a JSON value into a string. Numbers are rendered, empty strings are absent.
pub fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a JSON value into a Unix timestamp in milliseconds.
///
/// Accepts integer/float milliseconds, numeric strings and RFC 3339 strings.
pub fn coerce_timestamp_ms(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Some(ms);
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }
        _ => None,
    }
}
