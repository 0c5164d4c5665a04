//! Lenient scalar coercion for upstream JSON values
//!
//! Upstream feeds disagree on types: numbers arrive as strings, counts
//! arrive as lists, signal quality arrives as words. These helpers fold
//! all of that into the canonical numeric forms without ever erroring.

use serde_json::Value;

/// Numeric reading of a JSON value: numbers pass through, strings are
/// trimmed and parsed. Anything else is not a number.
pub(crate) fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Integer reading of a JSON value. Floats truncate toward zero, numeric
/// strings go through float parsing first ("12.9" is 12), and sequences
/// count their elements.
pub(crate) fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Array(items) => Some(items.len() as i64),
        _ => None,
    }
}

/// Float coercion with a fallback for absent or unusable values.
pub fn to_float(value: Option<&Value>, default: f64) -> f64 {
    value.and_then(float_of).unwrap_or(default)
}

/// Integer coercion with a fallback for absent or unusable values.
pub fn to_int(value: Option<&Value>, default: i64) -> i64 {
    value.and_then(int_of).unwrap_or(default)
}

/// Signal quality as a percentage. Numeric values pass through, the
/// conventional quality words map to fixed levels, and everything else
/// (including absence) reads as full strength.
pub fn to_signal_quality(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(100.0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "excellent" => 100.0,
            "good" => 75.0,
            "fair" => 50.0,
            "poor" => 25.0,
            "weak" => 10.0,
            _ => 100.0,
        },
        _ => 100.0,
    }
}
