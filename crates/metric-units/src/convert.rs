//! Unit-driven conversion of raw counter values.

use crate::round::unit_conversion;

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;
const MIB_PER_GIB: f64 = 1024.0;

/// Multiplier applied to `num` counters.
const COUNT_FACTOR: f64 = 3.0;

/// Unit label reported alongside a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// `KB` or `kiloBytes`.
    Kilobytes,
    /// `MB`.
    Megabytes,
    /// `num`.
    Count,
    /// Anything else (percent, rates, ...).
    Other,
}

impl Unit {
    pub fn from_label(label: &str) -> Self {
        match label {
            "KB" | "kiloBytes" => Unit::Kilobytes,
            "MB" => Unit::Megabytes,
            "num" => Unit::Count,
            _ => Unit::Other,
        }
    }
}

/// Convert a raw counter value according to its unit label.
///
/// Byte-like units are parsed as integers and scaled down, `num` counters
/// are parsed as integers and tripled, everything else is parsed as a float.
/// Input that does not parse counts as `0`.
pub fn convert_metric_value(raw: &str, unit_label: &str) -> f64 {
    match Unit::from_label(unit_label) {
        Unit::Kilobytes => unit_conversion(parse_int(raw) as f64 / KIB_PER_GIB),
        Unit::Megabytes => unit_conversion(parse_int(raw) as f64 / MIB_PER_GIB),
        Unit::Count => guard(parse_int(raw) as f64 * COUNT_FACTOR),
        Unit::Other => unit_conversion(raw.trim().parse::<f64>().unwrap_or(0.0)),
    }
}

fn parse_int(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(0)
}

fn guard(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
