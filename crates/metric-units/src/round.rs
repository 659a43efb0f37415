//! Decimal rounding helpers.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::DECIMAL_PLACES;

/// Guard and round a value to [`DECIMAL_PLACES`] decimals.
///
/// `NaN` and `±Inf` collapse to `0`.
pub fn unit_conversion(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    round_half_even(value, DECIMAL_PLACES)
}

/// Round `value` to `places` decimals using half-even rounding.
///
/// Rounding is done on the shortest decimal representation of the value
/// rather than on its binary form, so `2.675` rounds to `2.68` even though
/// the nearest `f64` is slightly below it.
pub fn round_half_even(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    match Decimal::from_str(&value.to_string()) {
        Ok(decimal) => {
            let rounded = decimal.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven);
            if rounded.is_zero() {
                0.0
            } else {
                // Parsing the text keeps the result identical to the literal.
                rounded.to_string().parse().unwrap_or(value)
            }
        }
        // Outside the 96-bit range: far too large to carry a fraction, or too
        // small to survive rounding.
        Err(_) if value.abs() < 1.0 => 0.0,
        Err(_) => value,
    }
}
