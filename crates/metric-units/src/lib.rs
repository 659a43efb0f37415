//! Normalization of raw performance counter samples.
//!
//! Counter values arrive as strings tagged with the unit label reported by the
//! management endpoint. This crate turns them into canonical `f64` values:
//! byte-like units are scaled to GiB/MiB-style figures, every result is
//! guarded against `NaN`/`Inf` and rounded to two decimals with half-even
//! rounding applied to the decimal representation of the value.

mod alias;
mod convert;
mod round;

pub use alias::transform_metric_alias;
pub use convert::{Unit, convert_metric_value};
pub use round::{round_half_even, unit_conversion};

/// Number of decimal places kept for every normalized value.
pub const DECIMAL_PLACES: u32 = 2;
