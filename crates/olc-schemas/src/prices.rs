//! Integer-micros amounts and prices.
//!
//! Amounts and prices inside the coordinator are `i64` micros
//! (1 unit = 1_000_000 micros). Venues speak decimal numbers, so `f64` only
//! appears where a request is built from caller input or an update is parsed
//! from the wire:
//!
//! | Direction            | Function            |
//! |----------------------|---------------------|
//! | internal → venue     | [`micros_to_price`] |
//! | venue/caller → internal | [`price_to_micros`] |

use thiserror::Error;

/// Scale factor: 1 unit = 1_000_000 micros (6 decimal places).
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Input to [`price_to_micros`] that has no `i64` micros representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PricingError {
    /// `NaN` or infinite.
    #[error("price_to_micros: non-finite input (NaN or Inf)")]
    NotFinite,
    /// Overflows `i64` once scaled by [`MICROS_PER_UNIT`].
    #[error("price_to_micros: value out of i64 range after scaling")]
    OutOfRange,
}

/// Micros → `f64`, for serialising towards the venue.
pub fn micros_to_price(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_UNIT as f64
}

/// `f64` → micros, rounded to the nearest micro.
///
/// # Errors
/// [`PricingError::NotFinite`] for `NaN`/`Inf`, [`PricingError::OutOfRange`]
/// when the scaled value does not fit an `i64`.
pub fn price_to_micros(price: f64) -> Result<i64, PricingError> {
    if !price.is_finite() {
        return Err(PricingError::NotFinite);
    }
    let scaled = price * MICROS_PER_UNIT as f64;
    // `as` saturates silently; reject instead.
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(PricingError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}
