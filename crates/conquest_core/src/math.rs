//! Fixed-point and integer helpers for deterministic resolution.
//!
//! Power, gold and experience are integers. Rates, ratios and
//! probabilities are fixed-point fractions so every platform rounds the
//! same way.

use fixed::types::I32F32;

/// Fixed-point number type for all fractional engine math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Largest ratio [`ratio`] will return before saturating.
const RATIO_LIMIT: i64 = i32::MAX as i64;

/// `num / den` as a fixed-point value, computed exactly on the raw bits.
///
/// Saturates at about 2^31 and returns [`Fixed::MAX`] when `den` is zero
/// and `num` is not.
#[must_use]
pub fn ratio(num: u64, den: u64) -> Fixed {
    if num == 0 {
        return Fixed::ZERO;
    }
    if den == 0 {
        return Fixed::MAX;
    }
    let bits = (u128::from(num) << 32) / u128::from(den);
    if bits >= (RATIO_LIMIT as u128) << 32 {
        Fixed::MAX
    } else {
        Fixed::from_bits(bits as i64)
    }
}

/// Basis points as a fixed-point fraction (`2_500` -> `0.25`).
#[must_use]
pub fn basis_points(bp: u32) -> Fixed {
    Fixed::from_num(bp) / Fixed::from_num(10_000)
}

/// Multiply an integer by a non-negative fraction, rounding down.
///
/// Negative fractions yield zero. The product saturates at `u64::MAX`.
#[must_use]
pub fn scale(value: u64, factor: Fixed) -> u64 {
    if factor <= Fixed::ZERO {
        return 0;
    }
    let product = (u128::from(value) * factor.to_bits() as u128) >> 32;
    u64::try_from(product).unwrap_or(u64::MAX)
}

/// Apply a percentage bonus: `value * (100 + pct) / 100`, rounding down.
#[must_use]
pub fn apply_bonus(value: u64, pct: u32) -> u64 {
    let product = u128::from(value) * (100 + u128::from(pct)) / 100;
    u64::try_from(product).unwrap_or(u64::MAX)
}

/// Apply basis points: `value * bp / 10_000`, rounding down.
#[must_use]
pub fn apply_basis_points(value: u64, bp: u32) -> u64 {
    let product = u128::from(value) * u128::from(bp) / 10_000;
    u64::try_from(product).unwrap_or(u64::MAX)
}

/// Compare `a_num / a_den` against `b_num / b_den` without division.
///
/// A zero denominator is treated as a zero fraction.
#[must_use]
pub fn cmp_fractions(a_num: u64, a_den: u64, b_num: u64, b_den: u64) -> std::cmp::Ordering {
    let a = if a_den == 0 { 0 } else { u128::from(a_num) * u128::from(b_den.max(1)) };
    let b = if b_den == 0 { 0 } else { u128::from(b_num) * u128::from(a_den.max(1)) };
    a.cmp(&b)
}
