//! Fixed-Point Math for Moneyp Protocol
//!
//! All quantities are unsigned 18-decimal wads held in `u128`. Products that
//! can exceed `u128` go through a 256-bit intermediate.

use primitive_types::U256;

use crate::constants::{precision, time};
use crate::errors::{MoneypError, MoneypResult};

const DECIMAL_PRECISION: u128 = precision::DECIMAL_PRECISION;
const HALF_PRECISION: u128 = DECIMAL_PRECISION / 2;

fn to_u128(value: U256) -> MoneypResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(MoneypError::Overflow);
    }
    Ok(value.low_u128())
}

/// `a * b / c`, floored, with a 256-bit intermediate product
pub fn mul_div(a: u128, b: u128, c: u128) -> MoneypResult<u128> {
    if c == 0 {
        return Err(MoneypError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    to_u128(product / U256::from(c))
}

/// `(a * b + carry) / c` and its remainder, with a 256-bit numerator.
///
/// Used by reward-per-unit updates that feed the remainder back in as the
/// next `carry`, so nothing is lost to truncation across calls.
pub fn mul_add_div_rem(a: u128, b: u128, carry: u128, c: u128) -> MoneypResult<(u128, u128)> {
    if c == 0 {
        return Err(MoneypError::DivisionByZero);
    }
    let numerator = U256::from(a) * U256::from(b) + U256::from(carry);
    let divisor = U256::from(c);
    let quotient = numerator / divisor;
    let remainder = numerator - quotient * divisor;
    Ok((to_u128(quotient)?, remainder.low_u128()))
}

/// Wad multiplication rounded half up: `(x * y + 0.5e18) / 1e18`
pub fn dec_mul(x: u128, y: u128) -> MoneypResult<u128> {
    let product = U256::from(x) * U256::from(y) + U256::from(HALF_PRECISION);
    to_u128(product / U256::from(DECIMAL_PRECISION))
}

/// `base ^ minutes` for a wad base, by repeated squaring.
///
/// The exponent is capped at [`time::MAX_DECAY_MINUTES`] so the loop stays
/// bounded no matter how long the system was idle.
pub fn dec_pow(base: u128, minutes: u64) -> MoneypResult<u128> {
    let mut n = minutes.min(time::MAX_DECAY_MINUTES);
    if n == 0 {
        return Ok(DECIMAL_PRECISION);
    }

    let mut x = base;
    let mut y = DECIMAL_PRECISION;
    while n > 1 {
        if n % 2 == 1 {
            y = dec_mul(x, y)?;
        }
        x = dec_mul(x, x)?;
        n /= 2;
    }
    dec_mul(x, y)
}

/// Collateral ratio in wads: `coll * price / debt`
///
/// Zero debt yields `u128::MAX` (infinite ratio).
pub fn compute_cr(coll: u128, debt: u128, price: u128) -> MoneypResult<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    mul_div(coll, price, debt)
}

/// Nominal collateral ratio: `coll * 1e20 / debt`, price independent
pub fn compute_nominal_cr(coll: u128, debt: u128) -> MoneypResult<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    mul_div(coll, precision::NICR_PRECISION, debt)
}

/// `amount * rate / 1e18`, floored
pub fn apply_rate(amount: u128, rate: u128) -> MoneypResult<u128> {
    mul_div(amount, rate, DECIMAL_PRECISION)
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> MoneypResult<u128> {
    a.checked_add(b).ok_or(MoneypError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> MoneypResult<u128> {
    a.checked_sub(b).ok_or(MoneypError::Underflow)
}
