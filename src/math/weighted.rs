//! Weighted-pool (Balancer-style) quoting.
//!
//! out = reserve_out * (1 - (reserve_in / (reserve_in + in*(1-fee)))^(w_in/w_out))
//!
//! The fractional power runs in `rust_decimal` (28 significant digits), the
//! only kernel that leaves pure integer space. Inputs are down-scaled by a
//! power of ten first so they fit the decimal mantissa; the result is scaled
//! back before returning, so amounts crossing the boundary stay integers.

use alloy::primitives::U256;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps};

use super::{narrow, widen, MathError, BPS};

/// Largest magnitude fed to the decimal kernel; anything bigger is
/// down-scaled by powers of ten first.
fn decimal_cap() -> U256 {
    U256::from(10u64).pow(U256::from(24u64))
}

/// Down-scale factor (a power of ten) so `value <= 1e24`.
fn scale_divisor(value: U256) -> U256 {
    let cap = decimal_cap();
    let mut divisor = U256::from(1u64);
    let ten = U256::from(10u64);
    let mut v = value;
    while v > cap {
        v /= ten;
        divisor *= ten;
    }
    divisor
}

fn to_decimal(value: U256) -> Result<Decimal, MathError> {
    let as_u128 = u128::try_from(value).map_err(|_| MathError::Overflow)?;
    // u128 -> Decimal fails above 28 digits; values here are pre-scaled.
    Decimal::from_u128(as_u128).ok_or(MathError::Overflow)
}

/// Output amount for a two-sided weighted swap, fee on the input side.
pub fn swap_output(
    reserve_in: U256,
    reserve_out: U256,
    weight_in: Decimal,
    weight_out: Decimal,
    fee_bps: u32,
    amount_in: U256,
) -> Result<U256, MathError> {
    if fee_bps > BPS {
        return Err(MathError::DomainError);
    }
    if weight_in <= Decimal::ZERO || weight_out <= Decimal::ZERO {
        return Err(MathError::UnsupportedPool);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    if amount_in.is_zero() {
        return Ok(U256::ZERO);
    }

    let divisor = scale_divisor(reserve_in.max(reserve_out).max(amount_in));
    let r_in = to_decimal(reserve_in / divisor)?;
    let r_out = to_decimal(reserve_out / divisor)?;
    let x = to_decimal(amount_in / divisor)?;
    if r_in.is_zero() || x.is_zero() {
        // The trade vanished under down-scaling; it cannot move the pool.
        return Ok(U256::ZERO);
    }

    let fee_factor = Decimal::from(BPS - fee_bps) / Decimal::from(BPS);
    let x_eff = x * fee_factor;
    let base = r_in / (r_in + x_eff);
    let exponent = weight_in / weight_out;
    let ratio = base.powd(exponent);
    if ratio > Decimal::ONE || ratio < Decimal::ZERO {
        return Err(MathError::ConvergenceFailure);
    }
    let out_scaled = r_out * (Decimal::ONE - ratio);

    // Back to base units: truncate toward zero, then re-apply the scale.
    let out_u128 = out_scaled.trunc().to_u128().ok_or(MathError::Overflow)?;
    let out = narrow(widen(U256::from(out_u128)) * widen(divisor))?;
    if out >= reserve_out {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok(out)
}

/// Closed-form fee-adjusted spot price in 1e18 fixed point:
/// (reserve_out / w_out)^-1-normalized ratio, i.e.
/// reserve_out * w_in * (10000 - fee) / (reserve_in * w_out * 10000).
pub fn spot_price_fp18(
    reserve_in: U256,
    reserve_out: U256,
    weight_in: Decimal,
    weight_out: Decimal,
    fee_bps: u32,
) -> Result<U256, MathError> {
    if fee_bps > BPS {
        return Err(MathError::DomainError);
    }
    if reserve_in.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    let w_in = weight_fixed(weight_in)?;
    let w_out = weight_fixed(weight_out)?;
    if w_in.is_zero() || w_out.is_zero() {
        return Err(MathError::UnsupportedPool);
    }
    // num = Rout * wIn * (BPS - fee) * 1e18, den = Rin * wOut * BPS
    let num = widen(reserve_out) * widen(w_in) * widen(U256::from(BPS - fee_bps));
    let den = widen(reserve_in) * widen(w_out) * widen(U256::from(BPS));
    let scale = widen(super::fp18());
    narrow(num * scale / den)
}

/// Weight as an integer on a 1e9 grid.
fn weight_fixed(weight: Decimal) -> Result<U256, MathError> {
    if weight.is_sign_negative() {
        return Err(MathError::UnsupportedPool);
    }
    let scaled = (weight * Decimal::from(1_000_000_000u64)).trunc();
    let v = scaled.to_u128().ok_or(MathError::Overflow)?;
    Ok(U256::from(v))
}
