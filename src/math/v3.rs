//! Concentrated-liquidity (v3-style) quoting along the current tick.
//!
//! The kernel prices against `sqrt_price_x96` and in-range `liquidity` only.
//! It does not walk tick bitmaps: any swap whose sqrt-price move would leave
//! the current tick-spacing band is rejected as `InsufficientLiquidity`.
//! That cap is conservative on purpose — the real boundary may be closer,
//! and a rejected candidate costs nothing while a mispriced one costs money.

use alloy::primitives::{U256, U512};

use super::{fp18, narrow, widen, MathError, BPS};
use crate::types::V3Params;

/// Q96 = 2^96, the sqrt-price fixed-point scale.
fn q96() -> U256 {
    U256::from(1u64) << 96
}

/// One tick is sqrt(1.0001) ~ 1.00005 in sqrt-price space, i.e. 0.5 bps.
/// A band of `tick_spacing` ticks therefore allows spacing / 20000 relative
/// sqrt-price movement.
const SQRT_BPS_DENOM: u64 = 20_000;

fn check_domain(params: &V3Params, amount_in: U256) -> Result<(), MathError> {
    if amount_in.is_zero() {
        // Zero-size v3 quotes are undefined: there is no "current" execution
        // price without a direction-committed step.
        return Err(MathError::DomainError);
    }
    if params.sqrt_price_x96.is_zero() {
        return Err(MathError::DomainError);
    }
    if params.liquidity == 0 {
        return Err(MathError::InsufficientLiquidity);
    }
    // Bound magnitudes so every product below fits 512 bits.
    if params.sqrt_price_x96.bit_len() > 160 || amount_in.bit_len() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(())
}

fn amount_in_after_fee(amount_in: U256, fee_bps: u32) -> Result<U512, MathError> {
    if fee_bps > BPS {
        return Err(MathError::DomainError);
    }
    Ok(widen(amount_in) * widen(U256::from(BPS - fee_bps)) / widen(U256::from(BPS)))
}

/// sqrt price after pushing `amount_in` through, fee already charged on the
/// input side. `zero_for_one` means token0 in / token1 out (price falls).
pub fn sqrt_price_after(
    params: &V3Params,
    zero_for_one: bool,
    fee_bps: u32,
    amount_in: U256,
) -> Result<U256, MathError> {
    check_domain(params, amount_in)?;
    let sqrt_p = widen(params.sqrt_price_x96);
    let liquidity = widen(U256::from(params.liquidity));
    let x = amount_in_after_fee(amount_in, fee_bps)?;

    let new_sqrt = if zero_for_one {
        // sqrtP' = L * Q96 * sqrtP / (L * Q96 + x * sqrtP)
        let l_q96 = liquidity * widen(q96());
        let denom = l_q96 + x * sqrt_p;
        l_q96 * sqrt_p / denom
    } else {
        // sqrtP' = sqrtP + x * Q96 / L
        sqrt_p + x * widen(q96()) / liquidity
    };
    let new_sqrt = narrow(new_sqrt)?;
    check_tick_band(params, new_sqrt)?;
    Ok(new_sqrt)
}

/// Reject moves past the current tick-spacing band (the documented
/// conservative multi-tick cap).
fn check_tick_band(params: &V3Params, new_sqrt: U256) -> Result<(), MathError> {
    let old = params.sqrt_price_x96;
    let delta = if new_sqrt > old { new_sqrt - old } else { old - new_sqrt };
    let allowed = widen(old) * widen(U256::from(params.tick_spacing)) / widen(U256::from(SQRT_BPS_DENOM));
    if widen(delta) > allowed {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok(())
}

/// Output amount for a single-band v3 swap.
pub fn swap_output(
    params: &V3Params,
    zero_for_one: bool,
    fee_bps: u32,
    amount_in: U256,
) -> Result<U256, MathError> {
    let new_sqrt = sqrt_price_after(params, zero_for_one, fee_bps, amount_in)?;
    let old_sqrt = params.sqrt_price_x96;
    let liquidity = widen(U256::from(params.liquidity));

    let out = if zero_for_one {
        // token1 out = L * (sqrtP - sqrtP') / Q96
        liquidity * widen(old_sqrt - new_sqrt) / widen(q96())
    } else {
        // token0 out = L * Q96 * (sqrtP' - sqrtP) / (sqrtP * sqrtP')
        let num = liquidity * widen(q96()) * widen(new_sqrt - old_sqrt);
        num / (widen(old_sqrt) * widen(new_sqrt))
    };
    narrow(out)
}

/// Fee-adjusted spot price in 1e18 fixed point for the given direction.
pub fn spot_price_fp18(params: &V3Params, zero_for_one: bool, fee_bps: u32) -> Result<U256, MathError> {
    if fee_bps > BPS {
        return Err(MathError::DomainError);
    }
    if params.sqrt_price_x96.is_zero() {
        return Err(MathError::DomainError);
    }
    if params.sqrt_price_x96.bit_len() > 160 {
        return Err(MathError::Overflow);
    }
    let sqrt_sq = widen(params.sqrt_price_x96) * widen(params.sqrt_price_x96);
    let q192 = widen(q96()) * widen(q96());
    let fee_factor = widen(U256::from(BPS - fee_bps));
    let scale = widen(fp18());
    let bps = widen(U256::from(BPS));

    let price = if zero_for_one {
        // price = sqrtP^2 / 2^192, token1 per token0
        sqrt_sq * fee_factor * scale / (q192 * bps)
    } else {
        q192 * fee_factor * scale / (sqrt_sq * bps)
    };
    narrow(price)
}
