//! StableSwap (Curve-style) two-asset quoting.
//!
//! The invariant is solved with bounded Newton iteration: K = 255 steps for
//! both the D invariant and the output-side balance. Non-convergence maps to
//! `ConvergenceFailure` instead of looping forever on hostile reserves.

use alloy::primitives::{U256, U512};

use super::{fp18, mul_div, narrow, widen, MathError, BPS};
use crate::types::StableParams;

/// Newton iteration bound for D and y.
const MAX_ITERATIONS: usize = 255;

/// Number of coins; this kernel prices the two-asset plain pool.
const N_COINS: u64 = 2;

fn check_reserves(reserve_in: U256, reserve_out: U256) -> Result<(), MathError> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    // Keep D^3 within 512 bits.
    if reserve_in.bit_len() > 128 || reserve_out.bit_len() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(())
}

/// Solve the StableSwap invariant D for balances (x, y) and amplification A.
fn compute_d(x: U512, y: U512, amp: u64) -> Result<U512, MathError> {
    let s = x + y;
    if s.is_zero() {
        return Ok(U512::ZERO);
    }
    let n = U512::from(N_COINS);
    let ann = U512::from(amp) * n * n;
    let one = U512::from(1u64);

    let mut d = s;
    for _ in 0..MAX_ITERATIONS {
        let mut d_p = d;
        d_p = d_p * d / (x * n);
        d_p = d_p * d / (y * n);
        let d_prev = d;
        d = (ann * s + d_p * n) * d / ((ann - one) * d + (n + one) * d_p);
        let diff = if d > d_prev { d - d_prev } else { d_prev - d };
        if diff <= one {
            return Ok(d);
        }
    }
    Err(MathError::ConvergenceFailure)
}

/// Solve the output-side balance y for a new input-side balance x, holding D.
fn compute_y(new_x: U512, d: U512, amp: u64) -> Result<U512, MathError> {
    if new_x.is_zero() {
        return Err(MathError::DomainError);
    }
    let n = U512::from(N_COINS);
    let ann = U512::from(amp) * n * n;
    let one = U512::from(1u64);

    // c = D^(n+1) / (n^n * x * Ann), b = x + D / Ann
    let c = d * d / (new_x * n) * d / (ann * n);
    let b = new_x + d / ann;

    let mut y = d;
    for _ in 0..MAX_ITERATIONS {
        let y_prev = y;
        let denom = y * U512::from(2u64) + b - d;
        if denom.is_zero() {
            return Err(MathError::ConvergenceFailure);
        }
        y = (y * y + c) / denom;
        let diff = if y > y_prev { y - y_prev } else { y_prev - y };
        if diff <= one {
            return Ok(y);
        }
    }
    Err(MathError::ConvergenceFailure)
}

/// Output amount for swapping through a stable pool, fee on the input side.
pub fn swap_output(
    params: &StableParams,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
    amount_in: U256,
) -> Result<U256, MathError> {
    if fee_bps > BPS {
        return Err(MathError::DomainError);
    }
    if params.amp == 0 {
        return Err(MathError::UnsupportedPool);
    }
    check_reserves(reserve_in, reserve_out)?;
    if amount_in.is_zero() {
        return Ok(U256::ZERO);
    }
    if amount_in.bit_len() > 128 {
        return Err(MathError::Overflow);
    }

    let x = widen(reserve_in);
    let y = widen(reserve_out);
    let dx = widen(amount_in) * widen(U256::from(BPS - fee_bps)) / widen(U256::from(BPS));

    let d = compute_d(x, y, params.amp)?;
    let new_y = compute_y(x + dx, d, params.amp)?;
    if new_y >= y {
        return Ok(U256::ZERO);
    }
    // Round down one unit, the convention that keeps the invariant safe.
    let out = narrow(y - new_y - U512::from(1u64))?;
    if out >= reserve_out {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok(out)
}

/// Finite-difference spot price in 1e18 fixed point.
///
/// The StableSwap derivative has no tidy closed form once A enters, so the
/// spot is measured with a deterministic probe of 1e-6 of the input reserve
/// (floored at a size that still quotes above integer rounding).
pub fn spot_price_fp18(
    params: &StableParams,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Result<U256, MathError> {
    check_reserves(reserve_in, reserve_out)?;
    let mut probe = reserve_in / U256::from(1_000_000u64);
    let floor = U256::from(1_000u64);
    if probe < floor {
        probe = floor.min(reserve_in / U256::from(2u64));
    }
    if probe.is_zero() {
        probe = U256::from(1u64);
    }
    let out = swap_output(params, reserve_in, reserve_out, fee_bps, probe)?;
    mul_div(out, fp18(), probe)
}
