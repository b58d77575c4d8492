//! Trade-size optimization over a cyclic path.
//!
//! profit(x) = multi_hop_out(path, x) - x * (1 + flashloan_fee) - gas
//!
//! The maximizer is found with a log-spaced seed scan (powers of two down
//! from the cap) followed by K = 60 integer ternary-search refinements.
//! Identical inputs always produce the identical size: the search touches
//! no clocks, no randomness, and rounds the same way every run.

use alloy::primitives::{I256, U256};

use super::path::{multi_hop_out, ResolvedLeg};
use super::{mul_div, MathError, BPS};

/// Hard cap: never size past 30% of the first leg's input reserve.
const RESERVE_CAP_BPS: u32 = 3_000;

/// Ternary refinement iterations.
const REFINE_ITERATIONS: usize = 60;

/// Log-spaced seed candidates (cap, cap/2, cap/4, ...).
const SEED_STEPS: usize = 40;

/// Cost model and outcome of sizing one path.
#[derive(Debug, Clone)]
pub struct ProfitBreakdown {
    pub input_amount: U256,
    pub gross_output: U256,
    pub flashloan_fee: U256,
    pub gas_cost: U256,
    pub net_profit: I256,
    pub gross_profit_bps: i32,
    pub net_profit_bps: i32,
}

/// Result of `optimal_input`: the argmax size with its profit profile, or
/// `None` when no size clears the cost stack.
#[derive(Debug, Clone)]
pub struct SizedTrade {
    pub amount_in: U256,
    pub breakdown: ProfitBreakdown,
}

fn to_signed(v: U256) -> Result<I256, MathError> {
    I256::try_from(v).map_err(|_| MathError::Overflow)
}

/// Net profit of trading `x` through the path; `None` when the path cannot
/// absorb `x` (treated as minus infinity by the search).
fn profit_at(
    legs: &[ResolvedLeg<'_>],
    x: U256,
    flashloan_fee_bps: u32,
    gas_cost_in_input: U256,
) -> Result<Option<I256>, MathError> {
    if x.is_zero() {
        return Ok(None);
    }
    let quote = match multi_hop_out(legs, x) {
        Ok(q) => q,
        Err(MathError::InsufficientLiquidity) | Err(MathError::DomainError) => return Ok(None),
        Err(e) => return Err(e),
    };
    let fee = mul_div(x, U256::from(flashloan_fee_bps), U256::from(BPS))?;
    let cost = to_signed(x)?
        .checked_add(to_signed(fee)?)
        .and_then(|c| c.checked_add(to_signed(gas_cost_in_input).ok()?))
        .ok_or(MathError::Overflow)?;
    let net = to_signed(quote.amount_out)?.checked_sub(cost).ok_or(MathError::Overflow)?;
    Ok(Some(net))
}

/// Full cost breakdown at a fixed size.
pub fn breakdown_at(
    legs: &[ResolvedLeg<'_>],
    x: U256,
    flashloan_fee_bps: u32,
    gas_cost_in_input: U256,
) -> Result<ProfitBreakdown, MathError> {
    let quote = multi_hop_out(legs, x)?;
    let flashloan_fee = mul_div(x, U256::from(flashloan_fee_bps), U256::from(BPS))?;
    let cost = to_signed(x)?
        .checked_add(to_signed(flashloan_fee)?)
        .and_then(|c| c.checked_add(to_signed(gas_cost_in_input).ok()?))
        .ok_or(MathError::Overflow)?;
    let net_profit = to_signed(quote.amount_out)?.checked_sub(cost).ok_or(MathError::Overflow)?;
    let gross_profit = to_signed(quote.amount_out)?.checked_sub(to_signed(x)?).ok_or(MathError::Overflow)?;

    let bps_of = |p: I256| -> i32 {
        if x.is_zero() {
            return 0;
        }
        let negative = p.is_negative();
        let magnitude = p.unsigned_abs();
        let per = mul_div(magnitude, U256::from(BPS), x).unwrap_or(U256::MAX);
        let clamped = u32::try_from(per).unwrap_or(u32::MAX).min(i32::MAX as u32) as i32;
        if negative { -clamped } else { clamped }
    };

    Ok(ProfitBreakdown {
        input_amount: x,
        gross_output: quote.amount_out,
        flashloan_fee,
        gas_cost: gas_cost_in_input,
        gross_profit_bps: bps_of(gross_profit),
        net_profit_bps: bps_of(net_profit),
        net_profit,
    })
}

/// Find the input size maximizing net profit across the path.
///
/// Returns `None` when the best achievable profit is zero or negative, so a
/// cross-path price differential below the fee stack never sizes a trade.
pub fn optimal_input(
    legs: &[ResolvedLeg<'_>],
    flashloan_fee_bps: u32,
    gas_cost_in_input: U256,
) -> Result<Option<SizedTrade>, MathError> {
    if legs.is_empty() {
        return Err(MathError::DomainError);
    }
    let first = &legs[0];
    let reserve_in = first.pool.reserve_of(first.token_in).ok_or(MathError::UnsupportedPool)?;
    let x_cap = mul_div(reserve_in, U256::from(RESERVE_CAP_BPS), U256::from(BPS))?;
    if x_cap.is_zero() {
        return Ok(None);
    }

    // Seed scan: powers of two down from the cap bracket the maximum of any
    // unimodal profit curve to within a factor of two.
    let mut best_x = U256::ZERO;
    let mut best_profit = I256::MIN;
    let mut x = x_cap;
    for _ in 0..=SEED_STEPS {
        if x.is_zero() {
            break;
        }
        if let Some(p) = profit_at(legs, x, flashloan_fee_bps, gas_cost_in_input)? {
            if p > best_profit {
                best_profit = p;
                best_x = x;
            }
        }
        x >>= 1;
    }
    if best_x.is_zero() {
        return Ok(None);
    }

    // Ternary refinement inside [best/2, min(best*2, cap)].
    let mut lo = best_x >> 1;
    let mut hi = best_x.checked_mul(U256::from(2u64)).unwrap_or(x_cap).min(x_cap);
    for _ in 0..REFINE_ITERATIONS {
        if hi <= lo || hi - lo <= U256::from(1u64) {
            break;
        }
        let third = (hi - lo) / U256::from(3u64);
        let m1 = lo + third;
        let m2 = hi - third;
        let p1 = profit_at(legs, m1, flashloan_fee_bps, gas_cost_in_input)?.unwrap_or(I256::MIN);
        let p2 = profit_at(legs, m2, flashloan_fee_bps, gas_cost_in_input)?.unwrap_or(I256::MIN);
        if p1 > best_profit {
            best_profit = p1;
            best_x = m1;
        }
        if p2 > best_profit {
            best_profit = p2;
            best_x = m2;
        }
        if p1 < p2 {
            lo = m1 + U256::from(1u64);
        } else {
            hi = m2;
        }
    }

    if best_profit <= I256::ZERO {
        return Ok(None);
    }
    let breakdown = breakdown_at(legs, best_x, flashloan_fee_bps, gas_cost_in_input)?;
    Ok(Some(SizedTrade { amount_in: best_x, breakdown }))
}
