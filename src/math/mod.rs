//! AMM math kernel.
//!
//! Pure, side-effect-free pricing over integer base units. Every entry point
//! returns `Result<_, MathError>`; untrusted input never panics. Floating
//! point never touches a sized amount, only scores derived elsewhere.

pub mod optimizer;
pub mod path;
pub mod stable;
pub mod v2;
pub mod v3;
pub mod weighted;

use alloy::primitives::{U256, U512};
use thiserror::Error;

use crate::types::{Pool, PoolKind, TokenId};

/// Basis-point denominator shared by every fee computation.
pub const BPS: u32 = 10_000;

/// Fixed-point scale for spot prices (1e18).
pub fn fp18() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// The trade exhausts or exceeds the pool's usable depth.
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
    /// Intermediate arithmetic exceeded the supported integer range.
    #[error("arithmetic overflow")]
    Overflow,
    /// The pool kind / token pair combination cannot be priced.
    #[error("unsupported pool")]
    UnsupportedPool,
    /// Iterative invariant solving did not converge within its bound.
    #[error("convergence failure")]
    ConvergenceFailure,
    /// The input is outside the function's domain (e.g. zero-size v3 quote).
    #[error("domain error")]
    DomainError,
}

pub(crate) fn widen(x: U256) -> U512 {
    U512::from_be_slice(&x.to_be_bytes::<32>())
}

pub(crate) fn narrow(x: U512) -> Result<U256, MathError> {
    let bytes = x.to_be_bytes::<64>();
    if bytes[..32].iter().any(|b| *b != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from_be_slice(&bytes[32..]))
}

/// floor(a * b / d) with a 512-bit intermediate.
pub(crate) fn mul_div(a: U256, b: U256, d: U256) -> Result<U256, MathError> {
    if d.is_zero() {
        return Err(MathError::DomainError);
    }
    narrow(widen(a) * widen(b) / widen(d))
}

/// Resolve the in/out reserve indices for a swap direction.
fn leg_indices(pool: &Pool, token_in: TokenId, token_out: TokenId) -> Result<(usize, usize), MathError> {
    let i = pool.token_index(token_in).ok_or(MathError::UnsupportedPool)?;
    let j = pool.token_index(token_out).ok_or(MathError::UnsupportedPool)?;
    if i == j {
        return Err(MathError::UnsupportedPool);
    }
    Ok((i, j))
}

/// Output amount for swapping `amount_in` of `token_in` into `token_out`.
///
/// Dispatches to the kind-specific kernel. The fee is always applied to the
/// input side, in basis points.
pub fn swap_output(
    pool: &Pool,
    token_in: TokenId,
    token_out: TokenId,
    amount_in: U256,
) -> Result<U256, MathError> {
    let (i, j) = leg_indices(pool, token_in, token_out)?;
    match &pool.kind {
        PoolKind::ConstantProductV2 => {
            v2::swap_output(pool.reserves[i], pool.reserves[j], pool.fee_bps, amount_in)
        }
        PoolKind::ConcentratedV3(p) => v3::swap_output(p, i == 0, pool.fee_bps, amount_in),
        PoolKind::StableCurve(p) => {
            stable::swap_output(p, pool.reserves[i], pool.reserves[j], pool.fee_bps, amount_in)
        }
        PoolKind::WeightedBalancer(p) => weighted::swap_output(
            pool.reserves[i],
            pool.reserves[j],
            p.weights[i],
            p.weights[j],
            pool.fee_bps,
            amount_in,
        ),
    }
}

/// Swap and return the pool as it would look afterwards, for market-impact
/// measurement. The returned pool is a detached copy; the caller's registry
/// state is never mutated from here.
pub fn apply_swap(
    pool: &Pool,
    token_in: TokenId,
    token_out: TokenId,
    amount_in: U256,
) -> Result<(U256, Pool), MathError> {
    let (i, j) = leg_indices(pool, token_in, token_out)?;
    let amount_out = swap_output(pool, token_in, token_out, amount_in)?;
    let mut after = pool.clone();
    after.reserves[i] = after.reserves[i].checked_add(amount_in).ok_or(MathError::Overflow)?;
    after.reserves[j] = after.reserves[j].checked_sub(amount_out).ok_or(MathError::InsufficientLiquidity)?;
    if let PoolKind::ConcentratedV3(p) = &mut after.kind {
        p.sqrt_price_x96 = v3::sqrt_price_after(p, i == 0, pool.fee_bps, amount_in)?;
    }
    Ok((amount_out, after))
}

/// Spot price of `token_out` per `token_in` as 1e18 fixed point, including
/// the input-side fee: the infinitesimal limit of `swap_output`.
pub fn spot_price_fp18(pool: &Pool, token_in: TokenId, token_out: TokenId) -> Result<U256, MathError> {
    let (i, j) = leg_indices(pool, token_in, token_out)?;
    match &pool.kind {
        PoolKind::ConstantProductV2 => {
            v2::spot_price_fp18(pool.reserves[i], pool.reserves[j], pool.fee_bps)
        }
        PoolKind::ConcentratedV3(p) => v3::spot_price_fp18(p, i == 0, pool.fee_bps),
        PoolKind::StableCurve(p) => {
            stable::spot_price_fp18(p, pool.reserves[i], pool.reserves[j], pool.fee_bps)
        }
        PoolKind::WeightedBalancer(p) => weighted::spot_price_fp18(
            pool.reserves[i],
            pool.reserves[j],
            p.weights[i],
            p.weights[j],
            pool.fee_bps,
        ),
    }
}

/// Execution slippage of a trade versus the spot price, in basis points,
/// clamped at zero.
pub fn slippage_bps(
    pool: &Pool,
    token_in: TokenId,
    token_out: TokenId,
    amount_in: U256,
) -> Result<u32, MathError> {
    if amount_in.is_zero() {
        return Ok(0);
    }
    let spot = spot_price_fp18(pool, token_in, token_out)?;
    let expected = mul_div(spot, amount_in, fp18())?;
    if expected.is_zero() {
        return Ok(0);
    }
    let actual = swap_output(pool, token_in, token_out, amount_in)?;
    if actual >= expected {
        return Ok(0);
    }
    let slip = mul_div(expected - actual, U256::from(BPS), expected)?;
    Ok(u32::try_from(slip).unwrap_or(BPS).min(BPS))
}

/// Relative spot-price move caused by a trade, in basis points.
pub fn market_impact_bps(
    pool: &Pool,
    token_in: TokenId,
    token_out: TokenId,
    amount_in: U256,
) -> Result<u32, MathError> {
    let before = spot_price_fp18(pool, token_in, token_out)?;
    if before.is_zero() {
        return Err(MathError::DomainError);
    }
    let (_, after_pool) = apply_swap(pool, token_in, token_out, amount_in)?;
    let after = spot_price_fp18(&after_pool, token_in, token_out)?;
    let delta = if after > before { after - before } else { before - after };
    let impact = mul_div(delta, U256::from(BPS), before)?;
    Ok(u32::try_from(impact).unwrap_or(u32::MAX))
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::types::V3Params;
    use alloy::primitives::Address;
    use rust_decimal::Decimal;

    pub fn v2_pool(reserve0: u128, reserve1: u128, fee_bps: u32) -> Pool {
        Pool {
            chain: 1,
            address: Address::repeat_byte(0x22),
            kind: PoolKind::ConstantProductV2,
            tokens: vec![TokenId(0), TokenId(1)],
            reserves: vec![U256::from(reserve0), U256::from(reserve1)],
            fee_bps,
            tvl_usd: Decimal::new(1_000_000, 0),
            last_update_ms: 0,
            source_layer: 1,
            confidence: 1.0,
        }
    }

    pub fn v3_pool(sqrt_price_x96: U256, liquidity: u128, tick_spacing: u32, fee_bps: u32) -> Pool {
        let mut pool = v2_pool(1_000_000, 1_000_000, fee_bps);
        pool.kind = PoolKind::ConcentratedV3(V3Params { sqrt_price_x96, liquidity, tick_spacing });
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn swap_output_zero_input_is_zero_for_v2() {
        let pool = v2_pool(1_000_000, 2_000_000, 30);
        let out = swap_output(&pool, TokenId(0), TokenId(1), U256::ZERO).unwrap();
        assert_eq!(out, U256::ZERO);
    }

    #[test]
    fn constant_product_never_decreases() {
        // I1: k after the swap (fee retained in reserves) >= k before.
        let pool = v2_pool(1_000_000, 2_000_000, 30);
        for amount in [1u64, 137, 9_999, 250_000, 999_999] {
            let x = U256::from(amount);
            let (out, after) = apply_swap(&pool, TokenId(0), TokenId(1), x).unwrap();
            assert!(out > U256::ZERO, "amount_in={amount} produced zero out");
            assert!(out < pool.reserves[1]);
            let k_before = widen(pool.reserves[0]) * widen(pool.reserves[1]);
            let k_after = widen(after.reserves[0]) * widen(after.reserves[1]);
            assert!(k_after >= k_before, "k decreased for amount_in={amount}");
        }
    }

    #[test]
    fn v2_full_reserve_input_is_insufficient_liquidity() {
        let pool = v2_pool(1_000_000, 2_000_000, 30);
        let err = swap_output(&pool, TokenId(0), TokenId(1), U256::from(1_000_000u64)).unwrap_err();
        assert_eq!(err, MathError::InsufficientLiquidity);
    }

    #[test]
    fn slippage_grows_with_size() {
        let pool = v2_pool(1_000_000, 2_000_000, 30);
        let small = slippage_bps(&pool, TokenId(0), TokenId(1), U256::from(100u64)).unwrap();
        let large = slippage_bps(&pool, TokenId(0), TokenId(1), U256::from(100_000u64)).unwrap();
        assert!(large > small);
        // A 10%-of-reserve trade on a v2 pool slips close to its size share.
        assert!((800..=1_100).contains(&large), "large slip {large} bps");
    }

    #[test]
    fn market_impact_matches_reserve_shift() {
        let pool = v2_pool(1_000_000, 1_000_000, 0);
        // Pushing 10% of reserves in moves spot by ~19% on a symmetric pool.
        let impact = market_impact_bps(&pool, TokenId(0), TokenId(1), U256::from(100_000u64)).unwrap();
        assert!((1_700..=2_000).contains(&impact), "impact {impact} bps");
    }

    #[test]
    fn unsupported_token_is_rejected() {
        let pool = v2_pool(1_000_000, 2_000_000, 30);
        let err = swap_output(&pool, TokenId(7), TokenId(1), U256::from(10u64)).unwrap_err();
        assert_eq!(err, MathError::UnsupportedPool);
    }
}
