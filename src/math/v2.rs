//! Constant-product (x * y = k) swap math with an input-side fee in bps.

use alloy::primitives::U256;

use super::{fp18, mul_div, narrow, widen, MathError, BPS};

/// amount_out = (in * (10000 - fee) * reserve_out)
///            / (reserve_in * 10000 + in * (10000 - fee))
///
/// `amount_in >= reserve_in` is rejected: the closed form stays finite there,
/// but a trade that size implies a drained pool upstream.
pub fn swap_output(
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
    amount_in: U256,
) -> Result<U256, MathError> {
    if fee_bps > BPS {
        return Err(MathError::DomainError);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    if amount_in.is_zero() {
        return Ok(U256::ZERO);
    }
    if amount_in >= reserve_in {
        return Err(MathError::InsufficientLiquidity);
    }

    let fee_factor = U256::from(BPS - fee_bps);
    let in_with_fee = widen(amount_in) * widen(fee_factor);
    let numerator = in_with_fee * widen(reserve_out);
    let denominator = widen(reserve_in) * widen(U256::from(BPS)) + in_with_fee;
    let out = narrow(numerator / denominator)?;

    // Follows from the formula, but the registry only guarantees reserves
    // at admission time; keep the output strictly inside the pool.
    if out >= reserve_out {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok(out)
}

/// Fee-adjusted spot price (out per in) in 1e18 fixed point:
/// (10000 - fee) * reserve_out * 1e18 / (10000 * reserve_in).
pub fn spot_price_fp18(reserve_in: U256, reserve_out: U256, fee_bps: u32) -> Result<U256, MathError> {
    if fee_bps > BPS {
        return Err(MathError::DomainError);
    }
    if reserve_in.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    let num = widen(reserve_out) * widen(U256::from(BPS - fee_bps)) * widen(fp18());
    let den = widen(reserve_in) * widen(U256::from(BPS));
    narrow(num / den)
}

/// Input required to receive `amount_out`, rounded up. Used by the sizer to
/// translate provider liquidity caps back into input space.
pub fn input_for_output(
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
    amount_out: U256,
) -> Result<U256, MathError> {
    if fee_bps >= BPS {
        return Err(MathError::DomainError);
    }
    if amount_out >= reserve_out {
        return Err(MathError::InsufficientLiquidity);
    }
    if amount_out.is_zero() {
        return Ok(U256::ZERO);
    }
    let num = widen(reserve_in) * widen(amount_out) * widen(U256::from(BPS));
    let den = widen(reserve_out - amount_out) * widen(U256::from(BPS - fee_bps));
    let floor = narrow(num / den)?;
    floor.checked_add(U256::from(1u64)).ok_or(MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_quote() {
        // 1 unit into a 100 / 200_000 pool at 30 bps: canonical router quote.
        let out = swap_output(
            U256::from(100_000_000_000_000_000_000u128),
            U256::from(200_000_000_000u64),
            30,
            U256::from(1_000_000_000_000_000_000u64),
        )
        .unwrap();
        assert!(out > U256::from(1_970_000_000u64));
        assert!(out < U256::from(2_000_000_000u64));
    }

    #[test]
    fn zero_fee_small_trade_tracks_spot() {
        let r_in = U256::from(1_000_000_000u64);
        let r_out = U256::from(1_000_000_000u64);
        let out = swap_output(r_in, r_out, 0, U256::from(1_000u64)).unwrap();
        // 1000 in vs 1e9 reserves: rounding aside, out ~= in.
        assert!(out >= U256::from(999u64) && out <= U256::from(1_000u64));
    }

    #[test]
    fn fee_reduces_output() {
        let r_in = U256::from(1_000_000u64);
        let r_out = U256::from(1_000_000u64);
        let free = swap_output(r_in, r_out, 0, U256::from(10_000u64)).unwrap();
        let taxed = swap_output(r_in, r_out, 100, U256::from(10_000u64)).unwrap();
        assert!(taxed < free);
    }

    #[test]
    fn input_for_output_round_trips() {
        let r_in = U256::from(1_000_000u64);
        let r_out = U256::from(2_000_000u64);
        let want_out = U256::from(50_000u64);
        let need_in = input_for_output(r_in, r_out, 30, want_out).unwrap();
        let got_out = swap_output(r_in, r_out, 30, need_in).unwrap();
        assert!(got_out >= want_out);
    }

    #[test]
    fn spot_price_of_balanced_pool_is_one_minus_fee() {
        let spot = spot_price_fp18(U256::from(500u64), U256::from(500u64), 30).unwrap();
        assert_eq!(spot, U256::from(997_000_000_000_000_000u128));
    }
}
