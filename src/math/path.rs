//! Multi-hop quoting across a resolved cyclic path.
//!
//! Pools along a path are distinct by construction, so legs are priced
//! sequentially against each pool's current state without interleaving.

use alloy::primitives::U256;

use super::{market_impact_bps, slippage_bps, swap_output, MathError, BPS};
use crate::types::{Pool, TokenId};

/// A path leg with its pool resolved from the registry snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedLeg<'a> {
    pub pool: &'a Pool,
    pub token_in: TokenId,
    pub token_out: TokenId,
}

/// Full quote of a multi-hop trade.
#[derive(Debug, Clone)]
pub struct MultiHopQuote {
    /// Amount entering each leg, plus the final output (len = legs + 1).
    pub amounts: Vec<U256>,
    /// Final output amount, same token as the path input.
    pub amount_out: U256,
    /// Per-leg execution slippage in bps.
    pub leg_slippage_bps: Vec<u32>,
    /// 1 - prod(1 - s_i), in bps.
    pub aggregate_slippage_bps: u32,
    /// Largest single-leg spot move in bps.
    pub worst_impact_bps: u32,
}

/// Combine per-leg slippages multiplicatively: 1 - prod(1 - s_i).
pub fn aggregate_slippage(leg_slippage_bps: &[u32]) -> u32 {
    let mut remaining: u64 = BPS as u64;
    for s in leg_slippage_bps {
        let keep = (BPS - (*s).min(BPS)) as u64;
        remaining = remaining * keep / BPS as u64;
    }
    BPS - remaining as u32
}

/// Reject any leg that would absorb half its input reserve or more. This is
/// the cheap depth gate that runs before full simulation.
pub fn check_leg_depth(legs: &[ResolvedLeg<'_>], amount_in: U256) -> Result<(), MathError> {
    let mut amount = amount_in;
    for leg in legs {
        let reserve_in = leg.pool.reserve_of(leg.token_in).ok_or(MathError::UnsupportedPool)?;
        let doubled = amount.checked_mul(U256::from(2u64)).ok_or(MathError::Overflow)?;
        if reserve_in < doubled {
            return Err(MathError::InsufficientLiquidity);
        }
        amount = swap_output(leg.pool, leg.token_in, leg.token_out, amount)?;
    }
    Ok(())
}

/// Sequentially apply `swap_output` across the path and collect the
/// slippage/impact profile.
pub fn multi_hop_out(legs: &[ResolvedLeg<'_>], amount_in: U256) -> Result<MultiHopQuote, MathError> {
    if legs.is_empty() {
        return Err(MathError::DomainError);
    }
    let mut amounts = Vec::with_capacity(legs.len() + 1);
    let mut leg_slippage = Vec::with_capacity(legs.len());
    let mut worst_impact = 0u32;
    let mut amount = amount_in;
    amounts.push(amount);

    for leg in legs {
        let slip = slippage_bps(leg.pool, leg.token_in, leg.token_out, amount)?;
        let impact = if amount.is_zero() {
            0
        } else {
            market_impact_bps(leg.pool, leg.token_in, leg.token_out, amount)?
        };
        worst_impact = worst_impact.max(impact);
        leg_slippage.push(slip);

        amount = swap_output(leg.pool, leg.token_in, leg.token_out, amount)?;
        amounts.push(amount);
    }

    Ok(MultiHopQuote {
        amount_out: amount,
        amounts,
        aggregate_slippage_bps: aggregate_slippage(&leg_slippage),
        leg_slippage_bps: leg_slippage,
        worst_impact_bps: worst_impact,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil::v2_pool;
    use super::*;

    #[test]
    fn aggregate_slippage_compounds() {
        // 1.00%, 1.50%, 0.80% -> 1 - 0.99 * 0.985 * 0.992 ~ 3.28%
        assert_eq!(aggregate_slippage(&[100, 150, 80]), 328);
        assert_eq!(aggregate_slippage(&[]), 0);
        assert_eq!(aggregate_slippage(&[0, 0]), 0);
        assert_eq!(aggregate_slippage(&[10_000]), 10_000);
    }

    #[test]
    fn two_hop_cycle_quotes_sequentially() {
        let p1 = v2_pool(1_000_000, 2_000_000, 30);
        let mut p2 = v2_pool(1_800_000, 1_000_000, 30);
        p2.tokens = vec![crate::types::TokenId(1), crate::types::TokenId(0)];
        let legs = [
            ResolvedLeg { pool: &p1, token_in: TokenId(0), token_out: TokenId(1) },
            ResolvedLeg { pool: &p2, token_in: TokenId(1), token_out: TokenId(0) },
        ];
        let quote = multi_hop_out(&legs, U256::from(10_000u64)).unwrap();
        assert_eq!(quote.amounts.len(), 3);
        assert_eq!(quote.amounts[0], U256::from(10_000u64));
        assert!(quote.amount_out > U256::from(10_000u64), "cycle should profit: {}", quote.amount_out);
        assert!(quote.aggregate_slippage_bps < 500);
        assert!(quote.worst_impact_bps > 0);
    }

    #[test]
    fn depth_gate_rejects_thin_legs() {
        let p1 = v2_pool(1_000_000, 2_000_000, 30);
        let legs = [ResolvedLeg { pool: &p1, token_in: TokenId(0), token_out: TokenId(1) }];
        assert!(check_leg_depth(&legs, U256::from(400_000u64)).is_ok());
        assert_eq!(
            check_leg_depth(&legs, U256::from(500_001u64)).unwrap_err(),
            MathError::InsufficientLiquidity
        );
    }
}
