//! Flashloan provider selection and trade sizing.
//!
//! Each eligible provider prices the same path through `optimal_input` with
//! its own fee; the winner is the (provider, size) pair with the highest
//! net profit, ties broken by lower fee then lower per-trade gas. The
//! chosen size is stored on the opportunity and never changes afterwards.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

use crate::math::optimizer::{breakdown_at, optimal_input, SizedTrade};
use crate::math::path::ResolvedLeg;
use crate::math::MathError;
use crate::types::{ChainId, PoolKind};

/// Provider family; fees follow the family convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Aave-style, 9 bps on the borrowed amount.
    AaveLike,
    /// dYdX-style, free.
    DydxLike,
    /// Balancer-style vault loan, free.
    BalancerLike,
    /// Uniswap-v3-style flash, fee follows the pool tier.
    UniswapV3Like,
}

#[derive(Debug, Clone)]
pub struct FlashloanProvider {
    pub name: String,
    pub kind: ProviderKind,
    /// Family fee. Ignored for `UniswapV3Like`: its effective fee is the
    /// tier of the pool lending the input token, resolved per path at
    /// selection time.
    pub fee_bps: u32,
    /// Fixed gas overhead of routing through this provider; a tie-break
    /// input, not part of the profit function.
    pub per_trade_gas: u64,
    /// Max borrowable per (chain, token). Absence means not offered there.
    pub liquidity: HashMap<(ChainId, Address), U256>,
}

impl FlashloanProvider {
    pub fn new(name: impl Into<String>, kind: ProviderKind, fee_bps: u32, per_trade_gas: u64) -> Self {
        Self { name: name.into(), kind, fee_bps, per_trade_gas, liquidity: HashMap::new() }
    }

    pub fn with_liquidity(mut self, chain: ChainId, token: Address, cap: U256) -> Self {
        self.liquidity.insert((chain, token), cap);
        self
    }

    pub fn cap_for(&self, chain: ChainId, token: Address) -> Option<U256> {
        self.liquidity.get(&(chain, token)).copied()
    }
}

/// The standard provider set. Liquidity caps are filled in from live data
/// at wiring time; fees are the family constants, except the v3 flash
/// whose fee comes from the lending pool's tier per path.
pub fn default_providers() -> Vec<FlashloanProvider> {
    vec![
        FlashloanProvider::new("aave-v3", ProviderKind::AaveLike, 9, 204_000),
        FlashloanProvider::new("dydx-solo", ProviderKind::DydxLike, 0, 230_000),
        FlashloanProvider::new("balancer-vault", ProviderKind::BalancerLike, 0, 190_000),
        FlashloanProvider::new("univ3-flash", ProviderKind::UniswapV3Like, 0, 160_000),
    ]
}

/// Fee tier a v3-style flash of the path's input token would pay: the
/// cheapest concentrated pool on the path that holds the input token. No
/// such pool means there is nothing to flash from.
fn v3_flash_fee_bps(legs: &[ResolvedLeg<'_>]) -> Option<u32> {
    let input = legs.first()?.token_in;
    legs.iter()
        .filter(|leg| matches!(leg.pool.kind, PoolKind::ConcentratedV3(_)))
        .filter(|leg| leg.pool.token_index(input).is_some())
        .map(|leg| leg.pool.fee_bps)
        .min()
}

/// Winning provider with its locked-in size.
#[derive(Debug, Clone)]
pub struct FlashloanChoice {
    pub provider_name: String,
    pub provider_kind: ProviderKind,
    pub fee_bps: u32,
    pub trade: SizedTrade,
}

pub struct FlashloanSizer {
    providers: Vec<FlashloanProvider>,
}

impl FlashloanSizer {
    pub fn new(providers: Vec<FlashloanProvider>) -> Self {
        Self { providers }
    }

    /// Pick the best (provider, size) for a path whose input token is
    /// `input_token` on `chain`. Returns `None` when no provider yields a
    /// positive net profit.
    pub fn select(
        &self,
        legs: &[ResolvedLeg<'_>],
        chain: ChainId,
        input_token: Address,
        gas_cost_in_input: U256,
    ) -> Result<Option<FlashloanChoice>, MathError> {
        let mut best: Option<FlashloanChoice> = None;
        for provider in &self.providers {
            let Some(cap) = provider.cap_for(chain, input_token) else {
                continue;
            };
            // Variable-fee family: the lending pool's tier is the fee.
            let fee_bps = match provider.kind {
                ProviderKind::UniswapV3Like => match v3_flash_fee_bps(legs) {
                    Some(tier) => tier,
                    None => continue,
                },
                _ => provider.fee_bps,
            };
            let Some(mut sized) = optimal_input(legs, fee_bps, gas_cost_in_input)? else {
                continue;
            };
            if sized.amount_in > cap {
                // The cap binds: re-price at the cap instead of silently
                // keeping an unborrowable size.
                let capped = breakdown_at(legs, cap, fee_bps, gas_cost_in_input)?;
                if capped.net_profit <= alloy::primitives::I256::ZERO {
                    continue;
                }
                sized = SizedTrade { amount_in: cap, breakdown: capped };
            }

            let candidate = FlashloanChoice {
                provider_name: provider.name.clone(),
                provider_kind: provider.kind,
                fee_bps,
                trade: sized,
            };
            best = Some(match best.take() {
                None => candidate,
                Some(current) => pick(current, candidate, self),
            });
        }
        Ok(best)
    }

    fn per_trade_gas_of(&self, name: &str) -> u64 {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.per_trade_gas)
            .unwrap_or(u64::MAX)
    }
}

fn pick(a: FlashloanChoice, b: FlashloanChoice, sizer: &FlashloanSizer) -> FlashloanChoice {
    let pa = a.trade.breakdown.net_profit;
    let pb = b.trade.breakdown.net_profit;
    if pb > pa {
        return b;
    }
    if pb < pa {
        return a;
    }
    if b.fee_bps != a.fee_bps {
        return if b.fee_bps < a.fee_bps { b } else { a };
    }
    let ga = sizer.per_trade_gas_of(&a.provider_name);
    let gb = sizer.per_trade_gas_of(&b.provider_name);
    if gb < ga {
        b
    } else {
        a
    }
}
