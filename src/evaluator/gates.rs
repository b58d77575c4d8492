//! Hard safety gates. Any failure rejects the candidate outright; there is
//! no soft-pass path through this module.

use alloy::primitives::{I256, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::opportunity::RejectReason;
use crate::math::BPS;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub min_profit_usd: Decimal,
    pub max_slippage_bps: u32,
    pub max_impact_bps: u32,
    pub max_gas_cost_usd: Decimal,
    /// Trade size cap as a share of each leg's input reserve.
    pub max_trade_fraction_bps: u32,
    /// Notional above which a passed double validation is mandatory.
    pub large_trade_usd: Decimal,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_profit_usd: dec!(10),
            max_slippage_bps: 500,
            max_impact_bps: 1_000,
            max_gas_cost_usd: dec!(50),
            max_trade_fraction_bps: 3_000,
            large_trade_usd: dec!(100000),
        }
    }
}

/// Everything the gates need to know about a candidate.
pub struct GateInput<'a> {
    pub confidence: f64,
    pub required_confidence: f64,
    pub net_profit: I256,
    pub net_profit_usd: Decimal,
    pub slippage_bps: u32,
    pub worst_impact_bps: u32,
    pub gas_cost_usd: Decimal,
    pub notional_usd: Decimal,
    /// (amount entering leg, input reserve of leg) per leg.
    pub leg_loads: &'a [(U256, U256)],
    /// Outcome of double validation, if one ran.
    pub double_validation_passed: Option<bool>,
}

/// Apply every gate in order; the first failure names the reject reason.
pub fn apply(config: &GateConfig, input: &GateInput<'_>) -> Result<(), RejectReason> {
    if input.confidence < input.required_confidence {
        return Err(RejectReason::LowConfidence);
    }
    if input.net_profit <= I256::ZERO || input.net_profit_usd < config.min_profit_usd {
        return Err(RejectReason::NoProfit);
    }
    if input.slippage_bps > config.max_slippage_bps {
        return Err(RejectReason::ExcessSlippage);
    }
    if input.worst_impact_bps > config.max_impact_bps {
        return Err(RejectReason::ExcessImpact);
    }
    for (amount, reserve) in input.leg_loads {
        if reserve.is_zero() {
            return Err(RejectReason::InsufficientLiquidity);
        }
        let cap = *reserve * U256::from(config.max_trade_fraction_bps) / U256::from(BPS);
        if *amount > cap {
            return Err(RejectReason::OversizedTrade);
        }
    }
    if input.gas_cost_usd > config.max_gas_cost_usd {
        return Err(RejectReason::GasCapExceeded);
    }
    if input.notional_usd > config.large_trade_usd && input.double_validation_passed != Some(true) {
        return Err(RejectReason::DoubleValidationFailed);
    }
    Ok(())
}
