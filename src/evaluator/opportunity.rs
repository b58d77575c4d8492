//! Opportunity lifecycle and the external plan payload.
//!
//! An opportunity lives for one loop iteration: created as a candidate,
//! walked through `Candidate -> Validated -> Scored -> Gated`, then either
//! approved (emitted) or rejected with a categorized reason.

use alloy::primitives::{Address, I256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ChainId, DexKind, Path, TokenId};
use crate::validation::DataPoint;

/// Why a candidate was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoProfit,
    LowConfidence,
    ExcessSlippage,
    ExcessImpact,
    InsufficientLiquidity,
    OversizedTrade,
    GasCapExceeded,
    DoubleValidationFailed,
    DataUnavailable,
    MathFailure,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoProfit => "no_profit",
            RejectReason::LowConfidence => "low_confidence",
            RejectReason::ExcessSlippage => "excess_slippage",
            RejectReason::ExcessImpact => "excess_impact",
            RejectReason::InsufficientLiquidity => "insufficient_liquidity",
            RejectReason::OversizedTrade => "oversized_trade",
            RejectReason::GasCapExceeded => "gas_cap_exceeded",
            RejectReason::DoubleValidationFailed => "double_validation_failed",
            RejectReason::DataUnavailable => "data_unavailable",
            RejectReason::MathFailure => "math_failure",
        }
    }
}

/// Evaluator-side state machine. Approved is terminal here; what happens
/// after emission belongs to the mode gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunityState {
    Candidate,
    Validated,
    Scored,
    Gated,
    Approved,
    Rejected(RejectReason),
}

/// A fully evaluated candidate trade.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub path: Path,
    pub path_signature: String,
    pub chain: ChainId,
    pub input_token: TokenId,
    pub input_amount: U256,
    /// Amount entering each leg plus final output (len = hops + 1).
    pub per_leg_amounts: Vec<U256>,
    pub gross_out: U256,
    /// Sum of DEX fees across legs, bps.
    pub fee_cost_bps: u32,
    pub flashloan_provider: Option<String>,
    pub flashloan_fee_bps: u32,
    pub flashloan_fee: U256,
    /// Gas cost converted into input-token base units.
    pub gas_cost_quote: U256,
    pub gas_cost_usd: Decimal,
    /// Net profit in input-token base units.
    pub net_profit: I256,
    pub net_profit_usd: Decimal,
    pub notional_usd: Decimal,
    pub slippage_bps: u32,
    pub market_impact_bps: u32,
    pub ml_score: f32,
    pub confidence: f64,
    /// Read-only copies; the accounting tracker owns the originals.
    pub data_points: Vec<DataPoint>,
    pub state: OpportunityState,
}

impl Opportunity {
    pub fn is_approved(&self) -> bool {
        self.state == OpportunityState::Approved
    }

    /// Hot opportunities open the manual window in LIVE mode.
    pub fn is_hot(&self, min_score: f32, min_profit_usd: Decimal, min_confidence: f64) -> bool {
        self.ml_score > min_score
            && self.net_profit_usd > min_profit_usd
            && self.confidence > min_confidence
    }

    /// External payload for the relay adapter.
    pub fn to_plan(&self, legs: &[PlanLeg], input_token: Address) -> OpportunityPlan {
        OpportunityPlan {
            version: PLAN_VERSION,
            chain: self.chain,
            path_signature: self.path_signature.clone(),
            legs: legs.to_vec(),
            input_token,
            input_amount: self.input_amount,
            per_leg_amounts: self.per_leg_amounts.clone(),
            min_amount_out: self.min_amount_out(),
            flashloan_provider: self.flashloan_provider.clone(),
            flashloan_fee_bps: self.flashloan_fee_bps,
            gas_cost_quote: self.gas_cost_quote,
            net_profit_quote: self.net_profit,
            net_profit_usd_micros: usd_to_micros(self.net_profit_usd),
            ml_score: self.ml_score,
        }
    }

    /// Revert threshold: input plus costs. Receiving less than this on
    /// the final leg makes the trade a loss.
    fn min_amount_out(&self) -> U256 {
        self.input_amount
            .saturating_add(self.flashloan_fee)
            .saturating_add(self.gas_cost_quote)
    }
}

pub const PLAN_VERSION: u32 = 1;

/// USD with 6 fractional digits as an integer, the on-wire convention.
pub fn usd_to_micros(value: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;
    (value * Decimal::from(1_000_000u64)).trunc().to_i64().unwrap_or(i64::MAX)
}

pub fn micros_to_usd(micros: i64) -> Decimal {
    Decimal::new(micros, 6)
}

/// One leg of the executable plan, token and pool addresses resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLeg {
    pub pool: Address,
    pub dex: DexKind,
    pub token_in: Address,
    pub token_out: Address,
}

/// The payload handed to the relay adapter. Integer fields survive an
/// encode/decode round trip bit-identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityPlan {
    pub version: u32,
    pub chain: ChainId,
    pub path_signature: String,
    pub legs: Vec<PlanLeg>,
    pub input_token: Address,
    pub input_amount: U256,
    pub per_leg_amounts: Vec<U256>,
    pub min_amount_out: U256,
    pub flashloan_provider: Option<String>,
    pub flashloan_fee_bps: u32,
    pub gas_cost_quote: U256,
    pub net_profit_quote: I256,
    pub net_profit_usd_micros: i64,
    pub ml_score: f32,
}

impl OpportunityPlan {
    pub fn encode(&self) -> eyre::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> eyre::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
