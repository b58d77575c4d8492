//! Fixed-schema feature vector for opportunity scoring.
//!
//! Ten named fields with a stable serialization; the external model and the
//! heuristic fallback both read exactly this shape. No open maps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub hops: u32,
    pub gross_profit_usd: f64,
    pub gas_cost_usd: f64,
    pub estimated_profit_usd: f64,
    /// Depth headroom in [0, 1]: 1 = trade is negligible vs the thinnest
    /// leg, 0 = trade uses the full 30% sizing cap of that leg.
    pub liquidity_score: f64,
    pub price_impact_bps: u32,
    pub slippage_bps: u32,
    pub confidence: f64,
    /// Fraction of the UTC day, [0, 1).
    pub time_of_day: f64,
    /// Short-horizon volatility proxy supplied by the orchestrator.
    pub volatility_indicator: f64,
}

impl FeatureVector {
    /// Depth headroom from the trade size share of the thinnest input
    /// reserve. `fraction_of_cap` is (amount / reserve) / 30%.
    pub fn liquidity_score_from_fraction(fraction_of_cap: f64) -> f64 {
        (1.0 - fraction_of_cap).clamp(0.0, 1.0)
    }

    pub fn time_of_day_from_ms(timestamp_ms: u64) -> f64 {
        const DAY_MS: u64 = 86_400_000;
        (timestamp_ms % DAY_MS) as f64 / DAY_MS as f64
    }
}
