//! ML scoring seam with a deterministic heuristic fallback.
//!
//! The inference transport is external; this crate only fixes the contract:
//! a 10-field feature vector in, a score in [0, 1] out, deterministic for
//! identical vectors, soft 500 ms timeout enforced by the caller.

use async_trait::async_trait;
use std::time::Duration;

use super::AdapterError;
use crate::evaluator::features::FeatureVector;

/// Soft timeout for inference calls.
pub const ML_TIMEOUT: Duration = Duration::from_millis(500);

#[async_trait]
pub trait MlScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Score in [0, 1]; higher means more likely to execute profitably.
    async fn score(&self, features: &FeatureVector) -> Result<f32, AdapterError>;
}

/// Deterministic fallback used whenever the inference adapter is absent or
/// times out. Weighted normalization of the feature vector:
///
/// | feature                  | weight | normalization                      |
/// |--------------------------|--------|------------------------------------|
/// | estimated_profit_usd     | 0.30   | p / (p + 50)                       |
/// | confidence               | 0.25   | already in [0, 1]                  |
/// | liquidity_score          | 0.15   | already in [0, 1]                  |
/// | slippage_bps             | 0.10   | 1 - min(s, 500) / 500              |
/// | price_impact_bps         | 0.10   | 1 - min(i, 300) / 300              |
/// | hops                     | 0.05   | 1 - (hops - 2) / 4                 |
/// | gas vs gross profit      | 0.05   | 1 - min(gas / max(gross, 1), 1)    |
///
/// time_of_day and volatility_indicator ride along for the external model
/// but carry no weight here: the fallback must not punt on fields it cannot
/// calibrate.
#[derive(Debug, Default, Clone)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn score_sync(features: &FeatureVector) -> f32 {
        let profit = features.estimated_profit_usd.max(0.0);
        let profit_score = profit / (profit + 50.0);
        let slippage_score = 1.0 - (features.slippage_bps as f64).min(500.0) / 500.0;
        let impact_score = 1.0 - (features.price_impact_bps as f64).min(300.0) / 300.0;
        let hops_score = (1.0 - (features.hops.saturating_sub(2)) as f64 / 4.0).max(0.0);
        let gross = features.gross_profit_usd.max(1.0);
        let gas_score = 1.0 - (features.gas_cost_usd.max(0.0) / gross).min(1.0);

        let score = 0.30 * profit_score
            + 0.25 * features.confidence.clamp(0.0, 1.0)
            + 0.15 * features.liquidity_score.clamp(0.0, 1.0)
            + 0.10 * slippage_score
            + 0.10 * impact_score
            + 0.05 * hops_score
            + 0.05 * gas_score;
        score.clamp(0.0, 1.0) as f32
    }
}

#[async_trait]
impl MlScorer for HeuristicScorer {
    fn name(&self) -> &str {
        "heuristic-fallback"
    }

    async fn score(&self, features: &FeatureVector) -> Result<f32, AdapterError> {
        Ok(Self::score_sync(features))
    }
}

/// Fixed-score stub for tests and simulation wiring.
pub struct StaticScorer {
    name: String,
    score: f32,
    fail_with: parking_lot::Mutex<Option<AdapterError>>,
}

impl StaticScorer {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self { name: name.into(), score, fail_with: parking_lot::Mutex::new(None) }
    }

    pub fn fail_with(&self, err: Option<AdapterError>) {
        *self.fail_with.lock() = err;
    }
}

#[async_trait]
impl MlScorer for StaticScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, _features: &FeatureVector) -> Result<f32, AdapterError> {
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(self.score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> FeatureVector {
        FeatureVector {
            hops: 2,
            gross_profit_usd: 120.0,
            gas_cost_usd: 5.0,
            estimated_profit_usd: 100.0,
            liquidity_score: 0.8,
            price_impact_bps: 40,
            slippage_bps: 60,
            confidence: 0.95,
            time_of_day: 0.5,
            volatility_indicator: 0.2,
        }
    }

    #[test]
    fn fallback_is_deterministic() {
        let features = baseline();
        assert_eq!(
            HeuristicScorer::score_sync(&features),
            HeuristicScorer::score_sync(&features)
        );
    }

    #[test]
    fn fallback_rewards_profit_and_confidence() {
        let good = baseline();
        let mut poor = baseline();
        poor.estimated_profit_usd = 2.0;
        poor.confidence = 0.5;
        poor.slippage_bps = 400;
        assert!(HeuristicScorer::score_sync(&good) > HeuristicScorer::score_sync(&poor));
    }

    #[test]
    fn fallback_stays_in_unit_interval() {
        let mut extreme = baseline();
        extreme.estimated_profit_usd = 1e9;
        extreme.slippage_bps = 0;
        extreme.price_impact_bps = 0;
        extreme.confidence = 1.0;
        extreme.liquidity_score = 1.0;
        let s = HeuristicScorer::score_sync(&extreme);
        assert!((0.0..=1.0).contains(&s));

        extreme.estimated_profit_usd = -50.0;
        extreme.slippage_bps = 10_000;
        extreme.price_impact_bps = 10_000;
        extreme.confidence = 0.0;
        extreme.liquidity_score = 0.0;
        extreme.gas_cost_usd = 1e6;
        let s = HeuristicScorer::score_sync(&extreme);
        assert!((0.0..=1.0).contains(&s));
    }

    #[tokio::test]
    async fn static_scorer_returns_fixed_score() {
        let scorer = StaticScorer::new("stub", 0.9);
        assert_eq!(scorer.score(&baseline()).await.unwrap(), 0.9);
        scorer.fail_with(Some(AdapterError::Timeout));
        assert!(scorer.score(&baseline()).await.is_err());
    }
}
