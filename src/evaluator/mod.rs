//! Opportunity evaluator: per-path simulation, scoring and gating.
//!
//! For each candidate path the evaluator pulls validated datapoints from
//! the fabric, sizes the trade through the flashloan sizer, scores the
//! result (ML adapter with a deterministic fallback) and walks the
//! opportunity through its state machine. Everything it consumes is either
//! an immutable snapshot or a fabric-validated point.

pub mod features;
pub mod gates;
pub mod opportunity;

use alloy::primitives::U256;
use lru::LruCache;
use parking_lot::Mutex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info};

pub use gates::GateConfig;
pub use opportunity::{
    Opportunity, OpportunityPlan, OpportunityState, PlanLeg, RejectReason,
};

use crate::adapters::ml::{HeuristicScorer, MlScorer, ML_TIMEOUT};
use crate::flashloan::FlashloanSizer;
use crate::math::path::{check_leg_depth, multi_hop_out, ResolvedLeg};
use crate::math::MathError;
use crate::registry::RegistrySnapshot;
use crate::types::{Path, Pool, TokenId};
use crate::validation::{
    DataPoint, DataType, DataValidator, DataValue, FetchRequest, FetchSubject,
};
use features::FeatureVector;

/// A datapoint together with the request that produced it, so phase-2
/// refetches can reuse the exact request shape.
#[derive(Debug, Clone)]
pub struct Sourced {
    pub request: FetchRequest,
    pub point: DataPoint,
}

/// Per-tick market context shared by every evaluation on a chain.
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Gas price, wei.
    pub gas: Sourced,
    /// USD price of the chain's native token.
    pub native_usd: Sourced,
    /// USD price of the path's input token.
    pub input_usd: Sourced,
    pub volatility_indicator: f64,
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub gates: GateConfig,
    /// Fixed gas overhead of the wrapping transaction.
    pub gas_units_base: u64,
    /// Marginal gas per swap leg.
    pub gas_units_per_hop: u64,
    pub feature_cache_capacity: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            gates: GateConfig::default(),
            gas_units_base: 100_000,
            gas_units_per_hop: 150_000,
            feature_cache_capacity: 1_024,
        }
    }
}

pub struct Evaluator {
    validator: Arc<DataValidator>,
    sizer: FlashloanSizer,
    scorer: Option<Arc<dyn MlScorer>>,
    config: EvaluatorConfig,
    /// Memo of (features, score) keyed by canonical path signature; a hit
    /// only counts when the features are identical, so scores stay exact.
    feature_cache: Mutex<LruCache<String, (FeatureVector, f32)>>,
}

impl Evaluator {
    pub fn new(
        validator: Arc<DataValidator>,
        sizer: FlashloanSizer,
        scorer: Option<Arc<dyn MlScorer>>,
        config: EvaluatorConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.feature_cache_capacity.max(1))
            .expect("non-zero cache capacity");
        Self {
            validator,
            sizer,
            scorer,
            config,
            feature_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn gates(&self) -> &GateConfig {
        &self.config.gates
    }

    /// Evaluate one candidate path. Always returns an opportunity whose
    /// state is `Approved` or `Rejected(reason)`; errors never escape as
    /// panics or silent successes.
    pub async fn evaluate(
        &self,
        snapshot: &RegistrySnapshot,
        path: &Path,
        ctx: &EvalContext,
    ) -> Opportunity {
        let signature = path.signature();
        let input_token = path.source_token();

        // Resolve pools from the snapshot.
        let mut pools: Vec<Arc<Pool>> = Vec::with_capacity(path.legs.len());
        for leg in &path.legs {
            match snapshot.pool(leg.pool) {
                Ok(pool) if snapshot.is_pool_active(leg.pool) => pools.push(pool.clone()),
                _ => {
                    return self.rejected(path, &signature, input_token, RejectReason::DataUnavailable)
                }
            }
        }
        let chain = pools[0].chain;

        // Per-leg reserves through the fabric; fetched values override the
        // snapshot's copy for simulation.
        let mut sourced: Vec<Sourced> = Vec::with_capacity(path.legs.len() + 3);
        let mut adjusted: Vec<Pool> = Vec::with_capacity(path.legs.len());
        for pool in &pools {
            let request = FetchRequest::new(
                DataType::Reserves,
                pool.chain,
                FetchSubject::Pool(pool.address),
            );
            let point = match self.validator.fetch_validated(&request).await {
                Ok(p) => p,
                Err(err) => {
                    debug!(%err, pool = %pool.address, "reserve fetch failed");
                    return self.rejected(path, &signature, input_token, RejectReason::DataUnavailable);
                }
            };
            let mut pool_sim = (**pool).clone();
            if let DataValue::Reserves(fresh) = &point.value {
                if fresh.len() == pool_sim.reserves.len() && fresh.iter().all(|r| !r.is_zero()) {
                    pool_sim.reserves = fresh.clone();
                }
            }
            sourced.push(Sourced { request, point });
            adjusted.push(pool_sim);
        }
        sourced.push(ctx.gas.clone());
        sourced.push(ctx.native_usd.clone());
        sourced.push(ctx.input_usd.clone());

        let legs: Vec<ResolvedLeg<'_>> = path
            .legs
            .iter()
            .zip(adjusted.iter())
            .map(|(leg, pool)| ResolvedLeg { pool, token_in: leg.token_in, token_out: leg.token_out })
            .collect();

        // State: Candidate -> Validated.
        let confidence = sourced.iter().map(|s| s.point.confidence).fold(1.0, f64::min);

        // Gas conversion into input units.
        let Some(input_meta) = snapshot.token(input_token) else {
            return self.rejected(path, &signature, input_token, RejectReason::DataUnavailable);
        };
        let input_decimals = input_meta.decimals;
        let input_address = input_meta.address;
        let (Some(gas_price), Some(native_usd), Some(input_usd)) = (
            ctx.gas.point.scalar(),
            ctx.native_usd.point.scalar(),
            ctx.input_usd.point.scalar(),
        ) else {
            return self.rejected(path, &signature, input_token, RejectReason::DataUnavailable);
        };
        if input_usd <= Decimal::ZERO || native_usd < Decimal::ZERO {
            return self.rejected(path, &signature, input_token, RejectReason::DataUnavailable);
        }

        let gas_units = self.config.gas_units_base
            + self.config.gas_units_per_hop * path.legs.len() as u64;
        let wei_per_native = Decimal::from_u128(1_000_000_000_000_000_000u128).unwrap_or(Decimal::ONE);
        let gas_cost_usd = Decimal::from(gas_units) * gas_price / wei_per_native * native_usd;
        let unit_scale = decimal_pow10(input_decimals);
        let gas_cost_quote_dec = (gas_cost_usd / input_usd * unit_scale).trunc();
        let Some(gas_cost_quote) = gas_cost_quote_dec.to_u128().map(U256::from) else {
            return self.rejected(path, &signature, input_token, RejectReason::MathFailure);
        };

        // Sizing through the flashloan providers.
        let choice = match self.sizer.select(&legs, chain, input_address, gas_cost_quote) {
            Ok(Some(choice)) => choice,
            Ok(None) => {
                debug!(path = %signature, "no profitable size");
                return self.rejected(path, &signature, input_token, RejectReason::NoProfit);
            }
            Err(MathError::InsufficientLiquidity) => {
                return self.rejected(path, &signature, input_token, RejectReason::InsufficientLiquidity)
            }
            Err(err) => {
                debug!(%err, path = %signature, "sizing failed");
                return self.rejected(path, &signature, input_token, RejectReason::MathFailure);
            }
        };
        let amount = choice.trade.amount_in;

        // Depth guard ahead of the final simulation.
        if let Err(MathError::InsufficientLiquidity) = check_leg_depth(&legs, amount) {
            return self.rejected(path, &signature, input_token, RejectReason::InsufficientLiquidity);
        }

        let quote = match multi_hop_out(&legs, amount) {
            Ok(q) => q,
            Err(MathError::InsufficientLiquidity) => {
                return self.rejected(path, &signature, input_token, RejectReason::InsufficientLiquidity)
            }
            Err(err) => {
                debug!(%err, path = %signature, "simulation failed");
                return self.rejected(path, &signature, input_token, RejectReason::MathFailure);
            }
        };

        // USD projections.
        let Some(amount_dec) = u256_to_decimal(amount) else {
            return self.rejected(path, &signature, input_token, RejectReason::MathFailure);
        };
        let notional_usd = amount_dec / unit_scale * input_usd;
        let net_profit = choice.trade.breakdown.net_profit;
        let profit_dec = i256_to_decimal(net_profit).unwrap_or(Decimal::ZERO);
        let net_profit_usd = profit_dec / unit_scale * input_usd;

        // Double validation where the fabric demands it.
        let mut double_ran = false;
        let mut double_ok = true;
        for s in &sourced {
            if !self.validator.needs_double_validation(&s.point, notional_usd) {
                continue;
            }
            double_ran = true;
            let request = s.request.clone().with_notional(notional_usd);
            match self.validator.double_validate(&request, &s.point).await {
                Ok(result) if result.passed => {}
                Ok(result) => {
                    debug!(reason = ?result.reason, "double validation failed");
                    double_ok = false;
                    break;
                }
                Err(err) => {
                    debug!(%err, "double validation errored");
                    double_ok = false;
                    break;
                }
            }
        }
        let double_validation_passed = double_ran.then_some(double_ok);

        // State: Validated -> Scored.
        let fee_cost_bps: u32 = legs.iter().map(|l| l.pool.fee_bps).sum();
        let cap_fraction = legs
            .iter()
            .zip(quote.amounts.iter())
            .map(|(leg, amount_in)| {
                let reserve = leg
                    .pool
                    .reserve_of(leg.token_in)
                    .and_then(u256_to_decimal)
                    .unwrap_or(Decimal::MAX);
                let amt = u256_to_decimal(*amount_in).unwrap_or(Decimal::ZERO);
                if reserve.is_zero() {
                    Decimal::ONE
                } else {
                    amt / reserve
                }
            })
            .fold(Decimal::ZERO, Decimal::max);
        let liquidity_score = FeatureVector::liquidity_score_from_fraction(
            (cap_fraction / Decimal::new(3, 1)).to_f64().unwrap_or(1.0),
        );

        let gross_profit_usd = {
            let gross = i256_to_decimal(choice.trade.breakdown.net_profit).unwrap_or(Decimal::ZERO)
                + gas_cost_quote_dec
                + u256_to_decimal(choice.trade.breakdown.flashloan_fee).unwrap_or(Decimal::ZERO);
            gross / unit_scale * input_usd
        };

        let feature_vector = FeatureVector {
            hops: path.legs.len() as u32,
            gross_profit_usd: gross_profit_usd.to_f64().unwrap_or(0.0),
            gas_cost_usd: gas_cost_usd.to_f64().unwrap_or(0.0),
            estimated_profit_usd: net_profit_usd.to_f64().unwrap_or(0.0),
            liquidity_score,
            price_impact_bps: quote.worst_impact_bps,
            slippage_bps: quote.aggregate_slippage_bps,
            confidence,
            time_of_day: FeatureVector::time_of_day_from_ms(crate::validation::now_ms()),
            volatility_indicator: ctx.volatility_indicator,
        };
        let ml_score = self.score(&signature, &feature_vector).await;

        // State: Scored -> Gated.
        let leg_loads: Vec<(U256, U256)> = legs
            .iter()
            .zip(quote.amounts.iter())
            .map(|(leg, amount_in)| {
                (*amount_in, leg.pool.reserve_of(leg.token_in).unwrap_or(U256::ZERO))
            })
            .collect();
        let gate_input = gates::GateInput {
            confidence,
            required_confidence: self.validator.config().required_confidence(notional_usd),
            net_profit,
            net_profit_usd,
            slippage_bps: quote.aggregate_slippage_bps,
            worst_impact_bps: quote.worst_impact_bps,
            gas_cost_usd,
            notional_usd,
            leg_loads: &leg_loads,
            double_validation_passed,
        };
        let state = match gates::apply(&self.config.gates, &gate_input) {
            Ok(()) => OpportunityState::Approved,
            Err(reason) => OpportunityState::Rejected(reason),
        };

        if state == OpportunityState::Approved {
            info!(
                path = %signature,
                amount = %amount,
                profit_usd = %net_profit_usd,
                score = ml_score,
                "opportunity approved"
            );
        }

        Opportunity {
            path: path.clone(),
            path_signature: signature,
            chain,
            input_token,
            input_amount: amount,
            per_leg_amounts: quote.amounts.clone(),
            gross_out: quote.amount_out,
            fee_cost_bps,
            flashloan_provider: Some(choice.provider_name),
            flashloan_fee_bps: choice.fee_bps,
            flashloan_fee: choice.trade.breakdown.flashloan_fee,
            gas_cost_quote,
            gas_cost_usd,
            net_profit,
            net_profit_usd,
            notional_usd,
            slippage_bps: quote.aggregate_slippage_bps,
            market_impact_bps: quote.worst_impact_bps,
            ml_score,
            confidence,
            data_points: sourced.into_iter().map(|s| s.point).collect(),
            state,
        }
    }

    /// Resolve an approved opportunity into its external plan payload.
    pub fn plan(&self, opportunity: &Opportunity, snapshot: &RegistrySnapshot) -> Option<OpportunityPlan> {
        let mut legs = Vec::with_capacity(opportunity.path.legs.len());
        for leg in &opportunity.path.legs {
            let pool = snapshot.pool(leg.pool).ok()?;
            let token_in = snapshot.token(leg.token_in)?.address;
            let token_out = snapshot.token(leg.token_out)?.address;
            legs.push(PlanLeg { pool: pool.address, dex: pool.dex_kind(), token_in, token_out });
        }
        let input_address = snapshot.token(opportunity.input_token)?.address;
        Some(opportunity.to_plan(&legs, input_address))
    }

    async fn score(&self, signature: &str, features: &FeatureVector) -> f32 {
        if let Some((cached_features, cached_score)) = self.feature_cache.lock().get(signature) {
            if cached_features == features {
                return *cached_score;
            }
        }
        let score = match &self.scorer {
            Some(scorer) => match timeout(ML_TIMEOUT, scorer.score(features)).await {
                Ok(Ok(s)) if (0.0..=1.0).contains(&s) => s,
                Ok(Ok(s)) => {
                    debug!(score = s, "ml adapter returned out-of-range score, using fallback");
                    HeuristicScorer::score_sync(features)
                }
                Ok(Err(err)) => {
                    debug!(%err, "ml adapter failed, using fallback");
                    HeuristicScorer::score_sync(features)
                }
                Err(_) => {
                    debug!("ml adapter timed out, using fallback");
                    HeuristicScorer::score_sync(features)
                }
            },
            None => HeuristicScorer::score_sync(features),
        };
        self.feature_cache
            .lock()
            .put(signature.to_string(), (features.clone(), score));
        score
    }

    fn rejected(
        &self,
        path: &Path,
        signature: &str,
        input_token: TokenId,
        reason: RejectReason,
    ) -> Opportunity {
        debug!(path = %signature, reason = reason.as_str(), "candidate rejected");
        Opportunity {
            path: path.clone(),
            path_signature: signature.to_string(),
            chain: 0,
            input_token,
            input_amount: U256::ZERO,
            per_leg_amounts: Vec::new(),
            gross_out: U256::ZERO,
            fee_cost_bps: 0,
            flashloan_provider: None,
            flashloan_fee_bps: 0,
            flashloan_fee: U256::ZERO,
            gas_cost_quote: U256::ZERO,
            gas_cost_usd: Decimal::ZERO,
            net_profit: alloy::primitives::I256::ZERO,
            net_profit_usd: Decimal::ZERO,
            notional_usd: Decimal::ZERO,
            slippage_bps: 0,
            market_impact_bps: 0,
            ml_score: 0.0,
            confidence: 0.0,
            data_points: Vec::new(),
            state: OpportunityState::Rejected(reason),
        }
    }
}

fn decimal_pow10(decimals: u8) -> Decimal {
    let mut scale = Decimal::ONE;
    for _ in 0..decimals {
        scale *= Decimal::from(10u64);
    }
    scale
}

fn u256_to_decimal(v: U256) -> Option<Decimal> {
    u128::try_from(v).ok().and_then(Decimal::from_u128)
}

fn i256_to_decimal(v: alloy::primitives::I256) -> Option<Decimal> {
    let negative = v.is_negative();
    let magnitude = u256_to_decimal(v.unsigned_abs())?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::adapters::oracle::{OracleAdapter, StaticOracle};
    use crate::adapters::rpc::{RpcAdapter, RpcRotation, StaticRpc};
    use crate::adapters::{AdapterError, DataFetcher, RawSample, RetryPolicy};
    use crate::flashloan::{FlashloanProvider, ProviderKind};
    use crate::registry::testutil::{token, v2_update};
    use crate::registry::{GraphFilter, PoolRegistry};
    use crate::validation::accounting::AccountingTracker;
    use crate::validation::cache::{DataCache, LastGoodStore};
    use crate::validation::layers::FallbackLayers;
    use crate::validation::oracle::{OracleConfig, OracleVerifier};
    use crate::validation::{now_ms, ValidationConfig};
    use alloy::primitives::Address;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    /// Protocol-native fetcher that routes by request shape.
    #[derive(Default)]
    pub struct RoutingPrimary {
        pub prices: parking_lot::Mutex<HashMap<(String, String), Decimal>>,
        pub gas_wei: parking_lot::Mutex<HashMap<crate::types::ChainId, alloy::primitives::U256>>,
        pub reserves: parking_lot::Mutex<HashMap<Address, Vec<alloy::primitives::U256>>>,
        pub age_ms: parking_lot::Mutex<u64>,
    }

    impl RoutingPrimary {
        pub fn set_price(&self, base: &str, quote: &str, price: Decimal) {
            self.prices.lock().insert((base.into(), quote.into()), price);
        }

        pub fn set_gas(&self, chain: crate::types::ChainId, wei: u64) {
            self.gas_wei.lock().insert(chain, alloy::primitives::U256::from(wei));
        }

        pub fn set_reserves(&self, pool: Address, reserves: Vec<u128>) {
            self.reserves
                .lock()
                .insert(pool, reserves.into_iter().map(alloy::primitives::U256::from).collect());
        }
    }

    #[async_trait]
    impl DataFetcher for RoutingPrimary {
        fn source_name(&self) -> &str {
            "protocol-sdk"
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<RawSample, AdapterError> {
            let observed_at_ms = now_ms().saturating_sub(*self.age_ms.lock());
            let value = match (&request.data_type, &request.subject) {
                (DataType::Price, FetchSubject::Pair { base, quote }) => self
                    .prices
                    .lock()
                    .get(&(base.clone(), quote.clone()))
                    .copied()
                    .map(DataValue::Price),
                (DataType::Gas, _) => self.gas_wei.lock().get(&request.chain).copied().map(DataValue::Gas),
                (DataType::Reserves, FetchSubject::Pool(pool)) => {
                    self.reserves.lock().get(pool).cloned().map(DataValue::Reserves)
                }
                _ => None,
            };
            value
                .map(|value| RawSample { value, observed_at_ms, source: "protocol-sdk".into() })
                .ok_or_else(|| AdapterError::Transport("not routed".into()))
        }
    }

    pub struct EvalFixture {
        pub registry: PoolRegistry,
        pub evaluator: Evaluator,
        pub primary: Arc<RoutingPrimary>,
        pub validator: Arc<DataValidator>,
    }

    pub const POOL_A: u8 = 0xA0;
    pub const POOL_B: u8 = 0xA1;

    /// Registry with the two-pool cycle from the seeded scenarios:
    /// P1 (A/B, 1_000_000 / 2_000_000), P2 (B/A, `p2_b` / 1_000_000).
    pub fn fixture(p2_reserve_b: u128) -> EvalFixture {
        let registry = PoolRegistry::new(GraphFilter::default(), [1]);
        let mut tok_a = token(1, 1, "AAA");
        tok_a.decimals = 6;
        let mut tok_b = token(1, 2, "BBB");
        tok_b.decimals = 6;
        registry.apply_update(vec![
            v2_update(1, POOL_A, tok_a.clone(), tok_b.clone(), 1_000_000, 2_000_000, 30),
            v2_update(1, POOL_B, tok_b, tok_a, p2_reserve_b, 1_000_000, 30),
        ]);

        let primary = Arc::new(RoutingPrimary::default());
        primary.set_reserves(Address::repeat_byte(POOL_A), vec![1_000_000, 2_000_000]);
        primary.set_reserves(Address::repeat_byte(POOL_B), vec![p2_reserve_b, 1_000_000]);
        primary.set_gas(1, 1_000_000_000); // 1 gwei
        primary.set_price("AAA", "USD", dec!(10000));
        primary.set_price("NATIVE", "USD", dec!(1));

        let oracle = Arc::new(StaticOracle::new("chainlink"));
        oracle.set_spot(1, "AAA", "USD", dec!(10000));
        oracle.set_spot(1, "NATIVE", "USD", dec!(1));
        oracle.set_spot(1, "GAS", "WEI", dec!(1000000000));

        let rpc_a = Arc::new(StaticRpc::new("rpc-a"));
        let rpc_b = Arc::new(StaticRpc::new("rpc-b"));
        for rpc in [&rpc_a, &rpc_b] {
            rpc.set_gas_price(1, alloy::primitives::U256::from(1_000_000_000u64));
            rpc.set_reserves(
                1,
                Address::repeat_byte(POOL_A),
                vec![alloy::primitives::U256::from(1_000_000u64), alloy::primitives::U256::from(2_000_000u64)],
            );
            rpc.set_reserves(
                1,
                Address::repeat_byte(POOL_B),
                vec![alloy::primitives::U256::from(p2_reserve_b), alloy::primitives::U256::from(1_000_000u64)],
            );
        }

        let cache = Arc::new(DataCache::new(64));
        let last_good = Arc::new(LastGoodStore::new());
        let layers = FallbackLayers::new(
            Some(primary.clone() as Arc<dyn DataFetcher>),
            Arc::new(RpcRotation::new(vec![
                rpc_a as Arc<dyn RpcAdapter>,
                rpc_b as Arc<dyn RpcAdapter>,
            ])),
            cache.clone(),
            last_good.clone(),
            RetryPolicy { base_delay_ms: 1, factor: 2, max_attempts: 2 },
        );
        let verifier = OracleVerifier::new(
            vec![oracle as Arc<dyn OracleAdapter>],
            OracleConfig::default(),
        );
        let validator = Arc::new(DataValidator::new(
            layers,
            verifier,
            Arc::new(AccountingTracker::new()),
            cache,
            last_good,
            ValidationConfig { double_validation_delay_ms: 1, ..Default::default() },
        ));

        let provider = FlashloanProvider::new("balancer-vault", ProviderKind::BalancerLike, 0, 190_000)
            .with_liquidity(1, Address::repeat_byte(1), alloy::primitives::U256::MAX);
        let evaluator = Evaluator::new(
            validator.clone(),
            FlashloanSizer::new(vec![provider]),
            None,
            EvaluatorConfig {
                gates: GateConfig { min_profit_usd: dec!(1), ..Default::default() },
                ..Default::default()
            },
        );
        EvalFixture { registry, evaluator, primary, validator }
    }

    pub fn two_hop_path(snapshot: &RegistrySnapshot) -> Path {
        use crate::types::{DexKind, PathLeg};
        let p1 = snapshot
            .pool_id(1, DexKind::ConstantProductV2, Address::repeat_byte(POOL_A))
            .unwrap();
        let p2 = snapshot
            .pool_id(1, DexKind::ConstantProductV2, Address::repeat_byte(POOL_B))
            .unwrap();
        Path::new(vec![
            PathLeg { pool: p1, token_in: TokenId(0), token_out: TokenId(1) },
            PathLeg { pool: p2, token_in: TokenId(1), token_out: TokenId(0) },
        ])
    }

    pub async fn context(fx: &EvalFixture) -> EvalContext {
        let gas_req = FetchRequest::new(DataType::Gas, 1, FetchSubject::Chain);
        let native_req = FetchRequest::new(
            DataType::Price,
            1,
            FetchSubject::Pair { base: "NATIVE".into(), quote: "USD".into() },
        );
        let input_req = FetchRequest::new(
            DataType::Price,
            1,
            FetchSubject::Pair { base: "AAA".into(), quote: "USD".into() },
        );
        EvalContext {
            gas: Sourced {
                point: fx.validator.fetch_validated(&gas_req).await.unwrap(),
                request: gas_req,
            },
            native_usd: Sourced {
                point: fx.validator.fetch_validated(&native_req).await.unwrap(),
                request: native_req,
            },
            input_usd: Sourced {
                point: fx.validator.fetch_validated(&input_req).await.unwrap(),
                request: input_req,
            },
            volatility_indicator: 0.1,
        }
    }
}
