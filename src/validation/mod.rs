//! Data validation fabric: the safety core.
//!
//! Every quantity on a decision path is fetched through the four fallback
//! layers, cross-checked against oracles where one exists, scored with the
//! confidence model and recorded by the accounting tracker. The evaluator
//! consumes only `DataPoint`s produced here.

pub mod accounting;
pub mod cache;
pub mod confidence;
pub mod datapoint;
mod double;
pub mod layers;
pub mod oracle;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use datapoint::{
    now_ms, DataPoint, DataType, DataValue, FetchRequest, FetchSubject, ValidationResult,
};

use accounting::AccountingTracker;
use cache::{DataCache, LastGoodStore};
use layers::FallbackLayers;
use oracle::{OracleCheck, OracleVerifier};

use crate::types::ChainId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("stale {data_type:?} data: {staleness_s:.1}s past the {limit_s:.1}s limit")]
    StaleData { data_type: DataType, staleness_s: f64, limit_s: f64 },
    #[error("confidence {confidence:.3} below required {required:.3}")]
    LowConfidence { confidence: f64, required: f64 },
    #[error("oracle deviation {deviation_pct}% outside tolerance")]
    OracleDeviation { deviation_pct: Decimal },
    #[error("all fabric layers exhausted for {data_type:?} on chain {chain}")]
    FallbackExhausted { data_type: DataType, chain: ChainId },
    #[error("double validation mismatch: phases deviate {deviation_pct}%")]
    DoubleValidationMismatch { deviation_pct: Decimal },
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Confidence floor for any execution.
    pub min_confidence: f64,
    /// Confidence floor once the notional crosses `high_notional_usd`.
    pub high_notional_confidence: f64,
    pub high_notional_usd: Decimal,
    /// Staleness limit for price points (seconds); other types use their
    /// cache TTL as the limit.
    pub price_staleness_limit_s: f64,
    /// Mandatory delay between double-validation phases.
    pub double_validation_delay_ms: u64,
    /// Phase agreement tolerance, percent.
    pub double_validation_tolerance_pct: Decimal,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.85,
            high_notional_confidence: 0.95,
            high_notional_usd: dec!(100000),
            price_staleness_limit_s: 12.0,
            double_validation_delay_ms: 500,
            double_validation_tolerance_pct: dec!(1),
        }
    }
}

impl ValidationConfig {
    pub fn staleness_limit_s(&self, data_type: DataType) -> f64 {
        match data_type {
            DataType::Price => self.price_staleness_limit_s,
            other => other.ttl_s() as f64,
        }
    }

    pub fn required_confidence(&self, notional_usd: Decimal) -> f64 {
        if notional_usd > self.high_notional_usd {
            self.high_notional_confidence
        } else {
            self.min_confidence
        }
    }
}

pub struct DataValidator {
    layers: FallbackLayers,
    oracle: OracleVerifier,
    accounting: Arc<AccountingTracker>,
    cache: Arc<DataCache>,
    last_good: Arc<LastGoodStore>,
    config: ValidationConfig,
}

impl DataValidator {
    pub fn new(
        layers: FallbackLayers,
        oracle: OracleVerifier,
        accounting: Arc<AccountingTracker>,
        cache: Arc<DataCache>,
        last_good: Arc<LastGoodStore>,
        config: ValidationConfig,
    ) -> Self {
        Self { layers, oracle, accounting, cache, last_good, config }
    }

    pub fn accounting(&self) -> &Arc<AccountingTracker> {
        &self.accounting
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Fetch through the fabric, cross-check, score and record. The result
    /// always carries provenance; rejecting on confidence is the caller's
    /// gate, because only the caller knows the trade notional.
    pub async fn fetch_validated(&self, request: &FetchRequest) -> Result<DataPoint, ValidationError> {
        let request_id = self.accounting.allocate_id();
        let fetched = self.layers.fetch(request).await?;
        let now = now_ms();
        let staleness_s = now.saturating_sub(fetched.observed_at_ms) as f64 / 1_000.0;

        let check = self.oracle_check(request, &fetched.value).await;
        let confidence = confidence::confidence_with_applicability(
            fetched.layer,
            staleness_s,
            check.applicable,
            check.verified,
            check.flagged,
        );

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("oracle_method".to_string(), check.method.to_string());
        if let Some(dev) = check.deviation_pct {
            metadata.insert("oracle_deviation_pct".to_string(), dev.to_string());
        }

        let point = DataPoint {
            request_id,
            value: fetched.value,
            data_type: request.data_type,
            source: fetched.source,
            layer: fetched.layer,
            chain: request.chain,
            timestamp_ms: fetched.observed_at_ms,
            validated: true,
            oracle_verified: check.verified,
            flagged: check.flagged,
            stale: fetched.stale,
            staleness_s,
            confidence,
            metadata,
        };
        self.accounting.record(&point);

        // Fresh observations replenish the cached layers.
        if point.layer <= 2 {
            self.cache.put(request, point.clone(), now);
            self.last_good.remember(request, &point);
        }
        debug!(
            id = point.request_id,
            layer = point.layer,
            confidence = point.confidence,
            flagged = point.flagged,
            "datapoint validated"
        );
        Ok(point)
    }

    async fn oracle_check(&self, request: &FetchRequest, value: &DataValue) -> OracleCheck {
        let twap_required = request.notional_usd > self.config.high_notional_usd;
        match (request.data_type, value) {
            (DataType::Price, DataValue::Price(price)) => {
                let (base, quote) = match &request.subject {
                    FetchSubject::Pair { base, quote } => (base.as_str(), quote.as_str()),
                    _ => ("", ""),
                };
                self.oracle
                    .verify_price(request.chain, base, quote, *price, request.guard_pool, twap_required)
                    .await
            }
            (DataType::Gas, DataValue::Gas(gas)) => {
                let scalar = DataValue::Gas(*gas).scalar().unwrap_or_default();
                // Gas rides the same feed shape under a reserved pair name.
                self.oracle
                    .verify_price(request.chain, "GAS", "WEI", scalar, None, false)
                    .await
            }
            _ => OracleCheck::not_applicable(),
        }
    }

    /// Whether a point must pass two-phase validation before execution.
    pub fn needs_double_validation(&self, point: &DataPoint, notional_usd: Decimal) -> bool {
        let unaccounted = !self.accounting.contains(point.request_id);
        let staleness_limit = self.config.staleness_limit_s(point.data_type);
        unaccounted
            || point.flagged
            || point.stale
            || point.staleness_s > staleness_limit
            || notional_usd > self.config.high_notional_usd
    }

    /// Run phase 2 against disjoint sources and gate on phase agreement.
    pub async fn double_validate(
        &self,
        request: &FetchRequest,
        phase1: &DataPoint,
    ) -> Result<ValidationResult, ValidationError> {
        double::run(
            &self.layers,
            request,
            phase1,
            self.config.double_validation_delay_ms,
            self.config.double_validation_tolerance_pct,
        )
        .await
    }
}
