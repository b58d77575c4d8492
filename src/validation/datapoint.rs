//! Externally sourced values with full provenance.
//!
//! Every quantity that participates in an execution decision travels as a
//! `DataPoint` through the validation fabric; raw adapter output never
//! reaches the evaluator directly.

use alloy::primitives::{Address, U256};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::ChainId;

/// Wall-clock milliseconds; provenance only, never a sizing input.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Price,
    Gas,
    Liquidity,
    Pool,
    Reserves,
}

impl DataType {
    /// Cache TTL for layer-3 reuse.
    pub fn ttl_s(&self) -> u64 {
        match self {
            DataType::Price => 12,
            DataType::Gas => 12,
            DataType::Liquidity => 60,
            DataType::Pool => 300,
            DataType::Reserves => 60,
        }
    }
}

/// What a request is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchSubject {
    /// A token pair, e.g. ("WETH", "USD").
    Pair { base: String, quote: String },
    /// A specific pool contract.
    Pool(Address),
    /// Chain-wide data (gas price, block number).
    Chain,
}

/// One fabric request. `notional_usd` carries the trade size context that
/// decides whether the TWAP guard and the stricter confidence floor apply;
/// zero means "not yet sized".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub data_type: DataType,
    pub chain: ChainId,
    pub subject: FetchSubject,
    pub notional_usd: Decimal,
    /// Pool whose TWAP guards this request when the notional is large.
    pub guard_pool: Option<Address>,
}

impl FetchRequest {
    pub fn new(data_type: DataType, chain: ChainId, subject: FetchSubject) -> Self {
        Self { data_type, chain, subject, notional_usd: Decimal::ZERO, guard_pool: None }
    }

    pub fn with_notional(mut self, notional_usd: Decimal) -> Self {
        self.notional_usd = notional_usd;
        self
    }

    pub fn with_guard_pool(mut self, pool: Address) -> Self {
        self.guard_pool = Some(pool);
        self
    }

    /// Cache key: requests differing only in notional share an entry.
    pub fn cache_key(&self) -> (DataType, ChainId, FetchSubject) {
        (self.data_type, self.chain, self.subject.clone())
    }
}

/// The fetched value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// Quote-denominated price, USD fixed point.
    Price(Decimal),
    /// Gas price in wei.
    Gas(U256),
    /// Liquidity depth in base units.
    Liquidity(U256),
    /// Per-token reserves in base units.
    Reserves(Vec<U256>),
    /// Full pool observation.
    PoolData(crate::registry::PoolUpdate),
}

impl DataValue {
    /// Scalar projection used for consensus and phase comparisons. Reserve
    /// vectors compare by their sum; full pool data by its reserve sum.
    pub fn scalar(&self) -> Option<Decimal> {
        match self {
            DataValue::Price(p) => Some(*p),
            DataValue::Gas(g) => u256_to_decimal(*g),
            DataValue::Liquidity(l) => u256_to_decimal(*l),
            DataValue::Reserves(rs) => {
                let mut sum = U256::ZERO;
                for r in rs {
                    sum = sum.checked_add(*r)?;
                }
                u256_to_decimal(sum)
            }
            DataValue::PoolData(p) => {
                let mut sum = U256::ZERO;
                for r in &p.reserves {
                    sum = sum.checked_add(*r)?;
                }
                u256_to_decimal(sum)
            }
        }
    }
}

fn u256_to_decimal(v: U256) -> Option<Decimal> {
    u128::try_from(v).ok().and_then(Decimal::from_u128)
}

/// Relative deviation |a - b| / |a|, as a fraction.
pub fn relative_deviation(a: Decimal, b: Decimal) -> Option<Decimal> {
    if a.is_zero() {
        return None;
    }
    Some(((a - b) / a).abs())
}

/// A validated observation plus provenance. Owned by the accounting
/// tracker; opportunities hold read-only copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    /// Accounting key; every point the evaluator consumes must have a
    /// matching tracker entry under this id.
    pub request_id: u64,
    pub value: DataValue,
    pub data_type: DataType,
    pub source: String,
    /// Fabric layer that produced the value (1..=4).
    pub layer: u8,
    pub chain: ChainId,
    pub timestamp_ms: u64,
    pub validated: bool,
    pub oracle_verified: bool,
    /// Set when an oracle cross-check exceeded the flag threshold.
    pub flagged: bool,
    /// Set when the value came from the conservative layer-4 store.
    pub stale: bool,
    pub staleness_s: f64,
    pub confidence: f64,
    pub metadata: BTreeMap<String, String>,
}

impl DataPoint {
    pub fn scalar(&self) -> Option<Decimal> {
        self.value.scalar()
    }
}

/// Outcome of a two-phase double validation. Transient.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub phase1_value: Option<Decimal>,
    pub phase2_value: Option<Decimal>,
    /// Relative deviation between phases, as a fraction.
    pub deviation: Option<Decimal>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ttls_follow_data_type() {
        assert_eq!(DataType::Price.ttl_s(), 12);
        assert_eq!(DataType::Gas.ttl_s(), 12);
        assert_eq!(DataType::Liquidity.ttl_s(), 60);
        assert_eq!(DataType::Pool.ttl_s(), 300);
    }

    #[test]
    fn scalar_sums_reserves() {
        let v = DataValue::Reserves(vec![U256::from(100u64), U256::from(200u64)]);
        assert_eq!(v.scalar(), Some(dec!(300)));
    }

    #[test]
    fn relative_deviation_is_symmetric_in_sign() {
        assert_eq!(relative_deviation(dec!(100), dec!(99)), Some(dec!(0.01)));
        assert_eq!(relative_deviation(dec!(100), dec!(101)), Some(dec!(0.01)));
        assert_eq!(relative_deviation(dec!(0), dec!(1)), None);
    }

    #[test]
    fn cache_key_ignores_notional() {
        let a = FetchRequest::new(DataType::Price, 1, FetchSubject::Pair {
            base: "WETH".into(),
            quote: "USD".into(),
        });
        let b = a.clone().with_notional(dec!(250000));
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
