//! Layer-3 cache and layer-4 last-known-good store.
//!
//! The cache is LRU with a per-data-type TTL; entries expire on read, so a
//! stale hit can never satisfy a request. The last-known-good store never
//! expires but every value leaving it is widened to its conservative side
//! and flagged stale.

use alloy::primitives::U256;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use super::datapoint::{DataPoint, DataType, DataValue, FetchRequest};
use crate::math::BPS;
use dashmap::DashMap;

type CacheKey = (DataType, crate::types::ChainId, super::datapoint::FetchSubject);

struct CacheEntry {
    point: DataPoint,
    inserted_ms: u64,
}

/// TTL'd LRU over validated datapoints.
pub struct DataCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl DataCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    pub fn put(&self, request: &FetchRequest, point: DataPoint, now_ms: u64) {
        self.inner
            .lock()
            .put(request.cache_key(), CacheEntry { point, inserted_ms: now_ms });
    }

    /// A hit only counts while the data-type TTL holds.
    pub fn get(&self, request: &FetchRequest, now_ms: u64) -> Option<DataPoint> {
        let mut cache = self.inner.lock();
        let key = request.cache_key();
        let entry = cache.get(&key)?;
        let age_s = now_ms.saturating_sub(entry.inserted_ms) / 1_000;
        if age_s >= request.data_type.ttl_s() {
            cache.pop(&key);
            return None;
        }
        Some(entry.point.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Widening applied to layer-4 values: gas up 50%, reserves down 10%.
/// Numbers err against the trade; a fallback value must never make an
/// opportunity look better than a live one would.
const GAS_WIDEN_BPS: u32 = 5_000;
const RESERVE_HAIRCUT_BPS: u32 = 1_000;

/// Last-known-good values, layer 4 of the fabric.
#[derive(Default)]
pub struct LastGoodStore {
    inner: DashMap<CacheKey, DataPoint>,
}

impl LastGoodStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, request: &FetchRequest, point: &DataPoint) {
        self.inner.insert(request.cache_key(), point.clone());
    }

    /// Retrieve the remembered value with the conservative margin applied
    /// and the stale flag raised.
    pub fn conservative(&self, request: &FetchRequest) -> Option<DataPoint> {
        let mut point = self.inner.get(&request.cache_key())?.clone();
        point.value = widen_value(point.value);
        point.stale = true;
        Some(point)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

fn haircut(value: U256) -> U256 {
    let factor = U256::from(BPS - RESERVE_HAIRCUT_BPS);
    value
        .checked_mul(factor)
        .map(|v| v / U256::from(BPS))
        // Near-max values shed precision instead of overflowing.
        .unwrap_or_else(|| value / U256::from(BPS) * factor)
}

fn widen_value(value: DataValue) -> DataValue {
    match value {
        DataValue::Gas(g) => {
            let widened = g
                .checked_mul(U256::from(BPS + GAS_WIDEN_BPS))
                .map(|v| v / U256::from(BPS))
                .unwrap_or(g);
            DataValue::Gas(widened)
        }
        DataValue::Reserves(rs) => DataValue::Reserves(rs.into_iter().map(haircut).collect()),
        DataValue::Liquidity(l) => DataValue::Liquidity(haircut(l)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::super::datapoint::FetchSubject;
    use super::*;
    use std::collections::BTreeMap;

    fn request(data_type: DataType) -> FetchRequest {
        FetchRequest::new(data_type, 1, FetchSubject::Chain)
    }

    fn point(data_type: DataType, value: DataValue) -> DataPoint {
        DataPoint {
            request_id: 1,
            value,
            data_type,
            source: "test".into(),
            layer: 1,
            chain: 1,
            timestamp_ms: 0,
            validated: true,
            oracle_verified: false,
            flagged: false,
            stale: false,
            staleness_s: 0.0,
            confidence: 1.0,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn cache_hits_inside_ttl_and_expires_after() {
        let cache = DataCache::new(8);
        let req = request(DataType::Price);
        let p = point(DataType::Price, DataValue::Price(rust_decimal_macros::dec!(1850)));
        cache.put(&req, p, 1_000_000);
        assert!(cache.get(&req, 1_000_000 + 11_000).is_some());
        assert!(cache.get(&req, 1_000_000 + 12_000).is_none());
        // Expiry evicted the entry.
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_evicts_least_recent() {
        let cache = DataCache::new(1);
        let gas = request(DataType::Gas);
        let price = request(DataType::Price);
        cache.put(&gas, point(DataType::Gas, DataValue::Gas(U256::from(50u64))), 0);
        cache.put(&price, point(DataType::Price, DataValue::Price(rust_decimal_macros::dec!(1))), 0);
        assert!(cache.get(&gas, 1_000).is_none());
        assert!(cache.get(&price, 1_000).is_some());
    }

    #[test]
    fn last_good_widens_gas_upward() {
        let store = LastGoodStore::new();
        let req = request(DataType::Gas);
        store.remember(&req, &point(DataType::Gas, DataValue::Gas(U256::from(100u64))));
        let got = store.conservative(&req).unwrap();
        assert!(got.stale);
        assert_eq!(got.value, DataValue::Gas(U256::from(150u64)));
    }

    #[test]
    fn last_good_haircuts_reserves() {
        let store = LastGoodStore::new();
        let req = request(DataType::Reserves);
        store.remember(
            &req,
            &point(
                DataType::Reserves,
                DataValue::Reserves(vec![U256::from(1_000u64), U256::from(2_000u64)]),
            ),
        );
        let got = store.conservative(&req).unwrap();
        assert_eq!(
            got.value,
            DataValue::Reserves(vec![U256::from(900u64), U256::from(1_800u64)])
        );
    }
}
