//! The four fallback layers of the data fabric.
//!
//! 1. protocol-native fetcher (weight 1.00)
//! 2. RPC rotation with median consensus (0.95)
//! 3. TTL'd cache (0.85)
//! 4. last-known-good with conservative widening (0.60)
//!
//! The first layer that produces a value wins; layer order equals source
//! weight order, so "first success" and "highest confidence" coincide.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

use super::cache::{DataCache, LastGoodStore};
use super::datapoint::{now_ms, DataType, DataValue, FetchRequest, FetchSubject};
use super::ValidationError;
use crate::adapters::rpc::{RpcRotation, RPC_TIMEOUT};
use crate::adapters::{with_retry, DataFetcher, RetryPolicy};

/// A value as it came out of a layer, before provenance stamping.
#[derive(Debug, Clone)]
pub struct LayeredFetch {
    pub value: DataValue,
    pub layer: u8,
    pub source: String,
    pub observed_at_ms: u64,
    pub stale: bool,
}

pub struct FallbackLayers {
    primary: Option<Arc<dyn DataFetcher>>,
    rpc: Arc<RpcRotation>,
    cache: Arc<DataCache>,
    last_good: Arc<LastGoodStore>,
    retry: RetryPolicy,
    consensus_band_pct: Decimal,
}

impl FallbackLayers {
    pub fn new(
        primary: Option<Arc<dyn DataFetcher>>,
        rpc: Arc<RpcRotation>,
        cache: Arc<DataCache>,
        last_good: Arc<LastGoodStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self { primary, rpc, cache, last_good, retry, consensus_band_pct: dec!(1) }
    }

    /// Standard fetch through all four layers.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<LayeredFetch, ValidationError> {
        self.fetch_inner(request, None, true).await
    }

    /// Phase-2 fetch: the phase-1 source is excluded and the cached layers
    /// are skipped, so the result is genuinely independent.
    pub async fn fetch_disjoint(
        &self,
        request: &FetchRequest,
        excluded_source: &str,
    ) -> Result<LayeredFetch, ValidationError> {
        self.fetch_inner(request, Some(excluded_source), false).await
    }

    async fn fetch_inner(
        &self,
        request: &FetchRequest,
        excluded_source: Option<&str>,
        allow_cached_layers: bool,
    ) -> Result<LayeredFetch, ValidationError> {
        // Layer 1: protocol-native.
        if let Some(primary) = &self.primary {
            if excluded_source != Some(primary.source_name()) {
                let fetched = with_retry(&self.retry, primary.source_name(), || async {
                    match timeout(RPC_TIMEOUT, primary.fetch(request)).await {
                        Ok(r) => r,
                        Err(_) => Err(crate::adapters::AdapterError::Timeout),
                    }
                })
                .await;
                match fetched {
                    Ok(sample) => {
                        return Ok(LayeredFetch {
                            value: sample.value,
                            layer: 1,
                            source: sample.source,
                            observed_at_ms: sample.observed_at_ms,
                            stale: false,
                        });
                    }
                    Err(err) => debug!(%err, "layer 1 exhausted, falling through"),
                }
            }
        }

        // Layer 2: RPC rotation with median consensus.
        if let Some(fetched) = self.layer2_consensus(request, excluded_source).await {
            return Ok(fetched);
        }

        if allow_cached_layers {
            // Layer 3: cache inside TTL.
            if let Some(point) = self.cache.get(request, now_ms()) {
                return Ok(LayeredFetch {
                    value: point.value.clone(),
                    layer: 3,
                    source: format!("cache:{}", point.source),
                    observed_at_ms: point.timestamp_ms,
                    stale: false,
                });
            }

            // Layer 4: last known good, widened and marked stale.
            if let Some(point) = self.last_good.conservative(request) {
                return Ok(LayeredFetch {
                    value: point.value.clone(),
                    layer: 4,
                    source: format!("last-good:{}", point.source),
                    observed_at_ms: point.timestamp_ms,
                    stale: true,
                });
            }
        }

        Err(ValidationError::FallbackExhausted {
            data_type: request.data_type,
            chain: request.chain,
        })
    }

    /// Query every (non-excluded) endpoint and accept the median when at
    /// least two values agree within the consensus band. Price and full
    /// pool data have no direct RPC representation and skip this layer.
    async fn layer2_consensus(
        &self,
        request: &FetchRequest,
        excluded_source: Option<&str>,
    ) -> Option<LayeredFetch> {
        // Price and full pool data have no direct RPC call shape.
        if matches!(request.data_type, DataType::Price | DataType::Pool) {
            return None;
        }
        let endpoints = match excluded_source {
            Some(name) => self.rpc.ordered_excluding(name),
            None => self.rpc.ordered(),
        };
        if endpoints.is_empty() {
            return None;
        }

        let mut samples: Vec<(DataValue, String)> = Vec::new();
        for endpoint in endpoints {
            let name = endpoint.endpoint().to_string();
            let value = match (&request.data_type, &request.subject) {
                (DataType::Gas, _) => endpoint.get_gas_price(request.chain).await.ok().map(DataValue::Gas),
                (DataType::Reserves, FetchSubject::Pool(pool)) => endpoint
                    .get_reserves(request.chain, *pool)
                    .await
                    .ok()
                    .map(DataValue::Reserves),
                (DataType::Liquidity, FetchSubject::Pool(pool)) => endpoint
                    .get_reserves(request.chain, *pool)
                    .await
                    .ok()
                    .map(|rs| {
                        let mut sum = U256::ZERO;
                        for r in &rs {
                            sum = sum.saturating_add(*r);
                        }
                        DataValue::Liquidity(sum)
                    }),
                _ => None,
            };
            if let Some(v) = value {
                samples.push((v, name));
            }
        }
        if samples.len() < 2 {
            return None;
        }

        let mut scored: Vec<(Decimal, usize)> = samples
            .iter()
            .enumerate()
            .filter_map(|(i, (v, _))| v.scalar().map(|s| (s, i)))
            .collect();
        if scored.len() < 2 {
            return None;
        }
        scored.sort_by(|a, b| a.0.cmp(&b.0));
        let (median_scalar, median_idx) = scored[scored.len() / 2];
        if median_scalar.is_zero() {
            return None;
        }
        let agreeing = scored
            .iter()
            .filter(|(s, _)| ((*s - median_scalar) / median_scalar).abs() * dec!(100) <= self.consensus_band_pct)
            .count();
        if agreeing < 2 {
            debug!(samples = scored.len(), "layer 2 consensus failed: endpoints disagree");
            return None;
        }

        let (value, source) = samples[median_idx].clone();
        Some(LayeredFetch {
            value,
            layer: 2,
            source: format!("rpc-consensus:{source}"),
            observed_at_ms: now_ms(),
            stale: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rpc::{RpcAdapter, StaticRpc};
    use crate::adapters::{AdapterError, RawSample};
    use async_trait::async_trait;

    struct FlakyPrimary {
        fail: bool,
    }

    #[async_trait]
    impl DataFetcher for FlakyPrimary {
        fn source_name(&self) -> &str {
            "subgraph"
        }

        async fn fetch(&self, _request: &FetchRequest) -> Result<RawSample, AdapterError> {
            if self.fail {
                Err(AdapterError::Timeout)
            } else {
                Ok(RawSample {
                    value: DataValue::Gas(U256::from(30u64)),
                    observed_at_ms: now_ms(),
                    source: "subgraph".into(),
                })
            }
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy { base_delay_ms: 1, factor: 2, max_attempts: 2 }
    }

    fn gas_request() -> FetchRequest {
        FetchRequest::new(DataType::Gas, 1, FetchSubject::Chain)
    }

    fn rpc_with_gas(name: &str, gas: u64) -> Arc<dyn RpcAdapter> {
        let rpc = StaticRpc::new(name);
        rpc.set_gas_price(1, U256::from(gas));
        Arc::new(rpc)
    }

    fn layers(
        primary_fails: bool,
        endpoints: Vec<Arc<dyn RpcAdapter>>,
    ) -> (FallbackLayers, Arc<DataCache>, Arc<LastGoodStore>) {
        let cache = Arc::new(DataCache::new(16));
        let last_good = Arc::new(LastGoodStore::new());
        let fabric = FallbackLayers::new(
            Some(Arc::new(FlakyPrimary { fail: primary_fails })),
            Arc::new(RpcRotation::new(endpoints)),
            cache.clone(),
            last_good.clone(),
            fast_retry(),
        );
        (fabric, cache, last_good)
    }

    #[tokio::test]
    async fn layer1_wins_when_healthy() {
        let (fabric, _, _) = layers(false, vec![rpc_with_gas("a", 99)]);
        let fetched = fabric.fetch(&gas_request()).await.unwrap();
        assert_eq!(fetched.layer, 1);
        assert_eq!(fetched.source, "subgraph");
        assert_eq!(fetched.value, DataValue::Gas(U256::from(30u64)));
    }

    #[tokio::test]
    async fn layer2_consensus_takes_median_of_agreeing_endpoints() {
        let (fabric, _, _) = layers(
            true,
            vec![rpc_with_gas("a", 100), rpc_with_gas("b", 101), rpc_with_gas("c", 100)],
        );
        let fetched = fabric.fetch(&gas_request()).await.unwrap();
        assert_eq!(fetched.layer, 2);
        assert_eq!(fetched.value, DataValue::Gas(U256::from(100u64)));
        assert!(fetched.source.starts_with("rpc-consensus:"));
    }

    #[tokio::test]
    async fn layer2_requires_two_in_band() {
        // 100 vs 200: no two endpoints agree within 1%.
        let (fabric, _, last_good) = layers(true, vec![rpc_with_gas("a", 100), rpc_with_gas("b", 200)]);
        let err = fabric.fetch(&gas_request()).await.unwrap_err();
        assert!(matches!(err, ValidationError::FallbackExhausted { .. }));
        assert_eq!(last_good.len(), 0);
    }

    #[tokio::test]
    async fn layer3_serves_cached_point_inside_ttl() {
        let (fabric, cache, _) = layers(true, vec![]);
        let req = gas_request();
        let mut point = super::super::datapoint::DataPoint {
            request_id: 7,
            value: DataValue::Gas(U256::from(44u64)),
            data_type: DataType::Gas,
            source: "subgraph".into(),
            layer: 1,
            chain: 1,
            timestamp_ms: now_ms(),
            validated: true,
            oracle_verified: true,
            flagged: false,
            stale: false,
            staleness_s: 0.0,
            confidence: 1.0,
            metadata: Default::default(),
        };
        point.timestamp_ms = now_ms();
        cache.put(&req, point, now_ms());
        let fetched = fabric.fetch(&req).await.unwrap();
        assert_eq!(fetched.layer, 3);
        assert_eq!(fetched.value, DataValue::Gas(U256::from(44u64)));
        assert!(fetched.source.starts_with("cache:"));
    }

    #[tokio::test]
    async fn layer4_widens_and_marks_stale() {
        let (fabric, _, last_good) = layers(true, vec![]);
        let req = gas_request();
        let point = super::super::datapoint::DataPoint {
            request_id: 9,
            value: DataValue::Gas(U256::from(100u64)),
            data_type: DataType::Gas,
            source: "subgraph".into(),
            layer: 1,
            chain: 1,
            timestamp_ms: 0,
            validated: true,
            oracle_verified: true,
            flagged: false,
            stale: false,
            staleness_s: 0.0,
            confidence: 1.0,
            metadata: Default::default(),
        };
        last_good.remember(&req, &point);
        let fetched = fabric.fetch(&req).await.unwrap();
        assert_eq!(fetched.layer, 4);
        assert!(fetched.stale);
        assert_eq!(fetched.value, DataValue::Gas(U256::from(150u64)));
    }

    #[tokio::test]
    async fn disjoint_fetch_skips_cached_layers_and_excluded_source() {
        let (fabric, cache, last_good) = layers(false, vec![rpc_with_gas("a", 100), rpc_with_gas("b", 100)]);
        let req = gas_request();
        // Seed cached layers; a disjoint fetch must ignore them.
        let point = super::super::datapoint::DataPoint {
            request_id: 1,
            value: DataValue::Gas(U256::from(1u64)),
            data_type: DataType::Gas,
            source: "cached".into(),
            layer: 1,
            chain: 1,
            timestamp_ms: now_ms(),
            validated: true,
            oracle_verified: false,
            flagged: false,
            stale: false,
            staleness_s: 0.0,
            confidence: 1.0,
            metadata: Default::default(),
        };
        cache.put(&req, point.clone(), now_ms());
        last_good.remember(&req, &point);

        let fetched = fabric.fetch_disjoint(&req, "subgraph").await.unwrap();
        assert_eq!(fetched.layer, 2);
        assert_eq!(fetched.value, DataValue::Gas(U256::from(100u64)));
    }

    #[tokio::test]
    async fn everything_down_is_fallback_exhausted() {
        let (fabric, _, _) = layers(true, vec![]);
        let err = fabric.fetch(&gas_request()).await.unwrap_err();
        assert!(matches!(err, ValidationError::FallbackExhausted { .. }));
    }
}
