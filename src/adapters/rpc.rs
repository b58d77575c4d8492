//! RPC adapter seam: per-endpoint health scoring, rotation order, a thin
//! JSON-RPC HTTP transport and a deterministic in-memory implementation for
//! simulation runs and tests.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::AdapterError;
use crate::types::ChainId;

/// Per-call timeout for RPC transports.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait RpcAdapter: Send + Sync {
    /// Stable endpoint identity for health tracking and source disjointness.
    fn endpoint(&self) -> &str;

    async fn get_reserves(&self, chain: ChainId, pool: Address) -> Result<Vec<U256>, AdapterError>;

    async fn get_gas_price(&self, chain: ChainId) -> Result<U256, AdapterError>;

    async fn get_block_number(&self, chain: ChainId) -> Result<u64, AdapterError>;
}

#[derive(Debug, Clone)]
struct EndpointHealth {
    score: f64,
    consecutive_failures: u32,
    last_latency_ms: u64,
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self { score: 1.0, consecutive_failures: 0, last_latency_ms: 0 }
    }
}

/// Rotation over independent providers. Healthy endpoints are tried first;
/// failures (timeouts, HTTP 4xx/5xx mapped by the transport) push an
/// endpoint down until successes heal it.
pub struct RpcRotation {
    endpoints: Vec<Arc<dyn RpcAdapter>>,
    health: DashMap<String, EndpointHealth>,
}

impl RpcRotation {
    pub fn new(endpoints: Vec<Arc<dyn RpcAdapter>>) -> Self {
        Self { endpoints, health: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in rotation order: descending health score, stable by
    /// registration order on ties.
    pub fn ordered(&self) -> Vec<Arc<dyn RpcAdapter>> {
        let mut indexed: Vec<(usize, Arc<dyn RpcAdapter>)> =
            self.endpoints.iter().cloned().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            let sa = self.score_of(a.endpoint());
            let sb = self.score_of(b.endpoint());
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal).then(ia.cmp(ib))
        });
        indexed.into_iter().map(|(_, e)| e).collect()
    }

    /// Endpoints excluding one source, for phase-2 disjoint refetch.
    pub fn ordered_excluding(&self, excluded: &str) -> Vec<Arc<dyn RpcAdapter>> {
        self.ordered().into_iter().filter(|e| e.endpoint() != excluded).collect()
    }

    pub fn score_of(&self, endpoint: &str) -> f64 {
        self.health.get(endpoint).map(|h| h.score).unwrap_or(1.0)
    }

    pub fn report_success(&self, endpoint: &str, latency: Duration) {
        let mut entry = self.health.entry(endpoint.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.last_latency_ms = latency.as_millis() as u64;
        entry.score = (entry.score + 0.1).min(1.0);
    }

    pub fn report_failure(&self, endpoint: &str, err: &AdapterError) {
        let mut entry = self.health.entry(endpoint.to_string()).or_default();
        entry.consecutive_failures += 1;
        entry.score = (entry.score - 0.25).max(0.0);
        warn!(endpoint, %err, failures = entry.consecutive_failures, "rpc endpoint degraded");
    }

    /// Run `op` against endpoints in rotation order until one succeeds.
    pub async fn first_success<T, F, Fut>(&self, mut op: F) -> Result<(T, String), AdapterError>
    where
        F: FnMut(Arc<dyn RpcAdapter>) -> Fut,
        Fut: std::future::Future<Output = Result<T, AdapterError>>,
    {
        let mut last = AdapterError::Timeout;
        for endpoint in self.ordered() {
            let name = endpoint.endpoint().to_string();
            let started = Instant::now();
            match op(endpoint).await {
                Ok(v) => {
                    self.report_success(&name, started.elapsed());
                    return Ok((v, name));
                }
                Err(err) => {
                    self.report_failure(&name, &err);
                    last = err;
                }
            }
        }
        Err(last)
    }
}

/// Thin JSON-RPC-over-HTTP transport. Only the three calls the fabric
/// needs; bundles, signing and subscriptions live outside this crate.
pub struct JsonRpcHttp {
    endpoint: String,
    client: reqwest::Client,
}

impl JsonRpcHttp {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { endpoint: endpoint.into(), client }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, AdapterError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout
                } else {
                    AdapterError::Transport(e.to_string())
                }
            })?;

        match response.status().as_u16() {
            401 | 403 => return Err(AdapterError::Unauthorized),
            429 => return Err(AdapterError::RateLimited),
            s if s >= 400 => return Err(AdapterError::Transport(format!("http status {s}"))),
            _ => {}
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        if let Some(err) = payload.get("error") {
            return Err(AdapterError::Transport(err.to_string()));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| AdapterError::Transport("missing result".into()))
    }

    fn parse_hex_u256(value: &serde_json::Value) -> Result<U256, AdapterError> {
        let raw = value.as_str().ok_or_else(|| AdapterError::Transport("non-string quantity".into()))?;
        U256::from_str_radix(raw.trim_start_matches("0x"), 16)
            .map_err(|e| AdapterError::Transport(format!("bad hex quantity: {e}")))
    }
}

/// getReserves() selector on v2-style pairs.
const GET_RESERVES_SELECTOR: &str = "0x0902f1ac";

#[async_trait]
impl RpcAdapter for JsonRpcHttp {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_reserves(&self, _chain: ChainId, pool: Address) -> Result<Vec<U256>, AdapterError> {
        let result = self
            .call(
                "eth_call",
                json!([{ "to": format!("{pool:?}"), "data": GET_RESERVES_SELECTOR }, "latest"]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| AdapterError::Transport("non-string call result".into()))?;
        let hex = raw.trim_start_matches("0x");
        if hex.len() < 128 {
            return Err(AdapterError::Transport("short getReserves payload".into()));
        }
        let reserve0 = U256::from_str_radix(&hex[0..64], 16)
            .map_err(|e| AdapterError::Transport(format!("bad reserve0: {e}")))?;
        let reserve1 = U256::from_str_radix(&hex[64..128], 16)
            .map_err(|e| AdapterError::Transport(format!("bad reserve1: {e}")))?;
        debug!(%pool, %reserve0, %reserve1, "fetched reserves");
        Ok(vec![reserve0, reserve1])
    }

    async fn get_gas_price(&self, _chain: ChainId) -> Result<U256, AdapterError> {
        let result = self.call("eth_gasPrice", json!([])).await?;
        Self::parse_hex_u256(&result)
    }

    async fn get_block_number(&self, _chain: ChainId) -> Result<u64, AdapterError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let n = Self::parse_hex_u256(&result)?;
        u64::try_from(n).map_err(|_| AdapterError::Transport("block number overflow".into()))
    }
}

/// Deterministic in-memory RPC used by SIMULATION mode and the test suite.
#[derive(Default)]
pub struct StaticRpc {
    name: String,
    reserves: DashMap<(ChainId, Address), Vec<U256>>,
    gas: DashMap<ChainId, U256>,
    blocks: DashMap<ChainId, u64>,
    fail_with: parking_lot::Mutex<Option<AdapterError>>,
}

impl StaticRpc {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn set_reserves(&self, chain: ChainId, pool: Address, reserves: Vec<U256>) {
        self.reserves.insert((chain, pool), reserves);
    }

    pub fn set_gas_price(&self, chain: ChainId, price: U256) {
        self.gas.insert(chain, price);
    }

    pub fn set_block_number(&self, chain: ChainId, block: u64) {
        self.blocks.insert(chain, block);
    }

    /// Make every subsequent call fail, until cleared with `None`.
    pub fn fail_with(&self, err: Option<AdapterError>) {
        *self.fail_with.lock() = err;
    }

    fn check_failure(&self) -> Result<(), AdapterError> {
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RpcAdapter for StaticRpc {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn get_reserves(&self, chain: ChainId, pool: Address) -> Result<Vec<U256>, AdapterError> {
        self.check_failure()?;
        self.reserves
            .get(&(chain, pool))
            .map(|r| r.clone())
            .ok_or_else(|| AdapterError::Transport(format!("no reserves seeded for {pool}")))
    }

    async fn get_gas_price(&self, chain: ChainId) -> Result<U256, AdapterError> {
        self.check_failure()?;
        self.gas
            .get(&chain)
            .map(|g| *g)
            .ok_or_else(|| AdapterError::Transport(format!("no gas seeded for chain {chain}")))
    }

    async fn get_block_number(&self, chain: ChainId) -> Result<u64, AdapterError> {
        self.check_failure()?;
        Ok(self.blocks.get(&chain).map(|b| *b).unwrap_or(0))
    }
}
