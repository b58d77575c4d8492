//! External adapter seams: RPC, oracle, ML inference and relay.
//!
//! Each adapter is a small trait with one job; implementations stay thin.
//! Transport failures are typed and retried with exponential backoff before
//! the fabric escalates them to `FallbackExhausted`.

pub mod ml;
pub mod oracle;
pub mod relay;
pub mod rpc;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::validation::datapoint::{DataValue, FetchRequest};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("adapter timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
}

impl AdapterError {
    /// Unauthorized never heals by retrying; everything else might.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AdapterError::Unauthorized)
    }
}

/// Exponential backoff: base * factor^attempt, bounded attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 100, factor: 2, max_attempts: 5 }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.factor.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor as u64))
    }
}

/// Run `op` under the policy. The last error is returned once attempts run
/// out; callers map it to `FallbackExhausted`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AdapterError>>,
{
    let mut last = AdapterError::Timeout;
    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                warn!(op = op_name, attempt, %err, "adapter call failed, backing off");
                last = err;
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
    Err(last)
}

/// A raw observation before the fabric stamps provenance onto it.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub value: DataValue,
    pub observed_at_ms: u64,
    pub source: String,
}

/// The single capability every data source implements. Layer 1 of the
/// fabric is just the protocol-native implementation of this trait.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    fn source_name(&self) -> &str;

    async fn fetch(&self, request: &FetchRequest) -> Result<RawSample, AdapterError>;
}

/// Bulk pool refresh for the orchestrator's Phase A. Returns full pool
/// observations ready for `PoolRegistry::apply_update`.
#[async_trait]
pub trait PoolSource: Send + Sync {
    fn source_name(&self) -> &str;

    async fn fetch_pools(&self) -> Result<Vec<crate::registry::PoolUpdate>, AdapterError>;
}

/// Fixed pool set served on every refresh; simulation and test wiring.
pub struct StaticPoolSource {
    pools: parking_lot::Mutex<Vec<crate::registry::PoolUpdate>>,
}

impl StaticPoolSource {
    pub fn new(pools: Vec<crate::registry::PoolUpdate>) -> Self {
        Self { pools: parking_lot::Mutex::new(pools) }
    }

    pub fn set_pools(&self, pools: Vec<crate::registry::PoolUpdate>) {
        *self.pools.lock() = pools;
    }
}

#[async_trait]
impl PoolSource for StaticPoolSource {
    fn source_name(&self) -> &str {
        "static-pools"
    }

    async fn fetch_pools(&self) -> Result<Vec<crate::registry::PoolUpdate>, AdapterError> {
        Ok(self.pools.lock().clone())
    }
}
