//! Oracle adapter seam: Chainlink-style spot rounds and Uniswap-style TWAP.

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::time::Duration;

use super::AdapterError;
use crate::types::ChainId;

/// Per-call timeout for oracle reads.
pub const ORACLE_TIMEOUT: Duration = Duration::from_secs(1);

/// One spot observation from a price feed.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleQuote {
    pub price: Decimal,
    pub round_id: u64,
    pub timestamp_ms: u64,
}

#[async_trait]
pub trait OracleAdapter: Send + Sync {
    /// Stable feed identity, used for disjoint-source selection.
    fn name(&self) -> &str;

    /// Chainlink-style latest round for a pair on a chain.
    async fn spot_price(
        &self,
        chain: ChainId,
        base: &str,
        quote: &str,
    ) -> Result<OracleQuote, AdapterError>;

    /// Time-weighted average price of a pool over a window.
    async fn twap(
        &self,
        chain: ChainId,
        pool: Address,
        window_s: u64,
    ) -> Result<Decimal, AdapterError>;
}

/// Deterministic in-memory oracle for SIMULATION mode and tests.
#[derive(Default)]
pub struct StaticOracle {
    name: String,
    spots: DashMap<(ChainId, String, String), OracleQuote>,
    twaps: DashMap<(ChainId, Address), Decimal>,
    fail_with: parking_lot::Mutex<Option<AdapterError>>,
}

impl StaticOracle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn set_spot(&self, chain: ChainId, base: &str, quote: &str, price: Decimal) {
        self.spots.insert(
            (chain, base.to_string(), quote.to_string()),
            OracleQuote { price, round_id: 1, timestamp_ms: 0 },
        );
    }

    pub fn set_twap(&self, chain: ChainId, pool: Address, price: Decimal) {
        self.twaps.insert((chain, pool), price);
    }

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
impl OracleAdapter for StaticOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn spot_price(
        &self,
        chain: ChainId,
        base: &str,
        quote: &str,
    ) -> Result<OracleQuote, AdapterError> {
        self.check_failure()?;
        self.spots
            .get(&(chain, base.to_string(), quote.to_string()))
            .map(|q| q.clone())
            .ok_or_else(|| AdapterError::Transport(format!("no feed for {base}/{quote}")))
    }

    async fn twap(
        &self,
        chain: ChainId,
        pool: Address,
        _window_s: u64,
    ) -> Result<Decimal, AdapterError> {
        self.check_failure()?;
        self.twaps
            .get(&(chain, pool))
            .map(|p| *p)
            .ok_or_else(|| AdapterError::Transport(format!("no twap for {pool}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn static_oracle_round_trips() {
        let oracle = StaticOracle::new("feed-a");
        oracle.set_spot(1, "WETH", "USD", dec!(1850.00));
        let quote = oracle.spot_price(1, "WETH", "USD").await.unwrap();
        assert_eq!(quote.price, dec!(1850.00));
        assert!(oracle.spot_price(1, "WBTC", "USD").await.is_err());
    }

    #[tokio::test]
    async fn failure_injection_propagates() {
        let oracle = StaticOracle::new("feed-b");
        oracle.set_spot(1, "WETH", "USD", dec!(1850));
        oracle.fail_with(Some(AdapterError::RateLimited));
        assert_eq!(
            oracle.spot_price(1, "WETH", "USD").await.unwrap_err(),
            AdapterError::RateLimited
        );
    }
}
