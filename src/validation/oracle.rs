//! Oracle cross-checking for price and gas datapoints.
//!
//! A point is verified when it sits inside the accept band of the oracle
//! price, flagged when it leaves it, and additionally raises a
//! HighDeviationAlert past the alert band. Multi-oracle consensus (three
//! feeds within 1%) accepts without the TWAP guard; otherwise trades above
//! the high-notional threshold must also survive a TWAP comparison.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::adapters::oracle::{OracleAdapter, ORACLE_TIMEOUT};
use crate::types::ChainId;

#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Deviation (percent of oracle price) under which a point verifies.
    pub accept_deviation_pct: Decimal,
    /// Deviation past which a HighDeviationAlert is emitted.
    pub alert_deviation_pct: Decimal,
    /// Band for multi-oracle consensus around the median, percent.
    pub consensus_band_pct: Decimal,
    /// Feeds needed inside the band to accept without TWAP.
    pub consensus_min_feeds: usize,
    /// TWAP window for the manipulation guard.
    pub twap_window_s: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            accept_deviation_pct: dec!(2),
            alert_deviation_pct: dec!(5),
            consensus_band_pct: dec!(1),
            consensus_min_feeds: 3,
            twap_window_s: 1_800,
        }
    }
}

/// Outcome of a cross-check.
#[derive(Debug, Clone)]
pub struct OracleCheck {
    /// False for data types outside oracle scope; their confidence takes a
    /// neutral oracle weight.
    pub applicable: bool,
    pub verified: bool,
    pub flagged: bool,
    pub alert: bool,
    /// Deviation vs the reference price, percent.
    pub deviation_pct: Option<Decimal>,
    /// Which reference won: "consensus", "spot", "twap", or "none".
    pub method: &'static str,
}

impl Default for OracleCheck {
    fn default() -> Self {
        Self {
            applicable: true,
            verified: false,
            flagged: false,
            alert: false,
            deviation_pct: None,
            method: "spot",
        }
    }
}

impl OracleCheck {
    fn unavailable() -> Self {
        Self { method: "none", ..Default::default() }
    }

    pub fn not_applicable() -> Self {
        Self { applicable: false, method: "not_applicable", ..Default::default() }
    }
}

pub struct OracleVerifier {
    feeds: Vec<Arc<dyn OracleAdapter>>,
    config: OracleConfig,
}

impl OracleVerifier {
    pub fn new(feeds: Vec<Arc<dyn OracleAdapter>>, config: OracleConfig) -> Self {
        Self { feeds, config }
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Cross-check an SDK-derived price. `twap_pool` names the pool whose
    /// TWAP guards manipulation; `twap_required` is set by the caller when
    /// the trade notional is above the high-value threshold.
    pub async fn verify_price(
        &self,
        chain: ChainId,
        base: &str,
        quote: &str,
        sdk_price: Decimal,
        twap_pool: Option<Address>,
        twap_required: bool,
    ) -> OracleCheck {
        let quotes = self.gather_spots(chain, base, quote).await;
        if quotes.is_empty() {
            debug!(base, quote, "no oracle feed available, point stays unverified");
            return OracleCheck::unavailable();
        }

        // Consensus path: enough feeds inside the band accept outright.
        if let Some(median) = self.consensus_median(&quotes) {
            let mut check = self.band_check(sdk_price, median, "consensus");
            if check.verified {
                return check;
            }
            // Consensus exists but the SDK price sits outside it: the
            // stricter spot/TWAP path below decides flags and alerts.
            check.method = "consensus";
            return self.escalate(check, chain, sdk_price, twap_pool, twap_required).await;
        }

        let reference = quotes[0];
        let check = self.band_check(sdk_price, reference, "spot");
        if check.verified && !twap_required {
            return check;
        }
        self.escalate(check, chain, sdk_price, twap_pool, twap_required).await
    }

    async fn escalate(
        &self,
        mut check: OracleCheck,
        chain: ChainId,
        sdk_price: Decimal,
        twap_pool: Option<Address>,
        twap_required: bool,
    ) -> OracleCheck {
        if !twap_required {
            return check;
        }
        let Some(pool) = twap_pool else {
            warn!("twap required but no guard pool known; refusing verification");
            check.verified = false;
            return check;
        };
        match self.gather_twap(chain, pool).await {
            Some(twap) if !twap.is_zero() => {
                let dev = ((sdk_price - twap) / twap).abs() * dec!(100);
                check.deviation_pct = Some(dev);
                check.method = "twap";
                if dev <= self.config.accept_deviation_pct {
                    check.verified = true;
                } else {
                    check.verified = false;
                    check.flagged = true;
                    if dev > self.config.alert_deviation_pct {
                        check.alert = true;
                        warn!(%dev, "HighDeviationAlert: sdk price diverges from twap");
                    }
                }
                check
            }
            _ => {
                warn!("twap required but unavailable; refusing verification");
                check.verified = false;
                check
            }
        }
    }

    fn band_check(&self, sdk_price: Decimal, reference: Decimal, method: &'static str) -> OracleCheck {
        if reference.is_zero() {
            return OracleCheck::unavailable();
        }
        let dev = ((sdk_price - reference) / reference).abs() * dec!(100);
        let verified = dev <= self.config.accept_deviation_pct;
        let flagged = !verified;
        let alert = dev > self.config.alert_deviation_pct;
        if alert {
            warn!(%dev, %reference, %sdk_price, "HighDeviationAlert: oracle deviation");
        }
        OracleCheck { applicable: true, verified, flagged, alert, deviation_pct: Some(dev), method }
    }

    async fn gather_spots(&self, chain: ChainId, base: &str, quote: &str) -> Vec<Decimal> {
        let mut quotes = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            match timeout(ORACLE_TIMEOUT, feed.spot_price(chain, base, quote)).await {
                Ok(Ok(q)) => quotes.push(q.price),
                Ok(Err(err)) => debug!(feed = feed.name(), %err, "oracle spot failed"),
                Err(_) => debug!(feed = feed.name(), "oracle spot timed out"),
            }
        }
        quotes
    }

    async fn gather_twap(&self, chain: ChainId, pool: Address) -> Option<Decimal> {
        for feed in &self.feeds {
            match timeout(ORACLE_TIMEOUT, feed.twap(chain, pool, self.config.twap_window_s)).await {
                Ok(Ok(price)) => return Some(price),
                Ok(Err(err)) => debug!(feed = feed.name(), %err, "twap failed"),
                Err(_) => debug!(feed = feed.name(), "twap timed out"),
            }
        }
        None
    }

    /// Median of feeds, if at least `consensus_min_feeds` sit inside the
    /// consensus band around it.
    fn consensus_median(&self, quotes: &[Decimal]) -> Option<Decimal> {
        if quotes.len() < self.config.consensus_min_feeds {
            return None;
        }
        let mut sorted = quotes.to_vec();
        sorted.sort();
        let median = sorted[sorted.len() / 2];
        if median.is_zero() {
            return None;
        }
        let inside = sorted
            .iter()
            .filter(|q| ((**q - median) / median).abs() * dec!(100) <= self.config.consensus_band_pct)
            .count();
        (inside >= self.config.consensus_min_feeds).then_some(median)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oracle::StaticOracle;

    fn feed(name: &str, price: Decimal) -> Arc<dyn OracleAdapter> {
        let oracle = StaticOracle::new(name);
        oracle.set_spot(1, "WETH", "USD", price);
        Arc::new(oracle)
    }

    #[tokio::test]
    async fn small_deviation_verifies() {
        let verifier = OracleVerifier::new(vec![feed("a", dec!(1850))], OracleConfig::default());
        let check = verifier.verify_price(1, "WETH", "USD", dec!(1860), None, false).await;
        assert!(check.verified);
        assert!(!check.flagged);
        assert!(!check.alert);
    }

    #[tokio::test]
    async fn moderate_deviation_flags_without_alert() {
        // 1850 vs 1940: ~4.6% off the feed, past accept but under alert.
        let verifier = OracleVerifier::new(vec![feed("a", dec!(1940))], OracleConfig::default());
        let check = verifier.verify_price(1, "WETH", "USD", dec!(1850), None, false).await;
        assert!(!check.verified);
        assert!(check.flagged);
        assert!(!check.alert);
        assert!(check.deviation_pct.unwrap() > dec!(2));
    }

    #[tokio::test]
    async fn extreme_deviation_raises_alert() {
        let verifier = OracleVerifier::new(vec![feed("a", dec!(2000))], OracleConfig::default());
        let check = verifier.verify_price(1, "WETH", "USD", dec!(1850), None, false).await;
        assert!(check.flagged);
        assert!(check.alert);
    }

    #[tokio::test]
    async fn three_feed_consensus_accepts_without_twap() {
        let verifier = OracleVerifier::new(
            vec![feed("a", dec!(1850)), feed("b", dec!(1852)), feed("c", dec!(1848))],
            OracleConfig::default(),
        );
        // High-notional path, but consensus short-circuits the TWAP guard.
        let check = verifier.verify_price(1, "WETH", "USD", dec!(1851), None, true).await;
        assert!(check.verified);
        assert_eq!(check.method, "consensus");
    }

    #[tokio::test]
    async fn twap_guard_flags_manipulated_spot() {
        let oracle = StaticOracle::new("a");
        oracle.set_spot(1, "WETH", "USD", dec!(1850));
        oracle.set_twap(1, Address::repeat_byte(0xAA), dec!(1700));
        let verifier = OracleVerifier::new(vec![Arc::new(oracle)], OracleConfig::default());
        // Spot agrees, but the 30-minute TWAP is far away: manipulation
        // shaped exactly like this is what the guard exists for.
        let check = verifier
            .verify_price(1, "WETH", "USD", dec!(1850), Some(Address::repeat_byte(0xAA)), true)
            .await;
        assert!(!check.verified);
        assert!(check.flagged);
        assert!(check.alert);
        assert_eq!(check.method, "twap");
    }

    #[tokio::test]
    async fn no_feeds_means_unverified_not_flagged() {
        let verifier = OracleVerifier::new(vec![], OracleConfig::default());
        let check = verifier.verify_price(1, "WETH", "USD", dec!(1850), None, false).await;
        assert!(!check.verified);
        assert!(!check.flagged);
        assert_eq!(check.method, "none");
    }
}
