//! Core identity and market-data types shared across the engine.
//!
//! Tokens and pools are interned to dense integer ids at registry admission;
//! everything downstream (graph, paths, caches) refers to ids only, so no
//! reference cycles exist between pools, tokens and the graph.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// EVM-style chain identifier (1 = mainnet, 137 = Polygon, ...).
pub type ChainId = u64;

/// Dense token id assigned by the registry interner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u32);

/// Dense pool id assigned by the registry interner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub u32);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// AMM family a pool belongs to. Used for identity, allowlists and routing
/// into the matching math kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexKind {
    ConstantProductV2,
    ConcentratedV3,
    StableCurve,
    WeightedBalancer,
}

impl DexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DexKind::ConstantProductV2 => "constant_product_v2",
            DexKind::ConcentratedV3 => "concentrated_v3",
            DexKind::StableCurve => "stable_curve",
            DexKind::WeightedBalancer => "weighted_balancer",
        }
    }

    /// Parse a CSV allowlist entry. Accepts the canonical snake_case name
    /// and a couple of common short forms.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant_product_v2" | "v2" | "uniswap_v2" => Some(DexKind::ConstantProductV2),
            "concentrated_v3" | "v3" | "uniswap_v3" => Some(DexKind::ConcentratedV3),
            "stable_curve" | "stable" | "curve" => Some(DexKind::StableCurve),
            "weighted_balancer" | "weighted" | "balancer" => Some(DexKind::WeightedBalancer),
            _ => None,
        }
    }
}

impl fmt::Display for DexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concentrated-liquidity (v3-style) pool parameters at the current tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V3Params {
    /// Current sqrt(price) in Q64.96 fixed point.
    pub sqrt_price_x96: U256,
    /// Active in-range liquidity L.
    pub liquidity: u128,
    /// Tick spacing of the fee tier (10 / 60 / 200).
    pub tick_spacing: u32,
}

/// StableSwap pool parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableParams {
    /// Amplification coefficient A (already multiplied by n^(n-1) is NOT
    /// assumed; this is the raw A the invariant math scales itself).
    pub amp: u64,
}

/// Weighted (Balancer-style) pool parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedParams {
    /// Normalized weights per token, must sum to 1.
    pub weights: Vec<Decimal>,
}

/// Pool kind with kind-specific parameters as a tagged sum type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolKind {
    ConstantProductV2,
    ConcentratedV3(V3Params),
    StableCurve(StableParams),
    WeightedBalancer(WeightedParams),
}

impl PoolKind {
    pub fn dex_kind(&self) -> DexKind {
        match self {
            PoolKind::ConstantProductV2 => DexKind::ConstantProductV2,
            PoolKind::ConcentratedV3(_) => DexKind::ConcentratedV3,
            PoolKind::StableCurve(_) => DexKind::StableCurve,
            PoolKind::WeightedBalancer(_) => DexKind::WeightedBalancer,
        }
    }
}

/// A token admitted to the registry. Identity is (chain, address);
/// attributes are immutable once admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub chain: ChainId,
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl Token {
    /// Identity key for interning and equivalence lookups.
    pub fn key(&self) -> (ChainId, Address) {
        (self.chain, self.address)
    }
}

/// A liquidity pool. Identity is (chain, dex kind, address). Reserves are
/// integers in token base units, ordered like `tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub chain: ChainId,
    pub address: Address,
    pub kind: PoolKind,
    pub tokens: Vec<TokenId>,
    pub reserves: Vec<U256>,
    /// Swap fee applied to the input amount, in basis points [0, 10_000].
    pub fee_bps: u32,
    /// TVL estimate used only as a monotone admission filter, never for sizing.
    pub tvl_usd: Decimal,
    /// Unix milliseconds of the last reserve update.
    pub last_update_ms: u64,
    /// Fabric layer that produced the current reserves (1..=4).
    pub source_layer: u8,
    /// Fabric confidence attached to the current reserves.
    pub confidence: f64,
}

impl Pool {
    /// Position of a token inside this pool, if it trades here.
    pub fn token_index(&self, token: TokenId) -> Option<usize> {
        self.tokens.iter().position(|t| *t == token)
    }

    /// Reserve backing `token`, if the token trades here.
    pub fn reserve_of(&self, token: TokenId) -> Option<U256> {
        self.token_index(token).map(|i| self.reserves[i])
    }

    pub fn dex_kind(&self) -> DexKind {
        self.kind.dex_kind()
    }

    /// Check the structural invariants a pool must satisfy to be admitted:
    /// positive reserves on every tradable leg and kind/params consistency.
    /// Returns a human-readable reason on the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.tokens.len() < 2 {
            return Err(format!("pool has {} tokens, need at least 2", self.tokens.len()));
        }
        if self.tokens.len() != self.reserves.len() {
            return Err(format!(
                "token/reserve length mismatch: {} vs {}",
                self.tokens.len(),
                self.reserves.len()
            ));
        }
        if self.fee_bps > 10_000 {
            return Err(format!("fee {} bps out of range", self.fee_bps));
        }
        if self.reserves.iter().any(|r| r.is_zero()) {
            return Err("zero reserve on a tradable leg".to_string());
        }
        if self.tvl_usd < Decimal::ZERO {
            return Err("negative tvl".to_string());
        }
        match &self.kind {
            PoolKind::ConstantProductV2 | PoolKind::ConcentratedV3(_) | PoolKind::StableCurve(_)
                if self.tokens.len() != 2 =>
            {
                return Err(format!(
                    "{} pool must have exactly 2 tokens, has {}",
                    self.dex_kind(),
                    self.tokens.len()
                ));
            }
            PoolKind::ConcentratedV3(p) => {
                if p.sqrt_price_x96.is_zero() {
                    return Err("v3 pool with zero sqrt_price".to_string());
                }
                if p.liquidity == 0 {
                    return Err("v3 pool with zero liquidity".to_string());
                }
                if p.tick_spacing == 0 {
                    return Err("v3 pool with zero tick_spacing".to_string());
                }
            }
            PoolKind::StableCurve(p) => {
                if p.amp == 0 {
                    return Err("stable pool with zero amplification".to_string());
                }
            }
            PoolKind::WeightedBalancer(p) => {
                if p.weights.len() != self.tokens.len() {
                    return Err(format!(
                        "weight/token length mismatch: {} vs {}",
                        p.weights.len(),
                        self.tokens.len()
                    ));
                }
                let sum: Decimal = p.weights.iter().copied().sum();
                // Weights are stored normalized; tolerate rounding in the
                // last decimal place of a 1e-9 grid.
                let one = Decimal::ONE;
                let eps = Decimal::new(1, 9);
                if (sum - one).abs() > eps {
                    return Err(format!("weights sum to {sum}, expected 1"));
                }
                if p.weights.iter().any(|w| *w <= Decimal::ZERO) {
                    return Err("non-positive weight".to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// One hop of a cyclic path: swap `token_in` for `token_out` through `pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathLeg {
    pub pool: PoolId,
    pub token_in: TokenId,
    pub token_out: TokenId,
}

/// A cyclic candidate path: consecutive legs share a token and the last
/// leg returns to the first leg's input token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    pub legs: Vec<PathLeg>,
}

impl Path {
    pub fn new(legs: Vec<PathLeg>) -> Self {
        Self { legs }
    }

    pub fn hops(&self) -> usize {
        self.legs.len()
    }

    /// Token the cycle starts and ends with.
    pub fn source_token(&self) -> TokenId {
        self.legs[0].token_in
    }

    /// Structural validity: legs chain token-to-token and close the cycle,
    /// with no repeated intermediate token and no repeated pool.
    pub fn is_cyclic(&self) -> bool {
        if self.legs.len() < 2 {
            return false;
        }
        for pair in self.legs.windows(2) {
            if pair[0].token_out != pair[1].token_in {
                return false;
            }
        }
        if self.legs.last().unwrap().token_out != self.legs[0].token_in {
            return false;
        }
        let mut seen_tokens = std::collections::HashSet::new();
        for leg in &self.legs {
            if !seen_tokens.insert(leg.token_in) {
                return false;
            }
        }
        let mut seen_pools = std::collections::HashSet::new();
        self.legs.iter().all(|l| seen_pools.insert(l.pool))
    }

    /// Stable signature used as the feature-cache key: hop count plus the
    /// ordered pool/token id sequence of the canonical form.
    pub fn signature(&self) -> String {
        let mut out = format!("{}h", self.legs.len());
        for leg in &self.legs {
            out.push_str(&format!(":{}-{}>{}", leg.pool, leg.token_in, leg.token_out));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn v2_pool(tokens: Vec<TokenId>, reserves: Vec<U256>) -> Pool {
        Pool {
            chain: 1,
            address: Address::repeat_byte(0x11),
            kind: PoolKind::ConstantProductV2,
            tokens,
            reserves,
            fee_bps: 30,
            tvl_usd: dec!(1_000_000),
            last_update_ms: 0,
            source_layer: 1,
            confidence: 1.0,
        }
    }

    #[test]
    fn invariants_accept_healthy_v2() {
        let pool = v2_pool(
            vec![TokenId(0), TokenId(1)],
            vec![U256::from(1_000_000u64), U256::from(2_000_000u64)],
        );
        assert!(pool.check_invariants().is_ok());
    }

    #[test]
    fn invariants_reject_zero_reserve() {
        let pool = v2_pool(
            vec![TokenId(0), TokenId(1)],
            vec![U256::ZERO, U256::from(2_000_000u64)],
        );
        assert!(pool.check_invariants().is_err());
    }

    #[test]
    fn invariants_reject_v3_without_price() {
        let mut pool = v2_pool(
            vec![TokenId(0), TokenId(1)],
            vec![U256::from(1u64), U256::from(1u64)],
        );
        pool.kind = PoolKind::ConcentratedV3(V3Params {
            sqrt_price_x96: U256::ZERO,
            liquidity: 1,
            tick_spacing: 60,
        });
        assert!(pool.check_invariants().is_err());
    }

    #[test]
    fn invariants_reject_unnormalized_weights() {
        let mut pool = v2_pool(
            vec![TokenId(0), TokenId(1)],
            vec![U256::from(1u64), U256::from(1u64)],
        );
        pool.kind = PoolKind::WeightedBalancer(WeightedParams {
            weights: vec![dec!(0.5), dec!(0.6)],
        });
        assert!(pool.check_invariants().is_err());
    }

    #[test]
    fn path_cycle_detection() {
        let legs = vec![
            PathLeg { pool: PoolId(0), token_in: TokenId(0), token_out: TokenId(1) },
            PathLeg { pool: PoolId(1), token_in: TokenId(1), token_out: TokenId(0) },
        ];
        let path = Path::new(legs);
        assert!(path.is_cyclic());
        assert_eq!(path.hops(), 2);
        assert_eq!(path.source_token(), TokenId(0));
    }

    #[test]
    fn path_rejects_open_chain() {
        let legs = vec![
            PathLeg { pool: PoolId(0), token_in: TokenId(0), token_out: TokenId(1) },
            PathLeg { pool: PoolId(1), token_in: TokenId(1), token_out: TokenId(2) },
        ];
        assert!(!Path::new(legs).is_cyclic());
    }

    #[test]
    fn dex_kind_parse_accepts_aliases() {
        assert_eq!(DexKind::parse("v2"), Some(DexKind::ConstantProductV2));
        assert_eq!(DexKind::parse("Balancer"), Some(DexKind::WeightedBalancer));
        assert_eq!(DexKind::parse("nope"), None);
    }
}
