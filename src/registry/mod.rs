//! Pool registry: canonical pool storage with copy-on-write snapshots.
//!
//! The registry exclusively owns pool and token records. All reads go
//! through `snapshot()`; all writes go through `apply_update`, which
//! validates each row, interns new tokens and pools, and atomically
//! publishes a new snapshot.

pub mod graph;
pub mod persist;
pub mod snapshot;

use alloy::primitives::{Address, U256};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub use snapshot::{GraphFilter, RegistrySnapshot};

use crate::types::{ChainId, Pool, PoolId, PoolKind, Token, TokenId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A pool or token violated a structural invariant. Fatal at startup,
    /// a per-row drop at runtime.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("unknown pool {0}")]
    UnknownPool(PoolId),
    #[error("chain {0} is not active")]
    ChainInactive(ChainId),
}

/// One row of a bulk update: a full pool observation with its token
/// descriptors, ready for interning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolUpdate {
    pub chain: ChainId,
    pub address: Address,
    pub kind: PoolKind,
    pub tokens: Vec<Token>,
    pub reserves: Vec<U256>,
    pub fee_bps: u32,
    pub tvl_usd: Decimal,
    pub last_update_ms: u64,
    pub source_layer: u8,
    pub confidence: f64,
}

/// Row-level rejection with its reason, reported back to the caller.
#[derive(Debug, Clone)]
pub struct RejectedRow {
    pub index: usize,
    pub reason: String,
}

/// Outcome of one `apply_update` batch.
#[derive(Debug, Clone, Default)]
pub struct UpdateStats {
    pub total: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub new_tokens: usize,
    pub new_pools: usize,
    pub rejected: Vec<RejectedRow>,
}

/// Canonical pool store. Cheap to share; readers clone an `Arc` snapshot.
pub struct PoolRegistry {
    head: RwLock<Arc<RegistrySnapshot>>,
}

impl PoolRegistry {
    pub fn new(filter: GraphFilter, active_chains: impl IntoIterator<Item = ChainId>) -> Self {
        let snapshot = RegistrySnapshot {
            version: 0,
            tokens: Vec::new(),
            token_ids: Default::default(),
            pools: Vec::new(),
            pool_ids: Default::default(),
            active_chains: active_chains.into_iter().collect(),
            live: Vec::new(),
            filter,
            graph: OnceCell::new(),
        };
        Self { head: RwLock::new(Arc::new(snapshot)) }
    }

    /// Current immutable view. Valid for at most one orchestrator tick by
    /// convention; holding it longer only delays memory reuse, never
    /// correctness.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.head.read().clone()
    }

    /// Validate and apply a batch of pool observations, publishing a single
    /// new snapshot. Offending rows are rejected individually; the publish
    /// itself is all-or-nothing.
    pub fn apply_update(&self, updates: Vec<PoolUpdate>) -> UpdateStats {
        let mut stats = UpdateStats { total: updates.len(), ..Default::default() };
        let mut head = self.head.write();

        let mut tokens = head.tokens.clone();
        let mut token_ids = head.token_ids.clone();
        let mut pools = head.pools.clone();
        let mut pool_ids = head.pool_ids.clone();
        let mut live = head.live.clone();
        let mut touched = false;

        for (index, update) in updates.into_iter().enumerate() {
            // Intern tokens first; admitted tokens are immutable, so any
            // attribute drift is a row error, not a mutation.
            let mut ids = Vec::with_capacity(update.tokens.len());
            let mut token_err = None;
            for token in &update.tokens {
                match token_ids.get(&token.key()) {
                    Some(&id) => {
                        let known = &tokens[id.0 as usize];
                        if known.decimals != token.decimals || known.symbol != token.symbol {
                            token_err = Some(format!(
                                "token {} attributes changed after admission",
                                token.address
                            ));
                            break;
                        }
                        ids.push(id);
                    }
                    None => {
                        let id = TokenId(tokens.len() as u32);
                        tokens.push(Arc::new(token.clone()));
                        token_ids.insert(token.key(), id);
                        ids.push(id);
                        stats.new_tokens += 1;
                    }
                }
            }
            if let Some(reason) = token_err {
                warn!(row = index, %reason, "rejecting pool update row");
                stats.rejected.push(RejectedRow { index, reason });
                continue;
            }

            let pool = Pool {
                chain: update.chain,
                address: update.address,
                kind: update.kind,
                tokens: ids,
                reserves: update.reserves,
                fee_bps: update.fee_bps,
                tvl_usd: update.tvl_usd,
                last_update_ms: update.last_update_ms,
                source_layer: update.source_layer,
                confidence: update.confidence,
            };
            if let Err(reason) = pool.check_invariants() {
                warn!(row = index, %reason, "rejecting pool update row");
                stats.rejected.push(RejectedRow { index, reason });
                continue;
            }

            let key = (pool.chain, pool.dex_kind(), pool.address);
            match pool_ids.get(&key) {
                Some(&id) => {
                    if *pools[id.0 as usize] == pool {
                        stats.unchanged += 1;
                    } else {
                        pools[id.0 as usize] = Arc::new(pool);
                        live[id.0 as usize] = true;
                        stats.applied += 1;
                        touched = true;
                    }
                }
                None => {
                    let id = PoolId(pools.len() as u32);
                    pool_ids.insert(key, id);
                    pools.push(Arc::new(pool));
                    live.push(true);
                    stats.applied += 1;
                    stats.new_pools += 1;
                    touched = true;
                }
            }
        }

        if touched || stats.new_tokens > 0 {
            let next = RegistrySnapshot {
                version: head.version + 1,
                tokens,
                token_ids,
                pools,
                pool_ids,
                active_chains: head.active_chains.clone(),
                live,
                filter: head.filter.clone(),
                graph: OnceCell::new(),
            };
            *head = Arc::new(next);
        }
        debug!(
            applied = stats.applied,
            unchanged = stats.unchanged,
            rejected = stats.rejected.len(),
            "registry update"
        );
        stats
    }

    pub fn activate_chain(&self, chain: ChainId) {
        self.set_chain(chain, true);
    }

    pub fn deactivate_chain(&self, chain: ChainId) {
        self.set_chain(chain, false);
    }

    fn set_chain(&self, chain: ChainId, active: bool) {
        let mut head = self.head.write();
        let mut chains: BTreeSet<ChainId> = head.active_chains.clone();
        let changed = if active { chains.insert(chain) } else { chains.remove(&chain) };
        if !changed {
            return;
        }
        let next = RegistrySnapshot {
            version: head.version + 1,
            tokens: head.tokens.clone(),
            token_ids: head.token_ids.clone(),
            pools: head.pools.clone(),
            pool_ids: head.pool_ids.clone(),
            active_chains: chains,
            live: head.live.clone(),
            filter: head.filter.clone(),
            graph: OnceCell::new(),
        };
        *head = Arc::new(next);
    }

    /// Retire a pool that failed liveness; it keeps its id but leaves the
    /// graph until a fresh update revives it.
    pub fn retire(&self, id: PoolId) -> Result<(), RegistryError> {
        let mut head = self.head.write();
        if id.0 as usize >= head.pools.len() {
            return Err(RegistryError::UnknownPool(id));
        }
        if !head.live[id.0 as usize] {
            return Ok(());
        }
        let mut live = head.live.clone();
        live[id.0 as usize] = false;
        let next = RegistrySnapshot {
            version: head.version + 1,
            tokens: head.tokens.clone(),
            token_ids: head.token_ids.clone(),
            pools: head.pools.clone(),
            pool_ids: head.pool_ids.clone(),
            active_chains: head.active_chains.clone(),
            live,
            filter: head.filter.clone(),
            graph: OnceCell::new(),
        };
        *head = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub fn token(chain: ChainId, byte: u8, symbol: &str) -> Token {
        Token {
            chain,
            address: Address::repeat_byte(byte),
            decimals: 18,
            symbol: symbol.to_string(),
        }
    }

    pub fn v2_update(
        chain: ChainId,
        pool_byte: u8,
        token_a: Token,
        token_b: Token,
        reserve_a: u128,
        reserve_b: u128,
        fee_bps: u32,
    ) -> PoolUpdate {
        PoolUpdate {
            chain,
            address: Address::repeat_byte(pool_byte),
            kind: PoolKind::ConstantProductV2,
            tokens: vec![token_a, token_b],
            reserves: vec![U256::from(reserve_a), U256::from(reserve_b)],
            fee_bps,
            tvl_usd: Decimal::new(5_000_000, 0),
            last_update_ms: 1_000,
            source_layer: 1,
            confidence: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    fn registry() -> PoolRegistry {
        PoolRegistry::new(GraphFilter::default(), [1])
    }

    #[test]
    fn update_interns_tokens_and_pools() {
        let reg = registry();
        let stats = reg.apply_update(vec![v2_update(
            1,
            0xA0,
            token(1, 1, "WETH"),
            token(1, 2, "USDC"),
            1_000_000,
            2_000_000,
            30,
        )]);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.new_tokens, 2);
        assert_eq!(stats.new_pools, 1);

        let snap = reg.snapshot();
        assert_eq!(snap.token_count(), 2);
        assert_eq!(snap.pool_count(), 1);
        let id = snap.pool_id(1, crate::types::DexKind::ConstantProductV2, Address::repeat_byte(0xA0));
        assert!(id.is_some());
        assert!(snap.is_pool_active(id.unwrap()));
    }

    #[test]
    fn invalid_rows_are_rejected_with_reasons() {
        let reg = registry();
        let mut bad = v2_update(1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_000, 1_000, 30);
        bad.reserves[0] = U256::ZERO;
        let good = v2_update(1, 0xA1, token(1, 1, "A"), token(1, 2, "B"), 1_000, 1_000, 30);
        let stats = reg.apply_update(vec![bad, good]);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.rejected.len(), 1);
        assert_eq!(stats.rejected[0].index, 0);
        assert!(stats.rejected[0].reason.contains("zero reserve"));
    }

    #[test]
    fn snapshots_are_immutable_across_updates() {
        // I5: a held snapshot never observes later writes.
        let reg = registry();
        reg.apply_update(vec![v2_update(
            1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_000_000, 2_000_000, 30,
        )]);
        let before = reg.snapshot();
        let id = before
            .pool_id(1, crate::types::DexKind::ConstantProductV2, Address::repeat_byte(0xA0))
            .unwrap();
        let reserves_before = before.pool(id).unwrap().reserves.clone();

        reg.apply_update(vec![v2_update(
            1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 5, 5, 30,
        )]);
        assert_eq!(before.pool(id).unwrap().reserves, reserves_before);
        let after = reg.snapshot();
        assert_eq!(after.pool(id).unwrap().reserves, vec![U256::from(5u64), U256::from(5u64)]);
        assert!(after.version() > before.version());
    }

    #[test]
    fn applying_same_update_twice_is_idempotent() {
        let reg = registry();
        let update = v2_update(1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_000, 2_000, 30);
        reg.apply_update(vec![update.clone()]);
        let first = reg.snapshot();
        let stats = reg.apply_update(vec![update]);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.applied, 0);
        let second = reg.snapshot();
        assert_eq!(first.version(), second.version());
        assert_eq!(first.pool_count(), second.pool_count());
    }

    #[test]
    fn token_attribute_drift_is_rejected() {
        let reg = registry();
        reg.apply_update(vec![v2_update(
            1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_000, 2_000, 30,
        )]);
        let mut drifted = token(1, 1, "A");
        drifted.decimals = 6;
        let stats = reg.apply_update(vec![v2_update(
            1, 0xA1, drifted, token(1, 2, "B"), 1_000, 2_000, 30,
        )]);
        assert_eq!(stats.rejected.len(), 1);
        assert!(stats.rejected[0].reason.contains("attributes changed"));
    }

    #[test]
    fn chain_deactivation_masks_pools_from_graph() {
        let reg = registry();
        reg.apply_update(vec![v2_update(
            1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_000, 2_000, 30,
        )]);
        let snap = reg.snapshot();
        assert_eq!(snap.graph().edge_count(), 2);

        reg.deactivate_chain(1);
        let masked = reg.snapshot();
        assert_eq!(masked.graph().edge_count(), 0);
        // The held snapshot still sees the old graph: immutability again.
        assert_eq!(snap.graph().edge_count(), 2);
    }

    #[test]
    fn filter_pools_narrows_without_copying_bodies() {
        let reg = registry();
        reg.apply_update(vec![
            v2_update(1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_000, 2_000, 30),
            v2_update(1, 0xA1, token(1, 1, "A"), token(1, 2, "B"), 9_000, 2_000, 100),
        ]);
        let snap = reg.snapshot();
        let narrowed = snap.filter_pools(|p| p.fee_bps <= 30);
        assert_eq!(narrowed.active_pools().count(), 1);
        assert_eq!(snap.active_pools().count(), 2);
        // Same Arc bodies underneath.
        let id = PoolId(0);
        assert!(Arc::ptr_eq(snap.pool(id).unwrap(), narrowed.pool(id).unwrap()));
    }

    #[test]
    fn retire_removes_pool_from_graph_until_refresh() {
        let reg = registry();
        reg.apply_update(vec![v2_update(
            1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_000, 2_000, 30,
        )]);
        reg.retire(PoolId(0)).unwrap();
        assert_eq!(reg.snapshot().graph().edge_count(), 0);

        reg.apply_update(vec![v2_update(
            1, 0xA0, token(1, 1, "A"), token(1, 2, "B"), 1_500, 2_000, 30,
        )]);
        assert_eq!(reg.snapshot().graph().edge_count(), 2);
    }
}
