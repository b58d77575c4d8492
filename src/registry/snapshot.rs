//! Immutable registry snapshots.
//!
//! Readers hold an `Arc<RegistrySnapshot>` for one orchestrator tick and
//! drop it at the end; writers publish a whole new snapshot, so a reader
//! never observes a torn update. Pool bodies are shared between snapshots
//! through `Arc`, making publication cheap.

use alloy::primitives::Address;
use once_cell::sync::OnceCell;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::graph::TokenGraph;
use super::RegistryError;
use crate::types::{ChainId, DexKind, Pool, PoolId, Token, TokenId};

/// Filters applied when deriving the token graph from the pool set.
#[derive(Debug, Clone, Default)]
pub struct GraphFilter {
    /// Pools below this TVL never enter the graph (admission filter only,
    /// never a sizing input).
    pub min_tvl_usd: Decimal,
    /// When set, only these DEX kinds enter the graph.
    pub dex_allow: Option<Vec<DexKind>>,
}

impl GraphFilter {
    fn admits(&self, pool: &Pool) -> bool {
        if pool.tvl_usd < self.min_tvl_usd {
            return false;
        }
        match &self.dex_allow {
            Some(kinds) => kinds.contains(&pool.dex_kind()),
            None => true,
        }
    }
}

/// One immutable view of the pool registry.
pub struct RegistrySnapshot {
    pub(super) version: u64,
    pub(super) tokens: Vec<Arc<Token>>,
    pub(super) token_ids: HashMap<(ChainId, Address), TokenId>,
    pub(super) pools: Vec<Arc<Pool>>,
    pub(super) pool_ids: HashMap<(ChainId, DexKind, Address), PoolId>,
    pub(super) active_chains: BTreeSet<ChainId>,
    /// Per-pool liveness mask; retired pools keep their id but leave the
    /// graph.
    pub(super) live: Vec<bool>,
    pub(super) filter: GraphFilter,
    pub(super) graph: OnceCell<Arc<TokenGraph>>,
}

impl RegistrySnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn token(&self, id: TokenId) -> Option<&Arc<Token>> {
        self.tokens.get(id.0 as usize)
    }

    pub fn token_id(&self, chain: ChainId, address: Address) -> Option<TokenId> {
        self.token_ids.get(&(chain, address)).copied()
    }

    pub fn pool(&self, id: PoolId) -> Result<&Arc<Pool>, RegistryError> {
        self.pools.get(id.0 as usize).ok_or(RegistryError::UnknownPool(id))
    }

    pub fn pool_id(&self, chain: ChainId, dex: DexKind, address: Address) -> Option<PoolId> {
        self.pool_ids.get(&(chain, dex, address)).copied()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn is_chain_active(&self, chain: ChainId) -> bool {
        self.active_chains.contains(&chain)
    }

    /// A pool participates in pathfinding iff it is live, its chain is
    /// active and it passes the graph filter.
    pub fn is_pool_active(&self, id: PoolId) -> bool {
        let Ok(pool) = self.pool(id) else {
            return false;
        };
        self.live.get(id.0 as usize).copied().unwrap_or(false)
            && self.active_chains.contains(&pool.chain)
            && self.filter.admits(pool)
    }

    /// Iterate the pools currently eligible for the graph.
    pub fn active_pools(&self) -> impl Iterator<Item = (PoolId, &Arc<Pool>)> {
        self.pools.iter().enumerate().filter_map(move |(i, pool)| {
            let id = PoolId(i as u32);
            self.is_pool_active(id).then_some((id, pool))
        })
    }

    /// Token-adjacency graph, derived lazily on first use and cached for
    /// this snapshot's lifetime.
    pub fn graph(&self) -> Arc<TokenGraph> {
        self.graph
            .get_or_init(|| {
                let mut graph = TokenGraph::new();
                for (id, pool) in self.active_pools() {
                    graph.add_pool(id, pool);
                }
                Arc::new(graph)
            })
            .clone()
    }

    /// Derived snapshot narrowed by `predicate`, sharing every pool body
    /// with its parent. The graph cache starts empty so the narrowed view
    /// derives its own adjacency.
    pub fn filter_pools(&self, predicate: impl Fn(&Pool) -> bool) -> RegistrySnapshot {
        let live = self
            .pools
            .iter()
            .enumerate()
            .map(|(i, pool)| self.live.get(i).copied().unwrap_or(false) && predicate(pool))
            .collect();
        RegistrySnapshot {
            version: self.version,
            tokens: self.tokens.clone(),
            token_ids: self.token_ids.clone(),
            pools: self.pools.clone(),
            pool_ids: self.pool_ids.clone(),
            active_chains: self.active_chains.clone(),
            live,
            filter: self.filter.clone(),
            graph: OnceCell::new(),
        }
    }
}
