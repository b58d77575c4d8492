//! Token-adjacency graph derived from the active pool set.
//!
//! Nodes are interned token ids, edges carry the owning pool id plus the
//! ordering keys the pathfinder needs. Edges never own pool state; the
//! snapshot does.

use alloy::primitives::U256;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::types::{Pool, PoolId, TokenId};

/// One directed tradable edge token_in -> token_out through a pool.
#[derive(Debug, Clone)]
pub struct EdgeData {
    pub pool: PoolId,
    pub token_in: TokenId,
    pub token_out: TokenId,
    pub fee_bps: u32,
    pub tvl_usd: Decimal,
    pub reserve_in: U256,
}

/// Directed multigraph of swap relationships across the active pools.
pub struct TokenGraph {
    graph: DiGraph<TokenId, EdgeData>,
    token_to_node: HashMap<TokenId, NodeIndex>,
}

impl Default for TokenGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGraph {
    pub fn new() -> Self {
        Self { graph: DiGraph::new(), token_to_node: HashMap::new() }
    }

    fn get_or_create_node(&mut self, token: TokenId) -> NodeIndex {
        if let Some(&node) = self.token_to_node.get(&token) {
            node
        } else {
            let node = self.graph.add_node(token);
            self.token_to_node.insert(token, node);
            node
        }
    }

    /// Add every ordered token pair of the pool as a directed edge.
    pub fn add_pool(&mut self, id: PoolId, pool: &Pool) {
        for (i, &token_in) in pool.tokens.iter().enumerate() {
            for (j, &token_out) in pool.tokens.iter().enumerate() {
                if i == j {
                    continue;
                }
                let from = self.get_or_create_node(token_in);
                let to = self.get_or_create_node(token_out);
                self.graph.add_edge(
                    from,
                    to,
                    EdgeData {
                        pool: id,
                        token_in,
                        token_out,
                        fee_bps: pool.fee_bps,
                        tvl_usd: pool.tvl_usd,
                        reserve_in: pool.reserves[i],
                    },
                );
            }
        }
    }

    pub fn node(&self, token: TokenId) -> Option<NodeIndex> {
        self.token_to_node.get(&token).copied()
    }

    pub fn token(&self, node: NodeIndex) -> Option<TokenId> {
        self.graph.node_weight(node).copied()
    }

    /// Outgoing edges of a token in the pathfinder's deterministic order:
    /// descending TVL, then ascending fee, then ascending pool id.
    pub fn ordered_edges_from(&self, token: TokenId) -> Vec<&EdgeData> {
        let Some(node) = self.node(token) else {
            return Vec::new();
        };
        let mut edges: Vec<&EdgeData> = self
            .graph
            .edges(node)
            .map(|e| e.weight())
            .collect();
        edges.sort_by(|a, b| {
            b.tvl_usd
                .cmp(&a.tvl_usd)
                .then(a.fee_bps.cmp(&b.fee_bps))
                .then(a.pool.cmp(&b.pool))
        });
        edges
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Underlying petgraph structure, for traversals that want it directly.
    pub fn graph_ref(&self) -> &DiGraph<TokenId, EdgeData> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::testutil::v2_pool;

    #[test]
    fn pool_induces_both_directions() {
        let mut graph = TokenGraph::new();
        graph.add_pool(PoolId(0), &v2_pool(1_000, 2_000, 30));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 2);
        let forward = graph.ordered_edges_from(TokenId(0));
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].token_out, TokenId(1));
        assert_eq!(forward[0].reserve_in, U256::from(1_000u64));
    }

    #[test]
    fn edge_ordering_is_tvl_fee_then_id() {
        let mut graph = TokenGraph::new();
        let mut rich = v2_pool(1_000, 2_000, 50);
        rich.tvl_usd = Decimal::new(9_000_000, 0);
        let mut cheap = v2_pool(1_000, 2_000, 10);
        cheap.tvl_usd = Decimal::new(1_000_000, 0);
        let mut tied = v2_pool(1_000, 2_000, 10);
        tied.tvl_usd = Decimal::new(1_000_000, 0);
        graph.add_pool(PoolId(2), &tied);
        graph.add_pool(PoolId(0), &rich);
        graph.add_pool(PoolId(1), &cheap);

        let order: Vec<PoolId> = graph
            .ordered_edges_from(TokenId(0))
            .iter()
            .map(|e| e.pool)
            .collect();
        assert_eq!(order, vec![PoolId(0), PoolId(1), PoolId(2)]);
    }

    #[test]
    fn three_token_pool_induces_six_edges() {
        let mut pool = v2_pool(1_000, 2_000, 30);
        pool.tokens = vec![TokenId(0), TokenId(1), TokenId(2)];
        pool.reserves = vec![U256::from(1u64), U256::from(2u64), U256::from(3u64)];
        let mut graph = TokenGraph::new();
        graph.add_pool(PoolId(0), &pool);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 6);
        // Edge iteration stays inside petgraph's model.
        let node = graph.node(TokenId(1)).unwrap();
        assert_eq!(graph.graph_ref().edges(node).count(), 2);
    }
}
