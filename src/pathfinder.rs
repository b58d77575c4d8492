//! Bounded-hop cyclic path enumeration over a registry snapshot.
//!
//! Depth-bounded DFS with three prunes: a visited-token set (no token
//! repeats except the source at close), a cumulative fee lower bound (legs
//! whose fees already exceed any realistic cycle return cannot recover),
//! and a per-leg minimum input reserve. Output is canonical: one rotation,
//! one direction per structural cycle.

use alloy::primitives::U256;
use std::collections::HashSet;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::registry::graph::TokenGraph;
use crate::registry::RegistrySnapshot;
use crate::types::{ChainId, DexKind, Path, PathLeg, TokenId};

#[derive(Debug, Clone)]
pub struct PathfinderConfig {
    /// Cycle length bounds; hops outside [2, max_hops] are never emitted.
    pub max_hops: usize,
    /// Stop after this many canonical cycles.
    pub top_n: usize,
    /// Minimum profit floor the fee prune protects, in bps.
    pub min_profit_floor_bps: u32,
    /// No real cycle returns more than this; cumulative fees past
    /// (max_return - floor) prune the branch.
    pub max_return_bps: u32,
    /// Legs with less input-side reserve than this are skipped outright.
    pub min_leg_reserve: U256,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_hops: 4,
            top_n: 1024,
            min_profit_floor_bps: 10,
            // Mirrors the sanity cap on cycle returns: anything promising
            // more than 50% is noise, so fees past that cannot pay off.
            max_return_bps: 5_000,
            min_leg_reserve: U256::from(1_000u64),
        }
    }
}

#[derive(Clone)]
pub struct Pathfinder {
    config: PathfinderConfig,
}

impl Pathfinder {
    pub fn new(config: PathfinderConfig) -> Self {
        Self { config }
    }

    /// Enumerate canonical cycles through `source`. Interruption via
    /// `cancel` is cooperative: whatever was found so far is returned.
    pub fn find_cycles(
        &self,
        snapshot: &RegistrySnapshot,
        source: TokenId,
        cancel: &CancelToken,
    ) -> Vec<Path> {
        let graph = snapshot.graph();
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut legs = Vec::with_capacity(self.config.max_hops);
        let mut visited = HashSet::from([source]);
        self.dfs(&graph, source, source, &mut legs, &mut visited, 0, &mut seen, &mut out, cancel);
        debug!(source = %source, cycles = out.len(), "pathfinder pass complete");
        out
    }

    /// Enumerate from several sources with shared dedup, optionally
    /// narrowed to an allowlist of DEX kinds and chains.
    pub fn find_cycles_multi(
        &self,
        snapshot: &RegistrySnapshot,
        sources: &[TokenId],
        dex_allow: Option<&[DexKind]>,
        chains: Option<&[ChainId]>,
        cancel: &CancelToken,
    ) -> Vec<Path> {
        let narrowed;
        let view: &RegistrySnapshot = if dex_allow.is_some() || chains.is_some() {
            narrowed = snapshot.filter_pools(|pool| {
                dex_allow.map_or(true, |kinds| kinds.contains(&pool.dex_kind()))
                    && chains.map_or(true, |cs| cs.contains(&pool.chain))
            });
            &narrowed
        } else {
            snapshot
        };

        let graph = view.graph();
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for &source in sources {
            if cancel.is_cancelled() || out.len() >= self.config.top_n {
                break;
            }
            let mut legs = Vec::with_capacity(self.config.max_hops);
            let mut visited = HashSet::from([source]);
            self.dfs(&graph, source, source, &mut legs, &mut visited, 0, &mut seen, &mut out, cancel);
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        graph: &TokenGraph,
        source: TokenId,
        current: TokenId,
        legs: &mut Vec<PathLeg>,
        visited: &mut HashSet<TokenId>,
        fee_sum_bps: u32,
        seen: &mut HashSet<Path>,
        out: &mut Vec<Path>,
        cancel: &CancelToken,
    ) {
        if out.len() >= self.config.top_n || cancel.is_cancelled() {
            return;
        }

        for edge in graph.ordered_edges_from(current) {
            if out.len() >= self.config.top_n || cancel.is_cancelled() {
                return;
            }
            if edge.reserve_in < self.config.min_leg_reserve {
                continue;
            }
            // A pool may appear once per cycle.
            if legs.iter().any(|l| l.pool == edge.pool) {
                continue;
            }
            let fee_sum = fee_sum_bps.saturating_add(edge.fee_bps);
            if fee_sum.saturating_add(self.config.min_profit_floor_bps) >= self.config.max_return_bps {
                continue;
            }

            let leg = PathLeg { pool: edge.pool, token_in: current, token_out: edge.token_out };

            if edge.token_out == source {
                if legs.len() + 1 >= 2 {
                    legs.push(leg);
                    let path = canonicalize(&Path::new(legs.clone()));
                    if seen.insert(path.clone()) {
                        out.push(path);
                    }
                    legs.pop();
                }
                continue;
            }

            if legs.len() + 1 >= self.config.max_hops {
                continue;
            }
            if visited.contains(&edge.token_out) {
                continue;
            }

            legs.push(leg);
            visited.insert(edge.token_out);
            self.dfs(graph, source, edge.token_out, legs, visited, fee_sum, seen, out, cancel);
            visited.remove(&edge.token_out);
            legs.pop();
        }
    }
}

/// Canonical form of a cycle: among all rotations of the forward and the
/// reversed traversal, the one with the smallest (token, pool) id vector.
pub fn canonicalize(path: &Path) -> Path {
    let forward = path.legs.clone();
    let reversed: Vec<PathLeg> = path
        .legs
        .iter()
        .rev()
        .map(|l| PathLeg { pool: l.pool, token_in: l.token_out, token_out: l.token_in })
        .collect();

    let mut best: Option<(Vec<(u32, u32)>, Vec<PathLeg>)> = None;
    for candidate in [forward, reversed] {
        let n = candidate.len();
        for rot in 0..n {
            let rotated: Vec<PathLeg> =
                (0..n).map(|i| candidate[(rot + i) % n]).collect();
            let key: Vec<(u32, u32)> =
                rotated.iter().map(|l| (l.token_in.0, l.pool.0)).collect();
            match &best {
                Some((best_key, _)) if *best_key <= key => {}
                _ => best = Some((key, rotated)),
            }
        }
    }
    Path::new(best.expect("path has at least one leg").1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testutil::{token, v2_update};
    use crate::registry::{GraphFilter, PoolRegistry};

    /// Triangle A-B, B-C, C-A plus a direct A-B return pool.
    fn seeded_registry() -> PoolRegistry {
        let reg = PoolRegistry::new(GraphFilter::default(), [1]);
        let a = token(1, 1, "A");
        let b = token(1, 2, "B");
        let c = token(1, 3, "C");
        let stats = reg.apply_update(vec![
            v2_update(1, 0xA0, a.clone(), b.clone(), 1_000_000, 2_000_000, 30),
            v2_update(1, 0xA1, b.clone(), a.clone(), 1_800_000, 1_000_000, 30),
            v2_update(1, 0xA2, b.clone(), c.clone(), 1_000_000, 1_000_000, 30),
            v2_update(1, 0xA3, c, a, 1_000_000, 1_000_000, 30),
        ]);
        assert_eq!(stats.applied, 4);
        reg
    }

    fn pathfinder() -> Pathfinder {
        Pathfinder::new(PathfinderConfig { min_leg_reserve: U256::from(1u64), ..Default::default() })
    }

    #[test]
    fn finds_two_hop_and_three_hop_cycles() {
        let reg = seeded_registry();
        let snap = reg.snapshot();
        let cycles = pathfinder().find_cycles(&snap, TokenId(0), &CancelToken::new());
        let hop_counts: Vec<usize> = cycles.iter().map(|p| p.hops()).collect();
        assert!(hop_counts.contains(&2), "expected a 2-hop cycle, got {hop_counts:?}");
        assert!(hop_counts.contains(&3), "expected a 3-hop cycle, got {hop_counts:?}");
        for cycle in &cycles {
            assert!(cycle.is_cyclic(), "non-cyclic output {cycle:?}");
        }
    }

    #[test]
    fn output_is_canonical_and_deduplicated() {
        // I4: enumerating from every token yields each cycle exactly once,
        // already in canonical form.
        let reg = seeded_registry();
        let snap = reg.snapshot();
        let cycles = pathfinder().find_cycles_multi(
            &snap,
            &[TokenId(0), TokenId(1), TokenId(2)],
            None,
            None,
            &CancelToken::new(),
        );
        let mut seen = HashSet::new();
        for cycle in &cycles {
            assert_eq!(*cycle, canonicalize(cycle), "non-canonical emission");
            assert!(seen.insert(cycle.clone()), "duplicate cycle {cycle:?}");
        }
    }

    #[test]
    fn canonicalize_is_rotation_and_direction_invariant() {
        let forward = Path::new(vec![
            PathLeg { pool: crate::types::PoolId(0), token_in: TokenId(0), token_out: TokenId(1) },
            PathLeg { pool: crate::types::PoolId(2), token_in: TokenId(1), token_out: TokenId(2) },
            PathLeg { pool: crate::types::PoolId(3), token_in: TokenId(2), token_out: TokenId(0) },
        ]);
        let rotated = Path::new(vec![forward.legs[1], forward.legs[2], forward.legs[0]]);
        let reversed = Path::new(
            forward
                .legs
                .iter()
                .rev()
                .map(|l| PathLeg { pool: l.pool, token_in: l.token_out, token_out: l.token_in })
                .collect(),
        );
        let canon = canonicalize(&forward);
        assert_eq!(canon, canonicalize(&rotated));
        assert_eq!(canon, canonicalize(&reversed));
        // Canonical form starts at the smallest (token, pool) pair.
        assert_eq!(canon.legs[0].token_in, TokenId(0));
    }

    #[test]
    fn respects_max_hops() {
        let reg = seeded_registry();
        let snap = reg.snapshot();
        let finder = Pathfinder::new(PathfinderConfig {
            max_hops: 2,
            min_leg_reserve: U256::from(1u64),
            ..Default::default()
        });
        let cycles = finder.find_cycles(&snap, TokenId(0), &CancelToken::new());
        assert!(!cycles.is_empty());
        assert!(cycles.iter().all(|p| p.hops() == 2));
    }

    #[test]
    fn min_reserve_prunes_thin_legs() {
        let reg = seeded_registry();
        let snap = reg.snapshot();
        let finder = Pathfinder::new(PathfinderConfig {
            min_leg_reserve: U256::from(10_000_000u64),
            ..Default::default()
        });
        assert!(finder.find_cycles(&snap, TokenId(0), &CancelToken::new()).is_empty());
    }

    #[test]
    fn fee_bound_prunes_expensive_branches() {
        let reg = PoolRegistry::new(GraphFilter::default(), [1]);
        let a = token(1, 1, "A");
        let b = token(1, 2, "B");
        // Two legs at 2600 bps each: 5200 > the 5000 bps return cap.
        reg.apply_update(vec![
            v2_update(1, 0xA0, a.clone(), b.clone(), 1_000_000, 1_000_000, 2_600),
            v2_update(1, 0xA1, b, a, 1_000_000, 1_000_000, 2_600),
        ]);
        let snap = reg.snapshot();
        assert!(pathfinder().find_cycles(&snap, TokenId(0), &CancelToken::new()).is_empty());
    }

    #[test]
    fn cancellation_returns_partial_output() {
        let reg = seeded_registry();
        let snap = reg.snapshot();
        let cancel = CancelToken::new();
        cancel.cancel();
        let cycles = pathfinder().find_cycles(&snap, TokenId(0), &cancel);
        assert!(cycles.is_empty());
    }

    #[test]
    fn enumeration_is_deterministic() {
        let reg = seeded_registry();
        let snap = reg.snapshot();
        let first = pathfinder().find_cycles(&snap, TokenId(0), &CancelToken::new());
        let second = pathfinder().find_cycles(&snap, TokenId(0), &CancelToken::new());
        assert_eq!(first, second);
    }

    #[test]
    fn top_n_caps_emission() {
        let reg = seeded_registry();
        let snap = reg.snapshot();
        let finder = Pathfinder::new(PathfinderConfig {
            top_n: 1,
            min_leg_reserve: U256::from(1u64),
            ..Default::default()
        });
        let cycles = finder.find_cycles(&snap, TokenId(0), &CancelToken::new());
        assert_eq!(cycles.len(), 1);
    }
}
