//! On-disk registry state: pool snapshot (JSON) and token equivalence (JSON).
//!
//! Both formats are additive-evolution stable: unknown fields are ignored on
//! read, new fields get defaults.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::{PoolRegistry, PoolUpdate, UpdateStats};
use crate::types::ChainId;

/// Pool-registry snapshot file: a plain list of full pool observations,
/// re-applied through the normal update path on load so every invariant is
/// re-checked.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub pools: Vec<PoolUpdate>,
}

impl SnapshotFile {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> eyre::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Load a snapshot file into the registry. Rejected rows are reported, not
/// fatal: a stale snapshot row simply waits for a live refresh.
pub fn load_registry_snapshot(registry: &PoolRegistry, path: &Path) -> eyre::Result<UpdateStats> {
    let file = SnapshotFile::load(path)?;
    let stats = registry.apply_update(file.pools);
    info!(
        path = %path.display(),
        applied = stats.applied,
        rejected = stats.rejected.len(),
        "registry snapshot loaded"
    );
    Ok(stats)
}

/// Serialize the current registry state back to a snapshot file.
pub fn save_registry_snapshot(registry: &PoolRegistry, path: &Path) -> eyre::Result<()> {
    let snap = registry.snapshot();
    let mut pools = Vec::with_capacity(snap.pool_count());
    for i in 0..snap.pool_count() {
        let id = crate::types::PoolId(i as u32);
        let Ok(pool) = snap.pool(id) else { continue };
        let tokens = pool
            .tokens
            .iter()
            .filter_map(|t| snap.token(*t))
            .map(|t| (**t).clone())
            .collect();
        pools.push(PoolUpdate {
            chain: pool.chain,
            address: pool.address,
            kind: pool.kind.clone(),
            tokens,
            reserves: pool.reserves.clone(),
            fee_bps: pool.fee_bps,
            tvl_usd: pool.tvl_usd,
            last_update_ms: pool.last_update_ms,
            source_layer: pool.source_layer,
            confidence: pool.confidence,
        });
    }
    SnapshotFile { pools }.save(path)
}

/// One equivalence entry: a token on a specific chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquivalentToken {
    pub chain: ChainId,
    pub address: Address,
}

/// Groups of semantically identical tokens across chains (wrapped variants,
/// bridged mints). Loaded once at startup; tokens are immutable afterwards.
#[derive(Debug, Default)]
pub struct TokenEquivalence {
    groups: Vec<Vec<EquivalentToken>>,
    index: HashMap<(ChainId, Address), usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EquivalenceFile {
    groups: Vec<Vec<EquivalentToken>>,
}

impl TokenEquivalence {
    pub fn from_groups(groups: Vec<Vec<EquivalentToken>>) -> Self {
        let mut index = HashMap::new();
        for (gi, group) in groups.iter().enumerate() {
            for member in group {
                index.insert((member.chain, member.address), gi);
            }
        }
        Self { groups, index }
    }

    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: EquivalenceFile = serde_json::from_str(&raw)?;
        Ok(Self::from_groups(file.groups))
    }

    pub fn save(&self, path: &Path) -> eyre::Result<()> {
        let file = EquivalenceFile { groups: self.groups.clone() };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Group index a token belongs to, if it is mapped at all.
    pub fn group_of(&self, chain: ChainId, address: Address) -> Option<usize> {
        self.index.get(&(chain, address)).copied()
    }

    /// Whether two tokens are the same asset across chains.
    pub fn equivalent(&self, a: (ChainId, Address), b: (ChainId, Address)) -> bool {
        if a == b {
            return true;
        }
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }
}
