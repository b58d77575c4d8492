//! Append-only provenance tracker.
//!
//! Every DataPoint that reaches a decision gets an entry here, keyed by
//! request id. A point without a matching entry is "unaccounted" and forces
//! double-validation downstream. Entries are never mutated or removed while
//! the process lives; `export` writes them as JSON Lines.

use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::datapoint::{DataPoint, DataType};
use crate::types::ChainId;

/// One provenance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingEntry {
    pub request_id: u64,
    pub data_type: DataType,
    pub source: String,
    pub layer: u8,
    pub chain: ChainId,
    pub timestamp_ms: u64,
    pub wall_clock: String,
    pub oracle_verified: bool,
    pub flagged: bool,
    pub stale: bool,
    pub staleness_s: f64,
    pub confidence: f64,
}

impl AccountingEntry {
    fn from_point(point: &DataPoint) -> Self {
        let wall_clock = Utc
            .timestamp_millis_opt(point.timestamp_ms as i64)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        Self {
            request_id: point.request_id,
            data_type: point.data_type,
            source: point.source.clone(),
            layer: point.layer,
            chain: point.chain,
            timestamp_ms: point.timestamp_ms,
            wall_clock,
            oracle_verified: point.oracle_verified,
            flagged: point.flagged,
            stale: point.stale,
            staleness_s: point.staleness_s,
            confidence: point.confidence,
        }
    }
}

/// Aggregate view over the log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountingStats {
    pub total: u64,
    pub by_layer: [u64; 4],
    pub oracle_verified: u64,
    pub flagged: u64,
    pub stale: u64,
    pub avg_confidence: f64,
}

/// The tracker itself: id allocation plus the append-only log.
#[derive(Default)]
pub struct AccountingTracker {
    next_id: AtomicU64,
    entries: DashMap<u64, AccountingEntry>,
    order: Mutex<Vec<u64>>,
}

impl AccountingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id a fetch will be tracked under.
    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Record a fetched point. Idempotent per request id: the first record
    /// wins, later writes for the same id are ignored (append-only).
    pub fn record(&self, point: &DataPoint) {
        let entry = AccountingEntry::from_point(point);
        if self.entries.insert(point.request_id, entry).is_none() {
            self.order.lock().push(point.request_id);
        }
    }

    /// Whether a point is accounted for.
    pub fn contains(&self, request_id: u64) -> bool {
        self.entries.contains_key(&request_id)
    }

    pub fn get(&self, request_id: u64) -> Option<AccountingEntry> {
        self.entries.get(&request_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn statistics(&self) -> AccountingStats {
        let mut stats = AccountingStats::default();
        let mut confidence_sum = 0.0;
        for entry in self.entries.iter() {
            stats.total += 1;
            let layer_idx = (entry.layer.clamp(1, 4) - 1) as usize;
            stats.by_layer[layer_idx] += 1;
            if entry.oracle_verified {
                stats.oracle_verified += 1;
            }
            if entry.flagged {
                stats.flagged += 1;
            }
            if entry.stale {
                stats.stale += 1;
            }
            confidence_sum += entry.confidence;
        }
        if stats.total > 0 {
            stats.avg_confidence = confidence_sum / stats.total as f64;
        }
        stats
    }

    /// Append the log to a JSONL file in insertion order. Previously
    /// exported ids are re-written; callers rotate files per run.
    pub fn export(&self, path: &Path) -> eyre::Result<u64> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let order = self.order.lock();
        let mut written = 0u64;
        for id in order.iter() {
            if let Some(entry) = self.entries.get(id) {
                writeln!(file, "{}", serde_json::to_string(&*entry)?)?;
                written += 1;
            }
        }
        Ok(written)
    }
}
