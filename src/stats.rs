//! Engine statistics and the paper-trade log.
//!
//! Counters are process-local atomics; the paper log is JSON Lines, one
//! record per simulated execution.

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one engine run.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub ticks: AtomicU64,
    pub ticks_skipped: AtomicU64,
    pub tick_overruns: AtomicU64,
    pub phase_a_failures: AtomicU64,
    pub paths_found: AtomicU64,
    pub evaluated: AtomicU64,
    pub approved: AtomicU64,
    pub queue_dropped: AtomicU64,
    pub submitted: AtomicU64,
    pub paper_trades: AtomicU64,
    pub manual_skips: AtomicU64,
    rejections: Mutex<HashMap<&'static str, u64>>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count_rejection(&self, reason: &'static str) {
        *self.rejections.lock().entry(reason).or_insert(0) += 1;
    }

    pub fn rejection_count(&self, reason: &str) -> u64 {
        self.rejections.lock().get(reason).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            tick_overruns: self.tick_overruns.load(Ordering::Relaxed),
            phase_a_failures: self.phase_a_failures.load(Ordering::Relaxed),
            paths_found: self.paths_found.load(Ordering::Relaxed),
            evaluated: self.evaluated.load(Ordering::Relaxed),
            approved: self.approved.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            paper_trades: self.paper_trades.load(Ordering::Relaxed),
            manual_skips: self.manual_skips.load(Ordering::Relaxed),
            rejections: self
                .rejections
                .lock()
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

/// Serializable view for logs and the smoke-test summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub ticks_skipped: u64,
    pub tick_overruns: u64,
    pub phase_a_failures: u64,
    pub paths_found: u64,
    pub evaluated: u64,
    pub approved: u64,
    pub queue_dropped: u64,
    pub submitted: u64,
    pub paper_trades: u64,
    pub manual_skips: u64,
    pub rejections: HashMap<String, u64>,
}

/// One recorded paper execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperTradeRecord {
    pub timestamp: String,
    pub path_signature: String,
    pub chain: u64,
    pub input_amount: String,
    pub net_profit_quote: String,
    pub net_profit_usd_micros: i64,
    pub ml_score: f32,
    pub confidence: f64,
}

/// Appends paper trades to a JSONL file.
pub struct PaperTradeLog {
    path: PathBuf,
}

impl PaperTradeLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &PaperTradeRecord) -> eyre::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    pub fn record_from(opportunity: &crate::evaluator::Opportunity) -> PaperTradeRecord {
        PaperTradeRecord {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            path_signature: opportunity.path_signature.clone(),
            chain: opportunity.chain,
            input_amount: opportunity.input_amount.to_string(),
            net_profit_quote: opportunity.net_profit.to_string(),
            net_profit_usd_micros: crate::evaluator::opportunity::usd_to_micros(
                opportunity.net_profit_usd,
            ),
            ml_score: opportunity.ml_score,
            confidence: opportunity.confidence,
        }
    }
}
