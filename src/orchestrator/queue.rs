//! Bounded approved-opportunity queue.
//!
//! FIFO within a score class (score bucketed to tenths); on overflow the
//! lowest-scored entry is dropped and counted, so backpressure sheds the
//! least promising work first.

use parking_lot::Mutex;

use crate::evaluator::{Opportunity, OpportunityPlan};

pub struct QueuedOpportunity {
    pub opportunity: Opportunity,
    pub plan: OpportunityPlan,
    seq: u64,
}

pub struct ApprovedQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    entries: Vec<QueuedOpportunity>,
    next_seq: u64,
    dropped: u64,
}

fn score_class(score: f32) -> u8 {
    (score.clamp(0.0, 1.0) * 10.0).floor() as u8
}

impl ApprovedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner { entries: Vec::new(), next_seq: 0, dropped: 0 }),
        }
    }

    /// Push an approved opportunity; returns false when it (or a weaker
    /// entry) was dropped to hold the bound.
    pub fn push(&self, opportunity: Opportunity, plan: OpportunityPlan) -> bool {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let entry = QueuedOpportunity { opportunity, plan, seq };

        if inner.entries.len() < self.capacity {
            inner.entries.push(entry);
            return true;
        }

        // Full: drop the globally lowest-scored entry, candidate included.
        let min_idx = inner
            .entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.opportunity
                    .ml_score
                    .partial_cmp(&b.opportunity.ml_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(i, _)| i);
        inner.dropped += 1;
        match min_idx {
            Some(i) if inner.entries[i].opportunity.ml_score < entry.opportunity.ml_score => {
                inner.entries[i] = entry;
                true
            }
            _ => false,
        }
    }

    /// Pop the next entry: highest score class first, FIFO inside a class.
    pub fn pop(&self) -> Option<QueuedOpportunity> {
        let mut inner = self.inner.lock();
        let best = inner
            .entries
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                score_class(a.opportunity.ml_score)
                    .cmp(&score_class(b.opportunity.ml_score))
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(i, _)| i)?;
        Some(inner.entries.swap_remove(best))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}
