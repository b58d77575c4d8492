//! Relay seam: hand an approved plan to an external submitter.
//!
//! Bundle formats, authentication and transports are out of scope; the
//! contract is submit -> (submission id, result future). The paper relay
//! records plans instead of sending them, which is all SIMULATION mode and
//! the test suite need.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::info;

use super::AdapterError;
use crate::evaluator::opportunity::OpportunityPlan;

/// Terminal outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Included { block: u64 },
    Dropped { reason: String },
}

/// Submission id plus a future resolving to the terminal outcome.
pub struct SubmissionHandle {
    pub submission_id: String,
    pub result: oneshot::Receiver<SubmissionResult>,
}

#[async_trait]
pub trait RelayAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, plan: &OpportunityPlan) -> Result<SubmissionHandle, AdapterError>;
}

/// Records every plan and resolves it as included immediately.
#[derive(Default)]
pub struct PaperRelay {
    submitted: Mutex<Vec<OpportunityPlan>>,
    next_id: AtomicU64,
}

impl PaperRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<OpportunityPlan> {
        self.submitted.lock().clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().len()
    }
}

#[async_trait]
impl RelayAdapter for PaperRelay {
    fn name(&self) -> &str {
        "paper-relay"
    }

    async fn submit(&self, plan: &OpportunityPlan) -> Result<SubmissionHandle, AdapterError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().push(plan.clone());
        info!(submission = id, path = %plan.path_signature, "paper trade recorded");

        let (tx, rx) = oneshot::channel();
        let _ = tx.send(SubmissionResult::Included { block: 0 });
        Ok(SubmissionHandle { submission_id: format!("paper-{id}"), result: rx })
    }
}
