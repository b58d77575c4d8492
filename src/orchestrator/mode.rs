//! Execution mode gate.
//!
//! SIMULATION records every approved opportunity as a paper trade and never
//! touches the outside world. LIVE submits through the relay adapter; hot
//! opportunities first open a manual accept/skip window on a control
//! channel, and silence auto-submits when the window closes.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use crate::adapters::relay::RelayAdapter;
use crate::evaluator::{Opportunity, OpportunityPlan};
use crate::stats::{EngineStats, PaperTradeLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Simulation,
    Live,
}

impl FromStr for EngineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SIMULATION" => Ok(EngineMode::Simulation),
            "LIVE" => Ok(EngineMode::Live),
            other => Err(format!("unknown mode {other:?}, expected SIMULATION or LIVE")),
        }
    }
}

/// Operator decision on a hot opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualDecision {
    Accept,
    Skip,
}

/// Thresholds defining a hot opportunity.
#[derive(Debug, Clone)]
pub struct HotThresholds {
    pub min_score: f32,
    pub min_profit_usd: Decimal,
    pub min_confidence: f64,
}

impl Default for HotThresholds {
    fn default() -> Self {
        Self { min_score: 0.8, min_profit_usd: dec!(50), min_confidence: 0.85 }
    }
}

/// What the gate did with one approved opportunity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    PaperRecorded,
    Submitted { submission_id: String },
    ManualSkip,
    Failed,
}

pub struct ModeGate {
    mode: RwLock<EngineMode>,
    relay: Arc<dyn RelayAdapter>,
    paper_log: Option<PaperTradeLog>,
    control: tokio::sync::Mutex<mpsc::Receiver<ManualDecision>>,
    manual_window: Duration,
    hot: HotThresholds,
    stats: Arc<EngineStats>,
}

impl ModeGate {
    pub fn new(
        mode: EngineMode,
        relay: Arc<dyn RelayAdapter>,
        paper_log: Option<PaperTradeLog>,
        control: mpsc::Receiver<ManualDecision>,
        manual_window: Duration,
        hot: HotThresholds,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            mode: RwLock::new(mode),
            relay,
            paper_log,
            control: tokio::sync::Mutex::new(control),
            manual_window,
            hot,
            stats,
        }
    }

    pub fn mode(&self) -> EngineMode {
        *self.mode.read()
    }

    /// Runtime mode switch; takes effect from the next dispatch.
    pub fn set_mode(&self, mode: EngineMode) {
        let previous = *self.mode.read();
        if previous != mode {
            info!(?previous, ?mode, "execution mode switched");
        }
        *self.mode.write() = mode;
    }

    pub async fn dispatch(
        &self,
        opportunity: &Opportunity,
        plan: &OpportunityPlan,
    ) -> DispatchOutcome {
        match self.mode() {
            EngineMode::Simulation => self.record_paper(opportunity),
            EngineMode::Live => self.dispatch_live(opportunity, plan).await,
        }
    }

    fn record_paper(&self, opportunity: &Opportunity) -> DispatchOutcome {
        EngineStats::bump(&self.stats.paper_trades);
        if let Some(log) = &self.paper_log {
            let record = PaperTradeLog::record_from(opportunity);
            if let Err(err) = log.append(&record) {
                warn!(%err, "failed to append paper trade");
            }
        }
        info!(
            path = %opportunity.path_signature,
            profit_usd = %opportunity.net_profit_usd,
            "paper trade recorded"
        );
        DispatchOutcome::PaperRecorded
    }

    async fn dispatch_live(
        &self,
        opportunity: &Opportunity,
        plan: &OpportunityPlan,
    ) -> DispatchOutcome {
        let hot = opportunity.is_hot(
            self.hot.min_score,
            self.hot.min_profit_usd,
            self.hot.min_confidence,
        );
        if hot {
            info!(
                path = %opportunity.path_signature,
                profit_usd = %opportunity.net_profit_usd,
                score = opportunity.ml_score,
                window_ms = self.manual_window.as_millis() as u64,
                "hot opportunity: manual window open"
            );
            let decision = {
                let mut control = self.control.lock().await;
                timeout(self.manual_window, control.recv()).await
            };
            match decision {
                Ok(Some(ManualDecision::Skip)) => {
                    EngineStats::bump(&self.stats.manual_skips);
                    info!(path = %opportunity.path_signature, "manually skipped");
                    return DispatchOutcome::ManualSkip;
                }
                Ok(Some(ManualDecision::Accept)) => {
                    info!(path = %opportunity.path_signature, "manually accepted");
                }
                // Channel closed or window elapsed: auto-submit.
                Ok(None) | Err(_) => {
                    info!(path = %opportunity.path_signature, "manual window elapsed, auto-submitting");
                }
            }
        }

        match self.relay.submit(plan).await {
            Ok(handle) => {
                EngineStats::bump(&self.stats.submitted);
                DispatchOutcome::Submitted { submission_id: handle.submission_id }
            }
            Err(err) => {
                warn!(%err, path = %opportunity.path_signature, "relay submission failed");
                DispatchOutcome::Failed
            }
        }
    }
}
