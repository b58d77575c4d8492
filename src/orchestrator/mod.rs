//! Orchestration loop: periodic ticks driving fetch, pathfinding,
//! evaluation and emission.
//!
//! One cooperative loop owns the pipeline; CPU stages run on the bounded
//! worker pool with immutable snapshots in and owned results out. Phase
//! order inside a tick is fixed: A (I/O refresh) -> B (pathfinding) ->
//! C (evaluation) -> D (mode gate). Errors are caught at phase boundaries,
//! counted, and the loop proceeds.

pub mod mode;
pub mod queue;
pub mod workers;

use futures::future::join_all;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

pub use mode::{DispatchOutcome, EngineMode, HotThresholds, ManualDecision, ModeGate};
pub use queue::ApprovedQueue;
pub use workers::WorkerPool;

use crate::adapters::PoolSource;
use crate::cancel::CancelToken;
use crate::evaluator::{EvalContext, Evaluator, OpportunityState, Sourced};
use crate::pathfinder::Pathfinder;
use crate::registry::{PoolRegistry, RegistrySnapshot};
use crate::stats::EngineStats;
use crate::types::{ChainId, DexKind, Path, TokenId};
use crate::validation::{DataType, DataValidator, FetchRequest, FetchSubject};

/// Loop-level failures; logged and counted, never user-surfaced beyond
/// metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("tick overran its budget")]
    TickOverrun,
    #[error("approved queue full")]
    QueueFull,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Sleep between ticks.
    pub tick: Duration,
    /// Phase-A per-call timeout.
    pub phase_a_timeout: Duration,
    /// Grace for in-flight I/O after cancellation.
    pub io_grace: Duration,
    /// Evaluation batch size for Phase C.
    pub batch_size: usize,
    /// Hard cap on simultaneous evaluations.
    pub max_concurrent_evals: usize,
    /// Approved queue bound.
    pub queue_capacity: usize,
    /// Cycle source tokens by symbol; empty means every token.
    pub base_symbols: Vec<String>,
    /// Chains the engine trades on.
    pub chains: Vec<ChainId>,
    /// Optional DEX-kind allowlist for pathfinding.
    pub dex_allow: Option<Vec<DexKind>>,
    /// Symbol used to price the chain's native token for gas conversion.
    pub native_symbol: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            phase_a_timeout: Duration::from_secs(2),
            io_grace: Duration::from_secs(2),
            batch_size: 64,
            max_concurrent_evals: 256,
            queue_capacity: 2_048,
            base_symbols: Vec::new(),
            chains: vec![1],
            dex_allow: None,
            native_symbol: "NATIVE".to_string(),
        }
    }
}

/// Per-chain market context assembled in Phase A.
struct ChainContext {
    gas: Sourced,
    native_usd: Sourced,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<PoolRegistry>,
    pathfinder: Pathfinder,
    evaluator: Arc<Evaluator>,
    validator: Arc<DataValidator>,
    pool_source: Arc<dyn PoolSource>,
    gate: Arc<ModeGate>,
    queue: ApprovedQueue,
    workers: WorkerPool,
    stats: Arc<EngineStats>,
    cancel: CancelToken,
    eval_permits: Arc<Semaphore>,
    last_gas_wei: Mutex<Option<Decimal>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<PoolRegistry>,
        pathfinder: Pathfinder,
        evaluator: Arc<Evaluator>,
        validator: Arc<DataValidator>,
        pool_source: Arc<dyn PoolSource>,
        gate: Arc<ModeGate>,
        workers: WorkerPool,
        stats: Arc<EngineStats>,
        cancel: CancelToken,
    ) -> Self {
        let queue = ApprovedQueue::new(config.queue_capacity);
        let eval_permits = Arc::new(Semaphore::new(config.max_concurrent_evals.max(1)));
        Self {
            config,
            registry,
            pathfinder,
            evaluator,
            validator,
            pool_source,
            gate,
            queue,
            workers,
            stats,
            cancel,
            eval_permits,
            last_gas_wei: Mutex::new(None),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    pub fn gate(&self) -> Arc<ModeGate> {
        self.gate.clone()
    }

    /// Run until cancelled.
    pub async fn run(&self) {
        info!(tick_ms = self.config.tick.as_millis() as u64, "orchestrator started");
        let mut skip_next = false;
        loop {
            if self.cancel.is_cancelled() {
                info!(reason = %OrchestratorError::Cancelled, "orchestrator stopped");
                break;
            }
            if skip_next {
                EngineStats::bump(&self.stats.ticks_skipped);
                skip_next = false;
                sleep(self.config.tick).await;
                continue;
            }
            let elapsed = self.run_tick().await;
            if elapsed > self.config.tick * 3 {
                EngineStats::bump(&self.stats.tick_overruns);
                debug!(
                    error = %OrchestratorError::TickOverrun,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tick overran 3x budget, skipping next"
                );
                skip_next = true;
            }
            sleep(self.config.tick).await;
        }
    }

    /// One full tick. Returns its wall-clock duration for overrun
    /// accounting.
    pub async fn run_tick(&self) -> Duration {
        let started = Instant::now();
        EngineStats::bump(&self.stats.ticks);

        // Phase A: refresh pools and market context in parallel.
        let (chain_ctx, input_prices) = self.phase_a().await;
        if self.cancel.is_cancelled() {
            return started.elapsed();
        }

        // Phase B: pathfinding on a fresh snapshot, offloaded.
        let snapshot = self.registry.snapshot();
        let paths = self.phase_b(snapshot.clone()).await;
        EngineStats::add(&self.stats.paths_found, paths.len() as u64);
        if self.cancel.is_cancelled() {
            return started.elapsed();
        }

        // Phase C: evaluation in bounded batches.
        let approved = self.phase_c(&snapshot, paths, &chain_ctx, &input_prices).await;

        // Phase D: queue and mode gate.
        self.phase_d(&snapshot, approved).await;

        started.elapsed()
    }

    async fn phase_a(
        &self,
    ) -> (HashMap<ChainId, ChainContext>, HashMap<String, Sourced>) {
        let pools = timeout(self.config.phase_a_timeout, self.pool_source.fetch_pools()).await;
        match pools {
            Ok(Ok(updates)) if !updates.is_empty() => {
                let stats = self.registry.apply_update(updates);
                if !stats.rejected.is_empty() {
                    debug!(rejected = stats.rejected.len(), "pool refresh rejected rows");
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                EngineStats::bump(&self.stats.phase_a_failures);
                warn!(%err, "pool refresh failed");
            }
            Err(_) => {
                EngineStats::bump(&self.stats.phase_a_failures);
                warn!("pool refresh timed out");
            }
        }

        let mut chain_ctx = HashMap::new();
        for &chain in &self.config.chains {
            let gas_req = FetchRequest::new(DataType::Gas, chain, FetchSubject::Chain);
            let native_req = FetchRequest::new(
                DataType::Price,
                chain,
                FetchSubject::Pair {
                    base: self.config.native_symbol.clone(),
                    quote: "USD".to_string(),
                },
            );
            let (gas, native) = tokio::join!(
                timeout(self.config.phase_a_timeout, self.validator.fetch_validated(&gas_req)),
                timeout(self.config.phase_a_timeout, self.validator.fetch_validated(&native_req)),
            );
            match (gas, native) {
                (Ok(Ok(gas_point)), Ok(Ok(native_point))) => {
                    chain_ctx.insert(
                        chain,
                        ChainContext {
                            gas: Sourced { request: gas_req, point: gas_point },
                            native_usd: Sourced { request: native_req, point: native_point },
                        },
                    );
                }
                (gas, native) => {
                    EngineStats::bump(&self.stats.phase_a_failures);
                    warn!(
                        chain,
                        gas_ok = matches!(gas, Ok(Ok(_))),
                        native_ok = matches!(native, Ok(Ok(_))),
                        "market context refresh failed"
                    );
                }
            }
        }

        // Input-token USD prices for every base symbol.
        let mut input_prices = HashMap::new();
        let snapshot = self.registry.snapshot();
        let symbols: Vec<String> = if self.config.base_symbols.is_empty() {
            let mut all = Vec::new();
            for i in 0..snapshot.token_count() {
                if let Some(token) = snapshot.token(TokenId(i as u32)) {
                    if !all.contains(&token.symbol) {
                        all.push(token.symbol.clone());
                    }
                }
            }
            all
        } else {
            self.config.base_symbols.clone()
        };
        for symbol in symbols {
            for &chain in &self.config.chains {
                let req = FetchRequest::new(
                    DataType::Price,
                    chain,
                    FetchSubject::Pair { base: symbol.clone(), quote: "USD".to_string() },
                );
                match timeout(self.config.phase_a_timeout, self.validator.fetch_validated(&req)).await
                {
                    Ok(Ok(point)) => {
                        input_prices.insert(symbol.clone(), Sourced { request: req, point });
                        break;
                    }
                    _ => continue,
                }
            }
        }

        (chain_ctx, input_prices)
    }

    async fn phase_b(&self, snapshot: Arc<RegistrySnapshot>) -> Vec<Path> {
        let sources = self.source_tokens(&snapshot);
        if sources.is_empty() {
            return Vec::new();
        }
        let pathfinder = self.pathfinder.clone();
        let cancel = self.cancel.clone();
        let dex_allow = self.config.dex_allow.clone();
        let chains = self.config.chains.clone();
        self.workers
            .run(move || {
                pathfinder.find_cycles_multi(
                    &snapshot,
                    &sources,
                    dex_allow.as_deref(),
                    Some(chains.as_slice()),
                    &cancel,
                )
            })
            .await
    }

    async fn phase_c(
        &self,
        snapshot: &Arc<RegistrySnapshot>,
        paths: Vec<Path>,
        chain_ctx: &HashMap<ChainId, ChainContext>,
        input_prices: &HashMap<String, Sourced>,
    ) -> Vec<crate::evaluator::Opportunity> {
        let mut approved = Vec::new();
        for batch in paths.chunks(self.config.batch_size.max(1)) {
            if self.cancel.is_cancelled() {
                break;
            }
            let futures = batch.iter().filter_map(|path| {
                let ctx = self.context_for(snapshot, path, chain_ctx, input_prices)?;
                let permits = self.eval_permits.clone();
                let evaluator = self.evaluator.clone();
                let snapshot = snapshot.clone();
                let path = path.clone();
                Some(async move {
                    let _permit = permits.acquire_owned().await.expect("eval semaphore closed");
                    evaluator.evaluate(&snapshot, &path, &ctx).await
                })
            });
            for opportunity in join_all(futures).await {
                EngineStats::bump(&self.stats.evaluated);
                match &opportunity.state {
                    OpportunityState::Approved => approved.push(opportunity),
                    OpportunityState::Rejected(reason) => {
                        self.stats.count_rejection(reason.as_str())
                    }
                    other => {
                        debug!(state = ?other, "evaluation ended in non-terminal state");
                    }
                }
            }
        }
        approved
    }

    async fn phase_d(
        &self,
        snapshot: &Arc<RegistrySnapshot>,
        approved: Vec<crate::evaluator::Opportunity>,
    ) {
        for opportunity in approved {
            let Some(plan) = self.evaluator.plan(&opportunity, snapshot) else {
                warn!(path = %opportunity.path_signature, "approved opportunity failed plan resolution");
                continue;
            };
            EngineStats::bump(&self.stats.approved);
            if !self.queue.push(opportunity, plan) {
                debug!(error = %OrchestratorError::QueueFull, "backpressure dropped an approved entry");
            }
        }
        // Sync the queue's drop counter into the stats snapshot.
        let dropped = self.queue.dropped();
        self.stats
            .queue_dropped
            .store(dropped, std::sync::atomic::Ordering::Relaxed);

        while let Some(entry) = self.queue.pop() {
            if self.cancel.is_cancelled() {
                // In-flight emission gets the grace period, then we stop.
                let _ = timeout(
                    self.config.io_grace,
                    self.gate.dispatch(&entry.opportunity, &entry.plan),
                )
                .await;
                break;
            }
            self.gate.dispatch(&entry.opportunity, &entry.plan).await;
        }
    }

    /// Build the evaluation context for one path, tracking the gas-price
    /// volatility between ticks as the model's volatility proxy.
    fn context_for(
        &self,
        snapshot: &RegistrySnapshot,
        path: &Path,
        chain_ctx: &HashMap<ChainId, ChainContext>,
        input_prices: &HashMap<String, Sourced>,
    ) -> Option<EvalContext> {
        let first_pool = snapshot.pool(path.legs.first()?.pool).ok()?;
        let ctx = chain_ctx.get(&first_pool.chain)?;
        let input_symbol = &snapshot.token(path.source_token())?.symbol;
        let input_usd = input_prices.get(input_symbol)?.clone();

        let gas_now = ctx.gas.point.scalar().unwrap_or(Decimal::ZERO);
        let volatility = {
            let mut last = self.last_gas_wei.lock();
            let v = match *last {
                Some(prev) if !prev.is_zero() => ((gas_now - prev) / prev)
                    .abs()
                    .to_f64()
                    .unwrap_or(0.0)
                    .min(1.0),
                _ => 0.0,
            };
            *last = Some(gas_now);
            v
        };

        Some(EvalContext {
            gas: ctx.gas.clone(),
            native_usd: ctx.native_usd.clone(),
            input_usd,
            volatility_indicator: volatility,
        })
    }

    fn source_tokens(&self, snapshot: &RegistrySnapshot) -> Vec<TokenId> {
        let mut sources = Vec::new();
        for i in 0..snapshot.token_count() {
            let id = TokenId(i as u32);
            let Some(token) = snapshot.token(id) else { continue };
            if self.config.base_symbols.is_empty()
                || self.config.base_symbols.iter().any(|s| s == &token.symbol)
            {
                sources.push(id);
            }
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::relay::PaperRelay;
    use crate::adapters::StaticPoolSource;
    use crate::evaluator::testutil::{fixture, EvalFixture, POOL_A, POOL_B};
    use crate::pathfinder::PathfinderConfig;
    use crate::registry::testutil::{token, v2_update};
    use crate::stats::EngineStats;
    use tokio::sync::mpsc;

    struct Harness {
        orchestrator: Orchestrator,
        relay: Arc<PaperRelay>,
        stats: Arc<EngineStats>,
    }

    fn harness(fx: EvalFixture, p2_reserve_b: u128, mode: EngineMode) -> Harness {
        let EvalFixture { registry, evaluator, validator, .. } = fx;
        let mut tok_a = token(1, 1, "AAA");
        tok_a.decimals = 6;
        let mut tok_b = token(1, 2, "BBB");
        tok_b.decimals = 6;
        let pool_source = Arc::new(StaticPoolSource::new(vec![
            v2_update(1, POOL_A, tok_a.clone(), tok_b.clone(), 1_000_000, 2_000_000, 30),
            v2_update(1, POOL_B, tok_b, tok_a, p2_reserve_b, 1_000_000, 30),
        ]));

        let stats = Arc::new(EngineStats::new());
        let relay = Arc::new(PaperRelay::new());
        let (_tx, rx) = mpsc::channel(1);
        let gate = Arc::new(ModeGate::new(
            mode,
            relay.clone(),
            None,
            rx,
            Duration::from_millis(10),
            HotThresholds::default(),
            stats.clone(),
        ));

        let config = OrchestratorConfig {
            base_symbols: vec!["AAA".to_string()],
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(registry),
            Pathfinder::new(PathfinderConfig::default()),
            Arc::new(evaluator),
            validator,
            pool_source,
            gate,
            WorkerPool::new(2),
            stats.clone(),
            CancelToken::new(),
        );
        Harness { orchestrator, relay, stats }
    }

    #[tokio::test]
    async fn profitable_cycle_emits_paper_trade_in_simulation() {
        let h = harness(fixture(1_800_000), 1_800_000, EngineMode::Simulation);
        h.orchestrator.run_tick().await;

        let snap = h.stats.snapshot();
        assert_eq!(snap.ticks, 1);
        assert!(snap.paths_found >= 1, "no paths found");
        assert_eq!(snap.approved, 1, "stats: {snap:?}");
        assert_eq!(snap.paper_trades, 1);
        // SIMULATION never reaches the relay.
        assert_eq!(h.relay.submitted_count(), 0);
    }

    #[tokio::test]
    async fn unprofitable_cycle_is_counted_not_emitted() {
        let h = harness(fixture(2_100_000), 2_100_000, EngineMode::Simulation);
        h.orchestrator.run_tick().await;

        let snap = h.stats.snapshot();
        assert_eq!(snap.approved, 0);
        assert_eq!(snap.paper_trades, 0);
        assert!(h.stats.rejection_count("no_profit") >= 1, "stats: {snap:?}");
    }

    #[tokio::test]
    async fn live_mode_submits_through_relay() {
        let h = harness(fixture(1_800_000), 1_800_000, EngineMode::Live);
        h.orchestrator.run_tick().await;
        // Cold opportunity (heuristic score < 0.8): direct submission.
        assert_eq!(h.relay.submitted_count(), 1);
        assert_eq!(h.stats.snapshot().submitted, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let h = harness(fixture(1_800_000), 1_800_000, EngineMode::Simulation);
        let cancel = h.orchestrator.cancel_token();
        cancel.cancel();
        // run() must return promptly once the token is set.
        tokio::time::timeout(Duration::from_secs(1), h.orchestrator.run())
            .await
            .expect("run did not stop after cancellation");
    }

    #[tokio::test]
    async fn repeated_ticks_are_stable() {
        let h = harness(fixture(1_800_000), 1_800_000, EngineMode::Simulation);
        h.orchestrator.run_tick().await;
        h.orchestrator.run_tick().await;
        let snap = h.stats.snapshot();
        assert_eq!(snap.ticks, 2);
        // The same cycle approves on each tick while the edge persists.
        assert_eq!(snap.paper_trades, 2);
    }
}
