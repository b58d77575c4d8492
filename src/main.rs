//! cyclarb binary: configuration, wiring and the process surface.
//!
//! Exit codes: 0 clean, 64 configuration error, 65 data-fabric hard
//! failure at startup, 70 internal invariant violation.

use clap::Parser;
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cyclarb::adapters::oracle::OracleAdapter;
use cyclarb::adapters::relay::PaperRelay;
use cyclarb::adapters::rpc::{JsonRpcHttp, RpcAdapter, RpcRotation};
use cyclarb::adapters::{RetryPolicy, StaticPoolSource};
use cyclarb::cancel::CancelToken;
use cyclarb::config::{Args, EngineConfig};
use cyclarb::evaluator::{Evaluator, EvaluatorConfig, GateConfig};
use cyclarb::flashloan::{default_providers, FlashloanSizer};
use cyclarb::orchestrator::{
    EngineMode, HotThresholds, ManualDecision, ModeGate, Orchestrator, OrchestratorConfig,
    WorkerPool,
};
use cyclarb::pathfinder::{Pathfinder, PathfinderConfig};
use cyclarb::registry::persist::{load_registry_snapshot, save_registry_snapshot, TokenEquivalence};
use cyclarb::registry::{GraphFilter, PoolRegistry};
use cyclarb::stats::{EngineStats, PaperTradeLog};
use cyclarb::types::TokenId;
use cyclarb::validation::accounting::AccountingTracker;
use cyclarb::validation::cache::{DataCache, LastGoodStore};
use cyclarb::validation::layers::FallbackLayers;
use cyclarb::validation::oracle::{OracleConfig, OracleVerifier};
use cyclarb::validation::{
    DataType, DataValidator, FetchRequest, FetchSubject, ValidationConfig, ValidationError,
};

const EXIT_CONFIG: u8 = 64;
const EXIT_FABRIC: u8 = 65;
const EXIT_INVARIANT: u8 = 70;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let env: HashMap<String, String> = std::env::vars().collect();
    let config = match EngineConfig::resolve(&args, &env) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration error");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!(mode = ?config.mode, chains = ?config.chains, "starting engine");

    // Registry, persisted state.
    let registry = Arc::new(PoolRegistry::new(
        GraphFilter { min_tvl_usd: rust_decimal::Decimal::ZERO, dex_allow: config.dex_allow.clone() },
        config.chains.iter().copied(),
    ));
    if config.snapshot_file.exists() {
        match load_registry_snapshot(&registry, &config.snapshot_file) {
            Ok(stats) if !stats.rejected.is_empty() => {
                // Invariant violations in persisted state are fatal at
                // startup; at runtime the same rows would just be dropped.
                for row in &stats.rejected {
                    error!(row = row.index, reason = %row.reason, "snapshot row violates invariants");
                }
                return ExitCode::from(EXIT_INVARIANT);
            }
            Ok(stats) => info!(pools = stats.applied, "registry snapshot restored"),
            Err(err) => {
                error!(%err, "failed to load registry snapshot");
                return ExitCode::from(EXIT_INVARIANT);
            }
        }
    }
    if config.equivalence_file.exists() {
        match TokenEquivalence::load(&config.equivalence_file) {
            Ok(_equivalence) => info!("token equivalence map loaded"),
            Err(err) => warn!(%err, "token equivalence file unreadable, continuing without"),
        }
    }

    // Validation fabric.
    let rpc_endpoints: Vec<Arc<dyn RpcAdapter>> = config
        .rpc_endpoints
        .iter()
        .map(|url| Arc::new(JsonRpcHttp::new(url.clone())) as Arc<dyn RpcAdapter>)
        .collect();
    if rpc_endpoints.is_empty() {
        warn!("no RPC endpoints configured (CHAIN_RPC_ENDPOINTS)");
    }
    let oracle_feeds: Vec<Arc<dyn OracleAdapter>> = Vec::new();
    if config.oracle_endpoints.is_empty() {
        warn!("no oracle endpoints configured; price points stay unverified");
    }

    let cache = Arc::new(DataCache::new(4_096));
    let last_good = Arc::new(LastGoodStore::new());
    let accounting = Arc::new(AccountingTracker::new());
    let layers = FallbackLayers::new(
        None,
        Arc::new(RpcRotation::new(rpc_endpoints)),
        cache.clone(),
        last_good.clone(),
        RetryPolicy::default(),
    );
    let validator = Arc::new(DataValidator::new(
        layers,
        OracleVerifier::new(oracle_feeds, OracleConfig::default()),
        accounting.clone(),
        cache,
        last_good,
        ValidationConfig {
            price_staleness_limit_s: config.staleness_limit_price_s,
            ..Default::default()
        },
    ));

    // Startup probe: the fabric must be able to answer at least one gas
    // request, or nothing downstream can ever validate.
    let probe = FetchRequest::new(DataType::Gas, config.chains[0], FetchSubject::Chain);
    if let Err(err @ ValidationError::FallbackExhausted { .. }) =
        validator.fetch_validated(&probe).await
    {
        error!(%err, "data fabric hard failure at startup");
        return ExitCode::from(EXIT_FABRIC);
    }

    // Flashloan providers: family fee structure with open caps; live
    // per-provider liquidity belongs to the provider adapters.
    let snapshot = registry.snapshot();
    let mut providers = default_providers();
    for provider in &mut providers {
        for i in 0..snapshot.token_count() {
            if let Some(token) = snapshot.token(TokenId(i as u32)) {
                provider
                    .liquidity
                    .insert((token.chain, token.address), alloy::primitives::U256::MAX);
            }
        }
    }
    drop(snapshot);

    let evaluator = Arc::new(Evaluator::new(
        validator.clone(),
        FlashloanSizer::new(providers),
        None,
        EvaluatorConfig {
            gates: GateConfig {
                min_profit_usd: config.min_profit_usd,
                max_slippage_bps: config.max_slippage_bps,
                max_impact_bps: config.max_impact_bps,
                ..Default::default()
            },
            ..Default::default()
        },
    ));

    // Mode gate with the manual control channel. Relay transports are
    // external; the paper relay records what would have been submitted.
    let stats = Arc::new(EngineStats::new());
    let (control_tx, control_rx) = mpsc::channel::<ManualDecision>(16);
    if config.mode == EngineMode::Live {
        spawn_stdin_control(control_tx);
    }
    let gate = Arc::new(ModeGate::new(
        config.mode,
        Arc::new(PaperRelay::new()),
        Some(PaperTradeLog::new(config.paper_log.clone())),
        control_rx,
        Duration::from_millis(config.manual_window_ms),
        HotThresholds::default(),
        stats.clone(),
    ));

    let cancel = CancelToken::new();
    let orchestrator = Orchestrator::new(
        OrchestratorConfig {
            tick: Duration::from_millis(config.tick_ms),
            base_symbols: config.base_symbols.clone(),
            chains: config.chains.clone(),
            dex_allow: config.dex_allow.clone(),
            native_symbol: config.native_symbol.clone(),
            ..Default::default()
        },
        registry.clone(),
        Pathfinder::new(PathfinderConfig { max_hops: config.max_hops, ..Default::default() }),
        evaluator,
        validator,
        Arc::new(StaticPoolSource::new(Vec::new())),
        gate,
        WorkerPool::per_cpu(),
        stats.clone(),
        cancel.clone(),
    );

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    if config.test_mode {
        info!("running single-iteration smoke mode");
        orchestrator.run_tick().await;
    } else {
        orchestrator.run().await;
    }

    // Persist state on the way out.
    if let Err(err) = accounting.export(&config.accounting_export) {
        warn!(%err, "accounting export failed");
    }
    if let Err(err) = save_registry_snapshot(&registry, &config.snapshot_file) {
        warn!(%err, "registry snapshot save failed");
    }
    match serde_json::to_string_pretty(&stats.snapshot()) {
        Ok(summary) => info!(%summary, "engine run summary"),
        Err(_) => {}
    }
    ExitCode::SUCCESS
}

/// Manual-window control transport: one character per line on stdin,
/// `a` accepts, `s` skips. The channel is the contract; this reader is
/// just the default transport.
fn spawn_stdin_control(tx: mpsc::Sender<ManualDecision>) {
    std::thread::spawn(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let decision = match line.trim() {
                "a" | "A" => Some(ManualDecision::Accept),
                "s" | "S" => Some(ManualDecision::Skip),
                _ => None,
            };
            if let Some(decision) = decision {
                if tx.blocking_send(decision).is_err() {
                    break;
                }
            }
        }
    });
}
