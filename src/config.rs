//! Engine configuration.
//!
//! Four layers, later wins: built-in defaults, TOML config file,
//! environment variables, CLI flags. The resolved `EngineConfig` is the
//! only configuration type the rest of the engine sees.

use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::orchestrator::EngineMode;
use crate::types::{ChainId, DexKind};

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("config file {path}: {reason}")]
    File { path: String, reason: String },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Parser, Debug, Default)]
#[command(name = "cyclarb")]
#[command(about = "Multi-chain cyclic arbitrage opportunity engine")]
pub struct Args {
    /// Execution mode: SIMULATION or LIVE
    #[arg(long)]
    pub mode: Option<String>,

    /// Sleep between orchestrator ticks, milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Maximum cycle length in hops (2..=5)
    #[arg(long)]
    pub max_hops: Option<usize>,

    /// Minimum net profit to approve, USD
    #[arg(long)]
    pub min_profit_usd: Option<Decimal>,

    /// Maximum aggregated slippage, basis points
    #[arg(long)]
    pub max_slippage_bps: Option<u32>,

    /// Maximum single-leg market impact, basis points
    #[arg(long)]
    pub max_impact_bps: Option<u32>,

    /// Active chain ids, comma separated
    #[arg(long)]
    pub chains: Option<String>,

    /// DEX kind allowlist, comma separated
    #[arg(long)]
    pub dex_allow: Option<String>,

    /// Manual accept/skip window for hot opportunities, milliseconds
    #[arg(long)]
    pub manual_window_ms: Option<u64>,

    /// Single-iteration smoke mode
    #[arg(long)]
    pub test: bool,

    /// TOML config file
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Pool-registry snapshot file (JSON)
    #[arg(long)]
    pub snapshot_file: Option<PathBuf>,

    /// Token-equivalence file (JSON)
    #[arg(long)]
    pub equivalence_file: Option<PathBuf>,

    /// Accounting export file (JSONL, append-only)
    #[arg(long)]
    pub accounting_export: Option<PathBuf>,

    /// Paper-trade log file (JSONL)
    #[arg(long)]
    pub paper_log: Option<PathBuf>,
}

/// Optional file layer; every field may be omitted.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub mode: Option<String>,
    pub tick_ms: Option<u64>,
    pub max_hops: Option<usize>,
    pub min_profit_usd: Option<Decimal>,
    pub max_slippage_bps: Option<u32>,
    pub max_impact_bps: Option<u32>,
    pub chains: Option<Vec<ChainId>>,
    pub dex_allow: Option<Vec<String>>,
    pub manual_window_ms: Option<u64>,
    pub rpc_endpoints: Option<Vec<String>>,
    pub oracle_endpoints: Option<Vec<String>>,
    pub base_symbols: Option<Vec<String>>,
    pub native_symbol: Option<String>,
    pub staleness_limit_price_s: Option<f64>,
    pub max_flashloan_percent_tvl: Option<Decimal>,
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: EngineMode,
    pub tick_ms: u64,
    pub max_hops: usize,
    pub min_profit_usd: Decimal,
    pub max_slippage_bps: u32,
    pub max_impact_bps: u32,
    pub chains: Vec<ChainId>,
    pub dex_allow: Option<Vec<DexKind>>,
    pub manual_window_ms: u64,
    pub test_mode: bool,
    pub rpc_endpoints: Vec<String>,
    pub oracle_endpoints: Vec<String>,
    pub base_symbols: Vec<String>,
    pub native_symbol: String,
    pub staleness_limit_price_s: f64,
    pub max_flashloan_percent_tvl: Decimal,
    pub snapshot_file: PathBuf,
    pub equivalence_file: PathBuf,
    pub accounting_export: PathBuf,
    pub paper_log: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Simulation,
            tick_ms: 10,
            max_hops: 4,
            min_profit_usd: dec!(10),
            max_slippage_bps: 500,
            max_impact_bps: 1_000,
            chains: vec![1],
            dex_allow: None,
            manual_window_ms: 5_000,
            test_mode: false,
            rpc_endpoints: Vec::new(),
            oracle_endpoints: Vec::new(),
            base_symbols: Vec::new(),
            native_symbol: "WETH".to_string(),
            staleness_limit_price_s: 12.0,
            max_flashloan_percent_tvl: dec!(30),
            snapshot_file: PathBuf::from("pool_registry_snapshot.json"),
            equivalence_file: PathBuf::from("token_equivalence.json"),
            accounting_export: PathBuf::from("accounting_export.jsonl"),
            paper_log: PathBuf::from("paper_trades.jsonl"),
        }
    }
}

fn parse_csv_chains(raw: &str) -> Result<Vec<ChainId>, ConfigError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim().parse::<ChainId>().map_err(|e| ConfigError::Invalid {
                field: "chains",
                reason: format!("{s:?}: {e}"),
            })
        })
        .collect()
}

fn parse_dex_list(items: impl Iterator<Item = String>) -> Result<Vec<DexKind>, ConfigError> {
    items
        .map(|s| {
            DexKind::parse(&s).ok_or(ConfigError::Invalid {
                field: "dex_allow",
                reason: format!("unknown dex kind {s:?}"),
            })
        })
        .collect()
}

impl EngineConfig {
    /// Resolve the four layers. `env` is passed in (instead of read
    /// globally) so precedence is testable.
    pub fn resolve(args: &Args, env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let file = match &args.config_file {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let mut config = EngineConfig::default();

        // File layer.
        if let Some(mode) = &file.mode {
            config.mode = mode.parse().map_err(|e| ConfigError::Invalid { field: "mode", reason: e })?;
        }
        if let Some(v) = file.tick_ms {
            config.tick_ms = v;
        }
        if let Some(v) = file.max_hops {
            config.max_hops = v;
        }
        if let Some(v) = file.min_profit_usd {
            config.min_profit_usd = v;
        }
        if let Some(v) = file.max_slippage_bps {
            config.max_slippage_bps = v;
        }
        if let Some(v) = file.max_impact_bps {
            config.max_impact_bps = v;
        }
        if let Some(v) = file.chains.clone() {
            config.chains = v;
        }
        if let Some(v) = file.dex_allow.clone() {
            config.dex_allow = Some(parse_dex_list(v.into_iter())?);
        }
        if let Some(v) = file.manual_window_ms {
            config.manual_window_ms = v;
        }
        if let Some(v) = file.rpc_endpoints.clone() {
            config.rpc_endpoints = v;
        }
        if let Some(v) = file.oracle_endpoints.clone() {
            config.oracle_endpoints = v;
        }
        if let Some(v) = file.base_symbols.clone() {
            config.base_symbols = v;
        }
        if let Some(v) = file.native_symbol.clone() {
            config.native_symbol = v;
        }
        if let Some(v) = file.staleness_limit_price_s {
            config.staleness_limit_price_s = v;
        }
        if let Some(v) = file.max_flashloan_percent_tvl {
            config.max_flashloan_percent_tvl = v;
        }

        // Environment layer.
        if let Some(raw) = env.get("MIN_PROFIT_USD") {
            config.min_profit_usd = raw.parse().map_err(|e| ConfigError::Invalid {
                field: "MIN_PROFIT_USD",
                reason: format!("{e}"),
            })?;
        }
        if let Some(raw) = env.get("MAX_FLASHLOAN_PERCENT_TVL") {
            config.max_flashloan_percent_tvl = raw.parse().map_err(|e| ConfigError::Invalid {
                field: "MAX_FLASHLOAN_PERCENT_TVL",
                reason: format!("{e}"),
            })?;
        }
        if let Some(raw) = env.get("STALENESS_LIMIT_PRICE") {
            config.staleness_limit_price_s = raw.parse().map_err(|e| ConfigError::Invalid {
                field: "STALENESS_LIMIT_PRICE",
                reason: format!("{e}"),
            })?;
        }
        if let Some(raw) = env.get("CHAIN_RPC_ENDPOINTS") {
            config.rpc_endpoints = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(raw) = env.get("ORACLE_ENDPOINTS") {
            config.oracle_endpoints = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // CLI layer.
        if let Some(mode) = &args.mode {
            config.mode = mode.parse().map_err(|e| ConfigError::Invalid { field: "mode", reason: e })?;
        }
        if let Some(v) = args.tick_ms {
            config.tick_ms = v;
        }
        if let Some(v) = args.max_hops {
            config.max_hops = v;
        }
        if let Some(v) = args.min_profit_usd {
            config.min_profit_usd = v;
        }
        if let Some(v) = args.max_slippage_bps {
            config.max_slippage_bps = v;
        }
        if let Some(v) = args.max_impact_bps {
            config.max_impact_bps = v;
        }
        if let Some(raw) = &args.chains {
            config.chains = parse_csv_chains(raw)?;
        }
        if let Some(raw) = &args.dex_allow {
            config.dex_allow = Some(parse_dex_list(
                raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            )?);
        }
        if let Some(v) = args.manual_window_ms {
            config.manual_window_ms = v;
        }
        config.test_mode = args.test;
        if let Some(v) = &args.snapshot_file {
            config.snapshot_file = v.clone();
        }
        if let Some(v) = &args.equivalence_file {
            config.equivalence_file = v.clone();
        }
        if let Some(v) = &args.accounting_export {
            config.accounting_export = v.clone();
        }
        if let Some(v) = &args.paper_log {
            config.paper_log = v.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=5).contains(&self.max_hops) {
            return Err(ConfigError::Invalid {
                field: "max_hops",
                reason: format!("{} outside 2..=5", self.max_hops),
            });
        }
        if self.max_slippage_bps > 10_000 || self.max_impact_bps > 10_000 {
            return Err(ConfigError::Invalid {
                field: "max_slippage_bps/max_impact_bps",
                reason: "basis points exceed 10000".to_string(),
            });
        }
        if self.chains.is_empty() {
            return Err(ConfigError::Invalid {
                field: "chains",
                reason: "at least one chain required".to_string(),
            });
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_ms",
                reason: "zero tick".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn defaults_resolve_cleanly() {
        let config = EngineConfig::resolve(&Args::default(), &no_env()).unwrap();
        assert_eq!(config.mode, EngineMode::Simulation);
        assert_eq!(config.tick_ms, 10);
        assert_eq!(config.max_hops, 4);
        assert_eq!(config.min_profit_usd, dec!(10));
        assert_eq!(config.manual_window_ms, 5_000);
    }

    #[test]
    fn env_overrides_defaults_and_cli_overrides_env() {
        let mut env = no_env();
        env.insert("MIN_PROFIT_USD".into(), "15".into());

        let config = EngineConfig::resolve(&Args::default(), &env).unwrap();
        assert_eq!(config.min_profit_usd, dec!(15));

        let args = Args { min_profit_usd: Some(dec!(25)), ..Default::default() };
        let config = EngineConfig::resolve(&args, &env).unwrap();
        assert_eq!(config.min_profit_usd, dec!(25));
    }

    #[test]
    fn csv_chains_and_dex_allow_parse() {
        let args = Args {
            chains: Some("1, 137,42161".into()),
            dex_allow: Some("v2,balancer".into()),
            ..Default::default()
        };
        let config = EngineConfig::resolve(&args, &no_env()).unwrap();
        assert_eq!(config.chains, vec![1, 137, 42161]);
        assert_eq!(
            config.dex_allow,
            Some(vec![DexKind::ConstantProductV2, DexKind::WeightedBalancer])
        );
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let args = Args { max_hops: Some(9), ..Default::default() };
        assert!(EngineConfig::resolve(&args, &no_env()).is_err());

        let args = Args { dex_allow: Some("frobnicator".into()), ..Default::default() };
        assert!(EngineConfig::resolve(&args, &no_env()).is_err());

        let args = Args { mode: Some("DRYRUN".into()), ..Default::default() };
        assert!(EngineConfig::resolve(&args, &no_env()).is_err());
    }

    #[test]
    fn rpc_endpoints_come_from_environment() {
        let mut env = no_env();
        env.insert(
            "CHAIN_RPC_ENDPOINTS".into(),
            "https://rpc-a.example, https://rpc-b.example".into(),
        );
        let config = EngineConfig::resolve(&Args::default(), &env).unwrap();
        assert_eq!(
            config.rpc_endpoints,
            vec!["https://rpc-a.example".to_string(), "https://rpc-b.example".to_string()]
        );
    }

    #[test]
    fn file_layer_loads_and_yields_to_env() {
        let dir = std::env::temp_dir();
        let path = dir.join("cyclarb-config-test.toml");
        std::fs::write(
            &path,
            "min_profit_usd = \"12\"\nmax_hops = 3\nnative_symbol = \"WMATIC\"\n",
        )
        .unwrap();

        let args = Args { config_file: Some(path.clone()), ..Default::default() };
        let config = EngineConfig::resolve(&args, &no_env()).unwrap();
        assert_eq!(config.min_profit_usd, dec!(12));
        assert_eq!(config.max_hops, 3);
        assert_eq!(config.native_symbol, "WMATIC");

        let mut env = no_env();
        env.insert("MIN_PROFIT_USD".into(), "15".into());
        let config = EngineConfig::resolve(&args, &env).unwrap();
        assert_eq!(config.min_profit_usd, dec!(15));

        std::fs::remove_file(&path).ok();
    }
}
