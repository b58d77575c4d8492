//! Cyclic arbitrage opportunity engine.
//!
//! Detects and evaluates cyclic arbitrage across a multi-chain, multi-DEX
//! pool graph: pool registry and token graph, bounded-hop pathfinding,
//! per-DEX AMM math, flashloan sizing, a four-layer data-validation fabric,
//! and the orchestration loop that wires them together. Transaction
//! signing, relay transports and dashboards live outside this crate;
//! only their seams are defined here.

pub mod adapters;
pub mod cancel;
pub mod config;
pub mod evaluator;
pub mod flashloan;
pub mod math;
pub mod orchestrator;
pub mod pathfinder;
pub mod registry;
pub mod stats;
pub mod types;
pub mod validation;
