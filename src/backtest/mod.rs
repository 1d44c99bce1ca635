//! Backtest simulator: daily NAV, trades and flagged events

pub mod cost;
pub mod records;
pub mod simulator;

pub use cost::{CostModel, ProportionalCost, BASIS_POINT};
pub use records::{
    BacktestResult, NavPoint, PositionRecord, SimulationEvent, SimulatorState, Trade, TradeKind,
};
pub use simulator::{
    BacktestConfig, BacktestSimulator, FactorTargets, PrecomputedTargets, TargetSource,
};
