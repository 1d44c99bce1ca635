//! # Rusty-Alpha
//!
//! Equity factor research in Rust: point-in-time factor construction,
//! predictive-power evaluation, constrained portfolio construction and a daily
//! backtest with transaction costs.
//!
//! Every stage is a pure function over an immutable [`data::Panel`], so identical
//! inputs always give identical outputs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rusty_alpha::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let panel = rusty_alpha::data::load_panel_csv("panel.csv")?;
//!     let factors = compute_factor(&panel, &TransformSpec::momentum(20), panel.calendar().dates())?;
//!     let report = evaluate_factor(&panel, &factors, &EvaluationConfig::default())?;
//!     println!("mean IC: {:?}", report.ic.mean);
//!     Ok(())
//! }
//! ```

pub mod backtest;
pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod instrument;
pub mod performance;
pub mod pipeline;
pub mod portfolio;
pub mod research;
pub mod stats;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::backtest::{
        BacktestConfig, BacktestResult, BacktestSimulator, CostModel, FactorTargets,
        PrecomputedTargets, ProportionalCost, TargetSource,
    };
    pub use crate::calendar::{RebalanceSchedule, TradingCalendar};
    pub use crate::config::ResearchConfig;
    pub use crate::data::{Panel, PanelRow, PointInTimeView, SectorMap};
    pub use crate::error::{AlphaError, Result};
    pub use crate::evaluation::{evaluate_factor, EvaluationConfig, EvaluationReport};
    pub use crate::instrument::{Instrument, InstrumentId};
    pub use crate::performance::{Benchmark, PerformanceReporter, PerformanceSummary};
    pub use crate::pipeline::{compute_factor, FactorEngine, FactorPanel, Formula, PostProcess, TransformSpec};
    pub use crate::portfolio::{Constraints, PortfolioConstructor, PortfolioWeights, WeightingScheme};
    pub use crate::research::{ResearchOutput, ResearchPipeline};
    pub use crate::types::*;
}
