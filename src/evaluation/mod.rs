//! Factor evaluator: predictive-power diagnostics against forward returns

pub mod ic;
pub mod quantiles;
pub mod report;
pub mod returns;

pub use ic::IcSummary;
pub use report::{
    decay, evaluate, evaluate_factor, DateEvaluation, DateStatus, DecayPoint, DecayProfile,
    EvaluationConfig, EvaluationReport, IcRecord, QuantileRecord,
};
pub use returns::ForwardReturns;
