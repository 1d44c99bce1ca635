//! Error types for rusty_alpha

use crate::pipeline::OmissionReason;
use crate::types::TradingDate;
use thiserror::Error;

/// Main error type for rusty_alpha
///
/// Per-cell and per-date variants (`InsufficientHistory`, `MissingFactorValue`,
/// `InsufficientCrossSection`, `NoEligibleInstruments`, `ConstraintInfeasible`) are
/// absorbed by the stage that
/// raises them and surface as markers in its output. The remaining variants are
/// structural and abort the run.
#[derive(Error, Debug)]
pub enum AlphaError {
    #[error("Insufficient history for {instrument} at {date}: required {required} observations, available {available}")]
    InsufficientHistory {
        instrument: String,
        date: TradingDate,
        required: usize,
        available: usize,
    },

    #[error("No factor value for {instrument} at {date}: {reason}")]
    MissingFactorValue {
        instrument: String,
        date: TradingDate,
        reason: OmissionReason,
    },

    #[error("Insufficient cross-section at {date}: {available} instruments, minimum {required}")]
    InsufficientCrossSection {
        date: TradingDate,
        available: usize,
        required: usize,
    },

    #[error("No eligible instruments at {date}: {eligible} passed filtering, minimum {required}")]
    NoEligibleInstruments {
        date: TradingDate,
        eligible: usize,
        required: usize,
    },

    #[error("Calendar mismatch: {0}")]
    CalendarMismatch(String),

    #[error("Constraint infeasible at {date}: caps require turnover {required:.6}, budget {budget:.6}")]
    ConstraintInfeasible {
        date: TradingDate,
        required: f64,
        budget: f64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed panel: {0}")]
    MalformedPanel(String),

    #[error("Sector-neutralization requested for factor '{0}' but no sector map was supplied")]
    MissingSectorMap(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl AlphaError {
    /// Structural errors abort a whole run; the others are absorbed per cell/date.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            AlphaError::InsufficientHistory { .. }
                | AlphaError::MissingFactorValue { .. }
                | AlphaError::InsufficientCrossSection { .. }
                | AlphaError::NoEligibleInstruments { .. }
                | AlphaError::ConstraintInfeasible { .. }
        )
    }
}

/// Result type alias for rusty_alpha operations
pub type Result<T> = std::result::Result<T, AlphaError>;
