//! Research run configuration
//!
//! One TOML tree drives a full run: factor definition, evaluation, portfolio
//! constraints, backtest and reporting. Every section falls back to defaults, and
//! the whole tree is validated before any computation starts.

use crate::backtest::BacktestConfig;
use crate::error::{AlphaError, Result};
use crate::evaluation::EvaluationConfig;
use crate::pipeline::TransformSpec;
use crate::portfolio::Constraints;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Reporting options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Annual risk-free rate used by Sharpe and Sortino
    pub risk_free_rate: f64,
    /// Attribute performance against the equal-weight universe
    pub benchmark: bool,
    /// Directory for CSV/JSON artifacts
    pub output_dir: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            benchmark: true,
            output_dir: None,
        }
    }
}

/// Complete research run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub factor: TransformSpec,
    pub evaluation: EvaluationConfig,
    pub portfolio: Constraints,
    pub backtest: BacktestConfig,
    pub report: ReportConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            factor: TransformSpec::momentum(20),
            evaluation: EvaluationConfig::default(),
            portfolio: Constraints::default(),
            backtest: BacktestConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ResearchConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("Loaded research config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AlphaError::InvalidConfig(format!("cannot serialize config: {}", e)))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.factor.validate()?;
        self.evaluation.validate()?;
        self.portfolio.validate()?;
        self.backtest.validate()?;
        if !self.report.risk_free_rate.is_finite() || self.report.risk_free_rate <= -1.0 {
            return Err(AlphaError::InvalidConfig(format!(
                "report.risk_free_rate must be finite and > -1, got {}",
                self.report.risk_free_rate
            )));
        }
        Ok(())
    }
}
