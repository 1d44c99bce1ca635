//! Declarative factor transform definitions

use crate::error::{AlphaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time-series formula evaluated per instrument over its lookback window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    /// Price change over the window: `p_t / p_first - 1`
    Momentum,
    /// Negated momentum, expecting short-term mean reversion
    Reversal,
    /// Sample standard deviation of daily returns in the window
    Volatility,
    /// Mean traded volume in the window
    AverageVolume,
    /// Distance of the price from its window mean: `p_t / mean(p) - 1`
    MovingAverageGap,
}

impl Formula {
    /// Smallest lookback for which the formula is defined
    pub fn min_lookback(&self) -> usize {
        match self {
            Formula::Volatility => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Formula::Momentum => "momentum",
            Formula::Reversal => "reversal",
            Formula::Volatility => "volatility",
            Formula::AverageVolume => "average_volume",
            Formula::MovingAverageGap => "moving_average_gap",
        };
        write!(f, "{}", name)
    }
}

/// Cross-sectional post-processing applied per date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcess {
    /// Raw formula values
    #[default]
    None,
    /// Average ranks scaled to `[0, 1]`
    RankNormalize,
    /// `(x - mean) / std` with the sample standard deviation
    Zscore,
    /// Subtract the sector mean; requires a sector map
    SectorNeutralize,
}

/// Formula, lookback window and post-processing of a factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Factor name used in outputs
    pub name: String,
    /// Time-series formula
    pub formula: Formula,
    /// Lookback window `w` in trading days; rows in `[t - w, t]` are visible
    pub lookback: usize,
    /// Cross-sectional post-processing
    #[serde(default)]
    pub post_process: PostProcess,
}

impl TransformSpec {
    /// Create a spec without post-processing
    pub fn new(name: impl Into<String>, formula: Formula, lookback: usize) -> Self {
        Self {
            name: name.into(),
            formula,
            lookback,
            post_process: PostProcess::None,
        }
    }

    /// `w`-day momentum named `momentum_{w}`
    pub fn momentum(lookback: usize) -> Self {
        Self::new(format!("momentum_{}", lookback), Formula::Momentum, lookback)
    }

    /// Set post-processing
    pub fn with_post_process(mut self, post_process: PostProcess) -> Self {
        self.post_process = post_process;
        self
    }

    /// Validate name and lookback
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AlphaError::InvalidConfig("factor name must not be empty".to_string()));
        }
        if self.lookback < self.formula.min_lookback() {
            return Err(AlphaError::InvalidConfig(format!(
                "factor '{}': {} requires a lookback of at least {}, got {}",
                self.name,
                self.formula,
                self.formula.min_lookback(),
                self.lookback
            )));
        }
        Ok(())
    }
}
