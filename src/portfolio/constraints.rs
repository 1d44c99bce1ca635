//! Weighting schemes and portfolio constraints

use crate::error::{AlphaError, Result};
use crate::types::Weight;
use serde::{Deserialize, Serialize};

/// How selected instruments share the available capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum WeightingScheme {
    /// Equal weight over the `n` highest factor values
    EqualWeightTopN { n: usize },
    /// Weight proportional to rank (best = highest), optionally over the top names only
    RankProportional {
        #[serde(default)]
        top_n: Option<usize>,
    },
}

impl Default for WeightingScheme {
    fn default() -> Self {
        WeightingScheme::EqualWeightTopN { n: 10 }
    }
}

/// Limits applied when constructing weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub scheme: WeightingScheme,
    /// Target sum of weights; the rest stays in cash
    pub gross: Weight,
    /// Per-instrument weight cap
    pub max_weight: Weight,
    /// Per-sector exposure cap
    pub max_sector_weight: Option<Weight>,
    /// Budget for `sum |w - w_prev|` per rebalance
    pub max_turnover: Option<f64>,
    /// Fewer eligible instruments than this skips the rebalance
    pub min_instruments: usize,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            scheme: WeightingScheme::default(),
            gross: 1.0,
            max_weight: 1.0,
            max_sector_weight: None,
            max_turnover: None,
            min_instruments: 10,
        }
    }
}

impl Constraints {
    /// Equal-weight top-`n` with no caps, requiring at least `n` eligible names
    pub fn equal_weight_top(n: usize) -> Self {
        Self {
            scheme: WeightingScheme::EqualWeightTopN { n },
            min_instruments: n,
            ..Default::default()
        }
    }

    pub fn with_max_weight(mut self, max_weight: Weight) -> Self {
        self.max_weight = max_weight;
        self
    }

    pub fn with_sector_cap(mut self, cap: Weight) -> Self {
        self.max_sector_weight = Some(cap);
        self
    }

    pub fn with_turnover_cap(mut self, budget: f64) -> Self {
        self.max_turnover = Some(budget);
        self
    }

    pub fn with_min_instruments(mut self, min_instruments: usize) -> Self {
        self.min_instruments = min_instruments;
        self
    }

    /// Validate constraint values
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(AlphaError::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    name, v
                )))
            }
        };
        unit("gross", self.gross)?;
        unit("max_weight", self.max_weight)?;
        if let Some(cap) = self.max_sector_weight {
            unit("max_sector_weight", cap)?;
        }
        if let Some(budget) = self.max_turnover {
            if !budget.is_finite() || budget < 0.0 {
                return Err(AlphaError::InvalidConfig(format!(
                    "max_turnover must be non-negative, got {}",
                    budget
                )));
            }
        }
        if self.min_instruments == 0 {
            return Err(AlphaError::InvalidConfig("min_instruments must be at least 1".to_string()));
        }
        match self.scheme {
            WeightingScheme::EqualWeightTopN { n: 0 }
            | WeightingScheme::RankProportional { top_n: Some(0) } => Err(AlphaError::InvalidConfig(
                "weighting scheme must select at least one instrument".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Constraints::default().validate().is_ok());
        assert!(Constraints::default().with_max_weight(0.0).validate().is_err());
        assert!(Constraints::default().with_sector_cap(1.5).validate().is_err());
        assert!(Constraints::default().with_turnover_cap(-0.1).validate().is_err());
        assert!(Constraints::equal_weight_top(0).validate().is_err());
    }

    #[test]
    fn test_scheme_from_toml() {
        let constraints: Constraints = toml::from_str(
            r#"
            max_weight = 0.1
            max_turnover = 0.5

            [scheme]
            scheme = "rank_proportional"
            top_n = 50
            "#,
        )
        .unwrap();
        assert_eq!(constraints.scheme, WeightingScheme::RankProportional { top_n: Some(50) });
        assert_eq!(constraints.max_turnover, Some(0.5));
        assert_eq!(constraints.gross, 1.0);
    }
}
