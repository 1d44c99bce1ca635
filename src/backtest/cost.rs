//! Transaction cost models

use crate::backtest::records::TradeKind;
use crate::error::{AlphaError, Result};
use serde::{Deserialize, Serialize};

/// One basis point
pub const BASIS_POINT: f64 = 1e-4;

/// Cost model trait
pub trait CostModel: Send + Sync {
    /// Cost rate charged on traded notional
    fn rate(&self, kind: TradeKind) -> f64;

    /// Cost of trading `notional` (sign ignored)
    fn cost(&self, notional: f64, kind: TradeKind) -> f64 {
        notional.abs() * self.rate(kind)
    }

    /// Get model name
    fn name(&self) -> &str;
}

/// Proportional commission plus slippage
///
/// Regular trades pay `commission_rate + slippage_rate`; forced liquidations
/// additionally pay `liquidation_slippage_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProportionalCost {
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub liquidation_slippage_rate: f64,
}

impl Default for ProportionalCost {
    fn default() -> Self {
        Self {
            commission_rate: 10.0 * BASIS_POINT,
            slippage_rate: 5.0 * BASIS_POINT,
            liquidation_slippage_rate: 100.0 * BASIS_POINT,
        }
    }
}

impl ProportionalCost {
    /// Create from explicit rates
    pub fn new(commission_rate: f64, slippage_rate: f64) -> Self {
        Self {
            commission_rate,
            slippage_rate,
            ..Default::default()
        }
    }

    /// Frictionless trading
    pub fn zero() -> Self {
        Self {
            commission_rate: 0.0,
            slippage_rate: 0.0,
            liquidation_slippage_rate: 0.0,
        }
    }

    /// Set the extra slippage paid by forced liquidations
    pub fn with_liquidation_slippage(mut self, rate: f64) -> Self {
        self.liquidation_slippage_rate = rate;
        self
    }

    /// Rate paid by regular trades
    pub fn cost_rate(&self) -> f64 {
        self.commission_rate + self.slippage_rate
    }

    /// Validate rates
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("commission_rate", self.commission_rate),
            ("slippage_rate", self.slippage_rate),
            ("liquidation_slippage_rate", self.liquidation_slippage_rate),
        ] {
            if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
                return Err(AlphaError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }
}

impl CostModel for ProportionalCost {
    fn rate(&self, kind: TradeKind) -> f64 {
        match kind {
            TradeKind::ForcedLiquidation => self.cost_rate() + self.liquidation_slippage_rate,
            TradeKind::Rebalance | TradeKind::Delisting => self.cost_rate(),
        }
    }

    fn name(&self) -> &str {
        "Proportional"
    }
}
