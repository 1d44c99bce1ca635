//! Forward returns used to score factors

use crate::data::Panel;
use crate::error::{AlphaError, Result};
use crate::instrument::InstrumentId;
use crate::types::TradingDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Forward returns at one horizon, keyed by as-of date
///
/// `values[t][i] = adj_close[t + h] / adj_close[t] - 1`, present only when both
/// rows exist and are tradable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardReturns {
    horizon: usize,
    values: BTreeMap<TradingDate, BTreeMap<InstrumentId, f64>>,
}

impl ForwardReturns {
    /// Compute forward returns on `dates` at `horizon` trading days
    pub fn compute(panel: &Panel, dates: &[TradingDate], horizon: usize) -> Result<Self> {
        if horizon == 0 {
            return Err(AlphaError::InvalidConfig(
                "forward return horizon must be at least 1".to_string(),
            ));
        }

        let mut values = BTreeMap::new();
        for &date in dates {
            let date_idx = panel.calendar().require_index(date)?;
            let row: BTreeMap<InstrumentId, f64> = panel
                .instruments()
                .iter()
                .enumerate()
                .filter_map(|(inst, instrument)| {
                    panel
                        .forward_return(inst, date_idx, horizon)
                        .map(|r| (instrument.id.clone(), r))
                })
                .collect();
            values.insert(date, row);
        }

        Ok(Self { horizon, values })
    }

    /// Forward returns on every calendar date
    pub fn compute_all(panel: &Panel, horizon: usize) -> Result<Self> {
        Self::compute(panel, panel.calendar().dates(), horizon)
    }

    /// Build from precomputed values
    pub fn from_values(
        horizon: usize,
        values: BTreeMap<TradingDate, BTreeMap<InstrumentId, f64>>,
    ) -> Self {
        Self { horizon, values }
    }

    /// Horizon in trading days
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Returns on an as-of date
    pub fn on(&self, date: TradingDate) -> Option<&BTreeMap<InstrumentId, f64>> {
        self.values.get(&date)
    }

    /// Single forward return
    pub fn get(&self, date: TradingDate, id: &InstrumentId) -> Option<f64> {
        self.values.get(&date).and_then(|row| row.get(id)).copied()
    }
}
