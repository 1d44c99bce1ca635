//! Target portfolio weights on a rebalance date

use crate::instrument::InstrumentId;
use crate::types::{TradingDate, Weight, WEIGHT_EPSILON};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Record of a turnover budget overriding weight or sector caps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relaxation {
    /// Turnover needed to honor every cap
    pub required_turnover: f64,
    /// Turnover budget that was enforced instead
    pub budget: f64,
}

/// Long-only target weights; the residual `1 - gross` is cash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
    pub date: TradingDate,
    weights: BTreeMap<InstrumentId, Weight>,
    /// Holdings kept at their previous weight because they could not trade
    #[serde(default)]
    pub frozen: BTreeSet<InstrumentId>,
    #[serde(default)]
    pub relaxation: Option<Relaxation>,
}

impl PortfolioWeights {
    /// All-cash portfolio
    pub fn empty(date: TradingDate) -> Self {
        Self {
            date,
            weights: BTreeMap::new(),
            frozen: BTreeSet::new(),
            relaxation: None,
        }
    }

    /// Build from raw weights, dropping zero entries
    pub fn from_weights<I>(date: TradingDate, weights: I) -> Self
    where
        I: IntoIterator<Item = (InstrumentId, Weight)>,
    {
        Self {
            date,
            weights: weights
                .into_iter()
                .filter(|(_, w)| w.abs() > WEIGHT_EPSILON)
                .collect(),
            frozen: BTreeSet::new(),
            relaxation: None,
        }
    }

    /// Weight of an instrument (zero when not held)
    pub fn get(&self, id: &InstrumentId) -> Weight {
        self.weights.get(id).copied().unwrap_or(0.0)
    }

    /// Weights by instrument
    pub fn weights(&self) -> &BTreeMap<InstrumentId, Weight> {
        &self.weights
    }

    /// Iterate holdings in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, Weight)> + '_ {
        self.weights.iter().map(|(id, w)| (id, *w))
    }

    /// Number of holdings
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Check if the portfolio is all cash
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Sum of weights
    pub fn gross(&self) -> Weight {
        self.weights.values().sum()
    }

    /// Implicit cash weight
    pub fn cash(&self) -> Weight {
        1.0 - self.gross()
    }

    /// `sum |w - w_prev|` over the union of holdings
    pub fn turnover_from(&self, previous: &PortfolioWeights) -> f64 {
        turnover(previous.weights(), &self.weights)
    }

    /// Flat records for CSV output
    pub fn to_records(&self) -> Vec<WeightRecord> {
        self.weights
            .iter()
            .map(|(id, w)| WeightRecord {
                date: self.date,
                instrument_id: id.clone(),
                weight: *w,
                frozen: self.frozen.contains(id),
            })
            .collect()
    }
}

/// `sum |target - previous|` over the union of both books
pub fn turnover(previous: &BTreeMap<InstrumentId, Weight>, target: &BTreeMap<InstrumentId, Weight>) -> f64 {
    let keys: BTreeSet<&InstrumentId> = previous.keys().chain(target.keys()).collect();
    keys.into_iter()
        .map(|id| {
            let p = previous.get(id).copied().unwrap_or(0.0);
            let t = target.get(id).copied().unwrap_or(0.0);
            (t - p).abs()
        })
        .sum()
}

/// Flat weight record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub date: TradingDate,
    pub instrument_id: InstrumentId,
    pub weight: Weight,
    pub frozen: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_gross_cash_and_turnover() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let a = InstrumentId::new("SH", "A");
        let b = InstrumentId::new("SH", "B");
        let c = InstrumentId::new("SH", "C");
        let prev = PortfolioWeights::from_weights(date, vec![(a.clone(), 0.5), (b.clone(), 0.5)]);
        let next = PortfolioWeights::from_weights(date, vec![(a, 0.4), (c, 0.3), (b, 0.0)]);

        assert_eq!(next.len(), 2);
        assert!((next.gross() - 0.7).abs() < 1e-12);
        assert!((next.cash() - 0.3).abs() < 1e-12);
        // |0.4 - 0.5| + |0 - 0.5| + |0.3 - 0|
        assert!((next.turnover_from(&prev) - 0.9).abs() < 1e-12);
    }
}
