//! Trading calendar shared by every instrument in a panel

use crate::error::{AlphaError, Result};
use crate::types::TradingDate;
use serde::{Deserialize, Serialize};

/// Strictly increasing sequence of trading dates
///
/// Positions in the calendar are the unit of every lookback and horizon in the
/// crate: `t - w` means `w` trading days before `t`, not calendar days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCalendar {
    dates: Vec<TradingDate>,
}

impl TradingCalendar {
    /// Create a calendar, rejecting unsorted or duplicated dates
    pub fn new(dates: Vec<TradingDate>) -> Result<Self> {
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(AlphaError::CalendarMismatch(format!(
                "calendar dates must be strictly increasing, found {} followed by {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { dates })
    }

    /// Build from an arbitrary collection of dates (sorted, deduplicated)
    pub fn from_unsorted<I: IntoIterator<Item = TradingDate>>(dates: I) -> Self {
        let mut dates: Vec<TradingDate> = dates.into_iter().collect();
        dates.sort_unstable();
        dates.dedup();
        Self { dates }
    }

    /// All dates
    pub fn dates(&self) -> &[TradingDate] {
        &self.dates
    }

    /// Number of trading days
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Check if calendar is empty
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Date at position
    pub fn date(&self, index: usize) -> Option<TradingDate> {
        self.dates.get(index).copied()
    }

    /// Position of a date, if it is a trading day
    pub fn index_of(&self, date: TradingDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Position of a date, failing with `CalendarMismatch` if it is not a trading day
    pub fn require_index(&self, date: TradingDate) -> Result<usize> {
        self.index_of(date).ok_or_else(|| {
            AlphaError::CalendarMismatch(format!("{} is not a trading day in the panel calendar", date))
        })
    }

    /// Check if a date is a trading day
    pub fn contains(&self, date: TradingDate) -> bool {
        self.index_of(date).is_some()
    }
}

/// When the simulator rebalances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RebalanceSchedule {
    /// Every `n` simulation days, starting at simulation day `offset`
    EveryNDays { n: usize, offset: usize },
    /// Explicit list of rebalance dates
    Dates { dates: Vec<TradingDate> },
}

impl Default for RebalanceSchedule {
    fn default() -> Self {
        RebalanceSchedule::EveryNDays { n: 5, offset: 0 }
    }
}

impl RebalanceSchedule {
    /// Validate schedule parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            RebalanceSchedule::EveryNDays { n, .. } if *n == 0 => Err(AlphaError::InvalidConfig(
                "rebalance frequency must be at least 1 day".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Resolve against the simulation days, failing if an explicit date is not a trading day
    pub fn resolve(&self, sim_days: &[TradingDate]) -> Result<Vec<TradingDate>> {
        self.validate()?;
        match self {
            RebalanceSchedule::EveryNDays { n, offset } => Ok(sim_days
                .iter()
                .enumerate()
                .filter(|(i, _)| *i >= *offset && (*i - *offset) % *n == 0)
                .map(|(_, d)| *d)
                .collect()),
            RebalanceSchedule::Dates { dates } => {
                let mut resolved = dates.clone();
                resolved.sort_unstable();
                resolved.dedup();
                for date in &resolved {
                    if sim_days.binary_search(date).is_err() {
                        return Err(AlphaError::CalendarMismatch(format!(
                            "rebalance date {} is not a simulation trading day",
                            date
                        )));
                    }
                }
                Ok(resolved)
            }
        }
    }
}
