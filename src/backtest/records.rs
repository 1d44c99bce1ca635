//! Simulation output records

use crate::instrument::InstrumentId;
use crate::types::{TradingDate, Weight};
use serde::{Deserialize, Serialize};

/// Simulator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatorState {
    /// NAV drifts with instrument returns; no trades
    Holding,
    /// Trading towards target weights
    Rebalancing,
    /// Terminal, after the last simulation day
    Closed,
}

/// Why a trade happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Rebalance,
    /// Exit after an over-long suspension, charged extra slippage
    ForcedLiquidation,
    /// Exit at the last known price after delisting
    Delisting,
}

/// One NAV observation per simulation day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub date: TradingDate,
    pub nav: f64,
    /// `nav_t / nav_{t-1} - 1`, costs included
    pub daily_return: f64,
    pub state: SimulatorState,
    /// Costs debited on this day
    pub cost: f64,
    /// `sum |w_target - w_current|` traded on this day
    pub turnover: f64,
}

/// Executed weight change for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub date: TradingDate,
    pub instrument_id: InstrumentId,
    pub kind: TradeKind,
    pub weight_before: Weight,
    pub weight_after: Weight,
    /// Signed traded value in NAV units
    pub notional: f64,
    pub cost: f64,
}

impl Trade {
    /// `weight_after - weight_before`
    pub fn weight_delta(&self) -> Weight {
        self.weight_after - self.weight_before
    }
}

/// End-of-day holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub date: TradingDate,
    pub instrument_id: InstrumentId,
    pub value: f64,
    pub weight: Weight,
    /// Could not trade on this day
    pub frozen: bool,
}

/// Flagged simulation events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimulationEvent {
    /// Rebalance date without usable targets; previous positions were held
    SkippedRebalance { date: TradingDate, reason: String },
    /// Suspension exceeded the limit; liquidation pending until trading resumes
    SuspensionLimitExceeded {
        date: TradingDate,
        instrument_id: InstrumentId,
        suspended_days: usize,
    },
    /// Liquidation at the first available price after an over-long suspension
    ForcedLiquidation {
        date: TradingDate,
        instrument_id: InstrumentId,
        suspended_days: usize,
        notional: f64,
        slippage_cost: f64,
    },
    /// Holding liquidated at its last known price after delisting
    Delisted {
        date: TradingDate,
        instrument_id: InstrumentId,
        value: f64,
    },
    /// Turnover budget forced caps to be relaxed
    ConstraintRelaxed {
        date: TradingDate,
        required_turnover: f64,
        budget: f64,
    },
}

impl SimulationEvent {
    /// Date of the event
    pub fn date(&self) -> TradingDate {
        match self {
            SimulationEvent::SkippedRebalance { date, .. }
            | SimulationEvent::SuspensionLimitExceeded { date, .. }
            | SimulationEvent::ForcedLiquidation { date, .. }
            | SimulationEvent::Delisted { date, .. }
            | SimulationEvent::ConstraintRelaxed { date, .. } => *date,
        }
    }
}

/// Complete simulation trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_nav: f64,
    pub nav: Vec<NavPoint>,
    pub trades: Vec<Trade>,
    pub positions: Vec<PositionRecord>,
    pub events: Vec<SimulationEvent>,
    /// Dates on which the schedule called for a rebalance
    pub rebalance_dates: Vec<TradingDate>,
    pub final_state: SimulatorState,
}

impl BacktestResult {
    /// `final_nav / initial_nav - 1`
    pub fn total_return(&self) -> f64 {
        self.final_nav()
            .map_or(0.0, |nav| nav / self.initial_nav - 1.0)
    }

    /// Final NAV
    pub fn final_nav(&self) -> Option<f64> {
        self.nav.last().map(|p| p.nav)
    }

    /// Daily returns in date order
    pub fn returns(&self) -> Vec<f64> {
        self.nav.iter().map(|p| p.daily_return).collect()
    }

    /// NAV on `date`
    pub fn nav_on(&self, date: TradingDate) -> Option<f64> {
        self.nav
            .binary_search_by(|p| p.date.cmp(&date))
            .ok()
            .map(|i| self.nav[i].nav)
    }

    /// Total costs debited
    pub fn total_cost(&self) -> f64 {
        self.nav.iter().map(|p| p.cost).sum()
    }

    /// Trades executed on `date`
    pub fn trades_on(&self, date: TradingDate) -> impl Iterator<Item = &Trade> + '_ {
        self.trades.iter().filter(move |t| t.date == date)
    }

    /// Positions held at the end of `date`
    pub fn positions_on(&self, date: TradingDate) -> impl Iterator<Item = &PositionRecord> + '_ {
        self.positions.iter().filter(move |p| p.date == date)
    }
}
