//! Daily backtest simulator
//!
//! Walks the simulation days in order. Targets decided with data as of close `t`
//! are filled at close `t`, and holdings earn returns from `t` to `t + 1`. NAV on a
//! day depends only on the previous day's holdings and the returns in between.

use crate::backtest::cost::{CostModel, ProportionalCost};
use crate::backtest::records::{
    BacktestResult, NavPoint, PositionRecord, SimulationEvent, SimulatorState, Trade, TradeKind,
};
use crate::calendar::RebalanceSchedule;
use crate::data::Panel;
use crate::error::{AlphaError, Result};
use crate::instrument::InstrumentId;
use crate::pipeline::FactorPanel;
use crate::portfolio::{PortfolioConstructor, PortfolioWeights};
use crate::types::{Price, TradingDate, Weight, WEIGHT_EPSILON};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Backtest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub schedule: RebalanceSchedule,
    pub costs: ProportionalCost,
    /// Consecutive non-tradable days after which a holding is force-liquidated
    pub max_suspension_days: usize,
    pub initial_nav: f64,
    /// First simulation day (inclusive); defaults to the start of the calendar
    pub start: Option<TradingDate>,
    /// Last simulation day (inclusive); defaults to the end of the calendar
    pub end: Option<TradingDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            schedule: RebalanceSchedule::default(),
            costs: ProportionalCost::default(),
            max_suspension_days: 20,
            initial_nav: 1.0,
            start: None,
            end: None,
        }
    }
}

impl BacktestConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        self.costs.validate()?;
        if !self.initial_nav.is_finite() || self.initial_nav <= 0.0 {
            return Err(AlphaError::InvalidConfig(format!(
                "initial_nav must be positive, got {}",
                self.initial_nav
            )));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(AlphaError::InvalidConfig(format!(
                    "backtest start {} is after end {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Supplies target weights on rebalance dates
pub trait TargetSource {
    /// Targets for `date` given the current drifted weights; `None` holds positions
    fn targets(&self, date: TradingDate, current: &PortfolioWeights) -> Result<Option<PortfolioWeights>>;

    /// Get source name
    fn name(&self) -> &str;
}

/// Targets computed ahead of time, keyed by date
#[derive(Debug, Clone, Default)]
pub struct PrecomputedTargets {
    targets: BTreeMap<TradingDate, PortfolioWeights>,
}

impl PrecomputedTargets {
    pub fn new<I: IntoIterator<Item = PortfolioWeights>>(targets: I) -> Self {
        Self {
            targets: targets.into_iter().map(|w| (w.date, w)).collect(),
        }
    }

    /// Dates with targets
    pub fn dates(&self) -> impl Iterator<Item = TradingDate> + '_ {
        self.targets.keys().copied()
    }
}

impl TargetSource for PrecomputedTargets {
    fn targets(&self, date: TradingDate, _current: &PortfolioWeights) -> Result<Option<PortfolioWeights>> {
        Ok(self.targets.get(&date).cloned())
    }

    fn name(&self) -> &str {
        "precomputed"
    }
}

/// Targets built on each rebalance date from a factor panel
///
/// The constructor sees the drifted holdings, so its turnover budget applies to
/// the real positions.
pub struct FactorTargets<'a> {
    constructor: PortfolioConstructor<'a>,
    factors: &'a FactorPanel,
}

impl<'a> FactorTargets<'a> {
    pub fn new(constructor: PortfolioConstructor<'a>, factors: &'a FactorPanel) -> Self {
        Self {
            constructor,
            factors,
        }
    }
}

impl TargetSource for FactorTargets<'_> {
    fn targets(&self, date: TradingDate, current: &PortfolioWeights) -> Result<Option<PortfolioWeights>> {
        self.constructor
            .construct(self.factors, date, Some(current))
            .map(Some)
    }

    fn name(&self) -> &str {
        self.factors.name()
    }
}

#[derive(Debug, Clone)]
struct Holding {
    value: f64,
    /// Price at which `value` was last marked
    mark: Price,
    /// Consecutive simulation days without a tradable price
    suspended_days: usize,
    /// Length of the most recent suspension that has ended
    last_suspension: usize,
    pending_liquidation: bool,
}

#[derive(Debug, Default)]
struct Book {
    cash: f64,
    holdings: BTreeMap<InstrumentId, Holding>,
}

impl Book {
    fn nav(&self) -> f64 {
        self.cash + self.holdings.values().map(|h| h.value).sum::<f64>()
    }
}

#[derive(Debug, Default)]
struct DayLog {
    cost: f64,
    turnover: f64,
    trades: Vec<Trade>,
    events: Vec<SimulationEvent>,
}

/// Backtest simulator over a panel
pub struct BacktestSimulator<'a> {
    panel: &'a Panel,
    config: BacktestConfig,
    cost_model: Box<dyn CostModel>,
}

impl<'a> BacktestSimulator<'a> {
    /// Create a simulator charging the configured proportional costs
    pub fn new(panel: &'a Panel, config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        let cost_model = Box::new(config.costs.clone());
        Ok(Self {
            panel,
            config,
            cost_model,
        })
    }

    /// Replace the cost model
    pub fn with_cost_model(mut self, cost_model: Box<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// Calendar days covered by the simulation
    pub fn simulation_days(&self) -> Result<Vec<TradingDate>> {
        let calendar = self.panel.calendar();
        let days: Vec<TradingDate> = calendar
            .dates()
            .iter()
            .copied()
            .filter(|d| self.config.start.map_or(true, |s| *d >= s))
            .filter(|d| self.config.end.map_or(true, |e| *d <= e))
            .collect();
        if days.is_empty() {
            return Err(AlphaError::CalendarMismatch(format!(
                "no trading days between {:?} and {:?}",
                self.config.start, self.config.end
            )));
        }
        Ok(days)
    }

    /// Run the simulation
    pub fn run(&self, source: &dyn TargetSource) -> Result<BacktestResult> {
        let days = self.simulation_days()?;
        let rebalance_dates = self.config.schedule.resolve(&days)?;
        let rebalance_set: BTreeSet<TradingDate> = rebalance_dates.iter().copied().collect();

        log::info!(
            "Backtesting '{}' over {} days ({} to {}), {} rebalance dates",
            source.name(),
            days.len(),
            days[0],
            days[days.len() - 1],
            rebalance_dates.len()
        );

        let mut book = Book {
            cash: self.config.initial_nav,
            holdings: BTreeMap::new(),
        };
        let mut nav_points = Vec::with_capacity(days.len());
        let mut trades = Vec::new();
        let mut positions = Vec::new();
        let mut events = Vec::new();
        let mut prev_nav = self.config.initial_nav;

        for (k, &date) in days.iter().enumerate() {
            let date_idx = self.panel.calendar().require_index(date)?;
            let mut day = DayLog::default();

            if k > 0 {
                self.mark_to_market(&mut book, date_idx)?;
            }
            self.liquidate_delisted(&mut book, date, &mut day);
            self.enforce_suspension_limit(&mut book, date, &mut day);

            let state = if rebalance_set.contains(&date) {
                self.rebalance(&mut book, date, date_idx, source, &mut day)?;
                SimulatorState::Rebalancing
            } else {
                SimulatorState::Holding
            };

            let nav = book.nav();
            for (id, h) in &book.holdings {
                positions.push(PositionRecord {
                    date,
                    instrument_id: id.clone(),
                    value: h.value,
                    weight: h.value / nav,
                    frozen: h.suspended_days > 0,
                });
            }
            nav_points.push(NavPoint {
                date,
                nav,
                daily_return: nav / prev_nav - 1.0,
                state,
                cost: day.cost,
                turnover: day.turnover,
            });
            prev_nav = nav;
            trades.extend(day.trades);
            events.extend(day.events);
        }

        let result = BacktestResult {
            initial_nav: self.config.initial_nav,
            nav: nav_points,
            trades,
            positions,
            events,
            rebalance_dates,
            final_state: SimulatorState::Closed,
        };

        log::info!(
            "Backtest finished: final NAV {:.6}, {} trades, total cost {:.6}",
            result.final_nav().unwrap_or(self.config.initial_nav),
            result.trades.len(),
            result.total_cost()
        );

        Ok(result)
    }

    fn tradable_price(&self, id: &InstrumentId, date_idx: usize) -> Option<Price> {
        let inst = self.panel.instrument_index(id)?;
        if !self.panel.is_tradable_at(inst, date_idx) {
            return None;
        }
        self.panel.observation_at(inst, date_idx).map(|o| o.adj_close)
    }

    /// Apply returns over `[t - 1, t]`; non-tradable holdings stay at their last mark
    fn mark_to_market(&self, book: &mut Book, date_idx: usize) -> Result<()> {
        let entries: Vec<(&InstrumentId, &Holding)> = book.holdings.iter().collect();
        let updated: Vec<Holding> = entries
            .par_iter()
            .map(|(id, h)| -> Result<Holding> {
                self.panel
                    .instrument_index(id)
                    .ok_or_else(|| AlphaError::UnknownInstrument(id.to_string()))?;
                let mut next = (*h).clone();
                match self.tradable_price(id, date_idx) {
                    Some(price) => {
                        next.value = h.value * price / h.mark;
                        next.mark = price;
                        next.last_suspension = h.suspended_days;
                        next.suspended_days = 0;
                    }
                    None => next.suspended_days += 1,
                }
                Ok(next)
            })
            .collect::<Result<Vec<_>>>()?;

        for (slot, next) in book.holdings.values_mut().zip(updated) {
            *slot = next;
        }
        Ok(())
    }

    /// Liquidate holdings past their delisting date at the last known price
    fn liquidate_delisted(&self, book: &mut Book, date: TradingDate, day: &mut DayLog) {
        let nav = book.nav();
        let delisted: Vec<InstrumentId> = book
            .holdings
            .keys()
            .filter(|id| {
                self.panel
                    .instrument(id)
                    .map_or(false, |inst| inst.is_delisted_by(date))
            })
            .cloned()
            .collect();

        for id in delisted {
            if let Some(h) = book.holdings.remove(&id) {
                let cost = self.cost_model.cost(h.value, TradeKind::Delisting);
                book.cash += h.value - cost;
                day.cost += cost;
                day.turnover += h.value / nav;
                log::warn!("{}: {} delisted, liquidated at last price ({:.6})", date, id, h.value);
                day.trades.push(Trade {
                    date,
                    instrument_id: id.clone(),
                    kind: TradeKind::Delisting,
                    weight_before: h.value / nav,
                    weight_after: 0.0,
                    notional: -h.value,
                    cost,
                });
                day.events.push(SimulationEvent::Delisted {
                    date,
                    instrument_id: id,
                    value: h.value,
                });
            }
        }
    }

    /// Flag over-long suspensions and liquidate flagged holdings once they trade again
    fn enforce_suspension_limit(&self, book: &mut Book, date: TradingDate, day: &mut DayLog) {
        let nav = book.nav();
        let mut liquidate = Vec::new();
        for (id, h) in book.holdings.iter_mut() {
            if h.pending_liquidation && h.suspended_days == 0 {
                liquidate.push(id.clone());
            } else if !h.pending_liquidation && h.suspended_days > self.config.max_suspension_days {
                h.pending_liquidation = true;
                log::warn!(
                    "{}: {} suspended for {} days, liquidating at the next available price",
                    date,
                    id,
                    h.suspended_days
                );
                day.events.push(SimulationEvent::SuspensionLimitExceeded {
                    date,
                    instrument_id: id.clone(),
                    suspended_days: h.suspended_days,
                });
            }
        }

        for id in liquidate {
            if let Some(h) = book.holdings.remove(&id) {
                let cost = self.cost_model.cost(h.value, TradeKind::ForcedLiquidation);
                let slippage_cost = cost - self.cost_model.cost(h.value, TradeKind::Rebalance);
                book.cash += h.value - cost;
                day.cost += cost;
                day.turnover += h.value / nav;
                day.trades.push(Trade {
                    date,
                    instrument_id: id.clone(),
                    kind: TradeKind::ForcedLiquidation,
                    weight_before: h.value / nav,
                    weight_after: 0.0,
                    notional: -h.value,
                    cost,
                });
                day.events.push(SimulationEvent::ForcedLiquidation {
                    date,
                    instrument_id: id,
                    suspended_days: h.last_suspension,
                    notional: h.value,
                    slippage_cost,
                });
            }
        }
    }

    fn rebalance(
        &self,
        book: &mut Book,
        date: TradingDate,
        date_idx: usize,
        source: &dyn TargetSource,
        day: &mut DayLog,
    ) -> Result<()> {
        let nav_pre = book.nav();
        let current = PortfolioWeights::from_weights(
            date,
            book.holdings
                .iter()
                .map(|(id, h)| (id.clone(), h.value / nav_pre)),
        );

        let target = match source.targets(date, &current) {
            Ok(Some(target)) => target,
            Ok(None) => {
                day.events.push(SimulationEvent::SkippedRebalance {
                    date,
                    reason: format!("no targets from '{}'", source.name()),
                });
                return Ok(());
            }
            Err(e) if !e.is_structural() => {
                log::warn!("{}: rebalance skipped, holding positions: {}", date, e);
                day.events.push(SimulationEvent::SkippedRebalance {
                    date,
                    reason: e.to_string(),
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if let Some(relaxation) = &target.relaxation {
            day.events.push(SimulationEvent::ConstraintRelaxed {
                date,
                required_turnover: relaxation.required_turnover,
                budget: relaxation.budget,
            });
        }

        // Holdings without a price today cannot trade
        let frozen_value: f64 = book
            .holdings
            .values()
            .filter(|h| h.suspended_days > 0)
            .map(|h| h.value)
            .sum();
        let frozen_weight = frozen_value / nav_pre;

        let mut desired: BTreeMap<InstrumentId, (Weight, Price)> = BTreeMap::new();
        for (id, w) in target.iter() {
            if self.panel.instrument_index(id).is_none() {
                return Err(AlphaError::UnknownInstrument(id.to_string()));
            }
            let frozen = book.holdings.get(id).map_or(false, |h| h.suspended_days > 0);
            match self.tradable_price(id, date_idx) {
                Some(price) if !frozen && w > WEIGHT_EPSILON => {
                    desired.insert(id.clone(), (w, price));
                }
                _ => log::debug!("{}: {} not tradable, target {:.4} left in cash", date, id, w),
            }
        }
        let desired_sum: Weight = desired.values().map(|(w, _)| w).sum();
        if desired_sum + frozen_weight > 1.0 + WEIGHT_EPSILON && desired_sum > 0.0 {
            let scale = (1.0 - frozen_weight).max(0.0) / desired_sum;
            desired.values_mut().for_each(|(w, _)| *w *= scale);
        }

        // Costs can leave less room than the targets need next to frozen value;
        // scale the targets before recording anything so trades match holdings
        let mut plan = self.plan_trades(book, &desired, nav_pre, date);
        let nav_post = nav_pre - plan.cost;
        let investable = (nav_post - frozen_value - plan.kept).max(0.0);
        let planned_value: f64 = plan.fills.iter().map(|(_, after, _)| after * nav_post).sum();
        if planned_value > investable && planned_value > 0.0 {
            let fit = investable / planned_value;
            log::debug!("{}: targets scaled by {:.6} to fit investable value", date, fit);
            desired.values_mut().for_each(|(w, _)| *w *= fit);
            plan = self.plan_trades(book, &desired, nav_pre, date);
        }

        let nav_post = nav_pre - plan.cost;
        for (id, after, price) in plan.fills {
            match price {
                Some(mark) if after > WEIGHT_EPSILON => {
                    book.holdings.insert(
                        id,
                        Holding {
                            value: after * nav_post,
                            mark,
                            suspended_days: 0,
                            last_suspension: 0,
                            pending_liquidation: false,
                        },
                    );
                }
                _ => {
                    book.holdings.remove(&id);
                }
            }
        }
        let invested: f64 = book.holdings.values().map(|h| h.value).sum();
        book.cash = nav_post - invested;
        let cost = plan.cost;
        day.cost += cost;
        day.turnover += plan.turnover;
        day.trades.extend(plan.trades);

        log::debug!(
            "{}: rebalanced {} trades, turnover {:.4}, cost {:.6}, NAV {:.6}",
            date,
            day.trades.len(),
            day.turnover,
            cost,
            nav_post
        );
        Ok(())
    }

    /// Trades moving tradable holdings from their current weight to `desired`
    fn plan_trades(
        &self,
        book: &Book,
        desired: &BTreeMap<InstrumentId, (Weight, Price)>,
        nav_pre: f64,
        date: TradingDate,
    ) -> TradePlan {
        let traded: BTreeSet<&InstrumentId> = book
            .holdings
            .iter()
            .filter(|(_, h)| h.suspended_days == 0)
            .map(|(id, _)| id)
            .chain(desired.keys())
            .collect();

        let mut plan = TradePlan::default();
        for id in traded {
            let held = book.holdings.get(id).map_or(0.0, |h| h.value);
            let before = held / nav_pre;
            let (after, price) = desired.get(id).map_or((0.0, None), |(w, p)| (*w, Some(*p)));
            if (after - before).abs() <= WEIGHT_EPSILON {
                plan.kept += held;
                continue;
            }
            let notional = (after - before) * nav_pre;
            let cost = self.cost_model.cost(notional, TradeKind::Rebalance);
            plan.cost += cost;
            plan.turnover += (after - before).abs();
            plan.trades.push(Trade {
                date,
                instrument_id: id.clone(),
                kind: TradeKind::Rebalance,
                weight_before: before,
                weight_after: after,
                notional,
                cost,
            });
            plan.fills.push((id.clone(), after, price));
        }
        plan
    }
}

#[derive(Debug, Default)]
struct TradePlan {
    trades: Vec<Trade>,
    /// Executed weight and fill price per traded instrument
    fills: Vec<(InstrumentId, Weight, Option<Price>)>,
    /// Value of tradable holdings left untouched
    kept: f64,
    cost: f64,
    turnover: f64,
}
