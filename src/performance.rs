//! Performance analytics over a simulated NAV series

use crate::backtest::{BacktestResult, SimulatorState};
use crate::data::Panel;
use crate::error::{AlphaError, Result};
use crate::stats;
use crate::types::{TradingDate, TRADING_DAYS_PER_YEAR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily benchmark return series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub name: String,
    returns: BTreeMap<TradingDate, f64>,
}

impl Benchmark {
    /// Create from explicit daily returns
    pub fn new<I>(name: impl Into<String>, returns: I) -> Self
    where
        I: IntoIterator<Item = (TradingDate, f64)>,
    {
        Self {
            name: name.into(),
            returns: returns.into_iter().collect(),
        }
    }

    /// Equal-weight average of one-day returns across the tradable universe
    ///
    /// A date has a return only if at least one instrument traded on both it
    /// and the previous calendar date; the first calendar date never does.
    pub fn equal_weight(panel: &Panel, dates: &[TradingDate]) -> Result<Self> {
        let calendar = panel.calendar();
        let mut returns = BTreeMap::new();

        for &date in dates {
            let t = calendar.require_index(date)?;
            if t == 0 {
                continue;
            }
            let daily: Vec<f64> = (0..panel.num_instruments())
                .filter_map(|inst| panel.forward_return(inst, t - 1, 1))
                .collect();
            if let Some(avg) = stats::mean(&daily) {
                returns.insert(date, avg);
            }
        }

        log::debug!(
            "Equal-weight benchmark: {} of {} dates defined",
            returns.len(),
            dates.len()
        );
        Ok(Self::new("equal_weight", returns))
    }

    /// Return on `date`
    pub fn get(&self, date: TradingDate) -> Option<f64> {
        self.returns.get(&date).copied()
    }

    /// Iterate (date, return) in date order
    pub fn iter(&self) -> impl Iterator<Item = (TradingDate, f64)> + '_ {
        self.returns.iter().map(|(d, r)| (*d, *r))
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Compounded return over all dates
    pub fn total_return(&self) -> f64 {
        self.returns.values().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
    }
}

/// Deepest peak-to-trough decline of a NAV series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    /// Fractional decline from the peak, non-negative
    pub depth: f64,
    /// Trading days from peak to trough
    pub duration: usize,
    /// `None` when the peak is the initial NAV
    pub peak: Option<TradingDate>,
    pub trough: Option<TradingDate>,
}

impl Drawdown {
    /// Scan `(date, nav)` starting from `initial_nav`
    pub fn from_nav(initial_nav: f64, nav: &[(TradingDate, f64)]) -> Self {
        let mut best = Self {
            depth: 0.0,
            duration: 0,
            peak: None,
            trough: None,
        };
        // position 0 is the initial NAV
        let mut peak_value = initial_nav;
        let mut peak_pos = 0usize;
        let mut peak_date = None;

        for (i, &(date, value)) in nav.iter().enumerate() {
            let pos = i + 1;
            if value > peak_value {
                peak_value = value;
                peak_pos = pos;
                peak_date = Some(date);
                continue;
            }
            if peak_value <= 0.0 {
                continue;
            }
            let depth = (peak_value - value) / peak_value;
            if depth > best.depth {
                best = Self {
                    depth,
                    duration: pos - peak_pos,
                    peak: peak_date,
                    trough: Some(date),
                };
            }
        }
        best
    }
}

/// Performance summary statistics
///
/// Ratios are `None` when undefined (too few periods, zero dispersion, no
/// benchmark) rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub start: Option<TradingDate>,
    pub end: Option<TradingDate>,
    pub num_periods: usize,
    pub initial_nav: f64,
    pub final_nav: f64,
    pub total_return: f64,
    pub annualized_return: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub calmar_ratio: Option<f64>,
    pub total_cost: f64,
    pub num_rebalances: usize,
    pub average_turnover: Option<f64>,
    pub risk_free_rate: f64,
    pub benchmark: Option<String>,
    pub benchmark_return: Option<f64>,
    /// Annualized OLS intercept against the benchmark
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
}

/// Builds a [`PerformanceSummary`] from a backtest
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceReporter {
    risk_free_rate: f64,
}

impl PerformanceReporter {
    /// Create with an annual risk-free rate
    pub fn new(risk_free_rate: f64) -> Result<Self> {
        if !risk_free_rate.is_finite() || risk_free_rate <= -1.0 {
            return Err(AlphaError::InvalidConfig(format!(
                "risk_free_rate must be finite and > -1, got {}",
                risk_free_rate
            )));
        }
        Ok(Self { risk_free_rate })
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    /// Summarize `result`, attributing against `benchmark` when given
    pub fn summarize(
        &self,
        result: &BacktestResult,
        benchmark: Option<&Benchmark>,
    ) -> PerformanceSummary {
        let returns = result.returns();
        let n = returns.len();
        let total_return = result.total_return();
        let daily_rf = self.risk_free_rate / TRADING_DAYS_PER_YEAR;
        let annualizer = TRADING_DAYS_PER_YEAR.sqrt();

        let annualized_return = (n > 0 && total_return > -1.0)
            .then(|| (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0);

        let std = stats::sample_std(&returns).filter(|s| *s > 0.0);
        let mean = stats::mean(&returns);
        let volatility = std.map(|s| s * annualizer);
        let sharpe_ratio = mean
            .zip(std)
            .map(|(m, s)| (m - daily_rf) / s * annualizer);
        let sortino_ratio = mean.and_then(|m| {
            let downside = downside_deviation(&returns, daily_rf)?;
            Some((m - daily_rf) / downside * annualizer)
        });

        let nav: Vec<(TradingDate, f64)> = result.nav.iter().map(|p| (p.date, p.nav)).collect();
        let drawdown = Drawdown::from_nav(result.initial_nav, &nav);
        let calmar_ratio = annualized_return
            .filter(|_| drawdown.depth > 0.0)
            .map(|r| r / drawdown.depth);

        let rebalance_turnover: Vec<f64> = result
            .nav
            .iter()
            .filter(|p| p.state == SimulatorState::Rebalancing)
            .map(|p| p.turnover)
            .collect();

        let (benchmark_return, alpha, beta) = match benchmark {
            Some(bench) => {
                let (x, y): (Vec<f64>, Vec<f64>) = result
                    .nav
                    .iter()
                    .filter_map(|p| bench.get(p.date).map(|b| (b, p.daily_return)))
                    .unzip();
                let fit = stats::ols(&x, &y);
                (
                    Some(bench.total_return()),
                    fit.map(|(a, _)| a * TRADING_DAYS_PER_YEAR),
                    fit.map(|(_, b)| b),
                )
            }
            None => (None, None, None),
        };

        PerformanceSummary {
            start: result.nav.first().map(|p| p.date),
            end: result.nav.last().map(|p| p.date),
            num_periods: n,
            initial_nav: result.initial_nav,
            final_nav: result.final_nav().unwrap_or(result.initial_nav),
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown: drawdown.depth,
            max_drawdown_duration: drawdown.duration,
            calmar_ratio,
            total_cost: result.total_cost(),
            num_rebalances: rebalance_turnover.len(),
            average_turnover: stats::mean(&rebalance_turnover),
            risk_free_rate: self.risk_free_rate,
            benchmark: benchmark.map(|b| b.name.clone()),
            benchmark_return,
            alpha,
            beta,
        }
    }
}

/// Root mean square of returns below `target`
fn downside_deviation(returns: &[f64], target: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let sum_sq: f64 = returns
        .iter()
        .map(|r| (r - target).min(0.0).powi(2))
        .sum();
    let dd = (sum_sq / returns.len() as f64).sqrt();
    (dd > 0.0).then_some(dd)
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

impl std::fmt::Display for PerformanceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Performance Summary:")?;
        if let (Some(start), Some(end)) = (self.start, self.end) {
            writeln!(f, "  Period:             {} to {}", start, end)?;
        }
        writeln!(f, "  Total Return:       {:.2}%", self.total_return * 100.0)?;
        writeln!(f, "  Annualized Return:  {}", pct(self.annualized_return))?;
        writeln!(f, "  Volatility:         {}", pct(self.volatility))?;
        writeln!(f, "  Sharpe Ratio:       {}", ratio(self.sharpe_ratio))?;
        writeln!(f, "  Sortino Ratio:      {}", ratio(self.sortino_ratio))?;
        writeln!(
            f,
            "  Max Drawdown:       {:.2}% ({} days)",
            self.max_drawdown * 100.0,
            self.max_drawdown_duration
        )?;
        writeln!(f, "  Calmar Ratio:       {}", ratio(self.calmar_ratio))?;
        writeln!(f, "  Total Costs:        {:.6}", self.total_cost)?;
        writeln!(
            f,
            "  Avg Turnover:       {} over {} rebalances",
            ratio(self.average_turnover),
            self.num_rebalances
        )?;
        if let Some(name) = &self.benchmark {
            writeln!(f, "  Benchmark:          {} ({})", name, pct(self.benchmark_return))?;
            writeln!(f, "  Alpha:              {}", pct(self.alpha))?;
            writeln!(f, "  Beta:               {}", ratio(self.beta))?;
        }
        writeln!(f, "  Periods:            {}", self.num_periods)?;
        Ok(())
    }
}
