//! Time-series factor formulas evaluated on point-in-time windows

use crate::data::PointInTimeView;
use crate::pipeline::factor_panel::OmissionReason;
use crate::pipeline::transform::Formula;
use crate::stats;
use crate::types::Observation;

/// Outcome of evaluating a factor for one instrument on one date
pub type FactorOutcome = std::result::Result<f64, OmissionReason>;

/// Base trait for all window factors
///
/// A factor only sees a `PointInTimeView`, so it cannot read rows after the
/// as-of date.
pub trait Factor: Send + Sync {
    /// Compute the factor for the instrument at position `inst`
    fn compute(&self, view: &PointInTimeView<'_>, inst: usize) -> FactorOutcome;

    /// Get factor name
    fn name(&self) -> &str;

    /// Lookback window in trading days
    fn lookback(&self) -> usize;
}

/// Build the factor implementing `formula`
pub fn build_factor(formula: Formula, lookback: usize) -> Box<dyn Factor> {
    match formula {
        Formula::Momentum => Box::new(Momentum::new(lookback)),
        Formula::Reversal => Box::new(Reversal::new(lookback)),
        Formula::Volatility => Box::new(HistoricalVolatility::new(lookback)),
        Formula::AverageVolume => Box::new(AverageVolume::new(lookback)),
        Formula::MovingAverageGap => Box::new(MovingAverageGap::new(lookback)),
    }
}

/// Valid observations in `[t - lookback, t]`, oldest first
///
/// The instrument must be listed and tradable on `t`, the window must not be
/// truncated by the start of the calendar, and at least `lookback` rows in it
/// must be present and unsuspended.
pub fn valid_window<'a>(
    view: &PointInTimeView<'a>,
    inst: usize,
    lookback: usize,
) -> std::result::Result<Vec<&'a Observation>, OmissionReason> {
    if !view.instruments()[inst].is_valid_on(view.date()) {
        return Err(OmissionReason::OutsideValidity);
    }
    if !view.current(inst).map_or(false, Observation::is_tradable) {
        return Err(OmissionReason::NotTradable);
    }

    let cells = view.window(inst, lookback);
    let valid: Vec<&Observation> = cells
        .iter()
        .filter_map(|c| c.as_ref())
        .filter(|o| o.is_tradable())
        .collect();

    if cells.len() < lookback + 1 || valid.len() < lookback {
        return Err(OmissionReason::InsufficientHistory {
            available: valid.len(),
        });
    }
    Ok(valid)
}

fn finite(value: f64) -> FactorOutcome {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OmissionReason::NonFinite)
    }
}

/// Price momentum: `p_t / p_first - 1`
#[derive(Debug, Clone)]
pub struct Momentum {
    name: String,
    window: usize,
}

impl Momentum {
    pub fn new(window: usize) -> Self {
        Self {
            name: format!("momentum({})", window),
            window,
        }
    }

    fn raw(&self, view: &PointInTimeView<'_>, inst: usize) -> FactorOutcome {
        let obs = valid_window(view, inst, self.window)?;
        match (obs.first(), obs.last()) {
            (Some(first), Some(last)) => finite(last.adj_close / first.adj_close - 1.0),
            _ => Err(OmissionReason::InsufficientHistory { available: 0 }),
        }
    }
}

impl Factor for Momentum {
    fn compute(&self, view: &PointInTimeView<'_>, inst: usize) -> FactorOutcome {
        self.raw(view, inst)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window
    }
}

/// Short-term reversal: negated momentum
#[derive(Debug, Clone)]
pub struct Reversal {
    name: String,
    momentum: Momentum,
}

impl Reversal {
    pub fn new(window: usize) -> Self {
        Self {
            name: format!("reversal({})", window),
            momentum: Momentum::new(window),
        }
    }
}

impl Factor for Reversal {
    fn compute(&self, view: &PointInTimeView<'_>, inst: usize) -> FactorOutcome {
        self.momentum.raw(view, inst).map(|m| -m)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.momentum.window
    }
}

/// Sample standard deviation of daily returns between consecutive valid rows
#[derive(Debug, Clone)]
pub struct HistoricalVolatility {
    name: String,
    window: usize,
}

impl HistoricalVolatility {
    pub fn new(window: usize) -> Self {
        Self {
            name: format!("volatility({})", window),
            window,
        }
    }
}

impl Factor for HistoricalVolatility {
    fn compute(&self, view: &PointInTimeView<'_>, inst: usize) -> FactorOutcome {
        let obs = valid_window(view, inst, self.window)?;
        let returns: Vec<f64> = obs
            .windows(2)
            .map(|pair| pair[1].adj_close / pair[0].adj_close - 1.0)
            .collect();
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(OmissionReason::NonFinite);
        }
        stats::sample_std(&returns).ok_or(OmissionReason::NonFinite)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window
    }
}

/// Mean traded volume
#[derive(Debug, Clone)]
pub struct AverageVolume {
    name: String,
    window: usize,
}

impl AverageVolume {
    pub fn new(window: usize) -> Self {
        Self {
            name: format!("average_volume({})", window),
            window,
        }
    }
}

impl Factor for AverageVolume {
    fn compute(&self, view: &PointInTimeView<'_>, inst: usize) -> FactorOutcome {
        let obs = valid_window(view, inst, self.window)?;
        let volumes: Vec<f64> = obs.iter().map(|o| o.volume).collect();
        stats::mean(&volumes).ok_or(OmissionReason::NonFinite)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window
    }
}

/// Gap between the price and its window mean: `p_t / mean(p) - 1`
#[derive(Debug, Clone)]
pub struct MovingAverageGap {
    name: String,
    window: usize,
}

impl MovingAverageGap {
    pub fn new(window: usize) -> Self {
        Self {
            name: format!("moving_average_gap({})", window),
            window,
        }
    }
}

impl Factor for MovingAverageGap {
    fn compute(&self, view: &PointInTimeView<'_>, inst: usize) -> FactorOutcome {
        let obs = valid_window(view, inst, self.window)?;
        let prices: Vec<f64> = obs.iter().map(|o| o.adj_close).collect();
        let avg = stats::mean(&prices).ok_or(OmissionReason::NonFinite)?;
        let last = prices.last().copied().ok_or(OmissionReason::NonFinite)?;
        finite(last / avg - 1.0)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window
    }
}
