//! Factor evaluation: IC series, quantile spreads, turnover and decay

use crate::calendar::RebalanceSchedule;
use crate::data::Panel;
use crate::error::{AlphaError, Result};
use crate::evaluation::ic::{aligned_pairs, rank_ic, IcSummary};
use crate::evaluation::quantiles::{assign_buckets, bucket_returns, bucket_turnover, spread};
use crate::evaluation::returns::ForwardReturns;
use crate::instrument::InstrumentId;
use crate::pipeline::FactorPanel;
use crate::stats;
use crate::types::TradingDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Evaluation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Forward return horizon in trading days
    pub horizon: usize,
    /// Number of quantile buckets
    pub quantiles: usize,
    /// Minimum instruments with both values for a date to enter aggregates
    pub min_instruments: usize,
    /// Horizons of the IC decay profile
    pub decay_horizons: Vec<usize>,
    /// Dates between which bucket turnover is measured; every evaluation date when unset
    pub rebalance: Option<RebalanceSchedule>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            horizon: 5,
            quantiles: 5,
            min_instruments: 10,
            decay_horizons: vec![1, 5, 10, 20],
            rebalance: None,
        }
    }
}

impl EvaluationConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(AlphaError::InvalidConfig("evaluation horizon must be at least 1".to_string()));
        }
        if self.quantiles < 2 {
            return Err(AlphaError::InvalidConfig(format!(
                "at least 2 quantiles are required, got {}",
                self.quantiles
            )));
        }
        if self.min_instruments < 2 {
            return Err(AlphaError::InvalidConfig(format!(
                "min_instruments must be at least 2, got {}",
                self.min_instruments
            )));
        }
        if self.decay_horizons.iter().any(|h| *h == 0) {
            return Err(AlphaError::InvalidConfig("decay horizons must be at least 1".to_string()));
        }
        if let Some(schedule) = &self.rebalance {
            schedule.validate()?;
        }
        Ok(())
    }
}

/// Whether a date enters aggregate statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStatus {
    Valid,
    /// Fewer than `min_instruments` instruments with both values
    Insufficient,
}

/// Per-date evaluation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateEvaluation {
    pub date: TradingDate,
    pub status: DateStatus,
    /// Instruments having both a factor value and a forward return
    pub n_instruments: usize,
    pub ic: Option<f64>,
    /// Mean forward return per bucket, lowest factor values first
    pub quantile_returns: Vec<Option<f64>>,
    pub spread: Option<f64>,
    /// Bucket turnover against the previous valid rebalance date
    pub turnover: Option<f64>,
}

/// Mean IC at one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayPoint {
    pub horizon: usize,
    pub mean_ic: Option<f64>,
    pub n_dates: usize,
}

/// IC as a function of horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayProfile {
    pub points: Vec<DecayPoint>,
    /// First horizon whose |mean IC| is at most half of the first horizon's
    pub half_life: Option<usize>,
}

impl DecayProfile {
    fn from_points(points: Vec<DecayPoint>) -> Self {
        let half_life = points.first().and_then(|p| p.mean_ic).and_then(|base| {
            points
                .iter()
                .skip(1)
                .find(|p| p.mean_ic.map_or(false, |ic| ic.abs() <= base.abs() / 2.0))
                .map(|p| p.horizon)
        });
        Self { points, half_life }
    }
}

/// Full evaluation of one factor at one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub factor: String,
    pub horizon: usize,
    pub quantiles: usize,
    pub min_instruments: usize,
    pub dates: Vec<DateEvaluation>,
    pub ic: IcSummary,
    pub mean_spread: Option<f64>,
    pub mean_quantile_returns: Vec<Option<f64>>,
    pub mean_turnover: Option<f64>,
    #[serde(default)]
    pub decay: Option<DecayProfile>,
}

impl EvaluationReport {
    /// Dates entering the aggregates
    pub fn valid_dates(&self) -> impl Iterator<Item = &DateEvaluation> + '_ {
        self.dates.iter().filter(|d| d.status == DateStatus::Valid)
    }

    /// Per-date evaluation on `date`
    pub fn date(&self, date: TradingDate) -> Option<&DateEvaluation> {
        self.dates
            .binary_search_by(|d| d.date.cmp(&date))
            .ok()
            .map(|i| &self.dates[i])
    }

    /// Flat per-date records
    pub fn ic_records(&self) -> Vec<IcRecord> {
        self.dates
            .iter()
            .map(|d| IcRecord {
                date: d.date,
                status: d.status,
                n_instruments: d.n_instruments,
                ic: d.ic,
                spread: d.spread,
                turnover: d.turnover,
            })
            .collect()
    }

    /// Flat per-date, per-bucket return records
    pub fn quantile_records(&self) -> Vec<QuantileRecord> {
        self.dates
            .iter()
            .flat_map(|d| {
                d.quantile_returns
                    .iter()
                    .enumerate()
                    .map(move |(q, r)| QuantileRecord {
                        date: d.date,
                        quantile: q + 1,
                        mean_return: *r,
                    })
            })
            .collect()
    }
}

/// Flat per-date evaluation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcRecord {
    pub date: TradingDate,
    pub status: DateStatus,
    pub n_instruments: usize,
    pub ic: Option<f64>,
    pub spread: Option<f64>,
    pub turnover: Option<f64>,
}

/// Flat quantile return record; quantiles are numbered from 1 (lowest)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileRecord {
    pub date: TradingDate,
    pub quantile: usize,
    pub mean_return: Option<f64>,
}

struct DateFragment {
    evaluation: DateEvaluation,
    buckets: BTreeMap<InstrumentId, usize>,
}

fn evaluate_date(
    date: TradingDate,
    values: &BTreeMap<InstrumentId, f64>,
    forward: &ForwardReturns,
    config: &EvaluationConfig,
) -> DateFragment {
    let empty = BTreeMap::new();
    let returns = forward.on(date).unwrap_or(&empty);
    let (f, r) = aligned_pairs(values, returns);
    let n = f.len();
    let status = if n >= config.min_instruments {
        DateStatus::Valid
    } else {
        DateStatus::Insufficient
    };

    // Bucket the same population the IC sees
    let scored: BTreeMap<InstrumentId, f64> = values
        .iter()
        .filter(|(id, _)| returns.contains_key(*id))
        .map(|(id, v)| (id.clone(), *v))
        .collect();
    let buckets = assign_buckets(&scored, config.quantiles);
    let quantile_returns = bucket_returns(&buckets, returns, config.quantiles);

    DateFragment {
        evaluation: DateEvaluation {
            date,
            status,
            n_instruments: n,
            ic: rank_ic(&f, &r),
            spread: spread(&quantile_returns),
            quantile_returns,
            turnover: None,
        },
        buckets,
    }
}

/// Evaluate a factor panel against forward returns
///
/// Dates with fewer than `min_instruments` instruments having both values stay in
/// the per-date series as `Insufficient` but are excluded from aggregates. Bucket
/// turnover is reported on rebalance dates against the previous valid one.
pub fn evaluate(
    factors: &FactorPanel,
    forward: &ForwardReturns,
    config: &EvaluationConfig,
) -> Result<EvaluationReport> {
    config.validate()?;

    let sections: Vec<(TradingDate, &BTreeMap<InstrumentId, f64>)> =
        factors.iter().map(|(date, cs)| (date, &cs.values)).collect();
    let rebalance: Option<BTreeSet<TradingDate>> = match &config.rebalance {
        Some(schedule) => {
            let dates: Vec<TradingDate> = sections.iter().map(|(date, _)| *date).collect();
            Some(schedule.resolve(&dates)?.into_iter().collect())
        }
        None => None,
    };
    let fragments: Vec<DateFragment> = sections
        .par_iter()
        .map(|(date, values)| evaluate_date(*date, values, forward, config))
        .collect();

    let mut dates = Vec::with_capacity(fragments.len());
    let mut previous: Option<BTreeMap<InstrumentId, usize>> = None;
    for fragment in fragments {
        let mut evaluation = fragment.evaluation;
        let on_rebalance = rebalance
            .as_ref()
            .map_or(true, |scheduled| scheduled.contains(&evaluation.date));
        if on_rebalance && evaluation.status == DateStatus::Valid {
            evaluation.turnover = previous
                .as_ref()
                .and_then(|prev| bucket_turnover(prev, &fragment.buckets));
            previous = Some(fragment.buckets);
        }
        if evaluation.status == DateStatus::Insufficient {
            log::debug!(
                "{}: {} instruments with factor and forward return, below {}",
                evaluation.date,
                evaluation.n_instruments,
                config.min_instruments
            );
        }
        dates.push(evaluation);
    }

    let valid: Vec<&DateEvaluation> = dates.iter().filter(|d| d.status == DateStatus::Valid).collect();
    let ic_series: Vec<f64> = valid.iter().filter_map(|d| d.ic).collect();
    let spreads: Vec<f64> = valid.iter().filter_map(|d| d.spread).collect();
    let turnovers: Vec<f64> = valid.iter().filter_map(|d| d.turnover).collect();
    let mean_quantile_returns = (0..config.quantiles)
        .map(|q| {
            let series: Vec<f64> = valid
                .iter()
                .filter_map(|d| d.quantile_returns.get(q).copied().flatten())
                .collect();
            stats::mean(&series)
        })
        .collect();
    let n_valid = valid.len();

    let report = EvaluationReport {
        factor: factors.name().to_string(),
        horizon: forward.horizon(),
        quantiles: config.quantiles,
        min_instruments: config.min_instruments,
        ic: IcSummary::from_series(&ic_series),
        mean_spread: stats::mean(&spreads),
        mean_quantile_returns,
        mean_turnover: stats::mean(&turnovers),
        decay: None,
        dates,
    };

    log::info!(
        "Evaluated '{}' at horizon {}: {} of {} dates valid, mean IC {}",
        report.factor,
        report.horizon,
        n_valid,
        report.dates.len(),
        report
            .ic
            .mean
            .map_or_else(|| "n/a".to_string(), |m| format!("{:.4}", m))
    );

    Ok(report)
}

/// Mean IC at each of the configured decay horizons
pub fn decay(
    panel: &Panel,
    factors: &FactorPanel,
    config: &EvaluationConfig,
) -> Result<DecayProfile> {
    config.validate()?;
    let dates: Vec<TradingDate> = factors.dates().collect();
    let mut points = Vec::with_capacity(config.decay_horizons.len());
    for &horizon in &config.decay_horizons {
        let forward = ForwardReturns::compute(panel, &dates, horizon)?;
        let report = evaluate(factors, &forward, config)?;
        points.push(DecayPoint {
            horizon,
            mean_ic: report.ic.mean,
            n_dates: report.ic.n_dates,
        });
    }
    Ok(DecayProfile::from_points(points))
}

/// Compute forward returns, evaluate and attach the decay profile
pub fn evaluate_factor(
    panel: &Panel,
    factors: &FactorPanel,
    config: &EvaluationConfig,
) -> Result<EvaluationReport> {
    let dates: Vec<TradingDate> = factors.dates().collect();
    let forward = ForwardReturns::compute(panel, &dates, config.horizon)?;
    let mut report = evaluate(factors, &forward, config)?;
    if !config.decay_horizons.is_empty() {
        report.decay = Some(decay(panel, factors, config)?);
    }
    Ok(report)
}
