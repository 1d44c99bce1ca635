//! Information coefficient per date and its summary statistics

use crate::instrument::InstrumentId;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aligned (factor, return) pairs for instruments having both values
pub fn aligned_pairs(
    factors: &BTreeMap<InstrumentId, f64>,
    returns: &BTreeMap<InstrumentId, f64>,
) -> (Vec<f64>, Vec<f64>) {
    factors
        .iter()
        .filter_map(|(id, f)| returns.get(id).map(|r| (*f, *r)))
        .unzip()
}

/// Spearman rank IC of one cross-section
pub fn rank_ic(factor: &[f64], returns: &[f64]) -> Option<f64> {
    stats::spearman(factor, returns)
}

/// Summary of an IC series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcSummary {
    /// Number of dates entering the statistics
    pub n_dates: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    /// `mean / (std / sqrt(n))`
    pub t_stat: Option<f64>,
    /// Information ratio of the IC: `mean / std`
    pub icir: Option<f64>,
    /// Two-sided p-value of `t_stat` under Student's t with `n - 1` dof
    pub p_value: Option<f64>,
    /// Share of dates with positive IC
    pub hit_rate: Option<f64>,
}

impl IcSummary {
    /// Summarize a series of per-date ICs
    pub fn from_series(series: &[f64]) -> Self {
        let n = series.len();
        let mean = stats::mean(series);
        let std = stats::sample_std(series);
        let t_stat = stats::t_stat(series);
        let icir = match (mean, std) {
            (Some(m), Some(s)) if s > 0.0 => Some(m / s),
            _ => None,
        };
        let p_value = t_stat.and_then(|t| stats::two_sided_p_value(t, n.saturating_sub(1)));
        let hit_rate =
            (n > 0).then(|| series.iter().filter(|ic| **ic > 0.0).count() as f64 / n as f64);

        Self {
            n_dates: n,
            mean,
            std,
            t_stat,
            icir,
            p_value,
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aligned_pairs_intersect() {
        let a = InstrumentId::new("SZ", "A");
        let b = InstrumentId::new("SZ", "B");
        let c = InstrumentId::new("SZ", "C");
        let factors: BTreeMap<_, _> = [(a.clone(), 1.0), (b.clone(), 2.0)].into_iter().collect();
        let returns: BTreeMap<_, _> = [(b, 0.1), (c, 0.2)].into_iter().collect();
        let (f, r) = aligned_pairs(&factors, &returns);
        assert_eq!(f, vec![2.0]);
        assert_eq!(r, vec![0.1]);
    }

    #[test]
    fn test_summary() {
        let summary = IcSummary::from_series(&[0.1, 0.2, 0.3, -0.2]);
        assert_eq!(summary.n_dates, 4);
        assert_relative_eq!(summary.mean.unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(summary.hit_rate.unwrap(), 0.75);
        let std = summary.std.unwrap();
        assert_relative_eq!(summary.icir.unwrap(), 0.1 / std, epsilon = 1e-12);
        assert_relative_eq!(summary.t_stat.unwrap(), 0.1 / (std / 2.0), epsilon = 1e-12);
        let p = summary.p_value.unwrap();
        assert!(p > 0.0 && p < 1.0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = IcSummary::from_series(&[]);
        assert_eq!(summary.n_dates, 0);
        assert_eq!(summary.mean, None);
        assert_eq!(summary.hit_rate, None);
    }
}
