//! Turnover capping by water-level clipping of weight deltas

use crate::instrument::InstrumentId;
use crate::types::{Weight, WEIGHT_EPSILON};
use std::collections::{BTreeMap, BTreeSet};

/// Level `L` such that `sum min(a_i, L) == budget`
///
/// Requires `budget < sum a_i`; magnitudes above `L` are clipped, the largest first.
pub fn water_level(magnitudes: &[f64], budget: f64) -> f64 {
    let mut sorted: Vec<f64> = magnitudes.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let mut below = 0.0;
    for (i, a) in sorted.iter().enumerate() {
        let remaining = (n - i) as f64;
        if below + remaining * a >= budget {
            return ((budget - below) / remaining).max(0.0);
        }
        below += a;
    }
    sorted.last().copied().unwrap_or(0.0)
}

/// Move from `previous` towards `target` spending at most `budget` turnover
///
/// Deltas larger than the water level are clipped to it. If the clipped book sums
/// above `gross`, buy-side deltas are scaled down until it fits.
pub fn clip_turnover(
    previous: &BTreeMap<InstrumentId, Weight>,
    target: &BTreeMap<InstrumentId, Weight>,
    budget: f64,
    gross: Weight,
) -> BTreeMap<InstrumentId, Weight> {
    let keys: BTreeSet<&InstrumentId> = previous.keys().chain(target.keys()).collect();
    let deltas: Vec<(&InstrumentId, f64, f64)> = keys
        .into_iter()
        .map(|id| {
            let p = previous.get(id).copied().unwrap_or(0.0);
            let t = target.get(id).copied().unwrap_or(0.0);
            (id, p, t - p)
        })
        .collect();

    let total: f64 = deltas.iter().map(|(_, _, d)| d.abs()).sum();
    if total <= budget {
        return target.clone();
    }

    let magnitudes: Vec<f64> = deltas.iter().map(|(_, _, d)| d.abs()).collect();
    let level = water_level(&magnitudes, budget);
    let mut clipped: Vec<(&InstrumentId, f64, f64)> = deltas
        .into_iter()
        .map(|(id, p, d)| (id, p, d.signum() * d.abs().min(level)))
        .collect();

    let sum: f64 = clipped.iter().map(|(_, p, d)| p + d).sum();
    if sum > gross {
        let buys: f64 = clipped.iter().filter(|(_, _, d)| *d > 0.0).map(|(_, _, d)| d).sum();
        if buys > 0.0 {
            let scale = ((buys - (sum - gross)) / buys).max(0.0);
            for (_, _, d) in clipped.iter_mut().filter(|(_, _, d)| *d > 0.0) {
                *d *= scale;
            }
        }
    }

    clipped
        .into_iter()
        .map(|(id, p, d)| (id.clone(), (p + d).max(0.0)))
        .filter(|(_, w)| *w > WEIGHT_EPSILON)
        .collect()
}
