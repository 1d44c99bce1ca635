//! Equal-count quantile buckets, spread returns and bucket turnover

use crate::instrument::InstrumentId;
use crate::stats;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Assign each instrument to one of `k` equal-count buckets
///
/// Instruments are ordered by ascending value, ties broken by identifier;
/// position `i` of `n` goes to bucket `floor(i * k / n)`. Bucket `k - 1` holds
/// the highest values.
pub fn assign_buckets(values: &BTreeMap<InstrumentId, f64>, k: usize) -> BTreeMap<InstrumentId, usize> {
    let n = values.len();
    if n == 0 || k == 0 {
        return BTreeMap::new();
    }
    let mut ordered: Vec<(&InstrumentId, f64)> = values.iter().map(|(id, v)| (id, *v)).collect();
    ordered.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (id, _))| (id.clone(), i * k / n))
        .collect()
}

/// Mean forward return of each bucket; `None` for buckets without returns
pub fn bucket_returns(
    buckets: &BTreeMap<InstrumentId, usize>,
    returns: &BTreeMap<InstrumentId, f64>,
    k: usize,
) -> Vec<Option<f64>> {
    let mut members: Vec<Vec<f64>> = vec![Vec::new(); k];
    for (id, bucket) in buckets {
        if let (Some(r), Some(slot)) = (returns.get(id), members.get_mut(*bucket)) {
            slot.push(*r);
        }
    }
    members.iter().map(|m| stats::mean(m)).collect()
}

/// Top bucket mean return minus bottom bucket mean return
pub fn spread(bucket_means: &[Option<f64>]) -> Option<f64> {
    match (bucket_means.first(), bucket_means.last()) {
        (Some(Some(bottom)), Some(Some(top))) if bucket_means.len() > 1 => Some(top - bottom),
        _ => None,
    }
}

/// Share of instruments present on both dates whose bucket changed
pub fn bucket_turnover(
    previous: &BTreeMap<InstrumentId, usize>,
    current: &BTreeMap<InstrumentId, usize>,
) -> Option<f64> {
    let (mut common, mut changed) = (0usize, 0usize);
    for (id, bucket) in current {
        if let Some(prev) = previous.get(id) {
            common += 1;
            if prev != bucket {
                changed += 1;
            }
        }
    }
    (common > 0).then(|| changed as f64 / common as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(t: &str) -> InstrumentId {
        InstrumentId::new("SZ", t)
    }

    fn values(pairs: &[(&str, f64)]) -> BTreeMap<InstrumentId, f64> {
        pairs.iter().map(|(t, v)| (id(t), *v)).collect()
    }

    #[test]
    fn test_bucket_formula() {
        let v = values(&[("A", 5.0), ("B", 1.0), ("C", 3.0), ("D", 2.0), ("E", 4.0)]);
        let buckets = assign_buckets(&v, 2);
        // ascending B D C E A -> positions 0..5 -> floor(i * 2 / 5) = 0 0 0 1 1
        assert_eq!(buckets[&id("B")], 0);
        assert_eq!(buckets[&id("D")], 0);
        assert_eq!(buckets[&id("C")], 0);
        assert_eq!(buckets[&id("E")], 1);
        assert_eq!(buckets[&id("A")], 1);
    }

    #[test]
    fn test_ties_broken_by_identifier() {
        let v = values(&[("B", 1.0), ("A", 1.0)]);
        let buckets = assign_buckets(&v, 2);
        assert_eq!(buckets[&id("A")], 0);
        assert_eq!(buckets[&id("B")], 1);
    }

    #[test]
    fn test_spread_and_turnover() {
        let v = values(&[("A", 1.0), ("B", 2.0), ("C", 3.0), ("D", 4.0)]);
        let buckets = assign_buckets(&v, 2);
        let r = values(&[("A", -0.01), ("B", 0.01), ("C", 0.02), ("D", 0.04)]);
        let means = bucket_returns(&buckets, &r, 2);
        assert!((spread(&means).unwrap() - 0.03).abs() < 1e-12);

        let shifted = assign_buckets(&values(&[("A", 4.0), ("B", 2.0), ("C", 3.0), ("E", 0.0)]), 2);
        // common A B C: A 0 -> 1, B 0 -> 0, C 1 -> 1
        assert!((bucket_turnover(&buckets, &shifted).unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }
}
