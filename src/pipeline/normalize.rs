//! Cross-sectional normalization of one date's factor values

use crate::data::SectorMap;
use crate::pipeline::factor_panel::{CrossSection, OmissionReason};
use crate::stats;
use crate::types::{SectorId, TradingDate};
use std::collections::BTreeMap;

/// Replace values by average ranks scaled to `[0, 1]`
///
/// A single instrument maps to 0.5.
pub fn rank_normalize(cs: &mut CrossSection) {
    let n = cs.values.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        cs.values.values_mut().for_each(|v| *v = 0.5);
        return;
    }
    let raw: Vec<f64> = cs.values.values().copied().collect();
    let ranks = stats::average_ranks(&raw);
    let denom = (n - 1) as f64;
    for (v, rank) in cs.values.values_mut().zip(ranks) {
        *v = (rank - 1.0) / denom;
    }
}

/// Standardize with the cross-sectional mean and sample standard deviation
///
/// With fewer than two values or no dispersion every instrument is omitted as
/// `DegenerateCrossSection`.
pub fn zscore(cs: &mut CrossSection) {
    let raw: Vec<f64> = cs.values.values().copied().collect();
    let moments = stats::mean(&raw).zip(stats::sample_std(&raw));
    match moments {
        Some((mean, std)) if std > 0.0 => {
            cs.values.values_mut().for_each(|v| *v = (*v - mean) / std);
        }
        _ => {
            let ids: Vec<_> = cs.values.keys().cloned().collect();
            for id in &ids {
                cs.omit(id, OmissionReason::DegenerateCrossSection);
            }
        }
    }
}

/// Subtract the mean of each sector on `date`
///
/// Instruments without a sector on `date` are omitted as `MissingSector`.
pub fn sector_neutralize(cs: &mut CrossSection, sectors: &SectorMap, date: TradingDate) {
    let mut groups: BTreeMap<SectorId, Vec<f64>> = BTreeMap::new();
    let mut missing = Vec::new();
    for (id, v) in &cs.values {
        match sectors.sector_of(id, date) {
            Some(sector) => groups.entry(sector.clone()).or_default().push(*v),
            None => missing.push(id.clone()),
        }
    }
    for id in &missing {
        cs.omit(id, OmissionReason::MissingSector);
    }

    let means: BTreeMap<SectorId, f64> = groups
        .into_iter()
        .filter_map(|(sector, values)| stats::mean(&values).map(|m| (sector, m)))
        .collect();
    for (id, v) in cs.values.iter_mut() {
        if let Some(m) = sectors.sector_of(id, date).and_then(|s| means.get(s)) {
            *v -= m;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentId;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn id(t: &str) -> InstrumentId {
        InstrumentId::new("SH", t)
    }

    fn section(values: &[(&str, f64)]) -> CrossSection {
        let mut cs = CrossSection::default();
        for (t, v) in values {
            cs.values.insert(id(t), *v);
        }
        cs
    }

    #[test]
    fn test_rank_normalize_with_ties() {
        let mut cs = section(&[("A", 3.0), ("B", 1.0), ("C", 3.0), ("D", 2.0)]);
        rank_normalize(&mut cs);
        // ranks 3.5, 1, 3.5, 2 over n = 4
        assert_relative_eq!(cs.get(&id("A")).unwrap(), 2.5 / 3.0);
        assert_relative_eq!(cs.get(&id("B")).unwrap(), 0.0);
        assert_relative_eq!(cs.get(&id("D")).unwrap(), 1.0 / 3.0);

        let mut single = section(&[("A", -7.0)]);
        rank_normalize(&mut single);
        assert_eq!(single.get(&id("A")), Some(0.5));
    }

    #[test]
    fn test_zscore() {
        let mut cs = section(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        zscore(&mut cs);
        assert_relative_eq!(cs.get(&id("A")).unwrap(), -1.0, epsilon = 1e-12);
        assert_relative_eq!(cs.get(&id("B")).unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(cs.get(&id("C")).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zscore_degenerate() {
        let mut cs = section(&[("A", 1.0), ("B", 1.0)]);
        zscore(&mut cs);
        assert!(cs.is_empty());
        assert_eq!(cs.omitted.get(&id("A")), Some(&OmissionReason::DegenerateCrossSection));
    }

    #[test]
    fn test_sector_neutralize() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut sectors = SectorMap::new();
        sectors.insert(id("A"), "bank").insert(id("B"), "bank").insert(id("C"), "tech");

        let mut cs = section(&[("A", 1.0), ("B", 3.0), ("C", 5.0), ("D", 9.0)]);
        sector_neutralize(&mut cs, &sectors, date);

        assert_relative_eq!(cs.get(&id("A")).unwrap(), -1.0);
        assert_relative_eq!(cs.get(&id("B")).unwrap(), 1.0);
        assert_relative_eq!(cs.get(&id("C")).unwrap(), 0.0);
        assert_eq!(cs.omitted.get(&id("D")), Some(&OmissionReason::MissingSector));
    }
}
