//! Factor computation engine over a panel

use crate::data::{Panel, SectorMap};
use crate::error::{AlphaError, Result};
use crate::pipeline::factor_panel::{CrossSection, FactorPanel};
use crate::pipeline::factors::{build_factor, Factor};
use crate::pipeline::normalize;
use crate::pipeline::transform::{PostProcess, TransformSpec};
use crate::types::TradingDate;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Computes factor panels from an immutable panel
///
/// Each as-of date is an independent task on the rayon pool; tasks only read the
/// panel through a point-in-time view and their cross-sections are merged in
/// date order.
pub struct FactorEngine<'a> {
    panel: &'a Panel,
    sectors: Option<&'a SectorMap>,
}

impl<'a> FactorEngine<'a> {
    /// Create an engine without sector data
    pub fn new(panel: &'a Panel) -> Self {
        Self {
            panel,
            sectors: None,
        }
    }

    /// Supply the sector map used by sector-neutralization
    pub fn with_sectors(mut self, sectors: &'a SectorMap) -> Self {
        self.sectors = Some(sectors);
        self
    }

    /// Compute a factor on every calendar date
    pub fn compute_all(&self, spec: &TransformSpec) -> Result<FactorPanel> {
        self.compute(spec, self.panel.calendar().dates())
    }

    /// Compute a factor on the given as-of dates
    pub fn compute(&self, spec: &TransformSpec, as_of_dates: &[TradingDate]) -> Result<FactorPanel> {
        spec.validate()?;
        if spec.post_process == PostProcess::SectorNeutralize && self.sectors.is_none() {
            return Err(AlphaError::MissingSectorMap(spec.name.clone()));
        }

        let mut dates = as_of_dates.to_vec();
        dates.sort_unstable();
        dates.dedup();
        for date in &dates {
            self.panel.calendar().require_index(*date)?;
        }

        let factor = build_factor(spec.formula, spec.lookback);
        let sections: Vec<(TradingDate, CrossSection)> = dates
            .par_iter()
            .map(|date| self.cross_section(factor.as_ref(), spec.post_process, *date).map(|cs| (*date, cs)))
            .collect::<Result<Vec<_>>>()?;

        let sections: BTreeMap<TradingDate, CrossSection> = sections.into_iter().collect();
        let valid: usize = sections.values().map(CrossSection::len).sum();
        let omitted: usize = sections.values().map(|cs| cs.omitted.len()).sum();
        log::info!(
            "Computed factor '{}' ({}) on {} dates: {} values, {} omitted",
            spec.name,
            factor.name(),
            sections.len(),
            valid,
            omitted
        );

        Ok(FactorPanel::new(spec.clone(), sections))
    }

    fn cross_section(
        &self,
        factor: &dyn Factor,
        post_process: PostProcess,
        date: TradingDate,
    ) -> Result<CrossSection> {
        let view = self.panel.as_of(date)?;
        let mut cs = CrossSection::default();
        for (inst, instrument) in view.instruments().iter().enumerate() {
            match factor.compute(&view, inst) {
                Ok(value) => {
                    cs.values.insert(instrument.id.clone(), value);
                }
                Err(reason) => {
                    cs.omitted.insert(instrument.id.clone(), reason);
                }
            }
        }

        match post_process {
            PostProcess::None => {}
            PostProcess::RankNormalize => normalize::rank_normalize(&mut cs),
            PostProcess::Zscore => normalize::zscore(&mut cs),
            PostProcess::SectorNeutralize => {
                if let Some(sectors) = self.sectors {
                    normalize::sector_neutralize(&mut cs, sectors, date);
                }
            }
        }
        Ok(cs)
    }
}

/// Compute a factor panel; sector-neutralization is unavailable without a sector map
pub fn compute_factor(
    panel: &Panel,
    spec: &TransformSpec,
    as_of_dates: &[TradingDate],
) -> Result<FactorPanel> {
    FactorEngine::new(panel).compute(spec, as_of_dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentId;
    use crate::pipeline::factor_panel::OmissionReason;
    use crate::pipeline::transform::Formula;
    use crate::types::Observation;
    use chrono::NaiveDate;

    fn d(day: u32) -> TradingDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn panel() -> Panel {
        let mut builder = Panel::builder();
        for day in 6..=10 {
            let t = day as f64;
            builder.add_observation(InstrumentId::new("SH", "A"), d(day), Observation::flat(t, 1.0).with_sector("x"));
            builder.add_observation(InstrumentId::new("SH", "B"), d(day), Observation::flat(2.0 * t * t, 1.0).with_sector("x"));
            builder.add_observation(InstrumentId::new("SH", "C"), d(day), Observation::flat(100.0 - t, 1.0).with_sector("y"));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_compute_marks_insufficient_history() {
        let panel = panel();
        let factors = compute_factor(&panel, &TransformSpec::momentum(2), panel.calendar().dates()).unwrap();
        assert_eq!(factors.num_dates(), 5);

        let first = factors.cross_section(d(6)).unwrap();
        assert!(first.is_empty());
        assert_eq!(first.omitted.len(), 3);
        assert_eq!(
            factors.cross_section(d(7)).unwrap().omitted.get(&InstrumentId::new("SH", "A")),
            Some(&OmissionReason::InsufficientHistory { available: 2 })
        );
        assert_eq!(factors.cross_section(d(8)).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_date_is_calendar_mismatch() {
        let panel = panel();
        let err = compute_factor(&panel, &TransformSpec::momentum(2), &[d(11)]).unwrap_err();
        assert!(matches!(err, AlphaError::CalendarMismatch(_)));
    }

    #[test]
    fn test_sector_neutralize_requires_map() {
        let panel = panel();
        let spec = TransformSpec::momentum(2).with_post_process(PostProcess::SectorNeutralize);
        assert!(matches!(
            compute_factor(&panel, &spec, &[d(8)]),
            Err(AlphaError::MissingSectorMap(_))
        ));

        let sectors = SectorMap::from_panel(&panel);
        let factors = FactorEngine::new(&panel).with_sectors(&sectors).compute(&spec, &[d(8)]).unwrap();
        let cs = factors.cross_section(d(8)).unwrap();
        let a = cs.get(&InstrumentId::new("SH", "A")).unwrap();
        let b = cs.get(&InstrumentId::new("SH", "B")).unwrap();
        assert!((a + b).abs() < 1e-12);
        assert_eq!(cs.get(&InstrumentId::new("SH", "C")), Some(0.0));
    }

    #[test]
    fn test_rank_normalized_range() {
        let panel = panel();
        let spec = TransformSpec::new("gap", Formula::MovingAverageGap, 3)
            .with_post_process(PostProcess::RankNormalize);
        let factors = FactorEngine::new(&panel).compute_all(&spec).unwrap();
        let cs = factors.cross_section(d(10)).unwrap();
        let mut values: Vec<f64> = cs.values.values().copied().collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_duplicate_dates_collapse() {
        let panel = panel();
        let factors = compute_factor(&panel, &TransformSpec::momentum(1), &[d(9), d(8), d(9)]).unwrap();
        assert_eq!(factors.dates().collect::<Vec<_>>(), vec![d(8), d(9)]);
    }
}
