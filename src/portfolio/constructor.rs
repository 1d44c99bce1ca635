//! Maps factor scores on a date to constrained target weights

use crate::data::{Panel, SectorMap};
use crate::error::{AlphaError, Result};
use crate::instrument::InstrumentId;
use crate::pipeline::FactorPanel;
use crate::portfolio::constraints::{Constraints, WeightingScheme};
use crate::portfolio::turnover::clip_turnover;
use crate::portfolio::weights::{turnover, PortfolioWeights, Relaxation};
use crate::types::{SectorId, TradingDate, Weight, WEIGHT_EPSILON};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

const CAP_TOLERANCE: f64 = 1e-9;

/// Portfolio constructor bound to a panel and constraint set
pub struct PortfolioConstructor<'a> {
    panel: &'a Panel,
    sectors: Option<&'a SectorMap>,
    constraints: Constraints,
}

impl<'a> PortfolioConstructor<'a> {
    /// Create a constructor, validating the constraints
    pub fn new(panel: &'a Panel, constraints: Constraints) -> Result<Self> {
        constraints.validate()?;
        Ok(Self {
            panel,
            sectors: None,
            constraints,
        })
    }

    /// Supply sector membership for the sector exposure cap
    pub fn with_sectors(mut self, sectors: &'a SectorMap) -> Self {
        self.sectors = Some(sectors);
        self
    }

    /// Active constraints
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Build target weights for `date`
    ///
    /// `previous` holds the current (drifted) weights; `None` is an all-cash book.
    /// The turnover budget is measured against it either way. Previous holdings
    /// that cannot trade on `date` keep their weight and are reported as frozen.
    pub fn construct(
        &self,
        factors: &FactorPanel,
        date: TradingDate,
        previous: Option<&PortfolioWeights>,
    ) -> Result<PortfolioWeights> {
        let date_idx = self.panel.calendar().require_index(date)?;
        let section = factors.cross_section(date).ok_or_else(|| {
            AlphaError::CalendarMismatch(format!(
                "factor '{}' has no cross-section on {}",
                factors.name(),
                date
            ))
        })?;

        // Holdings that cannot trade today stay where they are
        let mut frozen: BTreeMap<InstrumentId, Weight> = BTreeMap::new();
        if let Some(prev) = previous {
            for (id, w) in prev.iter() {
                let tradable = self
                    .panel
                    .instrument_index(id)
                    .map_or(false, |inst| self.panel.is_tradable_at(inst, date_idx));
                let delisted = self
                    .panel
                    .instrument(id)
                    .map_or(true, |inst| inst.is_delisted_by(date));
                if !tradable && !delisted && w > WEIGHT_EPSILON {
                    frozen.insert(id.clone(), w);
                }
            }
        }

        let mut eligible: Vec<(&InstrumentId, f64)> = section
            .values
            .iter()
            .filter(|(id, v)| {
                v.is_finite()
                    && !frozen.contains_key(*id)
                    && self
                        .panel
                        .instrument_index(id)
                        .map_or(false, |inst| self.panel.is_tradable_at(inst, date_idx))
            })
            .map(|(id, v)| (id, *v))
            .collect();

        if eligible.len() < self.constraints.min_instruments {
            return Err(AlphaError::NoEligibleInstruments {
                date,
                eligible: eligible.len(),
                required: self.constraints.min_instruments,
            });
        }

        // Best score first, ties by identifier
        eligible.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        let frozen_weight: Weight = frozen.values().sum();
        let capacity = (self.constraints.gross - frozen_weight).max(0.0);
        let proposal = propose(&eligible, &self.constraints.scheme, capacity);
        let mut target = cap_instruments(proposal, self.constraints.max_weight, capacity);
        target.extend(frozen.iter().map(|(id, w)| (id.clone(), *w)));

        if let Some(cap) = self.constraints.max_sector_weight {
            self.cap_sectors(&mut target, &frozen, cap, date);
        }

        let cash = BTreeMap::new();
        let held = previous.map_or(&cash, |prev| prev.weights());
        let mut relaxation = None;
        if let Some(budget) = self.constraints.max_turnover {
            let required = turnover(held, &target);
            if required > budget + CAP_TOLERANCE {
                target = clip_turnover(held, &target, budget, self.constraints.gross);
                if self.violates_caps(&target, &frozen, date) {
                    log::warn!(
                        "{}; keeping the turnover budget and relaxing caps",
                        AlphaError::ConstraintInfeasible {
                            date,
                            required,
                            budget
                        }
                    );
                    relaxation = Some(Relaxation {
                        required_turnover: required,
                        budget,
                    });
                }
            }
        }

        let mut weights = PortfolioWeights::from_weights(date, target);
        weights.frozen = frozen.into_keys().collect();
        weights.relaxation = relaxation;

        log::debug!(
            "{}: {} holdings, gross {:.4}, {} frozen",
            date,
            weights.len(),
            weights.gross(),
            weights.frozen.len()
        );
        Ok(weights)
    }

    fn sector_of(&self, id: &InstrumentId, date: TradingDate) -> Option<SectorId> {
        self.sectors
            .and_then(|s| s.sector_of(id, date))
            .cloned()
            .or_else(|| self.panel.observation(id, date).and_then(|o| o.sector_id.clone()))
    }

    /// Scale tradable members of over-cap sectors down pro-rata; the excess becomes cash
    fn cap_sectors(
        &self,
        target: &mut BTreeMap<InstrumentId, Weight>,
        frozen: &BTreeMap<InstrumentId, Weight>,
        cap: Weight,
        date: TradingDate,
    ) {
        for (sector, members) in self.group_by_sector(target, date) {
            let exposure: Weight = members.iter().map(|id| target[id]).sum();
            if exposure <= cap + CAP_TOLERANCE {
                continue;
            }
            let locked: Weight = members.iter().filter_map(|id| frozen.get(id)).sum();
            let free = exposure - locked;
            if free <= 0.0 {
                continue;
            }
            let scale = ((cap - locked).max(0.0) / free).min(1.0);
            for id in members.iter().filter(|id| !frozen.contains_key(*id)) {
                if let Some(w) = target.get_mut(id) {
                    *w *= scale;
                }
            }
            log::debug!(
                "{}: sector '{}' exposure {:.4} capped at {:.4}",
                date,
                sector,
                exposure,
                cap
            );
        }
    }

    fn group_by_sector(
        &self,
        target: &BTreeMap<InstrumentId, Weight>,
        date: TradingDate,
    ) -> BTreeMap<SectorId, Vec<InstrumentId>> {
        let mut groups: BTreeMap<SectorId, Vec<InstrumentId>> = BTreeMap::new();
        for id in target.keys() {
            if let Some(sector) = self.sector_of(id, date) {
                groups.entry(sector).or_default().push(id.clone());
            }
        }
        groups
    }

    fn violates_caps(
        &self,
        target: &BTreeMap<InstrumentId, Weight>,
        frozen: &BTreeMap<InstrumentId, Weight>,
        date: TradingDate,
    ) -> bool {
        let over_instrument = target
            .iter()
            .any(|(id, w)| !frozen.contains_key(id) && *w > self.constraints.max_weight + CAP_TOLERANCE);
        let over_sector = self.constraints.max_sector_weight.map_or(false, |cap| {
            self.group_by_sector(target, date)
                .values()
                .any(|members| members.iter().map(|id| target[id]).sum::<Weight>() > cap + CAP_TOLERANCE)
        });
        over_instrument || over_sector
    }
}

/// Raw weights over the ranked eligible set, summing to `capacity`
fn propose(
    ranked: &[(&InstrumentId, f64)],
    scheme: &WeightingScheme,
    capacity: Weight,
) -> Vec<(InstrumentId, Weight)> {
    match scheme {
        WeightingScheme::EqualWeightTopN { n } => {
            let selected = &ranked[..(*n).min(ranked.len())];
            let w = capacity / selected.len().max(1) as f64;
            selected.iter().map(|(id, _)| ((*id).clone(), w)).collect()
        }
        WeightingScheme::RankProportional { top_n } => {
            let m = top_n.map_or(ranked.len(), |n| n.min(ranked.len()));
            // Best name gets rank m, worst selected gets 1
            let total = (m * (m + 1)) as f64 / 2.0;
            ranked[..m]
                .iter()
                .enumerate()
                .map(|(i, (id, _))| ((*id).clone(), capacity * (m - i) as f64 / total))
                .collect()
        }
    }
}

/// Water-fill per-instrument cap: excess is redistributed pro-rata among uncapped
/// names until none exceeds `max_weight`; what cannot be placed stays in cash.
fn cap_instruments(
    proposal: Vec<(InstrumentId, Weight)>,
    max_weight: Weight,
    capacity: Weight,
) -> BTreeMap<InstrumentId, Weight> {
    let raw: BTreeMap<InstrumentId, Weight> = proposal.into_iter().collect();
    let mut capped: BTreeSet<InstrumentId> = BTreeSet::new();
    let mut weights = raw.clone();

    loop {
        let over: Vec<InstrumentId> = weights
            .iter()
            .filter(|(id, w)| !capped.contains(*id) && **w > max_weight + CAP_TOLERANCE)
            .map(|(id, _)| id.clone())
            .collect();
        if over.is_empty() {
            break;
        }
        capped.extend(over);

        let remaining = (capacity - max_weight * capped.len() as f64).max(0.0);
        let free_raw: Weight = raw
            .iter()
            .filter(|(id, _)| !capped.contains(*id))
            .map(|(_, w)| w)
            .sum();
        for (id, w) in weights.iter_mut() {
            if capped.contains(id) {
                *w = max_weight;
            } else if free_raw > 0.0 {
                *w = raw[id] / free_raw * remaining;
            }
        }
    }
    weights
}
