//! Portfolio constructor integration tests

mod common;

use approx::assert_relative_eq;
use common::{date, id, synthetic_panel};
use proptest::prelude::*;
use rusty_alpha::data::{Panel, SectorMap};
use rusty_alpha::error::AlphaError;
use rusty_alpha::pipeline::{compute_factor, FactorPanel, TransformSpec};
use rusty_alpha::portfolio::{turnover, Constraints, PortfolioConstructor, PortfolioWeights, WeightingScheme};
use rusty_alpha::types::Observation;
use std::collections::BTreeMap;

const TOLERANCE: f64 = 1e-9;

fn momentum(panel: &Panel) -> FactorPanel {
    compute_factor(panel, &TransformSpec::momentum(5), panel.calendar().dates()).unwrap()
}

#[test]
fn test_equal_weight_top_n() {
    let panel = synthetic_panel(20, 30, 4);
    let factors = momentum(&panel);
    let constructor = PortfolioConstructor::new(&panel, Constraints::equal_weight_top(5)).unwrap();
    let weights = constructor.construct(&factors, date(20), None).unwrap();

    assert_eq!(weights.len(), 5);
    assert_relative_eq!(weights.gross(), 1.0, epsilon = 1e-12);
    for (_, w) in weights.iter() {
        assert_relative_eq!(w, 0.2, epsilon = 1e-12);
    }

    // the selected names are the five best scores
    let cs = factors.cross_section(date(20)).unwrap();
    let mut ranked: Vec<(&_, f64)> = cs.values.iter().map(|(id, v)| (id, *v)).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(b.0)));
    for (inst, _) in ranked.iter().take(5) {
        assert!(weights.get(inst) > 0.0);
    }
}

#[test]
fn test_construction_is_idempotent() {
    let panel = synthetic_panel(20, 30, 4);
    let factors = momentum(&panel);
    let constraints = Constraints::equal_weight_top(8)
        .with_max_weight(0.1)
        .with_turnover_cap(1.0);
    let constructor = PortfolioConstructor::new(&panel, constraints).unwrap();

    let first = constructor.construct(&factors, date(15), None).unwrap();
    let again = constructor.construct(&factors, date(15), None).unwrap();
    assert_eq!(first, again);

    // rebuilding from the constructed book trades nothing
    let held = constructor.construct(&factors, date(15), Some(&first)).unwrap();
    assert_eq!(held.weights(), first.weights());
    assert_relative_eq!(held.turnover_from(&first), 0.0, epsilon = 1e-12);
    assert!(held.relaxation.is_none());
}

#[test]
fn test_turnover_budget_limits_build_up_from_cash() {
    let panel = synthetic_panel(20, 30, 4);
    let factors = momentum(&panel);
    let constructor =
        PortfolioConstructor::new(&panel, Constraints::equal_weight_top(5).with_turnover_cap(0.3)).unwrap();

    // 0.2 per name wanted, 0.06 per name affordable
    let first = constructor.construct(&factors, date(20), None).unwrap();
    assert_eq!(first.len(), 5);
    assert_relative_eq!(first.gross(), 0.3, epsilon = 1e-9);
    assert!(first.iter().all(|(_, w)| (w - 0.06).abs() < TOLERANCE));

    // an explicit empty book is the same as no book
    let empty = PortfolioWeights::empty(date(20));
    assert_eq!(constructor.construct(&factors, date(20), Some(&empty)).unwrap(), first);

    // successive rebalances close the gap one budget at a time
    let mut book = first;
    for expected in [0.6, 0.9, 1.0] {
        let next = constructor.construct(&factors, date(20), Some(&book)).unwrap();
        assert!(next.turnover_from(&book) <= 0.3 + TOLERANCE);
        assert_relative_eq!(next.gross(), expected, epsilon = 1e-9);
        book = next;
    }
}

#[test]
fn test_instrument_cap_leaves_excess_in_cash() {
    let panel = synthetic_panel(20, 30, 4);
    let factors = momentum(&panel);
    let constructor =
        PortfolioConstructor::new(&panel, Constraints::equal_weight_top(10).with_max_weight(0.08)).unwrap();
    let weights = constructor.construct(&factors, date(20), None).unwrap();

    assert!(weights.iter().all(|(_, w)| w <= 0.08 + TOLERANCE));
    assert_relative_eq!(weights.gross(), 0.8, epsilon = 1e-9);
    assert_relative_eq!(weights.cash(), 0.2, epsilon = 1e-9);
}

#[test]
fn test_rank_proportional_with_cap_redistributes() {
    let panel = synthetic_panel(12, 30, 3);
    let factors = momentum(&panel);
    let constraints = Constraints {
        scheme: WeightingScheme::RankProportional { top_n: Some(6) },
        max_weight: 0.2,
        min_instruments: 6,
        ..Default::default()
    };
    let constructor = PortfolioConstructor::new(&panel, constraints).unwrap();
    let weights = constructor.construct(&factors, date(20), None).unwrap();

    // 6/21 for the best name exceeds the cap; the excess goes to the others
    assert_eq!(weights.len(), 6);
    assert_relative_eq!(weights.gross(), 1.0, epsilon = 1e-9);
    assert!(weights.iter().all(|(_, w)| w <= 0.2 + TOLERANCE));
}

#[test]
fn test_sector_cap() {
    let panel = synthetic_panel(12, 30, 3);
    let factors = momentum(&panel);
    let sectors = SectorMap::from_panel(&panel);
    let constructor = PortfolioConstructor::new(&panel, Constraints::equal_weight_top(10).with_sector_cap(0.3))
        .unwrap()
        .with_sectors(&sectors);
    let weights = constructor.construct(&factors, date(20), None).unwrap();

    let mut exposure: BTreeMap<String, f64> = BTreeMap::new();
    for (inst, w) in weights.iter() {
        let sector = sectors.sector_of(inst, date(20)).unwrap().clone();
        *exposure.entry(sector).or_default() += w;
    }
    assert!(exposure.values().all(|e| *e <= 0.3 + TOLERANCE));
    assert!(weights.gross() <= 0.9 + TOLERANCE);
}

#[test]
fn test_too_few_eligible_instruments() {
    let panel = synthetic_panel(8, 30, 2);
    let factors = momentum(&panel);
    let constructor = PortfolioConstructor::new(&panel, Constraints::equal_weight_top(10)).unwrap();

    let err = constructor.construct(&factors, date(20), None).unwrap_err();
    assert!(matches!(
        err,
        AlphaError::NoEligibleInstruments { eligible: 8, required: 10, .. }
    ));
    assert!(!err.is_structural());

    // warm-up dates have no factor values at all
    let err = constructor.construct(&factors, date(2), None).unwrap_err();
    assert!(matches!(err, AlphaError::NoEligibleInstruments { eligible: 0, .. }));
}

#[test]
fn test_suspended_holding_is_frozen() {
    let mut builder = Panel::builder();
    for i in 0..6 {
        for t in 0..12 {
            let price = 10.0 + (i * t) as f64 * 0.1;
            let obs = Observation::flat(price, 1_000.0);
            let obs = if i == 0 && t == 10 { obs.suspended() } else { obs };
            builder.add_observation(id(&format!("{:06}", i)), date(t), obs);
        }
    }
    let panel = builder.build().unwrap();
    let factors = momentum(&panel);
    let constructor = PortfolioConstructor::new(&panel, Constraints::equal_weight_top(2)).unwrap();

    let suspended = id("000000");
    let previous = PortfolioWeights::from_weights(date(9), [(suspended.clone(), 0.2)]);
    let weights = constructor.construct(&factors, date(10), Some(&previous)).unwrap();

    assert!(weights.frozen.contains(&suspended));
    assert_relative_eq!(weights.get(&suspended), 0.2, epsilon = 1e-12);
    assert_relative_eq!(weights.gross(), 1.0, epsilon = 1e-12);
    // best momentum names share the remaining capacity
    assert_relative_eq!(weights.get(&id("000005")), 0.4, epsilon = 1e-12);
    assert_relative_eq!(weights.get(&id("000004")), 0.4, epsilon = 1e-12);
}

#[test]
fn test_unknown_date_is_structural() {
    let panel = synthetic_panel(12, 30, 3);
    let factors = momentum(&panel);
    let constructor = PortfolioConstructor::new(&panel, Constraints::equal_weight_top(5)).unwrap();
    let err = constructor.construct(&factors, date(99), None).unwrap_err();
    assert!(err.is_structural());
}

fn previous_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..0.1, 10)
}

proptest! {
    #[test]
    fn prop_turnover_never_exceeds_budget(
        prev in previous_strategy(),
        budget in 0.01f64..1.5,
        t in 6usize..30,
        max_weight in 0.06f64..1.0,
    ) {
        let panel = synthetic_panel(16, 30, 4);
        let factors = momentum(&panel);
        let constraints = Constraints::equal_weight_top(8)
            .with_max_weight(max_weight)
            .with_turnover_cap(budget);
        let constructor = PortfolioConstructor::new(&panel, constraints).unwrap();

        let previous = PortfolioWeights::from_weights(
            date(t),
            prev.iter().enumerate().map(|(i, w)| (id(&format!("{:06}", i)), *w)),
        );
        let weights = constructor.construct(&factors, date(t), Some(&previous)).unwrap();

        prop_assert!(turnover(previous.weights(), weights.weights()) <= budget + TOLERANCE);
        prop_assert!(weights.gross() <= 1.0 + TOLERANCE);
        prop_assert!(weights.iter().all(|(_, w)| w >= 0.0));
    }
}
