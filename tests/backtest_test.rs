//! Backtest simulator scenarios with hand-computed NAV paths

mod common;

use approx::assert_relative_eq;
use common::{date, dense_panel, id, synthetic_panel};
use rusty_alpha::backtest::{
    BacktestConfig, BacktestResult, BacktestSimulator, FactorTargets, NavPoint, PrecomputedTargets,
    ProportionalCost, SimulationEvent, SimulatorState, TradeKind,
};
use rusty_alpha::calendar::RebalanceSchedule;
use rusty_alpha::data::{read_csv, write_csv, Panel};
use rusty_alpha::error::AlphaError;
use rusty_alpha::instrument::InstrumentId;
use rusty_alpha::pipeline::{compute_factor, TransformSpec};
use rusty_alpha::portfolio::{Constraints, PortfolioConstructor, PortfolioWeights};
use rusty_alpha::types::Observation;

/// A rallies after day 5, B rises a little, C falls
fn three_instrument_panel() -> Panel {
    let flat = [10.0; 5];
    let tail_a = [12.0, 12.6, 13.2, 12.0, 12.6];
    let tail_b = [11.0; 5];
    let tail_c = [9.0; 5];
    let join = |tail: &[f64]| flat.iter().chain(tail).copied().collect::<Vec<f64>>();
    dense_panel(&[("A", join(&tail_a)), ("B", join(&tail_b)), ("C", join(&tail_c))])
}

fn momentum_top1(panel: &Panel, costs: ProportionalCost) -> BacktestResult {
    let factors = compute_factor(panel, &TransformSpec::momentum(5), panel.calendar().dates()).unwrap();
    let constructor = PortfolioConstructor::new(panel, Constraints::equal_weight_top(1)).unwrap();
    let targets = FactorTargets::new(constructor, &factors);
    let config = BacktestConfig {
        schedule: RebalanceSchedule::EveryNDays { n: 5, offset: 0 },
        costs,
        ..Default::default()
    };
    BacktestSimulator::new(panel, config).unwrap().run(&targets).unwrap()
}

fn weights(day: usize, w: &[(&str, f64)]) -> PortfolioWeights {
    PortfolioWeights::from_weights(date(day), w.iter().map(|(t, w)| (id(t), *w)))
}

fn on_dates(days: &[usize], costs: ProportionalCost) -> BacktestConfig {
    BacktestConfig {
        schedule: RebalanceSchedule::Dates {
            dates: days.iter().map(|d| date(*d)).collect(),
        },
        costs,
        ..Default::default()
    }
}

#[test]
fn test_momentum_top1_nav_matches_hand_computation() {
    let panel = three_instrument_panel();
    let result = momentum_top1(&panel, ProportionalCost::zero());

    let expected = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.05, 1.1, 1.0, 1.05];
    assert_eq!(result.nav.len(), expected.len());
    for (point, nav) in result.nav.iter().zip(expected) {
        assert_relative_eq!(point.nav, nav, epsilon = 1e-9);
    }
    assert_relative_eq!(result.nav[7].daily_return, 1.1 / 1.05 - 1.0, epsilon = 1e-9);
    assert_relative_eq!(result.total_return(), 0.05, epsilon = 1e-9);

    // day 0 has no factor history and is skipped; day 5 buys A
    assert_eq!(result.rebalance_dates, vec![date(0), date(5)]);
    assert!(matches!(
        result.events.as_slice(),
        [SimulationEvent::SkippedRebalance { date: d, .. }] if *d == date(0)
    ));
    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!((trade.date, &trade.instrument_id), (date(5), &id("A")));
    assert_eq!(trade.kind, TradeKind::Rebalance);
    assert_relative_eq!(trade.weight_delta(), 1.0, epsilon = 1e-12);

    assert_eq!(result.nav[5].state, SimulatorState::Rebalancing);
    assert_eq!(result.nav[6].state, SimulatorState::Holding);
    assert_eq!(result.final_state, SimulatorState::Closed);

    let held: Vec<&InstrumentId> = result.positions_on(date(9)).map(|p| &p.instrument_id).collect();
    assert_eq!(held, vec![&id("A")]);
}

#[test]
fn test_cost_equals_turnover_times_rate() {
    let panel = three_instrument_panel();
    let costs = ProportionalCost::new(0.001, 0.0005);
    let result = momentum_top1(&panel, costs.clone());

    assert_relative_eq!(result.nav[5].turnover, 1.0, epsilon = 1e-12);
    assert_relative_eq!(result.nav[5].cost, 0.0015, epsilon = 1e-12);
    assert_relative_eq!(result.nav[5].nav, 0.9985, epsilon = 1e-12);
    assert_relative_eq!(result.final_nav().unwrap(), 0.9985 * 1.05, epsilon = 1e-9);

    // second rebalance: sell A, buy B and C
    let targets = PrecomputedTargets::new([
        weights(5, &[("A", 1.0)]),
        weights(7, &[("B", 0.5), ("C", 0.5)]),
    ]);
    let result = BacktestSimulator::new(&panel, on_dates(&[5, 7], costs.clone()))
        .unwrap()
        .run(&targets)
        .unwrap();

    let nav_pre = 0.9985 * 1.1;
    let day = &result.nav[7];
    assert_relative_eq!(day.turnover, 2.0, epsilon = 1e-12);
    assert_relative_eq!(day.cost, 2.0 * nav_pre * costs.cost_rate(), epsilon = 1e-12);
    let trade_costs: f64 = result.trades_on(date(7)).map(|t| t.cost).sum();
    assert_relative_eq!(trade_costs, day.cost, epsilon = 1e-12);
    assert_relative_eq!(day.nav, nav_pre - day.cost, epsilon = 1e-12);
    assert_relative_eq!(result.total_cost(), 0.0015 + day.cost, epsilon = 1e-12);
}

/// A flat at 10; B suspended on `suspended` days, priced `resume` afterwards
fn suspension_panel(suspended: std::ops::Range<usize>, resume: f64) -> Panel {
    let mut builder = Panel::builder();
    for t in 0..10 {
        builder.add_observation(id("A"), date(t), Observation::flat(10.0, 1_000.0));
        let obs = if suspended.contains(&t) {
            Observation::flat(99.0, 0.0).suspended()
        } else if t < suspended.start {
            Observation::flat(10.0, 1_000.0)
        } else {
            Observation::flat(resume, 1_000.0)
        };
        builder.add_observation(id("B"), date(t), obs);
    }
    builder.build().unwrap()
}

#[test]
fn test_suspended_holding_is_frozen_not_traded() {
    let panel = suspension_panel(3..6, 12.0);
    let targets = PrecomputedTargets::new([
        weights(1, &[("A", 0.5), ("B", 0.5)]),
        weights(4, &[("A", 1.0)]),
    ]);
    let result = BacktestSimulator::new(&panel, on_dates(&[1, 4], ProportionalCost::zero()))
        .unwrap()
        .run(&targets)
        .unwrap();

    // B cannot be sold during its suspension and A is already at its share
    assert_eq!(result.trades_on(date(4)).count(), 0);
    for t in 3..6 {
        let b = result
            .positions_on(date(t))
            .find(|p| p.instrument_id == id("B"))
            .unwrap();
        assert!(b.frozen);
        assert_relative_eq!(b.value, 0.5, epsilon = 1e-12);
        assert_relative_eq!(result.nav[t].nav, 1.0, epsilon = 1e-12);
    }

    // the full 10 -> 12 move lands on the first day back
    assert_relative_eq!(result.nav[6].nav, 1.1, epsilon = 1e-12);
    assert_relative_eq!(result.nav[6].daily_return, 0.1, epsilon = 1e-12);
    assert!(result.events.is_empty());
}

#[test]
fn test_long_suspension_forces_liquidation() {
    let panel = suspension_panel(3..7, 8.0);
    let costs = ProportionalCost::zero().with_liquidation_slippage(0.01);
    let config = BacktestConfig {
        max_suspension_days: 2,
        ..on_dates(&[1], costs)
    };
    let targets = PrecomputedTargets::new([weights(1, &[("A", 0.5), ("B", 0.5)])]);
    let result = BacktestSimulator::new(&panel, config).unwrap().run(&targets).unwrap();

    let flagged: Vec<&SimulationEvent> = result
        .events
        .iter()
        .filter(|e| matches!(e, SimulationEvent::SuspensionLimitExceeded { .. }))
        .collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].date(), date(5));

    let liquidation = result
        .events
        .iter()
        .find_map(|e| match e {
            SimulationEvent::ForcedLiquidation {
                date: d,
                instrument_id,
                suspended_days,
                notional,
                slippage_cost,
            } => Some((*d, instrument_id.clone(), *suspended_days, *notional, *slippage_cost)),
            _ => None,
        })
        .unwrap();
    assert_eq!(liquidation.0, date(7));
    assert_eq!(liquidation.1, id("B"));
    assert_eq!(liquidation.2, 4);
    assert_relative_eq!(liquidation.3, 0.4, epsilon = 1e-12);
    assert_relative_eq!(liquidation.4, 0.004, epsilon = 1e-12);

    let trade = result.trades_on(date(7)).next().unwrap();
    assert_eq!(trade.kind, TradeKind::ForcedLiquidation);
    assert_relative_eq!(result.nav[7].nav, 0.5 + 0.4 - 0.004, epsilon = 1e-12);
    assert_eq!(result.positions_on(date(9)).count(), 1);
}

#[test]
fn test_deterministic_across_runs() {
    let panel = synthetic_panel(30, 60, 5);
    let factors = compute_factor(&panel, &TransformSpec::momentum(10), panel.calendar().dates()).unwrap();
    let constraints = Constraints::equal_weight_top(6)
        .with_max_weight(0.15)
        .with_turnover_cap(0.8);
    let run = || {
        let constructor = PortfolioConstructor::new(&panel, constraints.clone()).unwrap();
        let targets = FactorTargets::new(constructor, &factors);
        BacktestSimulator::new(&panel, BacktestConfig::default())
            .unwrap()
            .run(&targets)
            .unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert!(!first.trades.is_empty());
    assert!(first.total_cost() > 0.0);
}

#[test]
fn test_turnover_budget_holds_on_every_rebalance() {
    let panel = synthetic_panel(20, 30, 4);
    let factors = compute_factor(&panel, &TransformSpec::momentum(5), panel.calendar().dates()).unwrap();
    let constructor =
        PortfolioConstructor::new(&panel, Constraints::equal_weight_top(5).with_turnover_cap(0.3)).unwrap();
    let targets = FactorTargets::new(constructor, &factors);
    let config = BacktestConfig {
        schedule: RebalanceSchedule::EveryNDays { n: 5, offset: 0 },
        ..Default::default()
    };
    let result = BacktestSimulator::new(&panel, config).unwrap().run(&targets).unwrap();

    for point in &result.nav {
        assert!(
            point.turnover <= 0.3 + 1e-9,
            "{}: turnover {} over budget",
            point.date,
            point.turnover
        );
    }
    // the first build from cash is where the budget binds
    assert_relative_eq!(result.nav[5].turnover, 0.3, epsilon = 1e-9);
    let invested: f64 = result.positions_on(date(5)).map(|p| p.weight).sum();
    assert!(invested < 0.31);
}

#[test]
fn test_nav_csv_round_trip() {
    let panel = three_instrument_panel();
    let result = momentum_top1(&panel, ProportionalCost::default());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nav.csv");
    write_csv(&path, &result.nav).unwrap();
    let restored: Vec<NavPoint> = read_csv(&path).unwrap();
    assert_eq!(restored, result.nav);
}

#[test]
fn test_rebalance_date_off_calendar_is_rejected() {
    let panel = three_instrument_panel();
    let targets = PrecomputedTargets::default();
    let err = BacktestSimulator::new(&panel, on_dates(&[42], ProportionalCost::zero()))
        .unwrap()
        .run(&targets)
        .unwrap_err();
    assert!(matches!(err, AlphaError::CalendarMismatch(_)));
}
