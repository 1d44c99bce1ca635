//! End-to-end research run
//!
//! Factor computation, evaluation, backtest and performance attribution wired
//! together from one [`ResearchConfig`].

use crate::backtest::{BacktestResult, BacktestSimulator, FactorTargets};
use crate::calendar::RebalanceSchedule;
use crate::config::ResearchConfig;
use crate::data::{write_csv, write_json, Panel, SectorMap};
use crate::error::Result;
use crate::evaluation::{evaluate_factor, EvaluationReport};
use crate::performance::{Benchmark, PerformanceReporter, PerformanceSummary};
use crate::pipeline::{FactorEngine, FactorPanel};
use crate::portfolio::PortfolioConstructor;
use crate::types::TradingDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Every artifact of a research run
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutput {
    pub factors: FactorPanel,
    pub evaluation: EvaluationReport,
    pub backtest: BacktestResult,
    pub benchmark: Option<Benchmark>,
    pub performance: PerformanceSummary,
}

impl ResearchOutput {
    /// Write flat CSV records and JSON summaries into `dir`
    pub fn write_artifacts<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        write_csv(dir.join("factors.csv"), &self.factors.to_records())?;
        write_csv(dir.join("ic.csv"), &self.evaluation.ic_records())?;
        write_csv(dir.join("quantiles.csv"), &self.evaluation.quantile_records())?;
        write_json(dir.join("evaluation.json"), &self.evaluation)?;

        write_csv(dir.join("nav.csv"), &self.backtest.nav)?;
        write_csv(dir.join("trades.csv"), &self.backtest.trades)?;
        write_csv(dir.join("positions.csv"), &self.backtest.positions)?;
        write_json(dir.join("events.json"), &self.backtest.events)?;
        write_json(dir.join("performance.json"), &self.performance)?;

        log::info!("Wrote research artifacts to {}", dir.display());
        Ok(())
    }
}

/// Runs the stages of a research configuration over a panel
#[derive(Debug, Clone)]
pub struct ResearchPipeline {
    config: ResearchConfig,
}

impl ResearchPipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: ResearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Compute the factor over the whole calendar
    pub fn compute_factors(&self, panel: &Panel, sectors: Option<&SectorMap>) -> Result<FactorPanel> {
        let mut engine = FactorEngine::new(panel);
        if let Some(sectors) = sectors {
            engine = engine.with_sectors(sectors);
        }
        engine.compute_all(&self.config.factor)
    }

    /// Evaluate a factor panel, decay profile included
    ///
    /// Bucket turnover follows the backtest's rebalance dates unless the
    /// evaluation section sets its own schedule.
    pub fn evaluate(&self, panel: &Panel, factors: &FactorPanel) -> Result<EvaluationReport> {
        let mut config = self.config.evaluation.clone();
        if config.rebalance.is_none() {
            config.rebalance = Some(RebalanceSchedule::Dates {
                dates: self.rebalance_dates(panel)?,
            });
        }
        evaluate_factor(panel, factors, &config)
    }

    /// Rebalance dates of the configured backtest
    pub fn rebalance_dates(&self, panel: &Panel) -> Result<Vec<TradingDate>> {
        let days = BacktestSimulator::new(panel, self.config.backtest.clone())?.simulation_days()?;
        self.config.backtest.schedule.resolve(&days)
    }

    /// Backtest the factor with the configured constraints
    pub fn backtest(
        &self,
        panel: &Panel,
        sectors: Option<&SectorMap>,
        factors: &FactorPanel,
    ) -> Result<BacktestResult> {
        let mut constructor = PortfolioConstructor::new(panel, self.config.portfolio.clone())?;
        if let Some(sectors) = sectors {
            constructor = constructor.with_sectors(sectors);
        }
        let targets = FactorTargets::new(constructor, factors);
        BacktestSimulator::new(panel, self.config.backtest.clone())?.run(&targets)
    }

    /// Summarize a backtest, against the equal-weight universe when configured
    pub fn report(
        &self,
        panel: &Panel,
        backtest: &BacktestResult,
    ) -> Result<(Option<Benchmark>, PerformanceSummary)> {
        let benchmark = if self.config.report.benchmark {
            let dates: Vec<TradingDate> = backtest.nav.iter().map(|p| p.date).collect();
            Some(Benchmark::equal_weight(panel, &dates)?)
        } else {
            None
        };
        let reporter = PerformanceReporter::new(self.config.report.risk_free_rate)?;
        let summary = reporter.summarize(backtest, benchmark.as_ref());
        Ok((benchmark, summary))
    }

    /// Run every stage
    pub fn run(&self, panel: &Panel, sectors: Option<&SectorMap>) -> Result<ResearchOutput> {
        log::info!(
            "Research run '{}': {} instruments over {} dates",
            self.config.factor.name,
            panel.num_instruments(),
            panel.calendar().len()
        );

        let factors = self.compute_factors(panel, sectors)?;
        let evaluation = self.evaluate(panel, &factors)?;
        let backtest = self.backtest(panel, sectors, &factors)?;
        let (benchmark, performance) = self.report(panel, &backtest)?;

        log::info!(
            "Research run '{}' done: mean IC {}, total return {:.4}",
            self.config.factor.name,
            evaluation
                .ic
                .mean
                .map_or_else(|| "n/a".to_string(), |ic| format!("{:.4}", ic)),
            performance.total_return
        );

        Ok(ResearchOutput {
            factors,
            evaluation,
            backtest,
            benchmark,
            performance,
        })
    }
}
