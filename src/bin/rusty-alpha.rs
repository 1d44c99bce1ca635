//! rusty-alpha CLI - factor evaluation and backtesting from the command line
//!
//! ## Example Usage
//!
//! ```bash
//! # Evaluate the configured factor
//! rusty-alpha evaluate --panel panel.csv --config research.toml
//!
//! # Backtest it
//! rusty-alpha backtest --panel panel.csv --output results/
//!
//! # Full run with every artifact
//! rusty-alpha run --panel panel.csv --output results/
//!
//! # Print the default configuration
//! rusty-alpha config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rusty_alpha::config::ResearchConfig;
use rusty_alpha::data::{load_panel_csv, write_csv, write_json, Panel, SectorMap};
use rusty_alpha::evaluation::EvaluationReport;
use rusty_alpha::research::ResearchPipeline;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

/// rusty-alpha: equity factor research
#[derive(Parser)]
#[command(name = "rusty-alpha")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Equity factor evaluation and backtesting", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (default: ~/.rusty-alpha/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and evaluate the configured factor
    Evaluate {
        /// Panel CSV file
        #[arg(short, long)]
        panel: PathBuf,

        /// Directory for IC and quantile records
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Backtest the configured factor portfolio
    Backtest {
        /// Panel CSV file
        #[arg(short, long)]
        panel: PathBuf,

        /// Directory for NAV, trade and position records
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Factor, evaluation, backtest and performance in one go
    Run {
        /// Panel CSV file
        #[arg(short, long)]
        panel: PathBuf,

        /// Directory for all artifacts (overrides report.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<ResearchConfig> {
    if let Some(path) = path {
        return ResearchConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    if let Some(home) = dirs::home_dir() {
        let default_config = home.join(".rusty-alpha").join("config.toml");
        if default_config.exists() {
            if verbose {
                println!("Config: {}", default_config.display().to_string().dimmed());
            }
            return ResearchConfig::load(&default_config)
                .with_context(|| format!("failed to load config {}", default_config.display()));
        }
    }
    Ok(ResearchConfig::default())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn load_inputs(path: &Path, verbose: bool) -> Result<(Panel, Option<SectorMap>)> {
    let pb = spinner("Loading panel...");
    let panel = load_panel_csv(path).with_context(|| format!("failed to load panel {}", path.display()))?;
    pb.finish_and_clear();

    let sectors = SectorMap::from_panel(&panel);
    if verbose {
        println!(
            "  {} {} instruments, {} dates, {} observations",
            "Panel:".bold(),
            panel.num_instruments(),
            panel.calendar().len(),
            panel.num_observations()
        );
        println!("  {} {} instruments mapped", "Sectors:".bold(), sectors.len());
    }
    Ok((panel, (!sectors.is_empty()).then_some(sectors)))
}

fn print_evaluation(report: &EvaluationReport) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));

    println!("{}", format!("Factor Evaluation: {}", report.factor).green().bold());
    println!("{}", "==================".green());
    println!(
        "  Dates:            {} valid of {}",
        report.ic.n_dates,
        report.dates.len()
    );
    println!("  Mean IC:          {}", fmt(report.ic.mean).cyan());
    println!("  ICIR:             {}", fmt(report.ic.icir));
    println!("  t-stat:           {}", fmt(report.ic.t_stat));
    println!("  p-value:          {}", fmt(report.ic.p_value));
    println!("  Hit rate:         {}", fmt(report.ic.hit_rate));
    println!("  Top-bottom:       {}", fmt(report.mean_spread).bold());
    println!("  Turnover:         {}", fmt(report.mean_turnover));
    for (i, ret) in report.mean_quantile_returns.iter().enumerate() {
        println!("  Q{:<2}              {}", i + 1, fmt(*ret));
    }
    if let Some(decay) = &report.decay {
        for point in &decay.points {
            println!("  IC @ {:>3}d:        {}", point.horizon, fmt(point.mean_ic));
        }
        if let Some(half_life) = decay.half_life {
            println!("  Half-life:        {} days", half_life);
        }
    }
    println!();
}

fn evaluate(config: ResearchConfig, panel_path: &Path, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    println!("{}", "Evaluating factor...".cyan().bold());
    let (panel, sectors) = load_inputs(panel_path, verbose)?;
    let pipeline = ResearchPipeline::new(config)?;

    let pb = spinner("Computing factor...");
    let factors = pipeline.compute_factors(&panel, sectors.as_ref())?;
    pb.set_message("Evaluating...");
    let report = pipeline.evaluate(&panel, &factors)?;
    pb.finish_and_clear();

    print_evaluation(&report);

    if let Some(dir) = output {
        std::fs::create_dir_all(&dir)?;
        write_csv(dir.join("ic.csv"), &report.ic_records())?;
        write_csv(dir.join("quantiles.csv"), &report.quantile_records())?;
        write_json(dir.join("evaluation.json"), &report)?;
        println!("{} {}", "Saved to".green(), dir.display());
    }
    Ok(())
}

fn backtest(config: ResearchConfig, panel_path: &Path, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    println!("{}", "Running backtest...".cyan().bold());
    let (panel, sectors) = load_inputs(panel_path, verbose)?;
    let pipeline = ResearchPipeline::new(config)?;

    let pb = spinner("Computing factor...");
    let factors = pipeline.compute_factors(&panel, sectors.as_ref())?;
    pb.set_message("Simulating...");
    let result = pipeline.backtest(&panel, sectors.as_ref(), &factors)?;
    let (_, summary) = pipeline.report(&panel, &result)?;
    pb.finish_and_clear();

    println!("{}", summary);
    if !result.events.is_empty() {
        println!("  {} {}", "Flagged events:".yellow(), result.events.len());
    }

    if let Some(dir) = output {
        std::fs::create_dir_all(&dir)?;
        write_csv(dir.join("nav.csv"), &result.nav)?;
        write_csv(dir.join("trades.csv"), &result.trades)?;
        write_csv(dir.join("positions.csv"), &result.positions)?;
        write_json(dir.join("events.json"), &result.events)?;
        write_json(dir.join("performance.json"), &summary)?;
        println!("{} {}", "Saved to".green(), dir.display());
    }
    Ok(())
}

fn run(config: ResearchConfig, panel_path: &Path, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    println!("{}", "Running research pipeline...".cyan().bold());
    let output = output.or_else(|| config.report.output_dir.clone());
    let (panel, sectors) = load_inputs(panel_path, verbose)?;
    let pipeline = ResearchPipeline::new(config)?;

    let pb = spinner("Running...");
    let research = pipeline.run(&panel, sectors.as_ref())?;
    pb.finish_and_clear();

    print_evaluation(&research.evaluation);
    println!("{}", research.performance);

    if let Some(dir) = output {
        research.write_artifacts(&dir)?;
        println!("{} {}", "Saved to".green(), dir.display());
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.verbose) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    if cli.verbose {
        println!("{} v{}", "rusty-alpha".cyan().bold(), env!("CARGO_PKG_VERSION"));
        println!("Factor: {}", config.factor.name.dimmed());
    }

    let start = Instant::now();
    let result = match cli.command {
        Commands::Evaluate { panel, output } => evaluate(config, &panel, output, cli.verbose),
        Commands::Backtest { panel, output } => backtest(config, &panel, output, cli.verbose),
        Commands::Run { panel, output } => run(config, &panel, output, cli.verbose),
        Commands::Config => config
            .to_toml_string()
            .map(|text| println!("{}", text))
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
    if cli.verbose {
        println!("Done in {:.2?}", start.elapsed());
    }
}
