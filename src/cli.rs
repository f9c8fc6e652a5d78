//! Command-line interface for the portfolio simulator.

use portsim::allocation::flatten;
use portsim::analytics::{correlation_matrix, stats_table, StatsRecord};
use portsim::config::RunFileConfig;
use portsim::data::{CsvPriceProvider, DataConfig, PriceData, PriceProvider, SeriesKind};
use portsim::error::{Result, SimulationError};
use portsim::report::{ResultFormatter, PORTFOLIO_LABEL};
use portsim::simulator::{SimulationResult, Simulator};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// portsim - simulate hierarchical allocations with annual rebalancing and tax lots.
#[derive(Parser)]
#[command(name = "portsim")]
#[command(version)]
#[command(about = "Simulate rebalanced portfolios with FIFO capital-gains tax")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Simulate the portfolio described by a run file
    Run {
        /// Path to the TOML run file
        #[arg(short, long)]
        config: PathBuf,

        /// Number of most recent trades to list (0 = none)
        #[arg(long, default_value = "0")]
        trades: usize,
    },

    /// Print the flattened allocation of a run file
    Flatten {
        /// Path to the TOML run file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Compute statistics for price series without simulating
    Stats {
        /// Directory holding <name>.csv files
        #[arg(short, long)]
        data: PathBuf,

        /// Comma-separated series names
        #[arg(short, long, value_delimiter = ',', required = true)]
        series: Vec<String>,

        /// Interpret values as monthly percent returns
        #[arg(long)]
        returns: bool,

        /// Also print the return correlation matrix
        #[arg(long)]
        correlation: bool,
    },

    /// Write an example run file
    Init {
        /// Where to write the file
        #[arg(short, long, default_value = "portsim.toml")]
        path: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl Cli {
    /// Install the global tracing subscriber for the requested verbosity.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("tracing subscriber already installed");
        }
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Run { config, trades } => run_simulation(config, *trades, cli.output),
        Commands::Flatten { config } => run_flatten(config, cli.output),
        Commands::Stats {
            data,
            series,
            returns,
            correlation,
        } => run_stats(data, series, *returns, *correlation, cli.output),
        Commands::Init { path } => init_config(path),
    }
}

/// Compute one row per column, dropping (and reporting) columns that fail.
fn collect_stats(columns: &BTreeMap<String, Vec<f64>>) -> BTreeMap<String, StatsRecord> {
    stats_table(columns)
        .into_iter()
        .filter_map(|(name, stats)| match stats {
            Ok(stats) => Some((name, stats)),
            Err(e) => {
                warn!("No statistics for {}: {}", name, e);
                None
            }
        })
        .collect()
}

fn print_rows(rows: &BTreeMap<String, StatsRecord>, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => ResultFormatter::print_stats(rows),
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(rows)?),
        OutputFormat::Csv => print!("{}", ResultFormatter::to_csv(rows)),
    }
    Ok(())
}

/// JSON document printed by `run --output json`.
#[derive(Serialize)]
struct RunReport<'a> {
    result: &'a SimulationResult,
    stats: &'a BTreeMap<String, StatsRecord>,
}

fn run_simulation(config_path: &PathBuf, trades: usize, output: OutputFormat) -> Result<()> {
    let file_config = RunFileConfig::load(config_path)?;
    let sim_config = file_config.to_simulation_config()?;
    let provider = file_config.data.provider()?;

    let instruments: BTreeSet<String> = sim_config
        .allocation
        .instruments()
        .map(str::to_string)
        .collect();
    let data = provider.load(&instruments)?;

    let simulator = Simulator::new(sim_config)?;
    let result = simulator.run(&data)?;

    // Constituents are compared over the simulated window only.
    let mut columns = data.columns_between(result.start_date, result.end_date)?;
    columns.insert(PORTFOLIO_LABEL.to_string(), result.value_series());
    let rows = collect_stats(&columns);

    match output {
        OutputFormat::Text => {
            ResultFormatter::print_report(simulator.config(), &result);
            ResultFormatter::print_stats(&rows);
            if trades > 0 {
                println!("{}", ResultFormatter::trades_table(&result.trades, trades));
            }
        }
        OutputFormat::Json => {
            let report = RunReport {
                result: &result,
                stats: &rows,
            };
            println!("{}", ResultFormatter::to_json(&report)?);
        }
        OutputFormat::Csv => print!("{}", ResultFormatter::to_csv(&rows)),
    }
    Ok(())
}

fn run_flatten(config_path: &PathBuf, output: OutputFormat) -> Result<()> {
    let file_config = RunFileConfig::load(config_path)?;
    let flat = flatten(&file_config.allocation)?;

    match output {
        OutputFormat::Text => {
            for (instrument, weight) in flat.iter() {
                println!("{:<24} {:>8.4}%", instrument, weight * 100.0);
            }
        }
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&flat)?),
        OutputFormat::Csv => {
            println!("instrument,weight");
            for (instrument, weight) in flat.iter() {
                println!("{},{}", instrument, weight);
            }
        }
    }
    Ok(())
}

fn run_stats(
    dir: &PathBuf,
    series: &[String],
    returns: bool,
    correlation: bool,
    output: OutputFormat,
) -> Result<()> {
    let config = DataConfig {
        kind: if returns {
            SeriesKind::MonthlyReturnsPct
        } else {
            SeriesKind::Prices
        },
        ..Default::default()
    };
    let names: BTreeSet<String> = series.iter().cloned().collect();
    let data: PriceData = CsvPriceProvider::new(dir, config).load(&names)?;

    let (start, end) = data.common_range(data.instruments())?;
    info!("Common range: {} to {}", start, end);
    let columns = data.columns_between(start, end)?;

    if columns.values().all(|c| c.len() < 2) {
        return Err(SimulationError::InsufficientData {
            required: 2,
            actual: columns.values().map(Vec::len).max().unwrap_or(0),
        });
    }

    let rows = collect_stats(&columns);
    print_rows(&rows, output)?;

    if correlation && output == OutputFormat::Text {
        println!("{}", ResultFormatter::correlation_table(&correlation_matrix(&columns)));
    }

    // A single series also gets a headline line, handy in scripts.
    if let (OutputFormat::Text, [only]) = (output, series) {
        if let Some(stats) = rows.get(only) {
            let tau = stats
                .tau
                .map_or_else(|| "n/a".to_string(), |t| format!("{:.3}", t));
            println!("{}: sharpe {:.3}, tau {}", only, stats.sharpe, tau);
        }
    }

    Ok(())
}

fn init_config(path: &PathBuf) -> Result<()> {
    let example = RunFileConfig::example();
    fs::write(path, example)?;
    println!("Created example run file: {}", path.display());
    println!("\nEdit this file to describe your portfolio, then run:");
    println!("  portsim run -c {}", path.display());
    Ok(())
}
