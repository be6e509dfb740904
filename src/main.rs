//! ChartSeries - aggregation results to chart-ready series
//!
//! A CLI tool that reshapes search-engine date histogram aggregations
//! into named, gap-filled, chronologically ordered series per chart.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error, or at least one chart could not be evaluated

mod analysis;
mod batch;
mod cli;
mod computed;
mod config;
mod error;
mod interval;
mod models;
mod report;
mod tree;

use analysis::ChartEngine;
use anyhow::{bail, Context, Result};
use cli::{Args, OutputFormat};
use computed::ActionRegistry;
use config::Config;
use interval::IntervalKeyResolver;
use models::{ChartConfig, ChartSeries};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so `[general] verbose` can raise the log level
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("ChartSeries v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Evaluation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .chartseries.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", config::CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Edit it to set the time zone, default interval and inline charts.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so that `--output -` keeps stdout clean.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Evaluate every chart and write the output. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let zone = config.zone()?;
    info!("Interval keys in time zone: {}", zone);

    let registry = ActionRegistry::builtin();
    debug!("Computed field actions: {:?}", registry.names());

    let engine = ChartEngine::new(registry, IntervalKeyResolver::new(zone))
        .with_default_interval(config.engine.default_interval.clone());

    // Step 1: Read the aggregation document
    let Some(ref aggregations_path) = args.aggregations else {
        bail!("No aggregations file given");
    };
    let document = read_json(aggregations_path)?;
    let aggregations = analysis::aggregation_root(&document).clone();

    // Step 2: Collect chart definitions
    let mut charts = match args.charts {
        Some(ref path) => load_charts(path)?,
        None => Vec::new(),
    };
    charts.extend(config.charts.iter().cloned());

    if charts.is_empty() {
        bail!("No charts to evaluate: pass --charts or add [[charts]] to the config file");
    }
    info!("Evaluating {} chart(s)", charts.len());

    // Step 3: Evaluate
    let outcomes = batch::evaluate_all(
        Arc::new(engine),
        Arc::new(args.request_context()),
        Arc::new(aggregations),
        charts,
        config.general.concurrency,
    )
    .await?;

    let mut evaluated: Vec<ChartSeries> = Vec::with_capacity(outcomes.len());
    let mut failed = 0;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        let label = outcome
            .chart
            .name
            .clone()
            .unwrap_or_else(|| format!("#{}", i + 1));
        match outcome.result {
            Ok(chart) => {
                if chart.series.len() < outcome.chart.aggs_path.len() {
                    warn!(
                        "Chart {}: {} of {} metrics could not be built",
                        label,
                        outcome.chart.aggs_path.len() - chart.series.len(),
                        outcome.chart.aggs_path.len()
                    );
                }
                evaluated.push(chart);
            }
            Err(e) => {
                error!("Chart {} failed: {}", label, e);
                failed += 1;
            }
        }
    }

    // Step 4: Render and write
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&evaluated, config.report.pretty_json)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&evaluated, config.report.include_totals)
        }
    };

    let to_stdout = config.general.output == "-";
    if to_stdout {
        println!("{}", output);
    } else {
        std::fs::write(&config.general.output, &output)
            .with_context(|| format!("Failed to write output to {}", config.general.output))?;
    }

    let duration = start_time.elapsed().as_secs_f64();
    if !to_stdout && !args.quiet {
        println!("\n📊 Evaluation Summary:");
        println!("   Charts evaluated: {}", evaluated.len());
        if failed > 0 {
            println!("   Charts failed: {}", failed);
        }
        println!(
            "   Series written: {}",
            evaluated.iter().map(|c| c.series.len()).sum::<usize>()
        );
        println!("   Duration: {:.3}s", duration);
        println!("\n✅ Output saved to: {}", config.general.output);
    }

    Ok(if failed > 0 { 1 } else { 0 })
}

/// Where the configuration came from, reported once logging is up.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", config::CONFIG_FILE),
            ConfigSource::Builtin => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::DefaultFile),
        Ok(None) => (Config::default(), ConfigSource::Builtin),
        Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
    })
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

/// A charts file holds a single chart or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChartsFile {
    Many(Vec<ChartConfig>),
    One(Box<ChartConfig>),
}

fn load_charts(path: &Path) -> Result<Vec<ChartConfig>> {
    let value = read_json(path)?;
    let charts: ChartsFile = serde_json::from_value(value)
        .with_context(|| format!("Invalid chart definitions in {}", path.display()))?;

    Ok(match charts {
        ChartsFile::Many(charts) => charts,
        ChartsFile::One(chart) => vec![*chart],
    })
}
