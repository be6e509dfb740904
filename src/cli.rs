//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::interval::Zone;
use crate::models::{DateRange, Interval, RequestContext};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

/// ChartSeries - aggregation results to chart-ready series
///
/// Reads a search-engine response holding date histogram aggregations and
/// one or more chart definitions, and writes one aligned series per metric
/// path of each chart.
///
/// Examples:
///   chartseries --aggregations response.json --charts charts.json
///   chartseries -a response.json --charts charts.json --interval month --format markdown
///   chartseries -a response.json -c dashboards.toml -o -
///   chartseries --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Search response or bare aggregations document (JSON)
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub aggregations: Option<PathBuf>,

    /// Chart definitions (JSON object or array of objects)
    ///
    /// Charts from the config file's [[charts]] tables are evaluated too.
    #[arg(long, value_name = "FILE")]
    pub charts: Option<PathBuf>,

    /// Request-level interval overriding every chart's own
    ///
    /// Values: day, week, month, year
    #[arg(short, long, value_name = "INTERVAL")]
    pub interval: Option<String>,

    /// Visualization code echoed in the output
    #[arg(long, value_name = "CODE")]
    pub visualization_code: Option<String>,

    /// Request filter passed to computed fields (repeatable)
    ///
    /// VALUE is read as JSON when it parses, otherwise as a string.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,

    /// Start of the request date range (epoch millis)
    #[arg(long, value_name = "MILLIS", requires = "end")]
    pub start: Option<i64>,

    /// End of the request date range (epoch millis)
    #[arg(long, value_name = "MILLIS", requires = "start")]
    pub end: Option<i64>,

    /// Output file path for the series (`-` for stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, markdown)
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Time zone for interval keys: local, UTC or an IANA name
    #[arg(long, value_name = "TZ", env = "CHARTSERIES_TZ")]
    pub timezone: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .chartseries.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of charts evaluated at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .chartseries.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Markdown tables
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref path) = self.aggregations {
            if !path.is_file() {
                return Err(format!("Aggregations file does not exist: {}", path.display()));
            }
        }

        if let Some(ref path) = self.charts {
            if !path.is_file() {
                return Err(format!("Charts file does not exist: {}", path.display()));
            }
        }

        if let Some(ref interval) = self.interval {
            interval.parse::<Interval>().map_err(|e| e.to_string())?;
        }

        if let Some(ref timezone) = self.timezone {
            timezone.parse::<Zone>()?;
        }

        for filter in &self.filters {
            parse_filter(filter)?;
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err("Start of the date range must not be after its end".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the config file's `[general] verbose`; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Request context described by the arguments.
    pub fn request_context(&self) -> RequestContext {
        RequestContext {
            interval: self.interval.clone(),
            visualization_code: self.visualization_code.clone(),
            date_range: match (self.start, self.end) {
                (Some(start), Some(end)) => Some(DateRange { start, end }),
                _ => None,
            },
            filters: self
                .filters
                .iter()
                .filter_map(|f| parse_filter(f).ok())
                .collect(),
        }
    }
}

/// Split `KEY=VALUE`, reading the value as JSON when possible.
fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| format!("Filter must look like KEY=VALUE: {}", raw))?;

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}
