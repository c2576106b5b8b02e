//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::dashboard::RECENT_LIMIT;
use crate::catalog::CatalogKind;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// fairchance - fair chance hiring survey
///
/// Collect eligibility decisions for criminal offense categories, review the
/// aggregate results and load-test the backend.
///
/// Examples:
///   fairchance collect --variant hierarchical --username ada
///   fairchance collect --variant flat --offline
///   fairchance stats --format json --output results.json
///   fairchance stats --watch
///   fairchance load-test --scale 0.1 --max-vus 20
///   fairchance init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fairchance.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Backend project URL
    #[arg(long, value_name = "URL", env = "SUPABASE_URL", global = true)]
    pub url: Option<String>,

    /// Backend API key (sent as `apikey` and bearer token)
    #[arg(
        long,
        value_name = "KEY",
        env = "SUPABASE_ANON_KEY",
        hide_env_values = true,
        global = true
    )]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Answer the survey on the terminal
    Collect(CollectArgs),
    /// Print aggregate statistics over recent submissions
    Stats(StatsArgs),
    /// List recent submissions
    Batches(BatchesArgs),
    /// Print the offense catalog
    Catalog,
    /// Run the staged load generator against the decisions endpoint
    ///
    /// Exit code 2 when a threshold is breached.
    LoadTest(LoadTestArgs),
    /// Generate a default .fairchance.toml configuration file
    InitConfig,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CollectArgs {
    /// Survey variant
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<Variant>,

    /// Offense list for the flat variant
    #[arg(long, value_name = "CATALOG")]
    pub catalog: Option<CatalogKind>,

    /// Username for the hierarchical variant (prompted when omitted)
    #[arg(short, long, value_name = "NAME")]
    pub username: Option<String>,

    /// Read answers from a JSON array of strings instead of stdin
    #[arg(long, value_name = "FILE")]
    pub answers: Option<PathBuf>,

    /// Keep everything in memory instead of talking to the backend
    #[arg(long)]
    pub offline: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct StatsArgs {
    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Keep running and reprint as new submissions arrive
    #[arg(short, long)]
    pub watch: bool,

    /// Offense list used for the table rows
    #[arg(long, value_name = "CATALOG")]
    pub catalog: Option<CatalogKind>,

    /// How many recent submissions to include
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct BatchesArgs {
    /// How many recent submissions to list
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LoadTestArgs {
    /// Matrix id written with every request
    #[arg(long, value_name = "ID", env = "MATRIX_ID")]
    pub matrix_id: Option<String>,

    /// Multiply every stage duration by this factor
    #[arg(long, default_value = "1.0", value_name = "FACTOR")]
    pub scale: f64,

    /// Cap on concurrent virtual users
    #[arg(long, value_name = "NUM")]
    pub max_vus: Option<usize>,

    /// Fail when p95 latency reaches this many milliseconds
    #[arg(long, value_name = "MS")]
    pub p95_ms: Option<f64>,

    /// Fail when the failed-request ratio reaches this value (0.0 - 1.0)
    #[arg(long, value_name = "RATE")]
    pub max_failure_rate: Option<f64>,
}

impl Default for LoadTestArgs {
    fn default() -> Self {
        Self {
            matrix_id: None,
            scale: 1.0,
            max_vus: None,
            p95_ms: None,
            max_failure_rate: None,
        }
    }
}

/// Survey variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// One decision per offense in a flat list
    Flat,
    /// Categories and groups, answered in aggregate or per offense
    #[default]
    Hierarchical,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if let Command::InitConfig = self.command {
            return Ok(());
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Backend URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match &self.command {
            Command::Collect(collect) => {
                if let Some(ref answers) = collect.answers {
                    if !answers.is_file() {
                        return Err(format!("Answers file does not exist: {}", answers.display()));
                    }
                }
            }
            Command::Stats(stats) => {
                check_limit(stats.limit)?;
                if stats.watch && stats.output.is_some() {
                    return Err("--watch prints to stdout; drop --output".to_string());
                }
            }
            Command::Batches(batches) => check_limit(batches.limit)?,
            Command::LoadTest(load) => {
                if load.scale <= 0.0 {
                    return Err("Scale must be greater than 0".to_string());
                }
                if load.max_vus == Some(0) {
                    return Err("Max VUs must be at least 1".to_string());
                }
                if let Some(rate) = load.max_failure_rate {
                    if !(0.0..=1.0).contains(&rate) {
                        return Err("Failure rate must be between 0.0 and 1.0".to_string());
                    }
                }
                if let Some(p95) = load.p95_ms {
                    if p95 <= 0.0 {
                        return Err("p95 threshold must be greater than 0".to_string());
                    }
                }
            }
            Command::Catalog | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn check_limit(limit: Option<usize>) -> Result<(), String> {
    match limit {
        Some(0) => Err("Limit must be at least 1".to_string()),
        Some(n) if n > RECENT_LIMIT => Err(format!("Limit must be at most {}", RECENT_LIMIT)),
        _ => Ok(()),
    }
}
