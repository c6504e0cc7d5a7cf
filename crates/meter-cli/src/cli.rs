//! Command-line argument parsing with clap.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// cloudmeter - hourly utilization facts from cloud monitoring samples.
#[derive(Parser, Debug, Clone)]
#[command(name = "cloudmeter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML pipeline configuration.
    #[arg(short, long, env = "CLOUDMETER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Tenant whose state to operate on. Overrides the config file.
    #[arg(short, long, env = "CLOUDMETER_TENANT")]
    pub tenant: Option<String>,

    /// Root directory for pipeline state. Overrides the config file.
    #[arg(short, long, env = "CLOUDMETER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Capture JSON-lines metric samples into the raw layer.
    Ingest(IngestArgs),

    /// Promote and roll up every domain, once or on a schedule.
    Run(RunArgs),

    /// List hourly facts.
    Query(QueryArgs),

    /// Average and peak per resource and metric.
    Summary(QueryArgs),

    /// Row counts per domain.
    Status,
}

/// Arguments for the ingest command.
#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// JSON-lines file of samples. Reads stdin when omitted or `-`.
    #[arg(short = 'i', long)]
    pub file: Option<PathBuf>,

    /// Run a cycle right after ingesting.
    #[arg(long)]
    pub run: bool,
}

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Repeat every N seconds until interrupted.
    #[arg(short, long, value_name = "SECONDS")]
    pub every: Option<u64>,

    /// Stop after this many cycles when repeating.
    #[arg(long, requires = "every")]
    pub max_cycles: Option<u64>,
}

/// Filters shared by the query and summary commands.
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Resource id (case-insensitive).
    #[arg(short, long)]
    pub resource: Option<String>,

    /// Metric name.
    #[arg(short, long)]
    pub metric: Option<String>,

    /// Resource type tag.
    #[arg(long)]
    pub resource_type: Option<String>,

    /// Domain to read from. All domains when omitted.
    #[arg(short, long)]
    pub domain: Option<String>,

    /// First day of the window (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day of the window, included in full (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Ignore the default window and read every hour.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub all: bool,
}
