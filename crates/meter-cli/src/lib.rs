//! # meter-cli
//!
//! Command-line interface for the cloudmeter ingestion pipeline.
//!
//! Provides commands for:
//! - Capturing collector samples into the raw layer
//! - Running promotion and rollup cycles, optionally on an interval
//! - Querying hourly facts and utilization summaries
//! - Inspecting per-domain store sizes
//!
//! State lives on disk under `<state-dir>/<tenant>/<domain>/`; every command
//! opens it, works in memory and saves it back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, IngestArgs, QueryArgs, RunArgs};
pub use error::CliError;
pub use output::OutputFormat;
