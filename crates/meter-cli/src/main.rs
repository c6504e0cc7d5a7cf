//! cloudmeter CLI binary entrypoint.
//!
//! This is the main entry point for the `cloudmeter` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use meter_cli::cli::{Cli, Commands};
use meter_cli::commands::{IngestCommand, QueryCommand, RunCommand, StatusCommand};
use meter_cli::context::open_warehouse;
use meter_cli::output::OutputFormat;

const DEFAULT_LOG_FILTER: &str = "cloudmeter=info,meter_cli=info,meter_pipeline=info";

fn main() -> ExitCode {
    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), meter_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let warehouse = open_warehouse(&cli)?;
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Ingest(args) => {
            let cmd = IngestCommand::new(warehouse);
            cmd.execute(&mut stdout, &format, args).await?;
        }
        Commands::Run(args) => {
            let cmd = RunCommand::new(warehouse);
            cmd.execute(&mut stdout, &format, args).await?;
        }
        Commands::Query(args) => {
            let cmd = QueryCommand::new(warehouse);
            cmd.execute(&mut stdout, &format, args)?;
        }
        Commands::Summary(args) => {
            let cmd = QueryCommand::new(warehouse);
            cmd.execute_summary(&mut stdout, &format, args)?;
        }
        Commands::Status => {
            let cmd = StatusCommand::new(warehouse);
            cmd.execute(&mut stdout, &format)?;
        }
    }

    Ok(())
}
