//! Resolves the pipeline configuration from flags, environment and file.

use std::sync::Arc;

use meter_pipeline::{PipelineConfig, Warehouse};
use tracing::debug;

use crate::cli::Cli;
use crate::error::CliError;

/// Builds the effective configuration.
///
/// The config file (or defaults) is loaded first, then `--tenant` and
/// `--state-dir` override it.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
pub fn load_config(cli: &Cli) -> Result<PipelineConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(tenant) = &cli.tenant {
        config = config.with_tenant(tenant.as_str());
    }
    if let Some(dir) = &cli.state_dir {
        config = config.with_state_dir(dir);
    }
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    debug!(
        tenant = %config.tenant,
        state_dir = %config.state_dir.display(),
        domains = config.domains.len(),
        "configuration resolved"
    );
    Ok(config)
}

/// Opens the tenant's warehouse from its saved state.
///
/// # Errors
///
/// Returns an error if the configuration or any snapshot is invalid.
pub fn open_warehouse(cli: &Cli) -> Result<Arc<Warehouse>, CliError> {
    let config = load_config(cli)?;
    Ok(Arc::new(Warehouse::open(config)?))
}
