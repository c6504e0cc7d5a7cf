//! Status command implementation.
//!
//! Shows how many rows each layer of every domain holds for the tenant.

use std::io::Write;
use std::sync::Arc;

use meter_pipeline::Warehouse;

use crate::error::CliError;
use crate::output::{OutputFormat, StatusOutput};

/// Status command executor.
pub struct StatusCommand {
    warehouse: Arc<Warehouse>,
}

impl StatusCommand {
    /// Create a new status command.
    #[must_use]
    pub const fn new(warehouse: Arc<Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Execute the status command.
    ///
    /// # Errors
    ///
    /// Returns an error if output fails.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        format.write(writer, &self.status())
    }

    /// Collect per-domain counts.
    #[must_use]
    pub fn status(&self) -> StatusOutput {
        let config = self.warehouse.config();
        StatusOutput {
            tenant: config.tenant.clone(),
            state_dir: config.state_dir.join(&config.tenant).display().to_string(),
            domains: self.warehouse.stats(),
        }
    }
}
