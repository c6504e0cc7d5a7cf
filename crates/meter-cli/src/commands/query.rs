//! Query and summary command implementations.
//!
//! Both commands read gold facts through the same filters. A query with no
//! dates reads the configured default window; `--from`/`--to` select whole
//! days with the end day included.

use std::io::Write;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use meter_pipeline::{FactQuery, FactView, TimeRange, Warehouse, summarize};

use crate::cli::QueryArgs;
use crate::error::CliError;
use crate::output::{FactTable, OutputFormat, SummaryTable};

/// Query command executor.
pub struct QueryCommand {
    warehouse: Arc<Warehouse>,
}

impl QueryCommand {
    /// Create a new query command.
    #[must_use]
    pub const fn new(warehouse: Arc<Warehouse>) -> Self {
        Self { warehouse }
    }

    /// List matching facts.
    ///
    /// # Errors
    ///
    /// Returns an error if the filters are invalid or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &QueryArgs,
    ) -> Result<(), CliError> {
        let facts = self.fetch(args)?;
        format.write(writer, &FactTable { facts })
    }

    /// Summarize matching facts per resource and metric.
    ///
    /// # Errors
    ///
    /// Returns an error if the filters are invalid or output fails.
    pub fn execute_summary<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &QueryArgs,
    ) -> Result<(), CliError> {
        let rows = summarize(&self.fetch(args)?);
        format.write(writer, &SummaryTable { rows })
    }

    /// Runs the filters against one domain or all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the window is inverted or the domain is unknown.
    pub fn fetch(&self, args: &QueryArgs) -> Result<Vec<FactView>, CliError> {
        let query = build_query(args, self.warehouse.config().default_window_days)?;
        match &args.domain {
            Some(name) => Ok(self.warehouse.domain(name)?.query().facts(&query)),
            None => Ok(self.warehouse.query(&query)),
        }
    }
}

/// Translates command-line filters into a fact query.
///
/// # Errors
///
/// Returns an error if `--from` is after `--to`.
pub fn build_query(args: &QueryArgs, window_days: u32) -> Result<FactQuery, CliError> {
    let mut query = FactQuery::new();
    if let Some(resource) = &args.resource {
        query = query.with_resource(resource.as_str());
    }
    if let Some(metric) = &args.metric {
        query = query.with_metric(metric.as_str());
    }
    if let Some(kind) = &args.resource_type {
        query = query.with_resource_type(kind.as_str());
    }
    if let Some(range) = window(args, window_days, Utc::now().date_naive())? {
        query = query.with_range(range);
    }
    Ok(query)
}

fn window(args: &QueryArgs, window_days: u32, today: NaiveDate) -> Result<Option<TimeRange>, CliError> {
    if args.all {
        return Ok(None);
    }
    let look_back = |end: NaiveDate| {
        end.checked_sub_days(Days::new(u64::from(window_days.saturating_sub(1))))
            .ok_or_else(|| {
                CliError::InvalidArgument(format!(
                    "a {window_days} day window before {end} is out of range"
                ))
            })
    };
    let range = match (args.from, args.to) {
        (Some(from), Some(to)) => TimeRange::for_dates(from, to)?,
        (Some(from), None) => TimeRange::for_dates(from, today.max(from))?,
        (None, Some(to)) => TimeRange::for_dates(look_back(to)?, to)?,
        (None, None) => TimeRange::for_dates(look_back(today)?, today)?,
    };
    Ok(Some(range))
}
