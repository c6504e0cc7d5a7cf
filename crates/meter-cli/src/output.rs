//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use meter_pipeline::{CycleReport, DomainFailure, DomainStats, FactView, UtilizationSummary};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Per-domain counts of one ingest.
#[derive(Debug, Clone, Serialize)]
pub struct DomainIngest {
    /// Domain name.
    pub domain: String,
    /// Samples newly captured.
    pub inserted: usize,
    /// Samples already captured.
    pub duplicates: usize,
}

/// Result of the ingest command.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutput {
    /// Tenant the samples went to.
    pub tenant: String,
    /// Lines that were not JSON objects.
    pub rejected: usize,
    /// Samples no domain accepts.
    pub unrouted: usize,
    /// Per-domain counts.
    pub domains: Vec<DomainIngest>,
}

impl TableDisplay for IngestOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Ingest ({})", self.tenant)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "{:<12}  {:>10}  {:>10}", "DOMAIN", "INSERTED", "DUPLICATES")?;
        writeln!(writer, "{}", "─".repeat(36))?;
        for d in &self.domains {
            writeln!(
                writer,
                "{:<12}  {:>10}  {:>10}",
                truncate(&d.domain, 12),
                d.inserted,
                d.duplicates
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "Unrouted:       {}", self.unrouted)?;
        writeln!(writer, "Rejected lines: {}", self.rejected)?;
        Ok(())
    }
}

/// Result of one warehouse cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutput {
    /// Tenant the cycle ran for.
    pub tenant: String,
    /// Domains that completed.
    pub cycles: Vec<CycleReport>,
    /// Domains that failed.
    pub failures: Vec<DomainFailure>,
}

impl TableDisplay for CycleOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(
            writer,
            "{:<12}  {:>8}  {:>8}  {:>8}  {:>8}  {:>9}  RUN",
            "DOMAIN", "SCANNED", "ADMITTED", "GROUPS", "INSERTED", "CONFLICTS"
        )?;
        writeln!(writer, "{}", "─".repeat(98))?;
        for c in &self.cycles {
            writeln!(
                writer,
                "{:<12}  {:>8}  {:>8}  {:>8}  {:>8}  {:>9}  {}",
                truncate(&c.domain, 12),
                c.promote.scanned,
                c.promote.admitted,
                c.rollup.groups,
                c.rollup.inserted,
                c.rollup.conflicts,
                c.run_id
            )?;
        }
        for f in &self.failures {
            writeln!(writer, "✗ {}: {}", f.domain, f.error)?;
        }
        Ok(())
    }
}

/// Hourly facts returned by a query.
#[derive(Debug, Clone, Serialize)]
pub struct FactTable {
    /// Matching facts.
    pub facts: Vec<FactView>,
}

impl TableDisplay for FactTable {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.facts.is_empty() {
            writeln!(writer, "No facts found")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<16}  {:<24}  {:<24}  {:>14}  {:<10}  {:>7}",
            "HOUR", "RESOURCE", "METRIC", "VALUE", "UNIT", "SAMPLES"
        )?;
        writeln!(writer, "{}", "─".repeat(104))?;

        for f in &self.facts {
            writeln!(
                writer,
                "{:<16}  {:<24}  {:<24}  {:>14.4}  {:<10}  {:>7}",
                f.timestamp.format("%Y-%m-%d %H:%M"),
                truncate(&f.resource_id, 24),
                truncate(&f.metric_name, 24),
                f.value,
                truncate(&f.unit, 10),
                f.sample_count
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} fact(s)", self.facts.len())?;
        Ok(())
    }
}

/// Utilization summaries.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryTable {
    /// One row per resource and metric.
    pub rows: Vec<UtilizationSummary>,
}

impl TableDisplay for SummaryTable {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.rows.is_empty() {
            writeln!(writer, "No facts found")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<24}  {:<24}  {:>12}  {:>12}  {:<16}  {:>5}",
            "RESOURCE", "METRIC", "AVG", "MAX", "MAX AT", "HOURS"
        )?;
        writeln!(writer, "{}", "─".repeat(102))?;

        for r in &self.rows {
            writeln!(
                writer,
                "{:<24}  {:<24}  {:>12.4}  {:>12.4}  {:<16}  {:>5}",
                truncate(&r.resource_id, 24),
                truncate(&r.metric_name, 24),
                r.avg,
                r.max,
                r.max_at.format("%Y-%m-%d %H:%M"),
                r.fact_count
            )?;
        }
        Ok(())
    }
}

/// Store sizes of every domain.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    /// Tenant name.
    pub tenant: String,
    /// Tenant state directory.
    pub state_dir: String,
    /// Per-domain counts.
    pub domains: Vec<DomainStats>,
}

impl TableDisplay for StatusOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Tenant:    {}", self.tenant)?;
        writeln!(writer, "State Dir: {}", self.state_dir)?;
        writeln!(writer)?;
        writeln!(
            writer,
            "{:<12}  {:>8}  {:>8}  {:>9}  {:>7}  {:>6}  {:>8}",
            "DOMAIN", "BRONZE", "SILVER", "RESOURCES", "METRICS", "HOURS", "FACTS"
        )?;
        writeln!(writer, "{}", "─".repeat(72))?;
        for d in &self.domains {
            writeln!(
                writer,
                "{:<12}  {:>8}  {:>8}  {:>9}  {:>7}  {:>6}  {:>8}",
                truncate(&d.domain, 12),
                d.bronze,
                d.silver,
                d.resources,
                d.metrics,
                d.time_buckets,
                d.facts
            )?;
        }
        Ok(())
    }
}

/// Truncate a string to a maximum length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}
