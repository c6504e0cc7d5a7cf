//! Ingest command implementation.
//!
//! Reads JSON-lines samples from a file or stdin, routes them into the
//! tenant's raw layer and saves the result.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use meter_pipeline::{MetricSample, Warehouse};
use tracing::{info, warn};

use crate::cli::IngestArgs;
use crate::commands::run::RunCommand;
use crate::error::CliError;
use crate::output::{DomainIngest, IngestOutput, OutputFormat};

/// Ingest command executor.
pub struct IngestCommand {
    warehouse: Arc<Warehouse>,
}

impl IngestCommand {
    /// Create a new ingest command.
    #[must_use]
    pub const fn new(warehouse: Arc<Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Execute the ingest command.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read, state cannot be saved,
    /// or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &IngestArgs,
    ) -> Result<(), CliError> {
        let (samples, rejected) = match args.file.as_deref() {
            Some(path) if path != Path::new("-") => {
                read_samples(BufReader::new(File::open(path)?))?
            }
            _ => read_samples(io::stdin().lock())?,
        };

        let output = self.ingest(samples, rejected)?;
        format.write(writer, &output)?;

        if args.run {
            RunCommand::new(Arc::clone(&self.warehouse))
                .execute_once(writer, format)
                .await?;
        }
        Ok(())
    }

    /// Routes parsed samples and saves the warehouse.
    ///
    /// # Errors
    ///
    /// Returns an error if the warehouse cannot be saved.
    pub fn ingest(
        &self,
        samples: Vec<MetricSample>,
        rejected: usize,
    ) -> Result<IngestOutput, CliError> {
        let count = samples.len();
        let report = self.warehouse.ingest(samples);
        self.warehouse.save()?;

        info!(
            tenant = %self.warehouse.tenant(),
            samples = count,
            inserted = report.inserted(),
            duplicates = report.duplicates(),
            unrouted = report.unrouted,
            rejected,
            "samples ingested"
        );

        Ok(IngestOutput {
            tenant: self.warehouse.tenant().to_string(),
            rejected,
            unrouted: report.unrouted,
            domains: report
                .domains
                .into_iter()
                .map(|(domain, counts)| DomainIngest {
                    domain,
                    inserted: counts.inserted,
                    duplicates: counts.duplicates,
                })
                .collect(),
        })
    }
}

/// Parses one sample per non-blank line. Lines that are not a JSON sample
/// are skipped and counted.
///
/// # Errors
///
/// Returns an error only if reading fails.
pub fn read_samples<R: BufRead>(reader: R) -> Result<(Vec<MetricSample>, usize), CliError> {
    let mut samples = Vec::new();
    let mut rejected = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<MetricSample>(trimmed) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping unreadable sample");
                rejected += 1;
            }
        }
    }
    Ok((samples, rejected))
}
