//! Run command implementation.
//!
//! Executes one warehouse cycle, or repeats on a fixed interval until
//! interrupted. Each cycle runs on a blocking task: it first merges bronze
//! saved by other `ingest` calls, then saves state when done.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use meter_pipeline::{PipelineError, Warehouse, WarehouseReport};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{CycleOutput, OutputFormat};

/// Run command executor.
pub struct RunCommand {
    warehouse: Arc<Warehouse>,
}

impl RunCommand {
    /// Create a new run command.
    #[must_use]
    pub const fn new(warehouse: Arc<Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Execute the run command.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is zero, state cannot be saved, or a
    /// single-shot cycle has failing domains.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &RunArgs,
    ) -> Result<(), CliError> {
        match args.every {
            None => self.execute_once(writer, format).await,
            Some(0) => Err(CliError::InvalidArgument(
                "--every must be at least 1 second".to_string(),
            )),
            Some(secs) => {
                self.schedule(writer, format, Duration::from_secs(secs), args.max_cycles)
                    .await
            }
        }
    }

    /// Run a single cycle and report it.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be saved or any domain failed.
    pub async fn execute_once<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let output = self.cycle().await?;
        format.write(writer, &output)?;
        if output.failures.is_empty() {
            Ok(())
        } else {
            Err(CliError::Task(format!(
                "{} domain(s) failed",
                output.failures.len()
            )))
        }
    }

    async fn schedule<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        period: Duration,
        max_cycles: Option<u64>,
    ) -> Result<(), CliError> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed: u64 = 0;

        info!(
            tenant = %self.warehouse.tenant(),
            period_secs = period.as_secs(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let output = self.cycle().await?;
                    format.write(writer, &output)?;
                    completed += 1;
                    if max_cycles.is_some_and(|max| completed >= max) {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, stopping scheduler");
                    break;
                }
            }
        }

        info!(cycles = completed, "scheduler stopped");
        Ok(())
    }

    async fn cycle(&self) -> Result<CycleOutput, CliError> {
        let warehouse = Arc::clone(&self.warehouse);
        let report = tokio::task::spawn_blocking(move || -> Result<WarehouseReport, PipelineError> {
            warehouse.refresh()?;
            let report = warehouse.run_cycle();
            warehouse.save()?;
            Ok(report)
        })
        .await
        .map_err(|e| CliError::Task(format!("cycle task failed: {e}")))??;

        for failure in &report.failures {
            warn!(domain = %failure.domain, error = %failure.error, "domain cycle failed");
        }

        Ok(CycleOutput {
            tenant: self.warehouse.tenant().to_string(),
            cycles: report.cycles,
            failures: report.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use chrono::{TimeZone, Utc};
    use meter_pipeline::{MetricSample, PipelineConfig};

    fn warehouse(dir: &std::path::Path) -> Arc<Warehouse> {
        let config = PipelineConfig::default().with_state_dir(dir);
        let wh = Warehouse::new(config).expect("warehouse");
        let at = Utc
            .with_ymd_and_hms(2025, 1, 1, 10, 0, 0)
            .single()
            .expect("valid timestamp");
        wh.ingest([MetricSample::new("i-1", at, "CPUUtilization", 5.0).resource_type("ec2_instance")]);
        Arc::new(wh)
    }

    #[tokio::test]
    async fn single_cycle_writes_report_and_saves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wh = warehouse(dir.path());
        let cmd = RunCommand::new(Arc::clone(&wh));
        let mut buf = Vec::new();

        cmd.execute(&mut buf, &OutputFormat::new(Format::Table), &RunArgs { every: None, max_cycles: None })
            .await
            .expect("execute");

        let output = String::from_utf8(buf).expect("valid utf8");
        assert!(output.contains("compute"));
        assert!(output.contains("INSERTED"));
        assert!(dir.path().join("default").join("compute").join("facts.json").exists());
        assert_eq!(wh.domain("compute").expect("compute").facts().len(), 1);
    }

    #[tokio::test]
    async fn cycle_promotes_rows_ingested_by_another_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::default().with_state_dir(dir.path());
        let scheduler = Arc::new(Warehouse::open(config.clone()).expect("open"));
        let cmd = RunCommand::new(Arc::clone(&scheduler));

        let other = warehouse(dir.path());
        other.save().expect("save");

        cmd.execute_once(&mut Vec::new(), &OutputFormat::default())
            .await
            .expect("execute");

        assert_eq!(scheduler.domain("compute").expect("compute").facts().len(), 1);
        let reopened = Warehouse::open(config).expect("open");
        assert_eq!(reopened.domain("compute").expect("compute").bronze().len(), 1);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cmd = RunCommand::new(warehouse(dir.path()));
        let result = cmd
            .execute(&mut Vec::new(), &OutputFormat::default(), &RunArgs { every: Some(0), max_cycles: None })
            .await;
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn scheduler_stops_after_max_cycles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cmd = RunCommand::new(warehouse(dir.path()));
        let mut buf = Vec::new();

        cmd.execute(
            &mut buf,
            &OutputFormat::new(Format::Json),
            &RunArgs { every: Some(1), max_cycles: Some(2) },
        )
        .await
        .expect("execute");

        let output = String::from_utf8(buf).expect("valid utf8");
        assert_eq!(output.matches("\"tenant\"").count(), 2);
    }
}
