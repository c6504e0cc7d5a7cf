//! Domain pipelines and the tenant warehouse that routes between them.
//!
//! A [`DomainPipeline`] owns the four stores of one domain and runs the
//! bronze to gold passes over them. A [`Warehouse`] holds one pipeline per
//! configured domain for a single tenant, routes incoming samples by
//! resource type and runs every domain's cycle side by side.

use std::path::Path;
use std::thread;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bronze::{AppendReport, RawStore};
use crate::config::PipelineConfig;
use crate::dimension::{DimensionResolver, DimensionSnapshot};
use crate::domain::DomainSpec;
use crate::error::{PipelineError, Result};
use crate::fact::{FactRecord, FactStore};
use crate::persist::JsonStore;
use crate::query::{FactQuery, FactView, QuerySurface};
use crate::rollup::{FactBuilder, RollupReport};
use crate::silver::{CleanStore, PromoteReport};
use crate::summary::{UtilizationSummary, summarize};
use crate::types::{CleanMetricRecord, MetricSample, RawMetricRecord, TimeRange};

const BRONZE_FILE: &str = "bronze";
const SILVER_FILE: &str = "silver";
const DIMENSIONS_FILE: &str = "dimensions";
const FACTS_FILE: &str = "facts";

/// Outcome of one promote-then-rollup cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Domain the cycle ran for.
    pub domain: String,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Silver promotion counts.
    pub promote: PromoteReport,
    /// Gold rollup counts.
    pub rollup: RollupReport,
}

/// Row counts of every store in a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStats {
    /// Domain name.
    pub domain: String,
    /// Bronze records.
    pub bronze: usize,
    /// Silver records.
    pub silver: usize,
    /// Resource dimension rows.
    pub resources: usize,
    /// Metric dimension rows.
    pub metrics: usize,
    /// Hour bucket rows.
    pub time_buckets: usize,
    /// Gold facts.
    pub facts: usize,
}

/// Bronze, silver, dimensions and gold for one domain.
#[derive(Debug)]
pub struct DomainPipeline {
    spec: DomainSpec,
    bronze: RawStore,
    silver: CleanStore,
    dimensions: DimensionResolver,
    facts: FactStore,
    pass: Mutex<()>,
}

impl DomainPipeline {
    /// Creates an empty pipeline for `spec`.
    #[must_use]
    pub fn new(spec: DomainSpec) -> Self {
        Self::from_parts(
            spec,
            RawStore::new(),
            CleanStore::new(),
            DimensionResolver::new(),
            FactStore::new(),
        )
    }

    fn from_parts(
        spec: DomainSpec,
        bronze: RawStore,
        silver: CleanStore,
        dimensions: DimensionResolver,
        facts: FactStore,
    ) -> Self {
        Self {
            spec,
            bronze,
            silver,
            dimensions,
            facts,
            pass: Mutex::new(()),
        }
    }

    /// The domain this pipeline serves.
    #[must_use]
    pub const fn spec(&self) -> &DomainSpec {
        &self.spec
    }

    /// Domain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Captures samples into bronze, stamped with the current time.
    pub fn ingest(&self, samples: impl IntoIterator<Item = MetricSample>) -> AppendReport {
        self.ingest_at(samples, Utc::now())
    }

    /// Captures samples into bronze, stamped with `ingested_at`.
    pub fn ingest_at(
        &self,
        samples: impl IntoIterator<Item = MetricSample>,
        ingested_at: DateTime<Utc>,
    ) -> AppendReport {
        self.bronze.ingest(samples, ingested_at)
    }

    /// Promotes the current bronze snapshot into silver.
    pub fn promote(&self) -> PromoteReport {
        let _pass = self.pass.lock();
        self.promote_locked()
    }

    /// Rolls the current silver snapshot up into gold.
    ///
    /// # Errors
    ///
    /// Returns an error if a fact cannot be linked to its dimensions.
    pub fn rollup(&self) -> Result<RollupReport> {
        let _pass = self.pass.lock();
        self.rollup_locked()
    }

    /// Runs promotion then rollup as one pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollup fails. Promotion results are kept, and
    /// a rerun only inserts what is missing.
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let _pass = self.pass.lock();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        debug!(domain = %self.spec.name, %run_id, "cycle started");

        let promote = self.promote_locked();
        let rollup = self.rollup_locked()?;

        info!(
            domain = %self.spec.name,
            %run_id,
            admitted = promote.admitted,
            inserted = rollup.inserted,
            "cycle finished"
        );
        Ok(CycleReport {
            run_id,
            domain: self.spec.name.clone(),
            started_at,
            promote,
            rollup,
        })
    }

    fn promote_locked(&self) -> PromoteReport {
        self.silver.promote(&self.bronze.snapshot())
    }

    fn rollup_locked(&self) -> Result<RollupReport> {
        FactBuilder::new(self.dimensions.clone(), self.facts.clone())
            .rollup(&self.silver.snapshot())
    }

    /// Read-only query surface over this domain's gold layer.
    #[must_use]
    pub fn query(&self) -> QuerySurface {
        QuerySurface::new(self.facts.clone(), self.dimensions.clone())
    }

    /// Handle to the bronze store.
    #[must_use]
    pub const fn bronze(&self) -> &RawStore {
        &self.bronze
    }

    /// Handle to the silver store.
    #[must_use]
    pub const fn silver(&self) -> &CleanStore {
        &self.silver
    }

    /// Handle to the dimension tables.
    #[must_use]
    pub const fn dimensions(&self) -> &DimensionResolver {
        &self.dimensions
    }

    /// Handle to the fact store.
    #[must_use]
    pub const fn facts(&self) -> &FactStore {
        &self.facts
    }

    /// Row counts of every store.
    #[must_use]
    pub fn stats(&self) -> DomainStats {
        let (resources, metrics, time_buckets) = self.dimensions.counts();
        DomainStats {
            domain: self.spec.name.clone(),
            bronze: self.bronze.len(),
            silver: self.silver.len(),
            resources,
            metrics,
            time_buckets,
            facts: self.facts.len(),
        }
    }

    /// Writes every store to `dir`.
    ///
    /// Bronze rows another writer saved to `dir` since this pipeline was
    /// loaded are merged in first, so bronze on disk only ever grows. Silver,
    /// dimensions and facts are replaced; the next cycle derives them again
    /// from the merged bronze.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved bronze cannot be read or any snapshot
    /// cannot be written.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        let _pass = self.pass.lock();
        let merged = self.merge_saved_bronze(dir)?;
        if merged.inserted > 0 {
            debug!(
                domain = %self.spec.name,
                inserted = merged.inserted,
                "picked up bronze saved by another writer"
            );
        }
        JsonStore::new(dir, BRONZE_FILE).save(&self.bronze.snapshot())?;
        JsonStore::new(dir, SILVER_FILE).save(&self.silver.snapshot())?;
        JsonStore::new(dir, DIMENSIONS_FILE).save(&self.dimensions.snapshot())?;
        JsonStore::new(dir, FACTS_FILE).save(&self.facts.snapshot())?;
        debug!(domain = %self.spec.name, dir = %dir.display(), "domain saved");
        Ok(())
    }

    /// Appends the bronze rows saved under `dir` that this pipeline has not
    /// seen yet. Rows already present count as duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved bronze snapshot cannot be read.
    pub fn merge_saved_bronze(&self, dir: &Path) -> Result<AppendReport> {
        let saved: Vec<RawMetricRecord> =
            JsonStore::new(dir, BRONZE_FILE).load()?.unwrap_or_default();
        Ok(self.bronze.append_batch(saved))
    }

    /// Restores a pipeline from `dir`. Missing files restore as empty stores.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot exists but cannot be read.
    pub fn load_from(dir: &Path, spec: DomainSpec) -> Result<Self> {
        let bronze: Vec<RawMetricRecord> =
            JsonStore::new(dir, BRONZE_FILE).load()?.unwrap_or_default();
        let silver: Vec<CleanMetricRecord> =
            JsonStore::new(dir, SILVER_FILE).load()?.unwrap_or_default();
        let dimensions: DimensionSnapshot =
            JsonStore::new(dir, DIMENSIONS_FILE).load()?.unwrap_or_default();
        let facts: Vec<FactRecord> = JsonStore::new(dir, FACTS_FILE).load()?.unwrap_or_default();

        let pipeline = Self::from_parts(
            spec,
            RawStore::from_records(bronze),
            CleanStore::from_records(silver),
            DimensionResolver::from_snapshot(dimensions),
            FactStore::from_facts(facts),
        );
        let stats = pipeline.stats();
        debug!(
            domain = %stats.domain,
            bronze = stats.bronze,
            silver = stats.silver,
            facts = stats.facts,
            "domain loaded"
        );
        Ok(pipeline)
    }
}

/// Counts for routing a batch of samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Per-domain append counts, in configured domain order.
    pub domains: Vec<(String, AppendReport)>,
    /// Samples whose resource type no domain accepts.
    pub unrouted: usize,
}

impl IngestReport {
    /// Records newly stored across all domains.
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.domains.iter().map(|(_, r)| r.inserted).sum()
    }

    /// Duplicates absorbed across all domains.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.domains.iter().map(|(_, r)| r.duplicates).sum()
    }
}

/// A domain whose cycle failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFailure {
    /// Domain name.
    pub domain: String,
    /// Error message.
    pub error: String,
}

/// Outcome of a warehouse-wide cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseReport {
    /// Domains that completed.
    pub cycles: Vec<CycleReport>,
    /// Domains that failed.
    pub failures: Vec<DomainFailure>,
}

impl WarehouseReport {
    /// Returns true if every domain completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// All domain pipelines of one tenant.
#[derive(Debug)]
pub struct Warehouse {
    config: PipelineConfig,
    domains: Vec<DomainPipeline>,
}

impl Warehouse {
    /// Creates a warehouse with empty stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let domains = config
            .domains
            .iter()
            .cloned()
            .map(DomainPipeline::new)
            .collect();
        Ok(Self { config, domains })
    }

    /// Opens a warehouse, restoring each domain from its state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a snapshot is
    /// unreadable.
    pub fn open(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let domains = config
            .domains
            .iter()
            .map(|spec| DomainPipeline::load_from(&config.domain_dir(&spec.name), spec.clone()))
            .collect::<Result<Vec<_>>>()?;
        info!(
            tenant = %config.tenant,
            domains = domains.len(),
            "warehouse opened"
        );
        Ok(Self { config, domains })
    }

    /// Saves every domain under the tenant's state directory.
    ///
    /// # Errors
    ///
    /// Returns an error on the first domain that cannot be saved.
    pub fn save(&self) -> Result<()> {
        for pipeline in &self.domains {
            pipeline.save_to(&self.config.domain_dir(pipeline.name()))?;
        }
        Ok(())
    }

    /// Merges bronze rows saved by other writers into every domain, so the
    /// next cycle promotes them.
    ///
    /// Returns the number of rows picked up.
    ///
    /// # Errors
    ///
    /// Returns an error on the first domain whose saved bronze cannot be read.
    pub fn refresh(&self) -> Result<usize> {
        let mut picked_up = 0;
        for pipeline in &self.domains {
            let report = pipeline.merge_saved_bronze(&self.config.domain_dir(pipeline.name()))?;
            picked_up += report.inserted;
        }
        if picked_up > 0 {
            info!(tenant = %self.config.tenant, records = picked_up, "saved bronze merged");
        }
        Ok(picked_up)
    }

    /// The configuration this warehouse was built from.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tenant name.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.config.tenant
    }

    /// Looks up a domain pipeline by name.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnknownDomain` if no such domain is configured.
    pub fn domain(&self, name: &str) -> Result<&DomainPipeline> {
        self.domains
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| PipelineError::UnknownDomain {
                name: name.to_string(),
            })
    }

    /// All domain pipelines in configured order.
    #[must_use]
    pub fn domains(&self) -> &[DomainPipeline] {
        &self.domains
    }

    /// Routes samples to their domains, stamped with the current time.
    pub fn ingest(&self, samples: impl IntoIterator<Item = MetricSample>) -> IngestReport {
        self.ingest_at(samples, Utc::now())
    }

    /// Routes samples to their domains by resource type.
    ///
    /// Samples no domain accepts are counted and dropped.
    pub fn ingest_at(
        &self,
        samples: impl IntoIterator<Item = MetricSample>,
        ingested_at: DateTime<Utc>,
    ) -> IngestReport {
        let mut batches: Vec<Vec<MetricSample>> = vec![Vec::new(); self.domains.len()];
        let mut unrouted = 0;
        for sample in samples {
            let owner = sample.resource_type.as_deref().and_then(|kind| {
                self.domains.iter().position(|p| p.spec().accepts(kind))
            });
            match owner {
                Some(index) => batches[index].push(sample),
                None => unrouted += 1,
            }
        }

        if unrouted > 0 {
            warn!(tenant = %self.config.tenant, unrouted, "samples matched no domain");
        }

        let domains = self
            .domains
            .iter()
            .zip(batches)
            .map(|(pipeline, batch)| {
                (
                    pipeline.name().to_string(),
                    pipeline.ingest_at(batch, ingested_at),
                )
            })
            .collect();

        IngestReport { domains, unrouted }
    }

    /// Runs every domain's cycle concurrently.
    ///
    /// A failing domain is reported and does not stop the others.
    pub fn run_cycle(&self) -> WarehouseReport {
        let results: Vec<(String, Result<CycleReport>)> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .domains
                .iter()
                .map(|pipeline| (pipeline.name(), scope.spawn(move || pipeline.run_cycle())))
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(PipelineError::Storage {
                            reason: "domain cycle panicked".to_string(),
                        })
                    });
                    (name.to_string(), result)
                })
                .collect()
        });

        let mut report = WarehouseReport::default();
        for (domain, result) in results {
            match result {
                Ok(cycle) => report.cycles.push(cycle),
                Err(e) => {
                    warn!(tenant = %self.config.tenant, domain = %domain, error = %e, "domain cycle failed");
                    report.failures.push(DomainFailure {
                        domain,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Window used when a query gives no explicit range.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidTimeRange` if the window reaches past
    /// the earliest representable time.
    pub fn default_range(&self) -> Result<TimeRange> {
        TimeRange::last_days(i64::from(self.config.default_window_days))
    }

    /// Queries facts across every domain.
    #[must_use]
    pub fn query(&self, query: &FactQuery) -> Vec<FactView> {
        let mut views: Vec<FactView> = self
            .domains
            .iter()
            .flat_map(|p| p.query().facts(query))
            .collect();
        views.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
                .then_with(|| a.metric_name.cmp(&b.metric_name))
        });
        views
    }

    /// Summarizes the facts a query matches.
    #[must_use]
    pub fn summary(&self, query: &FactQuery) -> Vec<UtilizationSummary> {
        summarize(&self.query(query))
    }

    /// Row counts of every domain.
    #[must_use]
    pub fn stats(&self) -> Vec<DomainStats> {
        self.domains.iter().map(DomainPipeline::stats).collect()
    }
}
