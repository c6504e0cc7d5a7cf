//! Medallion ingestion pipeline for cloud resource metrics.
#![forbid(unsafe_code)]
//!
//! `meter-pipeline` turns at-least-once deliveries of cloud monitoring
//! samples into hourly, deduplicated fact rows that downstream reports can
//! read without knowing how the data arrived.
//!
//! # Layers
//!
//! - **Bronze** ([`RawStore`]): append-only capture, one row per fingerprint
//! - **Silver** ([`CleanStore`]): null-normalized records, never overwritten
//! - **Dimensions** ([`DimensionResolver`]): resources, metrics, hour buckets
//! - **Gold** ([`FactBuilder`], [`FactStore`]): hourly means per resource and metric
//! - **Query** ([`QuerySurface`], [`summarize`]): filtered fact views and summaries
//!
//! Every layer is keyed by a BLAKE3 fingerprint, so replaying a window or
//! rerunning a pass inserts only what is missing.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use meter_pipeline::{FactQuery, MetricSample, PipelineConfig, Warehouse};
//!
//! let warehouse = Warehouse::new(PipelineConfig::default()).unwrap();
//! let at = Utc.with_ymd_and_hms(2025, 1, 1, 10, 15, 30).unwrap();
//!
//! warehouse.ingest([
//!     MetricSample::new("i-123", at, "CPUUtilization", 10.0).resource_type("ec2_instance"),
//!     MetricSample::new("i-123", at + chrono::Duration::minutes(5), "CPUUtilization", 30.0)
//!         .resource_type("ec2_instance"),
//! ]);
//! warehouse.run_cycle();
//!
//! let facts = warehouse.query(&FactQuery::new().with_resource("i-123"));
//! assert_eq!(facts[0].value, 20.0);
//! ```

#![doc(html_root_url = "https://docs.rs/meter-pipeline/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bronze;
pub mod config;
pub mod dimension;
pub mod domain;
pub mod error;
pub mod fact;
pub mod fingerprint;
pub mod persist;
pub mod pipeline;
pub mod query;
pub mod rollup;
pub mod silver;
pub mod summary;
pub mod types;

// Re-export main types at crate root
pub use bronze::{AppendOutcome, AppendReport, RawStore};
pub use config::PipelineConfig;
pub use dimension::{
    DimensionResolver, DimensionSnapshot, MetricDimension, MetricKey, ResourceDimension,
    ResourceKey, TimeBucketDimension, TimeKey,
};
pub use domain::DomainSpec;
pub use error::{PipelineError, Result};
pub use fact::{FactRecord, FactStore, MergedAttributes};
pub use fingerprint::{fact_fingerprint, record_fingerprint};
pub use persist::JsonStore;
pub use pipeline::{
    CycleReport, DomainFailure, DomainPipeline, DomainStats, IngestReport, Warehouse,
    WarehouseReport,
};
pub use query::{FactQuery, FactView, QuerySurface};
pub use rollup::{FactBuilder, RollupReport};
pub use silver::{CleanStore, PromoteReport};
pub use summary::{UtilizationSummary, summarize};
pub use types::{
    AttributeMap, CleanMetricRecord, Fingerprint, MetricSample, RawMetricRecord,
    ResourceAttributes, TimeRange,
};
