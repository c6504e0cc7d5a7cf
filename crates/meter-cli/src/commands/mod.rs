//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`ingest`] - Capture JSON-lines samples
//! - [`run`] - Promote and roll up, once or on a schedule
//! - [`query`] - Fact listing and utilization summaries
//! - [`status`] - Per-domain row counts

pub mod ingest;
pub mod query;
pub mod run;
pub mod status;

pub use ingest::IngestCommand;
pub use query::QueryCommand;
pub use run::RunCommand;
pub use status::StatusCommand;
