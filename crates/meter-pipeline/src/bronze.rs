//! Bronze layer: the raw, append-only capture log.
//!
//! Every sample a collector delivers is captured here exactly once per
//! fingerprint. Re-delivery of identical source data is a no-op, so a
//! collector may replay a whole window without coordination.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fingerprint::capture;
use crate::types::{Fingerprint, MetricSample, RawMetricRecord};

/// Result of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    /// The record was stored.
    Inserted,
    /// A record with the same fingerprint already exists.
    Duplicate,
}

/// Counts for a batch append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReport {
    /// Records newly stored.
    pub inserted: usize,
    /// Records absorbed as duplicates.
    pub duplicates: usize,
}

impl AppendReport {
    /// Total records offered.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.inserted + self.duplicates
    }

    fn record(&mut self, outcome: AppendOutcome) {
        match outcome {
            AppendOutcome::Inserted => self.inserted += 1,
            AppendOutcome::Duplicate => self.duplicates += 1,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<RawMetricRecord>,
    seen: HashSet<Fingerprint>,
}

/// Thread-safe raw store keyed by record fingerprint.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct RawStore {
    inner: Arc<RwLock<Inner>>,
}

impl RawStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from previously captured records.
    ///
    /// Records sharing a fingerprint keep only the first occurrence.
    #[must_use]
    pub fn from_records(records: Vec<RawMetricRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.append(record);
        }
        store
    }

    /// Stores `record` unless its fingerprint is already present.
    ///
    /// The check and the insert happen under one write lock.
    pub fn append(&self, record: RawMetricRecord) -> AppendOutcome {
        let mut inner = self.inner.write();
        if !inner.seen.insert(record.fingerprint.clone()) {
            debug!(fingerprint = %record.fingerprint, "duplicate raw record absorbed");
            return AppendOutcome::Duplicate;
        }
        inner.records.push(record);
        AppendOutcome::Inserted
    }

    /// Appends several records.
    pub fn append_batch(&self, records: impl IntoIterator<Item = RawMetricRecord>) -> AppendReport {
        let mut report = AppendReport::default();
        for record in records {
            report.record(self.append(record));
        }
        debug!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            "raw batch appended"
        );
        report
    }

    /// Captures collector samples and appends them, stamping each with
    /// `ingested_at`.
    pub fn ingest(
        &self,
        samples: impl IntoIterator<Item = MetricSample>,
        ingested_at: DateTime<Utc>,
    ) -> AppendReport {
        self.append_batch(
            samples
                .into_iter()
                .map(|sample| capture(sample, ingested_at)),
        )
    }

    /// Returns a copy of every stored record in insertion order.
    ///
    /// Appends that land after the snapshot is taken are not included.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RawMetricRecord> {
        self.inner.read().records.clone()
    }

    /// Returns true if a record with this fingerprint is stored.
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.read().seen.contains(fingerprint)
    }

    /// Looks up a stored record by fingerprint.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<RawMetricRecord> {
        let inner = self.inner.read();
        if !inner.seen.contains(fingerprint) {
            return None;
        }
        inner
            .records
            .iter()
            .find(|r| &r.fingerprint == fingerprint)
            .cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
