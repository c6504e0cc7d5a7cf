//! Silver layer: canonicalized, fingerprint-deduplicated records.
//!
//! Promotion reads a bronze snapshot and admits every record whose
//! fingerprint the silver store has not seen. It never overwrites, so the
//! store only grows and is always safe to re-aggregate.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fingerprint::canonicalize;
use crate::types::{CleanMetricRecord, Fingerprint, RawMetricRecord};

/// Counts for one promotion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteReport {
    /// Bronze records read.
    pub scanned: usize,
    /// Records newly admitted to silver.
    pub admitted: usize,
    /// Records whose fingerprint silver already held.
    pub duplicates: usize,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<CleanMetricRecord>,
    seen: HashSet<Fingerprint>,
}

/// Thread-safe clean store keyed by record fingerprint.
#[derive(Debug, Clone, Default)]
pub struct CleanStore {
    inner: Arc<RwLock<Inner>>,
}

impl CleanStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from previously promoted records.
    #[must_use]
    pub fn from_records(records: Vec<CleanMetricRecord>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for record in records {
                if inner.seen.insert(record.fingerprint.clone()) {
                    inner.records.push(record);
                }
            }
        }
        store
    }

    /// Canonicalizes `bronze` and admits records with unseen fingerprints.
    ///
    /// Duplicates inside the batch itself are absorbed as well.
    pub fn promote(&self, bronze: &[RawMetricRecord]) -> PromoteReport {
        let mut report = PromoteReport {
            scanned: bronze.len(),
            ..PromoteReport::default()
        };

        let mut inner = self.inner.write();
        for raw in bronze {
            if inner.seen.contains(&raw.fingerprint) {
                report.duplicates += 1;
                continue;
            }
            let clean = canonicalize(raw);
            inner.seen.insert(clean.fingerprint.clone());
            inner.records.push(clean);
            report.admitted += 1;
        }
        drop(inner);

        debug!(
            scanned = report.scanned,
            admitted = report.admitted,
            duplicates = report.duplicates,
            "silver promotion finished"
        );
        report
    }

    /// Returns a copy of every clean record in admission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CleanMetricRecord> {
        self.inner.read().records.clone()
    }

    /// Returns true if a record with this fingerprint was admitted.
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.read().seen.contains(fingerprint)
    }

    /// Number of clean records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if nothing has been promoted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bronze::RawStore;
    use crate::types::MetricSample;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).single().expect("valid timestamp")
    }

    fn bronze_with(samples: Vec<MetricSample>) -> RawStore {
        let store = RawStore::new();
        store.ingest(samples, ts(12, 0, 0));
        store
    }

    #[test]
    fn promote_admits_every_new_record() {
        let bronze = bronze_with(vec![
            MetricSample::new("i-1", ts(10, 0, 0), "CPUUtilization", 1.0),
            MetricSample::new("i-1", ts(10, 5, 0), "CPUUtilization", 2.0),
        ]);
        let silver = CleanStore::new();
        let report = silver.promote(&bronze.snapshot());

        assert_eq!(report.scanned, 2);
        assert_eq!(report.admitted, 2);
        assert_eq!(report.duplicates, 0);
        assert_eq!(silver.len(), 2);
    }

    #[test]
    fn second_promotion_without_new_bronze_changes_nothing() {
        let bronze = bronze_with(vec![
            MetricSample::new("i-1", ts(10, 0, 0), "CPUUtilization", 1.0),
            MetricSample::default(),
        ]);
        let silver = CleanStore::new();
        silver.promote(&bronze.snapshot());
        let before = silver.snapshot();

        let report = silver.promote(&bronze.snapshot());

        assert_eq!(report.admitted, 0);
        assert_eq!(report.duplicates, 2);
        assert_eq!(silver.snapshot(), before);
    }

    #[test]
    fn promotion_picks_up_later_bronze_appends() {
        let bronze = bronze_with(vec![MetricSample::new(
            "i-1",
            ts(10, 0, 0),
            "CPUUtilization",
            1.0,
        )]);
        let silver = CleanStore::new();
        silver.promote(&bronze.snapshot());

        bronze.ingest(
            vec![MetricSample::new("i-1", ts(10, 1, 0), "CPUUtilization", 2.0)],
            ts(12, 30, 0),
        );
        let report = silver.promote(&bronze.snapshot());

        assert_eq!(report.admitted, 1);
        assert_eq!(silver.len(), 2);
    }

    #[test]
    fn promoted_records_are_null_normalized() {
        let bronze = bronze_with(vec![MetricSample::default()]);
        let silver = CleanStore::new();
        silver.promote(&bronze.snapshot());

        let clean = &silver.snapshot()[0];
        assert_eq!(clean.resource_id, "");
        assert_eq!(clean.timestamp, ts(12, 0, 0));
        assert_eq!(clean.value, 0.0);
    }

    #[test]
    fn duplicates_inside_one_batch_are_absorbed() {
        let record = crate::fingerprint::capture(
            MetricSample::new("i-1", ts(10, 0, 0), "CPUUtilization", 1.0),
            ts(12, 0, 0),
        );
        let silver = CleanStore::new();
        let report = silver.promote(&[record.clone(), record]);

        assert_eq!(report.admitted, 1);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn from_records_restores_fingerprint_index() {
        let bronze = bronze_with(vec![MetricSample::new(
            "i-1",
            ts(10, 0, 0),
            "CPUUtilization",
            1.0,
        )]);
        let silver = CleanStore::new();
        silver.promote(&bronze.snapshot());

        let restored = CleanStore::from_records(silver.snapshot());
        let report = restored.promote(&bronze.snapshot());

        assert_eq!(report.admitted, 0);
        assert_eq!(restored.len(), 1);
    }
}
