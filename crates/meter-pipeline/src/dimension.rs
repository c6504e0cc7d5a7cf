//! Dimension resolver: stable surrogate keys for resources, metrics and
//! hour buckets.
//!
//! Facts reference dimensions by surrogate key rather than natural key. Each
//! table sits behind its own write lock and allocates keys under it, so an
//! upsert for one natural key is atomic: concurrent resolves of the same
//! resource see one row and one key, never a half-written row.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fingerprint::hour_start;
use crate::types::{CleanMetricRecord, ResourceAttributes};

/// Surrogate key of a [`ResourceDimension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(pub u64);

/// Surrogate key of a [`MetricDimension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey(pub u64);

/// Surrogate key of a [`TimeBucketDimension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeKey(pub u64);

/// A physical resource, keyed by its lower-cased resource id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDimension {
    /// Surrogate key.
    pub key: ResourceKey,
    /// Natural key (lower-cased resource id).
    pub resource_id: String,
    /// Latest observed descriptive attributes.
    pub attributes: ResourceAttributes,
    /// Timestamp passed to the first resolve; never changes afterwards.
    pub first_seen: DateTime<Utc>,
    /// Latest timestamp passed to any resolve.
    pub last_seen: DateTime<Utc>,
}

/// A metric definition. The first writer's unit and description win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDimension {
    /// Surrogate key.
    pub key: MetricKey,
    /// Metric name.
    pub name: String,
    /// Unit recorded at first insert.
    pub unit: String,
    /// Description recorded at first insert.
    pub description: String,
}

/// An hour bucket with decomposed calendar fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucketDimension {
    /// Surrogate key.
    pub key: TimeKey,
    /// Start of the hour.
    pub hour_start: DateTime<Utc>,
    /// Calendar year.
    pub year: i32,
    /// Calendar month (1-12).
    pub month: u32,
    /// Day of month (1-31).
    pub day: u32,
    /// Hour of day (0-23).
    pub hour: u32,
}

impl TimeBucketDimension {
    fn new(key: TimeKey, hour_start: DateTime<Utc>) -> Self {
        Self {
            key,
            hour_start,
            year: hour_start.year(),
            month: hour_start.month(),
            day: hour_start.day(),
            hour: hour_start.hour(),
        }
    }
}

/// New rows created while absorbing a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsorbReport {
    /// Resources inserted (updates not counted).
    pub resources: usize,
    /// Metric definitions inserted.
    pub metrics: usize,
    /// Hour buckets inserted.
    pub time_buckets: usize,
}

/// Serializable copy of all three tables, ordered by surrogate key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSnapshot {
    /// Resource rows.
    pub resources: Vec<ResourceDimension>,
    /// Metric rows.
    pub metrics: Vec<MetricDimension>,
    /// Hour bucket rows.
    pub time_buckets: Vec<TimeBucketDimension>,
}

/// One dimension table: rows by natural key plus a reverse index by
/// surrogate key.
#[derive(Debug)]
struct Table<N, V> {
    rows: HashMap<N, V>,
    by_key: HashMap<u64, N>,
    next_key: u64,
}

impl<N: Eq + Hash + Clone, V: Clone> Table<N, V> {
    fn new() -> Self {
        Self {
            rows: HashMap::new(),
            by_key: HashMap::new(),
            next_key: 1,
        }
    }

    fn restore(rows: Vec<V>, natural: impl Fn(&V) -> N, key: impl Fn(&V) -> u64) -> Self {
        let mut table = Self::new();
        for row in rows {
            let k = key(&row);
            let n = natural(&row);
            table.next_key = table.next_key.max(k + 1);
            table.by_key.insert(k, n.clone());
            table.rows.insert(n, row);
        }
        table
    }

    fn allocate(&mut self, natural: N, build: impl FnOnce(u64) -> V) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.by_key.insert(key, natural.clone());
        self.rows.insert(natural, build(key));
        key
    }

    fn by_key(&self, key: u64) -> Option<&V> {
        self.by_key.get(&key).and_then(|n| self.rows.get(n))
    }

    fn sorted(&self, key: impl Fn(&V) -> u64) -> Vec<V> {
        let mut rows: Vec<V> = self.rows.values().cloned().collect();
        rows.sort_by_key(|row| key(row));
        rows
    }
}

/// Thread-safe resolver for the three dimensions of one domain.
///
/// Cloning yields another handle to the same tables.
#[derive(Debug, Clone)]
pub struct DimensionResolver {
    resources: Arc<RwLock<Table<String, ResourceDimension>>>,
    metrics: Arc<RwLock<Table<String, MetricDimension>>>,
    time_buckets: Arc<RwLock<Table<DateTime<Utc>, TimeBucketDimension>>>,
}

impl Default for DimensionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DimensionResolver {
    /// Creates a resolver with empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: Arc::new(RwLock::new(Table::new())),
            metrics: Arc::new(RwLock::new(Table::new())),
            time_buckets: Arc::new(RwLock::new(Table::new())),
        }
    }

    /// Rebuilds a resolver from a snapshot, continuing key allocation after
    /// the highest restored key of each table.
    #[must_use]
    pub fn from_snapshot(snapshot: DimensionSnapshot) -> Self {
        Self {
            resources: Arc::new(RwLock::new(Table::restore(
                snapshot.resources,
                |r| r.resource_id.clone(),
                |r| r.key.0,
            ))),
            metrics: Arc::new(RwLock::new(Table::restore(
                snapshot.metrics,
                |m| m.name.clone(),
                |m| m.key.0,
            ))),
            time_buckets: Arc::new(RwLock::new(Table::restore(
                snapshot.time_buckets,
                |t| t.hour_start,
                |t| t.key.0,
            ))),
        }
    }

    /// Inserts or updates a resource.
    ///
    /// Descriptive attributes are overwritten with `attributes`; `first_seen`
    /// keeps the value from the first call.
    pub fn resolve_resource(
        &self,
        resource_id: &str,
        attributes: &ResourceAttributes,
        seen_at: DateTime<Utc>,
    ) -> ResourceKey {
        self.upsert_resource(resource_id, attributes, seen_at).0
    }

    fn upsert_resource(
        &self,
        resource_id: &str,
        attributes: &ResourceAttributes,
        seen_at: DateTime<Utc>,
    ) -> (ResourceKey, bool) {
        let natural = resource_id.to_lowercase();
        let mut table = self.resources.write();

        if let Some(row) = table.rows.get_mut(&natural) {
            row.attributes = attributes.clone();
            row.last_seen = row.last_seen.max(seen_at);
            return (row.key, false);
        }

        let key = table.allocate(natural.clone(), |key| ResourceDimension {
            key: ResourceKey(key),
            resource_id: natural,
            attributes: attributes.clone(),
            first_seen: seen_at,
            last_seen: seen_at,
        });
        (ResourceKey(key), true)
    }

    /// Inserts a metric definition if the name is unknown.
    ///
    /// A later call with a different unit is ignored.
    pub fn resolve_metric(&self, name: &str, unit: &str, description: &str) -> MetricKey {
        self.insert_metric(name, unit, description).0
    }

    fn insert_metric(&self, name: &str, unit: &str, description: &str) -> (MetricKey, bool) {
        let mut table = self.metrics.write();

        if let Some(row) = table.rows.get(name) {
            if row.unit != unit {
                debug!(
                    metric = name,
                    kept_unit = %row.unit,
                    ignored_unit = unit,
                    "metric unit differs from first observation"
                );
            }
            return (row.key, false);
        }

        let key = table.allocate(name.to_string(), |key| MetricDimension {
            key: MetricKey(key),
            name: name.to_string(),
            unit: unit.to_string(),
            description: description.to_string(),
        });
        (MetricKey(key), true)
    }

    /// Inserts the hour bucket containing `ts` if unknown.
    pub fn resolve_time_bucket(&self, ts: DateTime<Utc>) -> TimeKey {
        self.insert_time_bucket(ts).0
    }

    fn insert_time_bucket(&self, ts: DateTime<Utc>) -> (TimeKey, bool) {
        let hour = hour_start(ts);
        let mut table = self.time_buckets.write();

        if let Some(row) = table.rows.get(&hour) {
            return (row.key, false);
        }

        let key = table.allocate(hour, |key| TimeBucketDimension::new(TimeKey(key), hour));
        (TimeKey(key), true)
    }

    /// Resolves every dimension a silver batch references.
    ///
    /// Records are visited in timestamp order so the attributes of the most
    /// recent observation of a resource are the ones left in place.
    pub fn absorb(&self, records: &[CleanMetricRecord]) -> AbsorbReport {
        let mut ordered: Vec<&CleanMetricRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut report = AbsorbReport::default();
        for record in ordered {
            if self
                .upsert_resource(&record.resource_id, &record.resource, record.timestamp)
                .1
            {
                report.resources += 1;
            }
            if self
                .insert_metric(&record.metric_name, &record.unit, &record.description)
                .1
            {
                report.metrics += 1;
            }
            if self.insert_time_bucket(record.timestamp).1 {
                report.time_buckets += 1;
            }
        }
        report
    }

    /// Looks up a resource by id (case-insensitive).
    #[must_use]
    pub fn resource(&self, resource_id: &str) -> Option<ResourceDimension> {
        self.resources
            .read()
            .rows
            .get(&resource_id.to_lowercase())
            .cloned()
    }

    /// Looks up a resource by surrogate key.
    #[must_use]
    pub fn resource_by_key(&self, key: ResourceKey) -> Option<ResourceDimension> {
        self.resources.read().by_key(key.0).cloned()
    }

    /// Looks up a metric definition by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<MetricDimension> {
        self.metrics.read().rows.get(name).cloned()
    }

    /// Looks up a metric definition by surrogate key.
    #[must_use]
    pub fn metric_by_key(&self, key: MetricKey) -> Option<MetricDimension> {
        self.metrics.read().by_key(key.0).cloned()
    }

    /// Looks up the hour bucket containing `ts`.
    #[must_use]
    pub fn time_bucket(&self, ts: DateTime<Utc>) -> Option<TimeBucketDimension> {
        self.time_buckets.read().rows.get(&hour_start(ts)).cloned()
    }

    /// Looks up an hour bucket by surrogate key.
    #[must_use]
    pub fn time_bucket_by_key(&self, key: TimeKey) -> Option<TimeBucketDimension> {
        self.time_buckets.read().by_key(key.0).cloned()
    }

    /// Row counts as (resources, metrics, time buckets).
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.resources.read().rows.len(),
            self.metrics.read().rows.len(),
            self.time_buckets.read().rows.len(),
        )
    }

    /// Copies all three tables.
    #[must_use]
    pub fn snapshot(&self) -> DimensionSnapshot {
        DimensionSnapshot {
            resources: self.resources.read().sorted(|r| r.key.0),
            metrics: self.metrics.read().sorted(|m| m.key.0),
            time_buckets: self.time_buckets.read().sorted(|t| t.key.0),
        }
    }
}
