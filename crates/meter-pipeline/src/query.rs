//! Read-only query surface over gold facts.
//!
//! Callers filter by resource, metric, resource type and time without knowing
//! the dimensional layout: each [`FactView`] is a fact joined with its hour
//! bucket, flattened into one row. Nothing here aggregates beyond what the
//! rollup already stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dimension::DimensionResolver;
use crate::fact::{FactRecord, FactStore, MergedAttributes};
use crate::types::TimeRange;

/// Filter criteria for fact queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactQuery {
    /// Resource id, compared case-insensitively.
    pub resource_id: Option<String>,
    /// Exact metric name.
    pub metric_name: Option<String>,
    /// Resource type tag, compared case-insensitively.
    pub resource_type: Option<String>,
    /// Inclusive window on the hour start.
    pub range: Option<TimeRange>,
}

impl FactQuery {
    /// Creates a query matching every fact.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one resource.
    #[must_use]
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Restricts to one metric.
    #[must_use]
    pub fn with_metric(mut self, metric_name: impl Into<String>) -> Self {
        self.metric_name = Some(metric_name.into());
        self
    }

    /// Restricts to one resource type.
    #[must_use]
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    /// Restricts to a time window.
    #[must_use]
    pub const fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Checks whether a fact passes every set filter.
    #[must_use]
    pub fn matches(&self, fact: &FactRecord) -> bool {
        if let Some(id) = &self.resource_id {
            if !fact.resource_id.eq_ignore_ascii_case(id) {
                return false;
            }
        }
        if let Some(metric) = &self.metric_name {
            if fact.metric_name != *metric {
                return false;
            }
        }
        if let Some(kind) = &self.resource_type {
            if !fact.resource.resource_type.eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        if let Some(range) = &self.range {
            if !range.contains(fact.hour_start) {
                return false;
            }
        }
        true
    }
}

/// One fact flattened with its identity and calendar fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactView {
    /// Lower-cased resource id.
    pub resource_id: String,
    /// Parent/grouping id.
    pub parent_id: String,
    /// Resource name.
    pub resource_name: String,
    /// Resource type tag.
    pub resource_type: String,
    /// Region.
    pub region: String,
    /// Account id.
    pub account_id: String,
    /// Metric name.
    pub metric_name: String,
    /// Hourly mean.
    pub value: f64,
    /// Unit.
    pub unit: String,
    /// Hour start.
    pub timestamp: DateTime<Utc>,
    /// Calendar year of the hour bucket.
    pub year: i32,
    /// Calendar month of the hour bucket.
    pub month: u32,
    /// Day of month of the hour bucket.
    pub day: u32,
    /// Hour of day of the hour bucket.
    pub hour: u32,
    /// Contributing sample count.
    pub sample_count: u64,
    /// Merged attribute maps.
    pub attributes: Option<MergedAttributes>,
}

/// Read path over one domain's facts and dimensions.
#[derive(Debug, Clone)]
pub struct QuerySurface {
    facts: FactStore,
    dimensions: DimensionResolver,
}

impl QuerySurface {
    /// Creates a query surface over shared stores.
    #[must_use]
    pub const fn new(facts: FactStore, dimensions: DimensionResolver) -> Self {
        Self { facts, dimensions }
    }

    /// Returns matching facts ordered by timestamp, resource id, metric.
    #[must_use]
    pub fn facts(&self, query: &FactQuery) -> Vec<FactView> {
        let mut views: Vec<FactView> = self
            .facts
            .snapshot()
            .into_iter()
            .filter(|fact| query.matches(fact))
            .map(|fact| self.flatten(fact))
            .collect();
        views.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
                .then_with(|| a.metric_name.cmp(&b.metric_name))
        });
        views
    }

    fn flatten(&self, fact: FactRecord) -> FactView {
        let (year, month, day, hour) = self
            .dimensions
            .time_bucket_by_key(fact.time_key)
            .map_or_else(
                || calendar(fact.hour_start),
                |bucket| (bucket.year, bucket.month, bucket.day, bucket.hour),
            );

        FactView {
            resource_id: fact.resource_id,
            parent_id: fact.resource.parent_id,
            resource_name: fact.resource.name,
            resource_type: fact.resource.resource_type,
            region: fact.resource.region,
            account_id: fact.resource.account_id,
            metric_name: fact.metric_name,
            value: fact.value,
            unit: fact.unit,
            timestamp: fact.hour_start,
            year,
            month,
            day,
            hour,
            sample_count: fact.sample_count,
            attributes: fact.attributes,
        }
    }
}

fn calendar(ts: DateTime<Utc>) -> (i32, u32, u32, u32) {
    use chrono::{Datelike, Timelike};
    (ts.year(), ts.month(), ts.day(), ts.hour())
}
