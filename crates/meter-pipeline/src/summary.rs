//! Per-resource utilization summaries over queried facts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::FactView;
use crate::rollup::mean;

/// Average and peak of one metric on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSummary {
    /// Lower-cased resource id.
    pub resource_id: String,
    /// Resource name from the latest fact.
    pub resource_name: String,
    /// Resource type from the latest fact.
    pub resource_type: String,
    /// Parent id from the latest fact.
    pub parent_id: String,
    /// Region from the latest fact.
    pub region: String,
    /// Metric name.
    pub metric_name: String,
    /// Unit from the latest fact.
    pub unit: String,
    /// Mean of the hourly values.
    pub avg: f64,
    /// Largest hourly value.
    pub max: f64,
    /// Hour at which `max` was reached, the latest on ties.
    pub max_at: DateTime<Utc>,
    /// Hourly facts considered.
    pub fact_count: usize,
}

struct Acc<'a> {
    latest: &'a FactView,
    values: Vec<f64>,
    max: f64,
    max_at: DateTime<Utc>,
}

impl<'a> Acc<'a> {
    fn new(view: &'a FactView) -> Self {
        Self {
            latest: view,
            values: vec![view.value],
            max: view.value,
            max_at: view.timestamp,
        }
    }

    fn push(&mut self, view: &'a FactView) {
        self.values.push(view.value);
        if view.value > self.max || (view.value == self.max && view.timestamp > self.max_at) {
            self.max = view.value;
            self.max_at = view.timestamp;
        }
        if view.timestamp >= self.latest.timestamp {
            self.latest = view;
        }
    }
}

/// Summarizes fact views per (resource, metric), sorted by resource then metric.
#[must_use]
pub fn summarize(views: &[FactView]) -> Vec<UtilizationSummary> {
    let mut groups: BTreeMap<(&str, &str), Acc<'_>> = BTreeMap::new();
    for view in views {
        groups
            .entry((view.resource_id.as_str(), view.metric_name.as_str()))
            .and_modify(|acc| acc.push(view))
            .or_insert_with(|| Acc::new(view));
    }

    groups
        .into_values()
        .map(|acc| UtilizationSummary {
            resource_id: acc.latest.resource_id.clone(),
            resource_name: acc.latest.resource_name.clone(),
            resource_type: acc.latest.resource_type.clone(),
            parent_id: acc.latest.parent_id.clone(),
            region: acc.latest.region.clone(),
            metric_name: acc.latest.metric_name.clone(),
            unit: acc.latest.unit.clone(),
            avg: mean(&acc.values),
            max: acc.max,
            max_at: acc.max_at,
            fact_count: acc.values.len(),
        })
        .collect()
}
