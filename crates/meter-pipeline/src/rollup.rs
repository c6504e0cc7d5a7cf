//! Gold rollup: collapses silver records into hourly fact rows.
//!
//! Records are grouped by (lower-cased resource id, resource attributes, hour
//! bucket, metric name). Each group becomes one candidate fact keyed by the
//! gold fingerprint, which is inserted only if no fact with that fingerprint
//! exists. Existing facts are never touched, so a late record for an hour
//! that was already rolled up is not reflected in gold.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dimension::{DimensionResolver, MetricKey, ResourceKey, TimeKey};
use crate::error::{PipelineError, Result};
use crate::fact::{FactRecord, FactStore, MergedAttributes};
use crate::fingerprint::{fact_fingerprint, hour_start};
use crate::types::{AttributeMap, CleanMetricRecord, Fingerprint, ResourceAttributes};

/// Counts for one rollup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupReport {
    /// Silver records read.
    pub scanned: usize,
    /// Groups formed.
    pub groups: usize,
    /// Facts inserted.
    pub inserted: usize,
    /// Groups whose fingerprint was already in gold before the insert.
    pub skipped_existing: usize,
    /// Groups that lost the insert to another fact with the same
    /// fingerprint during this pass.
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    resource_id: String,
    resource: ResourceAttributes,
    hour_start: DateTime<Utc>,
    metric_name: String,
}

#[derive(Debug, Default)]
struct UnitTally {
    count: usize,
    last_position: usize,
}

#[derive(Debug, Default)]
struct Group<'a> {
    values: Vec<f64>,
    latest: DateTime<Utc>,
    units: BTreeMap<&'a str, UnitTally>,
    maps: Vec<&'a AttributeMap>,
}

impl<'a> Group<'a> {
    fn add(&mut self, position: usize, record: &'a CleanMetricRecord) {
        self.values.push(record.value);
        self.latest = self.latest.max(record.timestamp);
        let tally = self.units.entry(record.unit.as_str()).or_default();
        tally.count += 1;
        tally.last_position = position;
        if let Some(map) = &record.attributes {
            self.maps.push(map);
        }
    }

    fn count(&self) -> u64 {
        self.values.len() as u64
    }

    /// Most frequent unit; among equally frequent units the one seen last.
    fn unit(&self) -> String {
        self.units
            .iter()
            .max_by_key(|(_, tally)| (tally.count, tally.last_position))
            .map(|(unit, _)| (*unit).to_string())
            .unwrap_or_default()
    }
}

/// Arithmetic mean of `values`, or `0.0` when empty.
///
/// Finite inputs always give a finite mean: if the plain sum overflows, each
/// value is scaled down before summing.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let plain = values.iter().sum::<f64>() / n;
    if plain.is_finite() {
        plain
    } else {
        values.iter().map(|v| v / n).sum()
    }
}

/// Builds gold facts from silver records for one domain.
#[derive(Debug, Clone)]
pub struct FactBuilder {
    dimensions: DimensionResolver,
    facts: FactStore,
}

impl FactBuilder {
    /// Creates a builder writing to `facts` and resolving against
    /// `dimensions`.
    #[must_use]
    pub const fn new(dimensions: DimensionResolver, facts: FactStore) -> Self {
        Self { dimensions, facts }
    }

    /// Rolls a silver batch up into facts.
    ///
    /// Dimensions referenced by the batch are resolved first, then each
    /// group is inserted if its gold fingerprint is new. Running this twice
    /// over the same batch inserts nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Storage` if a dimension row a fact needs is
    /// missing after resolution.
    pub fn rollup(&self, silver: &[CleanMetricRecord]) -> Result<RollupReport> {
        let absorbed = self.dimensions.absorb(silver);
        debug!(
            resources = absorbed.resources,
            metrics = absorbed.metrics,
            time_buckets = absorbed.time_buckets,
            "dimensions resolved"
        );

        let mut ordered: Vec<&CleanMetricRecord> = silver.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut groups: BTreeMap<GroupKey, Group<'_>> = BTreeMap::new();
        for (position, record) in ordered.into_iter().enumerate() {
            let key = GroupKey {
                resource_id: record.resource_id.to_lowercase(),
                resource: record.resource.clone(),
                hour_start: hour_start(record.timestamp),
                metric_name: record.metric_name.clone(),
            };
            groups.entry(key).or_default().add(position, record);
        }

        let mut report = RollupReport {
            scanned: silver.len(),
            groups: groups.len(),
            ..RollupReport::default()
        };

        // Groups that differ only in resource attributes share a gold
        // fingerprint. The one holding the most recent record wins.
        let mut winners: HashMap<Fingerprint, (DateTime<Utc>, &GroupKey)> = HashMap::new();
        let keyed: Vec<(Fingerprint, &GroupKey, &Group<'_>)> = groups
            .iter()
            .map(|(key, group)| {
                let fingerprint =
                    fact_fingerprint(&key.resource_id, key.hour_start, &key.metric_name);
                (fingerprint, key, group)
            })
            .collect();
        for (fingerprint, key, group) in &keyed {
            let candidate = (group.latest, *key);
            winners
                .entry(fingerprint.clone())
                .and_modify(|best| {
                    if candidate > *best {
                        *best = candidate;
                    }
                })
                .or_insert(candidate);
        }

        let mut written: HashSet<Fingerprint> = HashSet::new();
        for (fingerprint, key, group) in keyed {
            if self.facts.contains(&fingerprint) {
                if written.contains(&fingerprint) {
                    report.conflicts += 1;
                } else {
                    report.skipped_existing += 1;
                }
                continue;
            }
            if winners.get(&fingerprint).is_some_and(|(_, winner)| *winner != key) {
                report.conflicts += 1;
                continue;
            }

            let fact = FactRecord {
                fingerprint: fingerprint.clone(),
                resource_key: self.resource_key(&key.resource_id)?,
                metric_key: self.metric_key(&key.metric_name)?,
                time_key: self.time_key(key.hour_start)?,
                value: mean(&group.values),
                unit: group.unit(),
                attributes: MergedAttributes::merge(group.maps.iter().copied()),
                sample_count: group.count(),
                resource_id: key.resource_id.clone(),
                resource: key.resource.clone(),
                metric_name: key.metric_name.clone(),
                hour_start: key.hour_start,
            };

            if self.facts.insert_if_absent(fact) {
                written.insert(fingerprint);
                report.inserted += 1;
            } else {
                report.conflicts += 1;
            }
        }

        info!(
            scanned = report.scanned,
            groups = report.groups,
            inserted = report.inserted,
            skipped_existing = report.skipped_existing,
            conflicts = report.conflicts,
            "gold rollup finished"
        );
        Ok(report)
    }

    fn resource_key(&self, resource_id: &str) -> Result<ResourceKey> {
        self.dimensions
            .resource(resource_id)
            .map(|r| r.key)
            .ok_or_else(|| PipelineError::Storage {
                reason: format!("resource dimension missing for '{resource_id}'"),
            })
    }

    fn metric_key(&self, metric_name: &str) -> Result<MetricKey> {
        self.dimensions
            .metric(metric_name)
            .map(|m| m.key)
            .ok_or_else(|| PipelineError::Storage {
                reason: format!("metric dimension missing for '{metric_name}'"),
            })
    }

    fn time_key(&self, hour: DateTime<Utc>) -> Result<TimeKey> {
        self.dimensions
            .time_bucket(hour)
            .map(|t| t.key)
            .ok_or_else(|| PipelineError::Storage {
                reason: format!("time bucket missing for {}", hour.to_rfc3339()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{canonicalize, capture};
    use crate::types::MetricSample;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).single().expect("valid timestamp")
    }

    fn clean(sample: MetricSample) -> CleanMetricRecord {
        canonicalize(&capture(sample, ts(23, 0, 0)))
    }

    fn cpu(resource: &str, at: DateTime<Utc>, value: f64) -> CleanMetricRecord {
        clean(MetricSample::new(resource, at, "CPUUtilization", value).unit("Percent"))
    }

    fn builder() -> (FactBuilder, FactStore, DimensionResolver) {
        let dims = DimensionResolver::new();
        let facts = FactStore::new();
        (FactBuilder::new(dims.clone(), facts.clone()), facts, dims)
    }

    #[test]
    fn mean_and_count_for_one_hour() {
        let (builder, facts, _) = builder();
        let silver = vec![
            cpu("r", ts(10, 0, 0), 10.0),
            cpu("r", ts(10, 20, 0), 20.0),
            cpu("r", ts(10, 40, 0), 30.0),
        ];

        let report = builder.rollup(&silver).expect("rollup");

        assert_eq!(report.inserted, 1);
        let fact = &facts.snapshot()[0];
        assert_eq!(fact.value, 20.0);
        assert_eq!(fact.sample_count, 3);
        assert_eq!(fact.hour_start, ts(10, 0, 0));
        assert_eq!(fact.unit, "Percent");
    }

    #[test]
    fn separate_hours_make_separate_facts() {
        let (builder, facts, _) = builder();
        let silver = vec![cpu("r", ts(10, 59, 59), 1.0), cpu("r", ts(11, 0, 0), 3.0)];

        builder.rollup(&silver).expect("rollup");

        assert_eq!(facts.len(), 2);
    }

    #[test]
    fn resource_id_case_is_folded_into_one_group() {
        let (builder, facts, _) = builder();
        let silver = vec![cpu("I-ABC", ts(10, 0, 0), 1.0), cpu("i-abc", ts(10, 1, 0), 3.0)];

        builder.rollup(&silver).expect("rollup");

        let fact = &facts.snapshot()[0];
        assert_eq!(facts.len(), 1);
        assert_eq!(fact.resource_id, "i-abc");
        assert_eq!(fact.value, 2.0);
    }

    #[test]
    fn second_pass_inserts_nothing() {
        let (builder, facts, _) = builder();
        let silver = vec![cpu("r", ts(10, 0, 0), 1.0), cpu("q", ts(10, 0, 0), 2.0)];

        builder.rollup(&silver).expect("first rollup");
        let before = facts.snapshot();
        let report = builder.rollup(&silver).expect("second rollup");

        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped_existing, 2);
        assert_eq!(facts.snapshot(), before);
    }

    #[test]
    fn late_record_does_not_change_existing_fact() {
        let (builder, facts, _) = builder();
        let mut silver = vec![cpu("r", ts(10, 0, 0), 10.0), cpu("r", ts(10, 10, 0), 20.0)];
        builder.rollup(&silver).expect("first rollup");

        silver.push(cpu("r", ts(10, 30, 0), 90.0));
        builder.rollup(&silver).expect("second rollup");

        let fact = &facts.snapshot()[0];
        assert_eq!(facts.len(), 1);
        assert_eq!(fact.value, 15.0);
        assert_eq!(fact.sample_count, 2);
    }

    #[test]
    fn most_frequent_unit_wins() {
        let (builder, facts, _) = builder();
        let silver = vec![
            clean(MetricSample::new("r", ts(10, 0, 0), "NetworkIn", 1.0).unit("Bytes")),
            clean(MetricSample::new("r", ts(10, 1, 0), "NetworkIn", 1.0).unit("Bytes")),
            clean(MetricSample::new("r", ts(10, 2, 0), "NetworkIn", 1.0).unit("Kilobytes")),
        ];
        builder.rollup(&silver).expect("rollup");
        assert_eq!(facts.snapshot()[0].unit, "Bytes");
    }

    #[test]
    fn unit_tie_goes_to_last_seen() {
        let (builder, facts, _) = builder();
        let silver = vec![
            clean(MetricSample::new("r", ts(10, 5, 0), "NetworkIn", 1.0).unit("Kilobytes")),
            clean(MetricSample::new("r", ts(10, 0, 0), "NetworkIn", 1.0).unit("Bytes")),
        ];
        builder.rollup(&silver).expect("rollup");
        assert_eq!(facts.snapshot()[0].unit, "Kilobytes");
    }

    #[test]
    fn identical_attribute_maps_collapse() {
        let (builder, facts, _) = builder();
        let silver = vec![
            clean(MetricSample::new("r", ts(10, 0, 0), "NetworkIn", 1.0).attribute("az", "1a")),
            clean(MetricSample::new("r", ts(10, 1, 0), "NetworkIn", 1.0).attribute("az", "1a")),
            clean(MetricSample::new("r", ts(10, 2, 0), "NetworkIn", 1.0)),
        ];
        builder.rollup(&silver).expect("rollup");

        let attrs = facts.snapshot()[0].attributes.clone();
        let expected: AttributeMap = [("az".to_string(), json!("1a"))].into_iter().collect();
        assert_eq!(attrs, Some(MergedAttributes::Single(expected)));
    }

    #[test]
    fn distinct_attribute_maps_are_listed() {
        let (builder, facts, _) = builder();
        let silver = vec![
            clean(MetricSample::new("r", ts(10, 0, 0), "NetworkIn", 1.0).attribute("az", "1a")),
            clean(MetricSample::new("r", ts(10, 1, 0), "NetworkIn", 1.0).attribute("az", "1b")),
        ];
        builder.rollup(&silver).expect("rollup");

        match &facts.snapshot()[0].attributes {
            Some(MergedAttributes::Many(maps)) => assert_eq!(maps.len(), 2),
            other => panic!("expected merged list, got {other:?}"),
        }
    }

    #[test]
    fn no_attribute_maps_leave_attributes_absent() {
        let (builder, facts, _) = builder();
        builder
            .rollup(&[cpu("r", ts(10, 0, 0), 1.0)])
            .expect("rollup");
        assert!(facts.snapshot()[0].attributes.is_none());
    }

    #[test]
    fn facts_reference_resolved_dimensions() {
        let (builder, facts, dims) = builder();
        builder
            .rollup(&[cpu("r", ts(10, 30, 0), 1.0)])
            .expect("rollup");

        let fact = &facts.snapshot()[0];
        assert_eq!(
            dims.resource_by_key(fact.resource_key).map(|r| r.resource_id),
            Some("r".to_string())
        );
        assert_eq!(
            dims.metric_by_key(fact.metric_key).map(|m| m.unit),
            Some("Percent".to_string())
        );
        assert_eq!(
            dims.time_bucket_by_key(fact.time_key).map(|t| t.hour_start),
            Some(ts(10, 0, 0))
        );
    }

    #[test]
    fn attribute_drift_within_an_hour_keeps_latest_group() {
        // A mid-hour rename splits the hour into two groups with one gold
        // fingerprint; the group with the newest record becomes the fact.
        let (builder, facts, dims) = builder();
        let silver = vec![
            clean(MetricSample::new("r", ts(10, 0, 0), "CPUUtilization", 1.0).name("beta")),
            clean(MetricSample::new("r", ts(10, 5, 0), "CPUUtilization", 9.0).name("alpha")),
        ];

        let report = builder.rollup(&silver).expect("rollup");

        assert_eq!(report.groups, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.conflicts, 1);
        let fact = &facts.snapshot()[0];
        assert_eq!(fact.resource.name, "alpha");
        assert_eq!(fact.value, 9.0);
        assert_eq!(dims.resource("r").map(|r| r.attributes.name), Some("alpha".to_string()));
    }

    #[test]
    fn attribute_drift_winner_ignores_input_order() {
        let mut silver = vec![
            clean(MetricSample::new("r", ts(10, 50, 0), "CPUUtilization", 4.0).name("alpha")),
            clean(MetricSample::new("r", ts(10, 10, 0), "CPUUtilization", 2.0).name("beta")),
        ];
        let (first, first_facts, _) = builder();
        first.rollup(&silver).expect("rollup");
        silver.reverse();
        let (second, second_facts, _) = builder();
        second.rollup(&silver).expect("rollup");

        assert_eq!(first_facts.snapshot()[0].resource.name, "alpha");
        assert_eq!(first_facts.snapshot(), second_facts.snapshot());
    }

    #[test]
    fn huge_values_keep_a_finite_mean() {
        let (builder, facts, _) = builder();
        let silver = vec![cpu("r", ts(10, 0, 0), 1.5e308), cpu("r", ts(10, 1, 0), 1.5e308)];

        builder.rollup(&silver).expect("rollup");

        let fact = &facts.snapshot()[0];
        assert!(fact.value.is_finite());
        assert!((fact.value - 1.5e308).abs() <= 1e293);
    }

    #[test]
    fn mean_handles_empty_and_mixed_signs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[10.0, 20.0, 30.0]), 20.0);
        assert_eq!(mean(&[f64::MAX, -f64::MAX]), 0.0);
    }

    #[test]
    fn rollup_is_independent_of_input_order() {
        let silver = vec![
            cpu("a", ts(10, 0, 0), 1.0),
            cpu("b", ts(10, 5, 0), 2.0),
            cpu("a", ts(11, 0, 0), 3.0),
            cpu("a", ts(10, 30, 0), 5.0),
        ];
        let mut reversed = silver.clone();
        reversed.reverse();

        let (forward, forward_facts, _) = builder();
        forward.rollup(&silver).expect("rollup");
        let (backward, backward_facts, _) = builder();
        backward.rollup(&reversed).expect("rollup");

        let project = |facts: Vec<FactRecord>| -> Vec<_> {
            facts
                .into_iter()
                .map(|f| (f.fingerprint, f.value.to_bits(), f.sample_count))
                .collect()
        };
        assert_eq!(project(forward_facts.snapshot()), project(backward_facts.snapshot()));
    }
}
