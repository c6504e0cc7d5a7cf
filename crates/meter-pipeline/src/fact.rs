//! Gold layer fact rows and their store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dimension::{MetricKey, ResourceKey, TimeKey};
use crate::types::{AttributeMap, Fingerprint, ResourceAttributes};

/// Attribute maps of the records behind one fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergedAttributes {
    /// Every record that carried a map carried this one.
    Single(AttributeMap),
    /// Distinct maps in order of first appearance.
    Many(Vec<AttributeMap>),
}

impl MergedAttributes {
    /// Merges the maps of a group. Returns `None` when no record carried one.
    #[must_use]
    pub fn merge<'a>(maps: impl IntoIterator<Item = &'a AttributeMap>) -> Option<Self> {
        let mut distinct: Vec<AttributeMap> = Vec::new();
        for map in maps {
            if !distinct.contains(map) {
                distinct.push(map.clone());
            }
        }
        match distinct.len() {
            0 => None,
            1 => distinct.pop().map(Self::Single),
            _ => Some(Self::Many(distinct)),
        }
    }

    /// Iterates over the distinct maps.
    pub fn maps(&self) -> impl Iterator<Item = &AttributeMap> {
        match self {
            Self::Single(map) => std::slice::from_ref(map).iter(),
            Self::Many(maps) => maps.iter(),
        }
    }
}

/// One aggregated row per (resource, metric, hour).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Gold fingerprint over (resource id, hour start, metric name).
    pub fingerprint: Fingerprint,
    /// Reference to the resource dimension.
    pub resource_key: ResourceKey,
    /// Reference to the metric dimension.
    pub metric_key: MetricKey,
    /// Reference to the hour bucket dimension.
    pub time_key: TimeKey,
    /// Lower-cased resource id.
    pub resource_id: String,
    /// Resource attributes of the group.
    pub resource: ResourceAttributes,
    /// Metric name.
    pub metric_name: String,
    /// Start of the hour bucket.
    pub hour_start: DateTime<Utc>,
    /// Mean of the contributing values.
    pub value: f64,
    /// Most frequent unit, ties going to the last seen.
    pub unit: String,
    /// Merged attribute maps.
    pub attributes: Option<MergedAttributes>,
    /// Number of contributing silver records.
    pub sample_count: u64,
}

#[derive(Debug, Default)]
struct Inner {
    facts: Vec<FactRecord>,
    index: HashMap<Fingerprint, usize>,
}

/// Append-only fact store keyed by gold fingerprint.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    inner: Arc<RwLock<Inner>>,
}

impl FactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from saved facts.
    #[must_use]
    pub fn from_facts(facts: Vec<FactRecord>) -> Self {
        let store = Self::new();
        for fact in facts {
            store.insert_if_absent(fact);
        }
        store
    }

    /// Returns true if a fact with this fingerprint exists.
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.read().index.contains_key(fingerprint)
    }

    /// Inserts `fact` unless its fingerprint is present. Returns whether it
    /// was inserted. Existing facts are never replaced.
    pub fn insert_if_absent(&self, fact: FactRecord) -> bool {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&fact.fingerprint) {
            return false;
        }
        let position = inner.facts.len();
        inner.index.insert(fact.fingerprint.clone(), position);
        inner.facts.push(fact);
        true
    }

    /// Looks up a fact by fingerprint.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<FactRecord> {
        let inner = self.inner.read();
        inner
            .index
            .get(fingerprint)
            .and_then(|&i| inner.facts.get(i))
            .cloned()
    }

    /// Copies every fact in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FactRecord> {
        self.inner.read().facts.clone()
    }

    /// Number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().facts.len()
    }

    /// Returns true if no fact has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
