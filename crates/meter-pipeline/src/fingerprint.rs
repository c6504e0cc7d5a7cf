//! Canonicalization and fingerprinting.
//!
//! Fingerprints are the only identity the pipeline trusts. The record
//! fingerprint (bronze and silver) and the fact fingerprint (gold) share one
//! input layout:
//!
//! ```text
//! lower(resource_id) | YYYY-MM-DD HH:MM:SS | metric_name
//! ```
//!
//! and are digested with BLAKE3 in key-derivation mode under two different
//! context strings, so the two namespaces never collide even for identical
//! inputs. The output is 64 lowercase hex characters.

use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};

use crate::types::{
    AttributeMap, CleanMetricRecord, Fingerprint, MetricSample, RawMetricRecord, ResourceAttributes,
};

/// BLAKE3 derive-key context for bronze and silver record fingerprints.
pub const RECORD_CONTEXT: &str = "cloudmeter 2025-01 record fingerprint";

/// BLAKE3 derive-key context for gold fact fingerprints.
pub const FACT_CONTEXT: &str = "cloudmeter 2025-01 fact fingerprint";

/// Separator between identity fields in the digest input.
pub const FIELD_DELIMITER: char = '|';

/// Canonical timestamp layout used inside digest inputs.
pub const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Drops sub-second precision.
#[must_use]
pub fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Returns the start of the hour containing `ts`.
#[must_use]
pub fn hour_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}

/// Formats a timestamp the way it appears inside digest inputs.
#[must_use]
pub fn canonical_timestamp(ts: DateTime<Utc>) -> String {
    truncate_to_second(ts)
        .format(CANONICAL_TIMESTAMP_FORMAT)
        .to_string()
}

fn digest(context: &str, resource_id: &str, ts: DateTime<Utc>, metric_name: &str) -> Fingerprint {
    let input = format!(
        "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
        resource_id.to_lowercase(),
        canonical_timestamp(ts),
        metric_name
    );
    let hash = blake3::Hasher::new_derive_key(context)
        .update(input.as_bytes())
        .finalize();
    Fingerprint::from_hex(hash.to_hex().to_string())
}

/// Fingerprint of a bronze/silver record.
///
/// The timestamp is truncated to the second before digesting.
#[must_use]
pub fn record_fingerprint(resource_id: &str, ts: DateTime<Utc>, metric_name: &str) -> Fingerprint {
    digest(RECORD_CONTEXT, resource_id, ts, metric_name)
}

/// Fingerprint of a gold fact.
///
/// The timestamp is truncated to its hour bucket before digesting.
#[must_use]
pub fn fact_fingerprint(resource_id: &str, ts: DateTime<Utc>, metric_name: &str) -> Fingerprint {
    digest(FACT_CONTEXT, resource_id, hour_start(ts), metric_name)
}

/// Captures a collector sample as a bronze record.
///
/// The fingerprint is computed over the canonical identity fields, so a
/// sample missing its event time is keyed by `ingested_at`.
#[must_use]
pub fn capture(sample: MetricSample, ingested_at: DateTime<Utc>) -> RawMetricRecord {
    let fingerprint = record_fingerprint(
        sample.resource_id.as_deref().unwrap_or_default(),
        sample.timestamp.unwrap_or(ingested_at),
        sample.metric_name.as_deref().unwrap_or_default(),
    );
    RawMetricRecord {
        sample,
        ingested_at,
        fingerprint,
    }
}

/// Replaces every absent field of a bronze record with its default.
///
/// Text fields default to the empty string, the event time to the ingestion
/// time, the value to zero. An empty attribute map is treated as absent.
#[must_use]
pub fn canonicalize(raw: &RawMetricRecord) -> CleanMetricRecord {
    let sample = &raw.sample;
    let text = |field: &Option<String>| field.clone().unwrap_or_default();

    CleanMetricRecord {
        resource_id: text(&sample.resource_id),
        resource: ResourceAttributes {
            parent_id: text(&sample.parent_id),
            name: text(&sample.resource_name),
            resource_type: text(&sample.resource_type),
            region: text(&sample.region),
            account_id: text(&sample.account_id),
        },
        timestamp: sample.timestamp.unwrap_or(raw.ingested_at),
        metric_name: text(&sample.metric_name),
        value: sample.value.filter(|v| v.is_finite()).unwrap_or(0.0),
        unit: text(&sample.unit),
        description: text(&sample.description),
        attributes: sample
            .attributes
            .clone()
            .filter(|attrs: &AttributeMap| !attrs.is_empty()),
        fingerprint: raw.fingerprint.clone(),
    }
}
