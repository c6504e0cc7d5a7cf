//! Core record types for the ingestion pipeline.
//!
//! This module provides the types that flow between the stages:
//! - [`MetricSample`]: one observation as delivered by a collector
//! - [`RawMetricRecord`]: a sample captured in the bronze layer
//! - [`CleanMetricRecord`]: a null-normalized record in the silver layer
//! - [`ResourceAttributes`]: descriptive resource fields shared by every layer
//! - [`Fingerprint`]: the hex digest used as the deduplication key
//! - [`TimeRange`]: an inclusive time window for queries

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PipelineError, Result};

/// Open, semi-structured attribute map carried by a sample.
///
/// A `BTreeMap` keeps key order stable so identical maps compare and
/// serialize identically.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

/// Deterministic digest used as the sole deduplication key of a layer.
///
/// Always 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub(crate) const fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    /// Returns the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single metric observation as delivered by an external collector.
///
/// Every field is optional. Collectors are not trusted to fill identity
/// fields, and a sample with gaps is still captured so the raw layer keeps a
/// complete audit trail. Timestamps and values are parsed leniently: an
/// unparseable timestamp or a non-numeric value is treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Provider resource identifier (instance id, ARN, ARM path).
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Parent or grouping identifier, such as a VPC id.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Human-readable resource name.
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Resource type tag (`ec2_instance`, `nat_gateway`, ...).
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Cloud region.
    #[serde(default)]
    pub region: Option<String>,
    /// Account or subscription identifier.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Event time of the observation.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Metric name, e.g. `CPUUtilization`.
    #[serde(default)]
    pub metric_name: Option<String>,
    /// Observed value.
    #[serde(default, deserialize_with = "lenient_value")]
    pub value: Option<f64>,
    /// Unit of the value.
    #[serde(default)]
    pub unit: Option<String>,
    /// Provider description of the metric.
    #[serde(default)]
    pub description: Option<String>,
    /// Additional provider dimensions.
    #[serde(default)]
    pub attributes: Option<AttributeMap>,
}

impl MetricSample {
    /// Creates a sample with the three identity fields set.
    #[must_use]
    pub fn new(
        resource_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        metric_name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            timestamp: Some(timestamp),
            metric_name: Some(metric_name.into()),
            value: Some(value),
            ..Self::default()
        }
    }

    /// Sets the resource type tag.
    #[must_use]
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    /// Sets the parent/grouping id.
    #[must_use]
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the resource name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the account id.
    #[must_use]
    pub fn account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the metric description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds one attribute and returns self for chaining.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes
            .get_or_insert_with(AttributeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// A sample captured in the bronze layer.
///
/// Fields are kept exactly as delivered. The ingestion time is recorded so
/// that canonicalization can default a missing event time deterministically
/// from the stored record alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricRecord {
    /// The sample as delivered.
    pub sample: MetricSample,
    /// When the record was captured.
    pub ingested_at: DateTime<Utc>,
    /// Record fingerprint over the canonical identity fields.
    pub fingerprint: Fingerprint,
}

/// Descriptive resource fields that travel with every record and fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceAttributes {
    /// Parent or grouping identifier.
    pub parent_id: String,
    /// Human-readable name.
    pub name: String,
    /// Resource type tag.
    pub resource_type: String,
    /// Cloud region.
    pub region: String,
    /// Account or subscription identifier.
    pub account_id: String,
}

/// A null-normalized, fingerprint-unique record in the silver layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanMetricRecord {
    /// Resource identifier as delivered (empty when missing).
    pub resource_id: String,
    /// Descriptive resource fields.
    pub resource: ResourceAttributes,
    /// Event time, or the ingestion time when the sample had none.
    pub timestamp: DateTime<Utc>,
    /// Metric name (empty when missing).
    pub metric_name: String,
    /// Value (zero when missing).
    pub value: f64,
    /// Unit (empty when missing).
    pub unit: String,
    /// Metric description (empty when missing).
    pub description: String,
    /// Attribute map; `None` when the sample had no or an empty map.
    pub attributes: Option<AttributeMap>,
    /// Record fingerprint, identical to the bronze record's.
    pub fingerprint: Fingerprint,
}

/// An inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (inclusive).
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidTimeRange` if start > end.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(PipelineError::InvalidTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Creates a range covering whole calendar days, from midnight of
    /// `start` through the last second of `end`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidTimeRange` if `start` is after `end`.
    pub fn for_dates(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let from = start.and_time(NaiveTime::MIN).and_utc();
        let until = end
            .and_hms_opt(23, 59, 59)
            .map(|last| last.and_utc())
            .ok_or_else(|| PipelineError::InvalidTimeRange {
                start: from.to_rfc3339(),
                end: end.to_string(),
            })?;
        Self::new(from, until)
    }

    /// Creates a range covering the last `days` days up to now.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidTimeRange` if `days` is negative or
    /// reaches back past the earliest representable time.
    pub fn last_days(days: i64) -> Result<Self> {
        let end = Utc::now();
        let start = Duration::try_days(days)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| PipelineError::InvalidTimeRange {
                start: format!("{days} days before {}", end.to_rfc3339()),
                end: end.to_rfc3339(),
            })?;
        Self::new(start, end)
    }

    /// Checks if a timestamp falls within this range (inclusive).
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Accepts RFC 3339, or a naive `T`/space separated date-time taken as UTC.
/// Anything else is treated as missing.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        serde_json::Value::String(text) => parse_timestamp(&text),
        _ => None,
    }))
}

/// Accepts numbers and numeric strings. Anything else, including `"NaN"` and
/// `"inf"`, is treated as missing.
fn lenient_value<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|v| v.is_finite()))
}

/// Parses a collector timestamp.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).single().expect("valid timestamp")
    }

    mod sample_tests {
        use super::*;

        #[test]
        fn builder_sets_identity_and_descriptive_fields() {
            let sample = MetricSample::new("i-123", ts(10, 15, 30), "CPUUtilization", 42.0)
                .resource_type("ec2_instance")
                .region("us-east-1")
                .unit("Percent")
                .attribute("az", "us-east-1a");

            assert_eq!(sample.resource_id.as_deref(), Some("i-123"));
            assert_eq!(sample.metric_name.as_deref(), Some("CPUUtilization"));
            assert_eq!(sample.value, Some(42.0));
            assert_eq!(sample.resource_type.as_deref(), Some("ec2_instance"));
            assert_eq!(
                sample.attributes.as_ref().and_then(|a| a.get("az")),
                Some(&serde_json::json!("us-east-1a"))
            );
        }

        #[test]
        fn deserialize_missing_fields_as_none() {
            let sample: MetricSample =
                serde_json::from_str(r#"{"resource_id": "i-1"}"#).expect("parse");
            assert_eq!(sample.resource_id.as_deref(), Some("i-1"));
            assert!(sample.timestamp.is_none());
            assert!(sample.value.is_none());
            assert!(sample.attributes.is_none());
        }

        #[test]
        fn deserialize_numeric_string_value() {
            let sample: MetricSample =
                serde_json::from_str(r#"{"value": " 12.5 "}"#).expect("parse");
            assert_eq!(sample.value, Some(12.5));
        }

        #[test]
        fn deserialize_garbage_value_as_none() {
            let sample: MetricSample =
                serde_json::from_str(r#"{"value": "n/a"}"#).expect("parse");
            assert!(sample.value.is_none());
        }

        #[test_case::test_case(r#""NaN""# ; "nan")]
        #[test_case::test_case(r#""inf""# ; "infinity")]
        #[test_case::test_case(r#""-Infinity""# ; "negative infinity")]
        #[test_case::test_case("1e999" ; "overflowing literal")]
        fn deserialize_non_finite_value_as_none(value: &str) {
            let sample: Option<MetricSample> =
                serde_json::from_str(&format!(r#"{{"value": {value}}}"#)).ok();
            assert!(sample.is_none_or(|s| s.value.is_none()));
        }

        #[test]
        fn deserialize_null_timestamp_as_none() {
            let sample: MetricSample =
                serde_json::from_str(r#"{"timestamp": null}"#).expect("parse");
            assert!(sample.timestamp.is_none());
        }

        #[test]
        fn deserialize_naive_timestamp_as_utc() {
            let sample: MetricSample =
                serde_json::from_str(r#"{"timestamp": "2025-01-01T10:15:30"}"#).expect("parse");
            assert_eq!(sample.timestamp, Some(ts(10, 15, 30)));
        }

        #[test]
        fn serde_round_trip_preserves_sample() {
            let sample = MetricSample::new("i-9", ts(1, 2, 3), "NetworkIn", 1.5).unit("Bytes");
            let json = serde_json::to_string(&sample).expect("serialize");
            let back: MetricSample = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, sample);
        }
    }

    mod timestamp_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("2025-01-01T10:15:30Z" ; "rfc3339 zulu")]
        #[test_case("2025-01-01T12:15:30+02:00" ; "rfc3339 offset")]
        #[test_case("2025-01-01T10:15:30" ; "naive t separator")]
        #[test_case("2025-01-01 10:15:30" ; "naive space separator")]
        #[test_case(" 2025-01-01 10:15:30 " ; "surrounding whitespace")]
        fn parses_supported_formats(text: &str) {
            assert_eq!(parse_timestamp(text), Some(ts(10, 15, 30)));
        }

        #[test_case("" ; "empty")]
        #[test_case("yesterday" ; "word")]
        #[test_case("2025-13-01 00:00:00" ; "bad month")]
        fn rejects_unsupported_formats(text: &str) {
            assert!(parse_timestamp(text).is_none());
        }
    }

    mod time_range_tests {
        use super::*;

        #[test]
        fn new_rejects_inverted_range() {
            let result = TimeRange::new(ts(11, 0, 0), ts(10, 0, 0));
            assert!(matches!(result, Err(PipelineError::InvalidTimeRange { .. })));
        }

        #[test]
        fn contains_is_inclusive_on_both_ends() {
            let range = TimeRange::new(ts(10, 0, 0), ts(11, 0, 0)).expect("range");
            assert!(range.contains(ts(10, 0, 0)));
            assert!(range.contains(ts(11, 0, 0)));
            assert!(!range.contains(ts(11, 0, 1)));
            assert!(!range.contains(ts(9, 59, 59)));
        }

        #[test]
        fn for_dates_covers_whole_end_day() {
            let day = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");
            let range = TimeRange::for_dates(day, day).expect("range");
            assert!(range.contains(ts(0, 0, 0)));
            assert!(range.contains(ts(23, 59, 59)));
            assert!(!range.contains(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).single().expect("valid timestamp")));
        }

        #[test]
        fn last_days_spans_requested_window() {
            let range = TimeRange::last_days(7).expect("range");
            assert_eq!(range.end - range.start, Duration::days(7));
        }

        #[test_case::test_case(-1 ; "negative")]
        #[test_case::test_case(4_000_000_000 ; "past earliest time")]
        #[test_case::test_case(i64::MAX ; "beyond duration range")]
        fn last_days_out_of_range_is_an_error(days: i64) {
            let err = TimeRange::last_days(days).expect_err("should fail");
            assert!(matches!(err, PipelineError::InvalidTimeRange { .. }));
        }

        #[test]
        fn for_dates_at_calendar_limits() {
            let range = TimeRange::for_dates(NaiveDate::MIN, NaiveDate::MAX).expect("range");
            assert_eq!(range.end.date_naive(), NaiveDate::MAX);
        }
    }
}
