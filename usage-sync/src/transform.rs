//! Conversion from Logs Insights rows to CloudZero telemetry records.
//!
//! Each query projects `TenantId, Service, <metric>, timestamp`. The first
//! four fields of a row are read into a name-keyed map, so a query that
//! reorders its projection still yields the same records. A row shorter than
//! four fields means the query and this module disagree, and the whole
//! transform fails. A row that has the fields but lacks a usable value is
//! skipped.

use crate::error::{UsageSyncError, UsageSyncResult};
use crate::query::ResultRow;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

pub const POSITIONAL_FIELDS: usize = 4;

pub const TENANT_FIELD: &str = "TenantId";
pub const SERVICE_FIELD: &str = "Service";
pub const TIMESTAMP_FIELD: &str = "timestamp";

pub const ARCHITECTURE_FILTER: &str = "custom:Architecture Services";
pub const POOLED_ARCHITECTURE: &str = "Application Service Pooled";
pub const SERVICE_FILTER: &str = "service";
pub const DYNAMODB_SERVICE: &str = "AmazonDynamoDB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    InvocationCount,
    /// Already weighted and summed by the query.
    CapacityUnits
}

impl MetricType {
    pub fn value_field(&self) -> &'static str {
        match self {
            Self::InvocationCount => "LambdaInvocation",
            Self::CapacityUnits => "CapacityUnits"
        }
    }

    pub fn stream(&self) -> &'static str {
        match self {
            Self::InvocationCount => "Pooled-LambdaInvocation",
            Self::CapacityUnits => "Pooled-CapacityUnits"
        }
    }

    pub fn required_fields(&self) -> [&'static str; POSITIONAL_FIELDS] {
        [
            TENANT_FIELD,
            SERVICE_FIELD,
            self.value_field(),
            TIMESTAMP_FIELD
        ]
    }

    pub fn filters(&self) -> BTreeMap<String, Vec<String>> {
        let mut filters = BTreeMap::new();
        filters.insert(
            ARCHITECTURE_FILTER.to_string(),
            vec![POOLED_ARCHITECTURE.to_string()]
        );
        if *self == Self::CapacityUnits {
            filters.insert(SERVICE_FILTER.to_string(), vec![DYNAMODB_SERVICE.to_string()]);
        }
        filters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    value: f64,
    timestamp: DateTime<Utc>,
    granularity: Granularity,
    #[serde(rename = "element-name")]
    element_name: String,
    #[serde(rename = "telemetry-stream")]
    stream: String,
    #[serde(rename = "filter")]
    filters: BTreeMap<String, Vec<String>>
}

impl TelemetryRecord {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn filters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.filters
    }
}

/// Records for one publish call. An empty batch means there is nothing to report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub records: Vec<TelemetryRecord>
}

impl TelemetryBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetryRecord> {
        self.records.iter()
    }
}

/// Turns query rows into telemetry records for `metric`, keeping row order.
///
/// With no metric every row is dropped, after the shape check.
pub fn transform(metric: Option<MetricType>, rows: &[ResultRow]) -> UsageSyncResult<TelemetryBatch> {
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;

    for (row_index, row) in rows.iter().enumerate() {
        let fields = positional_fields(row_index, row)?;

        let Some(metric) = metric else {
            skipped += 1;
            continue;
        };

        match build_record(metric, &fields) {
            Ok(record) => records.push(record),
            Err(reason) => {
                skipped += 1;
                warn!(row_index, metric = ?metric, reason, "Skipping result row");
            }
        }
    }

    if skipped > 0 {
        metrics::counter!("usage_sync.rows.skipped").increment(skipped as u64);
    }
    debug!(rows = rows.len(), records = records.len(), skipped, "Transformed query rows");

    Ok(TelemetryBatch { records })
}

fn positional_fields(row_index: usize, row: &ResultRow) -> UsageSyncResult<HashMap<&str, &str>> {
    if row.len() < POSITIONAL_FIELDS {
        return Err(UsageSyncError::Shape {
            row_index,
            field_count: row.len(),
            expected: POSITIONAL_FIELDS
        });
    }

    Ok(row.fields[..POSITIONAL_FIELDS]
        .iter()
        .map(|f| (f.field.as_str(), f.value.as_str()))
        .collect())
}

fn build_record(
    metric: MetricType,
    fields: &HashMap<&str, &str>
) -> Result<TelemetryRecord, &'static str> {
    for name in metric.required_fields() {
        match fields.get(name) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err("missing required field")
        }
    }

    let value = fields[metric.value_field()]
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or("metric value is not a number")?;
    let timestamp =
        parse_timestamp(fields[TIMESTAMP_FIELD]).ok_or("timestamp is not a recognised instant")?;

    Ok(TelemetryRecord {
        value,
        timestamp,
        granularity: Granularity::Daily,
        element_name: fields[TENANT_FIELD].trim().to_string(),
        stream: metric.stream().to_string(),
        filters: metric.filters()
    })
}

/// Accepts epoch seconds, RFC 3339, or the `2023-11-15 00:00:00.000` form
/// Logs Insights uses for `dateceil`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
