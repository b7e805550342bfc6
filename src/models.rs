//! Data model shared by the job engine, the backend client and the formatter.
//!
//! Wire structs mirror the query-job API (camelCase JSON); the typed views
//! (`ResponseMetadata`, `FormattedOutput`, `AnnotationEvent`) are what the rest
//! of the crate works with.

use crate::error::JobError;
use serde::ser::{SerializeMap, SerializeSeq};
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// One event row as returned by the backend. Key order is preserved.
pub type RawEvent = serde_json::Map<String, Value>;

/// Time-series bucket field written by `timechart()`
pub const BUCKET_FIELD: &str = "_bucket";
/// Aggregate field name used when no value field can be inferred
pub const DEFAULT_VALUE_FIELD: &str = "_count";
/// Timestamp field every annotation event must carry
pub const TIMESTAMP_FIELD: &str = "@timestamp";

// ============================================================
// Job submission
// ============================================================

/// Opaque identifier of a backend query job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A query time bound: either backend duration syntax ("1h", "now") or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    Epoch(i64),
    Relative(String),
}

impl TimeBound {
    pub fn relative(expr: impl Into<String>) -> Self {
        Self::Relative(expr.into())
    }
}

/// Snapshot of what was submitted for a job slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDefinition {
    pub query_string: String,
    pub time_zone_offset_minutes: i32,
    #[serde(rename = "showQueryEventDistribution")]
    pub show_event_distribution: bool,
    pub is_live: bool,
    pub start: TimeBound,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<TimeBound>,
}

impl QueryDefinition {
    /// True when both definitions describe the same backend job. `end` is ignored.
    pub fn same_job_as(&self, other: &QueryDefinition) -> bool {
        self.query_string == other.query_string
            && self.time_zone_offset_minutes == other.time_zone_offset_minutes
            && self.show_event_distribution == other.show_event_distribution
            && self.is_live == other.is_live
            && self.start == other.start
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobResponse {
    pub id: String,
}

// ============================================================
// Job polling
// ============================================================

/// GET /queryjobs/{id} response body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryJobResponse {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default, rename = "metaData")]
    pub meta_data: WireMetaData,
    #[serde(default)]
    pub field_order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetaData {
    #[serde(default)]
    pub extra_data: HashMap<String, Value>,
    #[serde(default)]
    pub poll_after: Option<u64>,
    #[serde(default)]
    pub field_order: Option<Vec<String>>,
}

impl QueryJobResponse {
    /// Typed view of the metadata the engine and formatter care about
    pub fn metadata(&self) -> ResponseMetadata {
        let extra = |key: &str| self.meta_data.extra_data.get(key).and_then(value_to_text);

        ResponseMetadata {
            done: self.done,
            poll_after_ms: self.meta_data.poll_after,
            timechart: extra("timechart").as_deref() == Some("true"),
            series_field: extra("series").filter(|s| !s.is_empty()),
            group_by_fields: extra("groupby_fields").filter(|s| !s.is_empty()),
            field_order: self
                .meta_data
                .field_order
                .clone()
                .or_else(|| self.field_order.clone()),
            suggested_widget: extra("ui:suggested-widget"),
        }
    }
}

/// Metadata attached to a completed poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub done: bool,
    pub poll_after_ms: Option<u64>,
    pub timechart: bool,
    pub series_field: Option<String>,
    /// Comma separated list, as sent by the backend
    pub group_by_fields: Option<String>,
    pub field_order: Option<Vec<String>>,
    pub suggested_widget: Option<String>,
}

impl ResponseMetadata {
    /// Group-by field names, trimmed, in declared order
    pub fn group_by_list(&self) -> Vec<String> {
        self.group_by_fields
            .as_deref()
            .map(|fields| fields.split(',').map(|f| f.trim().to_string()).collect())
            .unwrap_or_default()
    }
}

// ============================================================
// Engine inputs / outputs
// ============================================================

/// One query of a panel/dashboard context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTarget {
    pub ref_id: String,
    pub query_text: String,
    pub repository: String,
}

impl QueryTarget {
    pub fn new(
        ref_id: impl Into<String>,
        query_text: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            ref_id: ref_id.into(),
            query_text: query_text.into(),
            repository: repository.into(),
        }
    }
}

/// Result of one `QueryJob::execute`. Errors are carried, never thrown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryJobResult {
    pub events: Vec<RawEvent>,
    pub metadata: Option<ResponseMetadata>,
    pub error: Option<JobError>,
}

impl QueryJobResult {
    pub fn completed(response: QueryJobResponse) -> Self {
        let metadata = response.metadata();
        Self {
            events: response.events,
            metadata: Some(metadata),
            error: None,
        }
    }

    pub fn failed(error: JobError) -> Self {
        Self {
            events: Vec::new(),
            metadata: None,
            error: Some(error),
        }
    }
}

/// A single chart point: `[value, epochMs]`, or `[value]` when untimed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub value: f64,
    pub timestamp: Option<i64>,
}

impl Serialize for DataPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.timestamp.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.value)?;
        if let Some(ts) = self.timestamp {
            seq.serialize_element(&ts)?;
        }
        seq.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub text: String,
}

/// Output shapes produced by the result formatter
#[derive(Debug, Clone, PartialEq)]
pub enum FormattedOutput {
    TimeSeries {
        target: String,
        datapoints: Vec<DataPoint>,
    },
    Table {
        columns: Vec<TableColumn>,
        rows: Vec<Vec<Value>>,
    },
}

impl Serialize for FormattedOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::TimeSeries { target, datapoints } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("target", target)?;
                map.serialize_entry("datapoints", datapoints)?;
                map.end()
            }
            Self::Table { columns, rows } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("columns", columns)?;
                map.serialize_entry("rows", rows)?;
                map.serialize_entry("type", "table")?;
                map.end()
            }
        }
    }
}

/// Flattened formatter output for a whole manager update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormattedResponse {
    pub data: Vec<FormattedOutput>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_error")]
    pub error: Option<JobError>,
}

fn serialize_error<S: Serializer>(error: &Option<JobError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationEvent {
    pub time: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<f64>,
    pub is_region: bool,
}

// ============================================================
// Value helpers
// ============================================================

/// Render a scalar event value as text; strings are returned unquoted.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn leading_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(Infinity|(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?)")
            .expect("valid number regex")
    })
}

/// Numeric value of an event field: JSON numbers as-is, strings by their
/// longest leading decimal prefix (`"12ms"` is 12, `"abc"` and `"nan"` are none).
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number_pattern()
            .find(s.trim_start())
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        _ => None,
    }
}
