//! Reshapes raw query-job events into chart series, tables and annotations.

use crate::{
    error::{AnnotationError, VariableError},
    models::{
        value_as_f64, value_to_text, AnnotationEvent, DataPoint, FormattedOutput,
        FormattedResponse, QueryJobResult, QueryTarget, RawEvent, ResponseMetadata, TableColumn,
        BUCKET_FIELD, DEFAULT_VALUE_FIELD, TIMESTAMP_FIELD,
    },
    range::{widget_hint, WidgetKind},
};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Format the results of one manager update.
///
/// Output of all targets is flattened in target order. The first error found
/// is reported; data from successful targets is still returned.
pub fn format_query_responses(
    responses: &[QueryJobResult],
    targets: &[QueryTarget],
) -> FormattedResponse {
    let data = responses
        .iter()
        .enumerate()
        .flat_map(|(index, response)| {
            let query_text = targets
                .get(index)
                .map(|t| t.query_text.as_str())
                .unwrap_or_default();
            format_response(response, query_text)
        })
        .collect();

    let error = responses.iter().find_map(|r| r.error.clone());

    FormattedResponse { data, error }
}

fn format_response(response: &QueryJobResult, query_text: &str) -> Vec<FormattedOutput> {
    if response.events.is_empty() {
        return Vec::new();
    }

    let metadata = response.metadata.clone().unwrap_or_default();
    let events = &response.events;
    let value_fields = infer_value_fields(&metadata, events);
    let value_field = value_fields[0].as_str();

    match widget_hint(&metadata, query_text) {
        WidgetKind::Timechart => {
            compose_timechart(events, metadata.series_field.as_deref(), value_field)
        }
        WidgetKind::Table => {
            let columns = metadata.field_order.clone().unwrap_or_default();
            vec![compose_table(events, &columns)]
        }
        // World maps are tables over the value fields
        WidgetKind::WorldMap => vec![compose_table(events, &value_fields)],
        WidgetKind::Untyped => compose_untyped(events, &metadata, value_field),
    }
}

/// Fields that carry "the" numeric value of a response. Never empty.
pub fn infer_value_fields(metadata: &ResponseMetadata, events: &[RawEvent]) -> Vec<String> {
    let mut excluded = vec![BUCKET_FIELD.to_string()];
    excluded.extend(metadata.series_field.clone());
    excluded.extend(metadata.group_by_list());

    let not_excluded = |field: &&String| !excluded.contains(*field);

    if let Some(field_order) = &metadata.field_order {
        let fields: Vec<String> = field_order.iter().filter(not_excluded).cloned().collect();
        if !fields.is_empty() {
            return fields;
        }
    }

    if let Some(first) = events.first() {
        let fields: Vec<String> = first.keys().filter(not_excluded).cloned().collect();
        if !fields.is_empty() {
            return fields;
        }
    }

    vec![DEFAULT_VALUE_FIELD.to_string()]
}

fn numeric_field(event: &RawEvent, field: &str) -> f64 {
    event.get(field).and_then(value_as_f64).unwrap_or(f64::NAN)
}

fn compose_timechart(
    events: &[RawEvent],
    series_field: Option<&str>,
    value_field: &str,
) -> Vec<FormattedOutput> {
    let mut order: Vec<String> = Vec::new();
    let mut series: HashMap<String, Vec<DataPoint>> = HashMap::new();

    for event in events {
        // Without a series field every event belongs to one series named after the value
        let name = match series_field {
            Some(field) => event.get(field).and_then(value_to_text).unwrap_or_default(),
            None => value_field.to_string(),
        };
        let point = DataPoint {
            value: numeric_field(event, value_field),
            timestamp: event
                .get(BUCKET_FIELD)
                .and_then(value_as_f64)
                .map(|ts| ts as i64),
        };

        series
            .entry(name.clone())
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(point);
    }

    order
        .into_iter()
        .map(|target| {
            let datapoints = series.remove(&target).unwrap_or_default();
            FormattedOutput::TimeSeries { target, datapoints }
        })
        .collect()
}

fn compose_table(events: &[RawEvent], columns: &[String]) -> FormattedOutput {
    FormattedOutput::Table {
        columns: columns
            .iter()
            .map(|column| TableColumn {
                text: column.clone(),
            })
            .collect(),
        rows: events
            .iter()
            .map(|event| {
                columns
                    .iter()
                    .map(|column| event.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect(),
    }
}

fn compose_untyped(
    events: &[RawEvent],
    metadata: &ResponseMetadata,
    value_field: &str,
) -> Vec<FormattedOutput> {
    let group_by = metadata.group_by_list();

    if group_by.is_empty() {
        let datapoints = events
            .iter()
            .map(|event| DataPoint {
                value: numeric_field(event, value_field),
                timestamp: None,
            })
            .collect();
        return vec![FormattedOutput::TimeSeries {
            target: value_field.to_string(),
            datapoints,
        }];
    }

    events
        .iter()
        .map(|event| FormattedOutput::TimeSeries {
            target: group_by_name(&group_by, event),
            datapoints: vec![DataPoint {
                value: numeric_field(event, value_field),
                timestamp: None,
            }],
        })
        .collect()
}

/// `[host1] [cluster1]` for group-by fields `host, cluster`
fn group_by_name(group_by: &[String], event: &RawEvent) -> String {
    group_by
        .iter()
        .map(|field| {
            let value = event.get(field).and_then(value_to_text).unwrap_or_default();
            format!("[{}]", value)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================
// Annotations
// ============================================================

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(.+?)\}").expect("valid placeholder regex"))
}

/// Convert annotation query events into annotation events.
///
/// `template` may reference event fields as `{field}`. When `time_end_field` is
/// given and present on an event, the annotation becomes a region.
pub fn format_annotation_query_response(
    events: &[RawEvent],
    template: &str,
    time_end_field: Option<&str>,
) -> Result<Vec<AnnotationEvent>, AnnotationError> {
    events
        .iter()
        .map(|event| {
            let time = event
                .get(TIMESTAMP_FIELD)
                .filter(|v| !v.is_null())
                .ok_or(AnnotationError::MissingTimestampField)?;
            let time = value_as_f64(time).ok_or(AnnotationError::NonNumericTimestamp)?;
            let time_end = time_end(event, time_end_field)?;

            Ok(AnnotationEvent {
                time,
                text: render_template(template, event)?,
                time_end,
                is_region: time_end.is_some(),
            })
        })
        .collect()
}

fn time_end(event: &RawEvent, field: Option<&str>) -> Result<Option<f64>, AnnotationError> {
    let Some(field) = field else {
        return Ok(None);
    };
    match event.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_as_f64(value)
            .map(Some)
            .ok_or_else(|| AnnotationError::NonNumericTimeEnd(field.to_string())),
    }
}

fn render_template(template: &str, event: &RawEvent) -> Result<String, AnnotationError> {
    let mut text = String::with_capacity(template.len());
    let mut last = 0;

    for captures in placeholder_pattern().captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = lookup_field(event, name.as_str())
            .and_then(value_to_text)
            .ok_or_else(|| AnnotationError::MissingTemplateField(name.as_str().to_string()))?;

        text.push_str(&template[last..whole.start()]);
        text.push_str(&value);
        last = whole.end();
    }
    text.push_str(&template[last..]);

    Ok(text)
}

// ============================================================
// Variables
// ============================================================

/// Values of `data_field` on every event, in event order.
///
/// `data_field` may be a dotted path. Every event must carry a non-empty value.
pub fn format_variable_values(
    events: &[RawEvent],
    data_field: &str,
) -> Result<Vec<String>, VariableError> {
    events
        .iter()
        .map(|event| {
            lookup_field(event, data_field)
                .and_then(value_to_text)
                .filter(|text| !text.is_empty())
                .ok_or_else(|| VariableError::MissingDataField(data_field.to_string()))
        })
        .collect()
}

/// Literal field name first, then a dotted path into nested objects
fn lookup_field<'a>(event: &'a RawEvent, name: &str) -> Option<&'a Value> {
    if let Some(value) = event.get(name) {
        return Some(value);
    }

    let mut parts = name.split('.');
    let mut current = event.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
