//! Time-range classification: live eligibility, live duration syntax, and
//! widget-kind inference for a completed response.

use crate::error::RangeError;
use crate::models::ResponseMetadata;
use regex::Regex;
use std::sync::OnceLock;

/// Marker that snaps a relative bound to a calendar boundary (e.g. `now-1d/d`)
const TRUNCATION_MARKER: char = '/';
const RELATIVE_NOW_PREFIX: &str = "now-";
const MONTH_UNIT: char = 'M';
const BACKEND_MONTH_UNIT: &str = "mon";

/// Range expressions exactly as the user entered them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTimeRange {
    pub from: String,
    pub to: String,
}

/// Range resolved to epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteTimeRange {
    pub from_ms: i64,
    pub to_ms: i64,
}

/// Requested time window. A range without `raw` can never run live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub raw: Option<RawTimeRange>,
    pub absolute: Option<AbsoluteTimeRange>,
}

impl TimeRange {
    pub fn relative(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            raw: Some(RawTimeRange {
                from: from.into(),
                to: to.into(),
            }),
            absolute: None,
        }
    }

    pub fn absolute(from_ms: i64, to_ms: i64) -> Self {
        Self {
            raw: None,
            absolute: Some(AbsoluteTimeRange { from_ms, to_ms }),
        }
    }

    pub fn with_absolute(mut self, from_ms: i64, to_ms: i64) -> Self {
        self.absolute = Some(AbsoluteTimeRange { from_ms, to_ms });
        self
    }
}

/// Response shape family, decides how raw events are pivoted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Timechart,
    Table,
    WorldMap,
    Untyped,
}

pub fn is_eligible_for_live(lower_bound: &str) -> bool {
    !lower_bound.contains(TRUNCATION_MARKER)
}

/// Translate a relative lower bound (`now-6M`) into backend duration syntax (`6mon`).
pub fn to_live_duration(lower_bound: &str) -> Result<String, RangeError> {
    if !is_eligible_for_live(lower_bound) {
        return Err(RangeError::InvalidLiveRange(lower_bound.to_string()));
    }

    Ok(lower_bound
        .replacen(RELATIVE_NOW_PREFIX, "", 1)
        .replacen(MONTH_UNIT, BACKEND_MONTH_UNIT, 1))
}

/// `now`, or `now` followed by anything but a minus (`now/d`)
pub fn upper_bound_is_now(upper_bound: &str) -> bool {
    match upper_bound.strip_prefix("now") {
        Some(rest) => !rest.starts_with('-'),
        None => false,
    }
}

pub fn query_is_live(has_auto_refresh: bool, upper_bound_is_now: bool, lower_bound_eligible: bool) -> bool {
    has_auto_refresh && upper_bound_is_now && lower_bound_eligible
}

/// Live decision for a whole range; absolute-only ranges are never live.
pub fn range_is_live(has_auto_refresh: bool, range: &TimeRange) -> bool {
    match &range.raw {
        Some(raw) => query_is_live(
            has_auto_refresh,
            upper_bound_is_now(&raw.to),
            is_eligible_for_live(&raw.from),
        ),
        None => false,
    }
}

fn table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(table\()(.+)(\))").expect("valid table regex"))
}

pub fn widget_hint(metadata: &ResponseMetadata, query_text: &str) -> WidgetKind {
    if metadata.timechart {
        return WidgetKind::Timechart;
    }
    if table_pattern().is_match(query_text) {
        return WidgetKind::Table;
    }
    if metadata.suggested_widget.as_deref() == Some("world-map") {
        WidgetKind::WorldMap
    } else {
        WidgetKind::Untyped
    }
}
