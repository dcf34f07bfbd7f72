// Facility summary models - latest values with an age judgement
use super::series::{Cell, Series};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Values older than this are flagged stale on a summary table
pub fn default_max_age() -> TimeDelta {
    TimeDelta::milliseconds(330_000)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastValue {
    pub label: String,
    pub value: Cell,
    pub timestamp: DateTime<Utc>,
    pub too_old: bool,
}

impl LastValue {
    pub fn new(label: impl Into<String>, value: Cell, timestamp: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            value,
            timestamp,
            too_old: false,
        }
    }

    /// Latest valid value of a series, or its value at an anchor timestamp
    /// shared with related rows
    pub fn from_series(series: &Series, anchor: Option<DateTime<Utc>>) -> Option<Self> {
        let (timestamp, value) = match anchor {
            Some(t) => (t, series.value_at(t)?),
            None => series.last_valid()?,
        };
        Some(Self::new(series.name(), value.clone(), timestamp))
    }

    pub fn judge_age(mut self, now: DateTime<Utc>, max_age: TimeDelta) -> Self {
        self.too_old = now - self.timestamp > max_age;
        self
    }
}

/// Join several last values into one, e.g. hours, minutes and seconds of a
/// coordinate into `05:07:09`. Whole numbers are zero-padded to two digits.
/// The result carries the timestamp of the final part.
pub fn deshred(parts: &[LastValue], delimiter: &str, label: impl Into<String>) -> Option<LastValue> {
    let last = parts.last()?;
    let text = parts
        .iter()
        .map(|p| format_part(&p.value))
        .collect::<Vec<_>>()
        .join(delimiter);
    Some(LastValue::new(label, Cell::Text(text), last.timestamp))
}

fn format_part(value: &Cell) -> String {
    match value {
        Cell::Number(v) if v.is_finite() => format!("{:02}", v.trunc() as i64),
        Cell::Number(v) => v.to_string(),
        Cell::Text(s) => s.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub label: String,
    pub value: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub stale: bool,
}

impl SummaryRow {
    pub fn missing(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
            timestamp: None,
            stale: true,
        }
    }

    pub fn from_last_value(label: impl Into<String>, value: LastValue, text: String) -> Self {
        Self {
            label: label.into(),
            value: Some(text),
            timestamp: Some(value.timestamp),
            stale: value.too_old,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilitySummary {
    pub id: String,
    pub title: String,
    pub updated: DateTime<Utc>,
    pub rows: Vec<SummaryRow>,
}

pub fn cell_text(value: &Cell) -> String {
    match value {
        Cell::Number(v) => v.to_string(),
        Cell::Text(s) => s.clone(),
    }
}
