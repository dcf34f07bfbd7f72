// Time series domain models
use super::error::{TelemetryError, TelemetryResult};
use super::timestamp::RawTimestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One stored value; `None` in a column is the "no data" marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(_) => None,
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: Option<Cell>,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, value: Option<Cell>) -> Self {
        Self { time, value }
    }
}

/// A named sequence of samples with strictly increasing timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    samples: Vec<Sample>,
}

impl Series {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> TelemetryResult<Self> {
        let name = name.into();
        if let Some(pair) = samples.windows(2).find(|w| w[1].time <= w[0].time) {
            return Err(TelemetryError::NonMonotonic {
                context: name,
                time: pair[1].time,
            });
        }
        Ok(Self { name, samples })
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Value recorded exactly at `time`, if any
    pub fn value_at(&self, time: DateTime<Utc>) -> Option<&Cell> {
        self.samples
            .binary_search_by(|s| s.time.cmp(&time))
            .ok()
            .and_then(|i| self.samples[i].value.as_ref())
    }

    /// Latest sample that carries a value
    pub fn last_valid(&self) -> Option<(DateTime<Utc>, &Cell)> {
        self.samples
            .iter()
            .rev()
            .find_map(|s| s.value.as_ref().map(|v| (s.time, v)))
    }

    pub(crate) fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn retain_after(&self, cutoff: DateTime<Utc>) -> Self {
        // Samples are sorted, so everything past the partition point is newer
        let start = self.samples.partition_point(|s| s.time <= cutoff);
        Self {
            name: self.name.clone(),
            samples: self.samples[start..].to_vec(),
        }
    }

    pub(crate) fn map_numbers(mut self, f: impl Fn(f64) -> f64) -> Self {
        for sample in &mut self.samples {
            if let Some(Cell::Number(v)) = &mut sample.value {
                *v = f(*v);
            }
        }
        self
    }
}

/// Columns sharing one logical time axis, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBundle {
    series: BTreeMap<String, Series>,
}

impl SeriesBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(series: impl IntoIterator<Item = Series>) -> Self {
        let mut bundle = Self::new();
        for s in series {
            bundle.insert(s);
        }
        bundle
    }

    pub fn insert(&mut self, series: Series) {
        self.series.insert(series.name().to_string(), series);
    }

    pub fn get(&self, column: &str) -> Option<&Series> {
        self.series.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.values()
    }

    /// True when no column holds a single sample
    pub fn is_empty(&self) -> bool {
        self.series.values().all(Series::is_empty)
    }

    /// Prefix every column name, as needed after splitting a grouped query
    pub fn with_prefix(self, prefix: &str) -> Self {
        Self::from_series(self.series.into_values().map(|s| {
            let name = format!("{}{}", prefix, s.name());
            s.renamed(name)
        }))
    }

    pub fn without(mut self, columns: &[String]) -> Self {
        for column in columns {
            self.series.remove(column);
        }
        self
    }

    pub fn map_column(mut self, column: &str, f: impl Fn(f64) -> f64) -> TelemetryResult<Self> {
        let series = self
            .series
            .remove(column)
            .ok_or_else(|| TelemetryError::UnknownColumn {
                column: column.to_string(),
            })?;
        self.insert(series.map_numbers(f));
        Ok(self)
    }

    pub(crate) fn map_series(&self, f: impl Fn(&Series) -> Series) -> Self {
        Self::from_series(self.series.values().map(f))
    }
}

/// A query result exactly as the database delivered it: one raw time
/// column and any number of value columns of the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTable {
    pub time: Vec<RawTimestamp>,
    pub columns: BTreeMap<String, Vec<Option<Cell>>>,
}

impl QueryTable {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn push_row(&mut self, time: RawTimestamp, values: BTreeMap<String, Option<Cell>>) {
        let row = self.time.len();
        for (column, value) in values {
            let cells = self
                .columns
                .entry(column)
                .or_insert_with(|| vec![None; row]);
            cells.resize(row, None);
            cells.push(value);
        }
        self.time.push(time);
        for cells in self.columns.values_mut() {
            cells.resize(row + 1, None);
        }
    }
}

/// All tables produced by one named batch query. Ungrouped queries hold a
/// single table under the empty key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub groups: BTreeMap<String, QueryTable>,
}

impl QueryResult {
    pub fn ungrouped(table: QueryTable) -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(String::new(), table);
        Self { groups }
    }

    pub fn table(&self, group: Option<&str>) -> Option<&QueryTable> {
        self.groups.get(group.unwrap_or(""))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(QueryTable::is_empty)
    }
}
