// Summary service - facility summary tables of latest values
use crate::application::snapshot_store::{QuerySnapshot, QuerySnapshotStore};
use crate::domain::error::{TelemetryError, TelemetryResult};
use crate::domain::filter::TimeWindowFilter;
use crate::domain::series::{Cell, QueryTable, SeriesBundle};
use crate::domain::summary::{cell_text, deshred, FacilitySummary, LastValue, SummaryRow};
use crate::infrastructure::config::{DashboardsConfig, SummaryConfig, SummaryRowConfig};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct SummaryService {
    store: QuerySnapshotStore,
    summaries: BTreeMap<String, SummaryConfig>,
}

impl SummaryService {
    pub fn new(store: QuerySnapshotStore, dashboards: &DashboardsConfig) -> Self {
        let summaries = dashboards
            .summaries
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        Self { store, summaries }
    }

    pub fn summaries(&self) -> Vec<(String, String)> {
        self.summaries
            .values()
            .map(|s| (s.id.clone(), s.title.clone()))
            .collect()
    }

    /// `None` for an unknown summary id
    pub fn get_summary(&self, id: &str, now: DateTime<Utc>) -> Option<TelemetryResult<FacilitySummary>> {
        let config = self.summaries.get(id)?;
        Some(build_summary(config, &self.store.load(), now))
    }
}

fn build_summary(
    config: &SummaryConfig,
    snapshot: &QuerySnapshot,
    now: DateTime<Utc>,
) -> TelemetryResult<FacilitySummary> {
    // Every referenced table must have rows before anything is shown
    let mut bundles: BTreeMap<(String, Option<String>), SeriesBundle> = BTreeMap::new();
    for row in &config.rows {
        let key = (row.query.clone(), row.group.clone());
        if bundles.contains_key(&key) {
            continue;
        }
        let table = row_table(snapshot, row)?;
        if table.is_empty() {
            return Err(TelemetryError::EmptyDataset {
                query: row.query.clone(),
            });
        }
        bundles.insert(key, TimeWindowFilter::new(None).apply_table(table)?);
    }

    let max_age = TimeDelta::seconds(config.max_age_secs);
    let rows = config
        .rows
        .iter()
        .map(|row| {
            let bundle = &bundles[&(row.query.clone(), row.group.clone())];
            build_row(row, bundle, now, max_age)
        })
        .collect::<TelemetryResult<Vec<_>>>()?;

    Ok(FacilitySummary {
        id: config.id.clone(),
        title: config.title.clone(),
        updated: now,
        rows,
    })
}

fn row_table<'a>(snapshot: &'a QuerySnapshot, row: &SummaryRowConfig) -> TelemetryResult<&'a QueryTable> {
    snapshot
        .get(&row.query)
        .and_then(|r| r.table(row.group.as_deref()))
        .ok_or_else(|| TelemetryError::MissingQuery {
            query: row.query.clone(),
        })
}

fn build_row(
    row: &SummaryRowConfig,
    bundle: &SeriesBundle,
    now: DateTime<Utc>,
    max_age: TimeDelta,
) -> TelemetryResult<SummaryRow> {
    let series_for = |column: &str| {
        bundle.get(column).ok_or_else(|| TelemetryError::UnknownColumn {
            column: column.to_string(),
        })
    };

    let anchor = match &row.anchor {
        Some(column) => match series_for(column)?.last_valid() {
            Some((t, _)) => Some(t),
            None => return Ok(SummaryRow::missing(&row.label)),
        },
        None => None,
    };

    let mut parts = Vec::with_capacity(row.columns.len());
    for column in &row.columns {
        match LastValue::from_series(series_for(column)?, anchor) {
            Some(value) => parts.push(value),
            None => return Ok(SummaryRow::missing(&row.label)),
        }
    }

    let value = match parts.as_slice() {
        [single] => single.clone(),
        _ => match deshred(&parts, &row.delimiter, &row.label) {
            Some(joined) => joined,
            None => return Ok(SummaryRow::missing(&row.label)),
        },
    };
    let value = value.judge_age(now, max_age);

    let text = match (&row.value_map, &value.value) {
        (Some(map), Cell::Number(v)) if *v == 0.0 => map.zero.clone(),
        (Some(map), Cell::Number(_)) => map.other.clone(),
        (None, Cell::Number(v)) => match row.decimals {
            Some(places) => format!("{:.*}", places, v),
            None => cell_text(&value.value),
        },
        (_, cell) => cell_text(cell),
    };

    Ok(SummaryRow::from_last_value(&row.label, value, text))
}
