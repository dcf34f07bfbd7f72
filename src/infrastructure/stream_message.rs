// Wire messages for dashboard streams and their mapping from domain types
use crate::domain::buffer::RowBatch;
use crate::domain::patch::YRange;
use crate::domain::series::Cell;
use crate::infrastructure::config::DashboardConfig;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Skeleton(DashboardSkeleton),
    Snapshot(RowsPayload),
    Append(RowsPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSkeleton {
    pub id: String,
    pub title: String,
    pub columns: Vec<ColumnSkeleton>,
    pub y_low: f64,
    pub y_high: f64,
    pub max_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSkeleton {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Column-oriented rows; times are epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowsPayload {
    pub index: Vec<i64>,
    pub columns: BTreeMap<String, Vec<Option<Cell>>>,
    pub patch_xs: Vec<[i64; 4]>,
    pub patch_ys: Vec<[f64; 4]>,
}

pub fn skeleton_message(
    config: &DashboardConfig,
    columns: impl IntoIterator<Item = String>,
    y_range: YRange,
) -> StreamMessage {
    let columns = columns
        .into_iter()
        .map(|id| {
            let described = config.columns.iter().find(|c| c.id == id);
            ColumnSkeleton {
                label: described
                    .and_then(|c| c.label.clone())
                    .unwrap_or_else(|| id.clone()),
                unit: described.and_then(|c| c.unit.clone()),
                color: described.and_then(|c| c.color.clone()),
                id,
            }
        })
        .collect();

    StreamMessage::Skeleton(DashboardSkeleton {
        id: config.id.clone(),
        title: config.title.clone(),
        columns,
        y_low: y_range.low,
        y_high: y_range.high,
        max_rows: config.max_rows,
    })
}

pub fn snapshot_message(batch: RowBatch) -> StreamMessage {
    StreamMessage::Snapshot(rows_payload(batch))
}

pub fn append_message(batch: RowBatch) -> StreamMessage {
    StreamMessage::Append(rows_payload(batch))
}

fn rows_payload(batch: RowBatch) -> RowsPayload {
    RowsPayload {
        index: batch.index.iter().map(|t| t.timestamp_millis()).collect(),
        columns: batch.columns,
        patch_xs: batch
            .patches
            .iter()
            .map(|p| p.xs().map(|t| t.timestamp_millis()))
            .collect(),
        patch_ys: batch.patches.iter().map(|p| p.ys()).collect(),
    }
}
