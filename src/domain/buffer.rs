// Bounded rolling buffer backing one live dashboard
use super::assemble::MergeResult;
use super::error::{TelemetryError, TelemetryResult};
use super::patch::Patch;
use super::series::Cell;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};

pub const INDEX_COLUMN: &str = "index";
pub const PATCH_COLUMN: &str = "patches";

/// Rows to append: the index, every data column and the matching patches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub index: Vec<DateTime<Utc>>,
    pub columns: BTreeMap<String, Vec<Option<Cell>>>,
    pub patches: Vec<Patch>,
}

impl RowBatch {
    pub fn new(merged: MergeResult, patches: Vec<Patch>) -> Self {
        Self {
            index: merged.index,
            columns: merged.columns,
            patches,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Fixed-capacity column store; the oldest rows are evicted first.
///
/// Every column, including the index and the patches, always has the same
/// length. The column set and the capacity are fixed at creation.
#[derive(Debug, Clone)]
pub struct StreamingBuffer {
    max_rows: usize,
    index: VecDeque<DateTime<Utc>>,
    columns: BTreeMap<String, VecDeque<Option<Cell>>>,
    patches: VecDeque<Patch>,
}

impl StreamingBuffer {
    pub fn new(max_rows: usize, columns: impl IntoIterator<Item = String>) -> Self {
        Self {
            max_rows,
            index: VecDeque::new(),
            columns: columns.into_iter().map(|c| (c, VecDeque::new())).collect(),
            patches: VecDeque::new(),
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn index(&self) -> &VecDeque<DateTime<Utc>> {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&VecDeque<Option<Cell>>> {
        self.columns.get(name)
    }

    pub fn patches(&self) -> &VecDeque<Patch> {
        &self.patches
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.index.back().copied()
    }

    /// Latest value of every column, used to continue forward-fill
    pub fn last_row(&self) -> BTreeMap<String, Option<Cell>> {
        self.columns
            .iter()
            .map(|(name, cells)| (name.clone(), cells.back().cloned().flatten()))
            .collect()
    }

    /// Copy of the current contents, oldest row first
    pub fn to_batch(&self) -> RowBatch {
        RowBatch {
            index: self.index.iter().copied().collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, cells)| (name.clone(), cells.iter().cloned().collect()))
                .collect(),
            patches: self.patches.iter().copied().collect(),
        }
    }

    /// Append rows to every column in lock-step, then evict from the front
    /// down to capacity. Returns the number of evicted rows. On error the
    /// buffer is untouched.
    pub fn append(&mut self, batch: RowBatch) -> TelemetryResult<usize> {
        self.check_lengths(&batch)?;
        self.check_order(&batch)?;

        let RowBatch {
            index,
            mut columns,
            patches,
        } = batch;

        self.index.extend(index);
        self.patches.extend(patches);
        for (name, cells) in self.columns.iter_mut() {
            if let Some(new_cells) = columns.remove(name) {
                cells.extend(new_cells);
            }
        }

        let evicted = self.index.len().saturating_sub(self.max_rows);
        if evicted > 0 {
            self.index.drain(..evicted);
            self.patches.drain(..evicted);
            for cells in self.columns.values_mut() {
                cells.drain(..evicted);
            }
        }

        Ok(evicted)
    }

    fn check_lengths(&self, batch: &RowBatch) -> TelemetryResult<()> {
        let expected = batch.index.len();
        let mut lengths = vec![
            (INDEX_COLUMN.to_string(), expected),
            (PATCH_COLUMN.to_string(), batch.patches.len()),
        ];
        for name in self.columns.keys() {
            lengths.push((name.clone(), batch.columns.get(name).map_or(0, Vec::len)));
        }
        for (name, cells) in &batch.columns {
            if !self.columns.contains_key(name) {
                lengths.push((name.clone(), cells.len()));
            }
        }

        let unknown = batch.columns.keys().any(|name| !self.columns.contains_key(name));
        if unknown || lengths.iter().any(|(_, len)| *len != expected) {
            return Err(TelemetryError::ColumnLengthMismatch { lengths });
        }
        Ok(())
    }

    fn check_order(&self, batch: &RowBatch) -> TelemetryResult<()> {
        let mut previous = self.last_time();
        for t in &batch.index {
            if previous.is_some_and(|p| *t <= p) {
                return Err(TelemetryError::NonMonotonic {
                    context: "buffer append".to_string(),
                    time: *t,
                });
            }
            previous = Some(*t);
        }
        Ok(())
    }
}
