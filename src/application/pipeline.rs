// Dashboard pipeline - one generic gather/filter/assemble/patch path,
// parameterized entirely by a dashboard's configuration
use crate::application::snapshot_store::QuerySnapshot;
use crate::domain::assemble::{MergeResult, OuterJoinAssembler};
use crate::domain::buffer::{RowBatch, StreamingBuffer};
use crate::domain::error::{TelemetryError, TelemetryResult};
use crate::domain::filter::TimeWindowFilter;
use crate::domain::patch::{TooltipPatchGenerator, YRange};
use crate::domain::series::{QueryTable, SeriesBundle};
use crate::infrastructure::config::{ColumnTransform, DashboardConfig, SourceConfig, YLimitsConfig};
use chrono::{DateTime, TimeDelta, Utc};

/// First full load of a dashboard: its rows and the y-range its patches use
#[derive(Debug, Clone)]
pub struct InitialLoad {
    pub batch: RowBatch,
    pub y_range: YRange,
}

#[derive(Debug, Clone)]
pub struct DashboardPipeline {
    config: DashboardConfig,
}

impl DashboardPipeline {
    pub fn new(config: DashboardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Read, filter and transform every source. A source whose timestamps
    /// cannot be normalized is treated as empty for this call.
    pub fn gather(
        &self,
        snapshot: &QuerySnapshot,
        cutoff: Option<DateTime<Utc>>,
    ) -> TelemetryResult<Vec<SeriesBundle>> {
        let filter = TimeWindowFilter::new(cutoff);
        let mut bundles = Vec::with_capacity(self.config.sources.len());

        for source in &self.config.sources {
            let table = source_table(snapshot, source)?;
            let bundle = match filter.apply_table(table) {
                Ok(bundle) => bundle,
                Err(e) => {
                    tracing::warn!(
                        "Dashboard {}: treating {} as empty this tick: {}",
                        self.config.id,
                        source.query,
                        e
                    );
                    SeriesBundle::new()
                }
            };
            bundles.push(shape(bundle, source)?);
        }

        Ok(bundles)
    }

    /// Build the first rows for a fresh session. Every source must have
    /// usable rows; one emptied by bad timestamps counts as empty.
    pub fn initial_load(&self, snapshot: &QuerySnapshot) -> TelemetryResult<InitialLoad> {
        for source in &self.config.sources {
            if source_table(snapshot, source)?.is_empty() {
                return Err(TelemetryError::EmptyDataset {
                    query: source.query.clone(),
                });
            }
        }

        let bundles = self.gather(snapshot, None)?;
        if let Some((source, _)) = self
            .config
            .sources
            .iter()
            .zip(&bundles)
            .find(|(_, bundle)| bundle.is_empty())
        {
            return Err(TelemetryError::EmptyDataset {
                query: source.query.clone(),
            });
        }

        let merged = assemble(&OuterJoinAssembler::new(), &bundles)?;
        if merged.is_empty() {
            return Err(TelemetryError::EmptyDataset {
                query: self.config.id.clone(),
            });
        }

        let y_range = self.resolve_y_range(&merged)?;
        let lead_in = TimeDelta::seconds(self.config.lead_in_secs);
        let patches =
            TooltipPatchGenerator::new(y_range).generate(&merged.index, Some(lead_in))?;

        Ok(InitialLoad {
            batch: RowBatch::new(merged, patches),
            y_range,
        })
    }

    /// Rows newer than the buffer's last timestamp, shaped to the buffer's
    /// columns and gap-filled from its last row. `None` when nothing is new.
    pub fn next_batch(
        &self,
        snapshot: &QuerySnapshot,
        buffer: &StreamingBuffer,
        y_range: YRange,
    ) -> TelemetryResult<Option<RowBatch>> {
        let Some(last_time) = buffer.last_time() else {
            return Ok(None);
        };

        let bundles = self.gather(snapshot, Some(last_time))?;
        let mut merged = assemble(&OuterJoinAssembler::with_carry(buffer.last_row()), &bundles)?;
        if merged.is_empty() {
            return Ok(None);
        }

        let known: Vec<String> = buffer.column_names().map(str::to_string).collect();
        let dropped: Vec<&String> = merged.columns.keys().filter(|c| !known.contains(c)).collect();
        if !dropped.is_empty() {
            tracing::debug!(
                "Dashboard {}: ignoring columns not present at start: {:?}",
                self.config.id,
                dropped
            );
        }
        merged.retain_columns(known.iter().map(String::as_str));

        let patches = TooltipPatchGenerator::new(y_range).extend(last_time, &merged.index)?;
        Ok(Some(RowBatch::new(merged, patches)))
    }

    fn resolve_y_range(&self, merged: &MergeResult) -> TelemetryResult<YRange> {
        match &self.config.y_limits {
            YLimitsConfig::Fixed([low, high]) => Ok(YRange::new(*low, *high)),
            YLimitsConfig::Auto {
                low_column,
                high_column,
                pad,
            } => {
                let min = column_extreme(merged, low_column, f64::min)?;
                let max = column_extreme(merged, high_column, f64::max)?;
                Ok(YRange::padded(min, max, *pad))
            }
        }
    }
}

fn source_table<'a>(
    snapshot: &'a QuerySnapshot,
    source: &SourceConfig,
) -> TelemetryResult<&'a QueryTable> {
    let missing = || TelemetryError::MissingQuery {
        query: match &source.group {
            Some(group) => format!("{}[{}]", source.query, group),
            None => source.query.clone(),
        },
    };

    snapshot
        .get(&source.query)
        .ok_or_else(missing)?
        .table(source.group.as_deref())
        .ok_or_else(missing)
}

/// Drop unwanted columns, convert units, then prefix names
fn shape(bundle: SeriesBundle, source: &SourceConfig) -> TelemetryResult<SeriesBundle> {
    let mut bundle = bundle.without(&source.drop);
    for ColumnTransform { column, transform } in &source.transforms {
        // A transform for a column absent this tick is not an error
        if bundle.get(column).is_some() {
            bundle = bundle.map_column(column, |v| transform.apply(v))?;
        }
    }
    Ok(match &source.prefix {
        Some(prefix) => bundle.with_prefix(prefix),
        None => bundle,
    })
}

fn assemble(assembler: &OuterJoinAssembler, bundles: &[SeriesBundle]) -> TelemetryResult<MergeResult> {
    let refs: Vec<&SeriesBundle> = bundles.iter().collect();
    assembler.assemble(&refs)
}

fn column_extreme(
    merged: &MergeResult,
    column: &str,
    pick: fn(f64, f64) -> f64,
) -> TelemetryResult<f64> {
    let cells = merged
        .column(column)
        .ok_or_else(|| TelemetryError::UnknownColumn {
            column: column.to_string(),
        })?;

    cells
        .iter()
        .filter_map(|c| c.as_ref().and_then(|c| c.as_f64()))
        .filter(|v| v.is_finite())
        .reduce(pick)
        .ok_or_else(|| TelemetryError::EmptyDataset {
            query: format!("column {}", column),
        })
}
