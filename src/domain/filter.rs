// Time window filter - selects rows newer than a cutoff
use super::error::TelemetryResult;
use super::series::{Sample, Series, SeriesBundle, QueryTable};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindowFilter {
    cutoff: Option<DateTime<Utc>>,
}

impl TimeWindowFilter {
    /// No cutoff keeps everything (initial full load)
    pub fn new(cutoff: Option<DateTime<Utc>>) -> Self {
        Self { cutoff }
    }

    pub fn after(cutoff: DateTime<Utc>) -> Self {
        Self::new(Some(cutoff))
    }

    /// Entries with timestamp strictly greater than the cutoff
    pub fn apply_series(&self, series: &Series) -> Series {
        match self.cutoff {
            Some(cutoff) => series.retain_after(cutoff),
            None => series.clone(),
        }
    }

    pub fn apply_bundle(&self, bundle: &SeriesBundle) -> SeriesBundle {
        bundle.map_series(|s| self.apply_series(s))
    }

    /// Normalize a raw query table and filter it.
    ///
    /// Fails if any timestamp in the table cannot be normalized; the caller
    /// decides whether that empties the source for the current tick.
    pub fn apply_table(&self, table: &QueryTable) -> TelemetryResult<SeriesBundle> {
        let times = table
            .time
            .iter()
            .map(|t| t.normalize())
            .collect::<TelemetryResult<Vec<_>>>()?;

        let mut bundle = SeriesBundle::new();
        for (column, cells) in &table.columns {
            let samples = times
                .iter()
                .zip(cells)
                .filter(|(t, _)| self.cutoff.is_none_or(|c| **t > c))
                .map(|(t, v)| Sample::new(*t, v.clone()))
                .collect();
            bundle.insert(Series::new(column.clone(), samples)?);
        }
        Ok(bundle)
    }
}
