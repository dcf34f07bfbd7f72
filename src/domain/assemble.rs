// Outer join assembler - merges bundles on the union of their timestamps
use super::error::{TelemetryError, TelemetryResult};
use super::series::{Cell, Sample, Series, SeriesBundle};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Merged rows: one shared index, every column defined at every index entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeResult {
    pub index: Vec<DateTime<Utc>>,
    pub columns: BTreeMap<String, Vec<Option<Cell>>>,
}

impl MergeResult {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<Cell>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Keep only the named columns
    pub fn retain_columns<'a>(&mut self, keep: impl IntoIterator<Item = &'a str>) {
        let keep: BTreeSet<&str> = keep.into_iter().collect();
        self.columns.retain(|name, _| keep.contains(name.as_str()));
    }

    /// Turn the merged rows back into a bundle, one series per column
    pub fn to_bundle(&self) -> SeriesBundle {
        SeriesBundle::from_series(self.columns.iter().map(|(name, cells)| {
            let samples = self
                .index
                .iter()
                .zip(cells)
                .map(|(t, v)| Sample::new(*t, v.clone()))
                .collect();
            // The index is strictly increasing by construction
            Series::new(name.clone(), samples).unwrap_or_else(|_| Series::empty(name.clone()))
        }))
    }
}

/// Outer-joins bundles and forward-fills the gaps.
///
/// A carry row may seed the fill with values known from before the first
/// input timestamp, which is how new rows are continued from a buffer that
/// already holds earlier data.
#[derive(Debug, Clone, Default)]
pub struct OuterJoinAssembler {
    carry: BTreeMap<String, Option<Cell>>,
}

impl OuterJoinAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_carry(carry: BTreeMap<String, Option<Cell>>) -> Self {
        Self { carry }
    }

    pub fn assemble(&self, bundles: &[&SeriesBundle]) -> TelemetryResult<MergeResult> {
        let mut merged: BTreeMap<&str, BTreeMap<DateTime<Utc>, Option<&Cell>>> = BTreeMap::new();
        let mut index = BTreeSet::new();

        for bundle in bundles {
            for series in bundle.iter() {
                let column = merged.entry(series.name()).or_default();
                for sample in series.samples() {
                    index.insert(sample.time);
                    let slot = column.entry(sample.time).or_insert(None);
                    *slot = combine(series.name(), sample.time, *slot, sample.value.as_ref())?;
                }
            }
        }

        let mut names: BTreeSet<&str> = merged.keys().copied().collect();
        names.extend(self.carry.keys().map(String::as_str));

        let columns = names
            .into_iter()
            .map(|name| {
                let mut last = self.carry.get(name).cloned().flatten();
                let known = merged.get(name);
                let cells = index
                    .iter()
                    .map(|t| {
                        if let Some(Some(value)) = known.and_then(|c| c.get(t)) {
                            last = Some((*value).clone());
                        }
                        last.clone()
                    })
                    .collect();
                (name.to_string(), cells)
            })
            .collect();

        Ok(MergeResult {
            index: index.into_iter().collect(),
            columns,
        })
    }
}

/// Combine two observations of one column at one timestamp. Missing data
/// yields to a value; two different values are a conflict.
fn combine<'a>(
    column: &str,
    time: DateTime<Utc>,
    existing: Option<&'a Cell>,
    incoming: Option<&'a Cell>,
) -> TelemetryResult<Option<&'a Cell>> {
    match (existing, incoming) {
        (Some(a), Some(b)) if a != b => Err(TelemetryError::ConflictingSample {
            column: column.to_string(),
            time,
        }),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::tests::{at, numeric};
    use assert_matches::assert_matches;

    fn nums(values: &[Option<f64>]) -> Vec<Option<Cell>> {
        values.iter().map(|v| v.map(Cell::Number)).collect()
    }

    fn bundle_a() -> SeriesBundle {
        SeriesBundle::from_series([numeric("A", &[(1, 10.0), (3, 30.0), (5, 50.0)])])
    }

    fn bundle_b() -> SeriesBundle {
        SeriesBundle::from_series([numeric("B", &[(2, 100.0), (4, 200.0)])])
    }

    #[test]
    fn test_outer_join_forward_fills() {
        let merged = OuterJoinAssembler::new()
            .assemble(&[&bundle_a(), &bundle_b()])
            .unwrap();

        assert_eq!(merged.index, vec![at(1), at(2), at(3), at(4), at(5)]);
        assert_eq!(
            merged.columns["A"],
            nums(&[Some(10.0), Some(10.0), Some(30.0), Some(30.0), Some(50.0)])
        );
        assert_eq!(
            merged.columns["B"],
            nums(&[None, Some(100.0), Some(100.0), Some(200.0), Some(200.0)])
        );
    }

    #[test]
    fn test_argument_order_does_not_matter() {
        let assembler = OuterJoinAssembler::new();
        let ab = assembler.assemble(&[&bundle_a(), &bundle_b()]).unwrap();
        let ba = assembler.assemble(&[&bundle_b(), &bundle_a()]).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_reassembling_a_result_is_a_no_op() {
        let assembler = OuterJoinAssembler::new();
        let merged = assembler.assemble(&[&bundle_a(), &bundle_b()]).unwrap();
        let again = merged.to_bundle();

        assert_eq!(assembler.assemble(&[&again]).unwrap(), merged);
        assert_eq!(assembler.assemble(&[&again, &again]).unwrap(), merged);
    }

    #[test]
    fn test_explicit_gaps_are_filled_but_never_backwards() {
        let series = Series::new(
            "Humidity",
            vec![
                Sample::new(at(2), None),
                Sample::new(at(3), Some(Cell::Number(40.0))),
                Sample::new(at(4), None),
            ],
        )
        .unwrap();
        let other = SeriesBundle::from_series([numeric("AirTemp", &[(1, 5.0)])]);

        let merged = OuterJoinAssembler::new()
            .assemble(&[&SeriesBundle::from_series([series]), &other])
            .unwrap();

        assert_eq!(
            merged.columns["Humidity"],
            nums(&[None, None, Some(40.0), Some(40.0)])
        );
    }

    #[test]
    fn test_carry_seeds_the_fill() {
        let carry = BTreeMap::from([
            ("A".to_string(), Some(Cell::Number(7.0))),
            ("Idle".to_string(), Some(Cell::Text("parked".into()))),
        ]);
        let merged = OuterJoinAssembler::with_carry(carry)
            .assemble(&[&bundle_b()])
            .unwrap();

        assert_eq!(merged.columns["A"], nums(&[Some(7.0), Some(7.0)]));
        assert_eq!(merged.columns["Idle"].len(), 2);
        assert_eq!(merged.columns["B"], nums(&[Some(100.0), Some(200.0)]));
    }

    #[test]
    fn test_conflicting_values_are_rejected() {
        let left = SeriesBundle::from_series([numeric("A", &[(1, 1.0)])]);
        let right = SeriesBundle::from_series([numeric("A", &[(1, 2.0)])]);

        assert_matches!(
            OuterJoinAssembler::new().assemble(&[&left, &right]),
            Err(TelemetryError::ConflictingSample { .. })
        );
    }

    #[test]
    fn test_empty_input_gives_empty_result() {
        let merged = OuterJoinAssembler::new().assemble(&[]).unwrap();
        assert!(merged.is_empty());
        assert!(merged.columns.is_empty());
    }
}
