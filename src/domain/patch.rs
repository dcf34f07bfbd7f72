// Tooltip patches - invisible hover targets spanning each sample interval
use super::error::{TelemetryError, TelemetryResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YRange {
    pub low: f64,
    pub high: f64,
}

impl YRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Widen a data range outward by a fraction of each bound's magnitude
    pub fn padded(min: f64, max: f64, pad: f64) -> Self {
        let low = if min < 0.0 { min * (1.0 + pad) } else { min * (1.0 - pad) };
        let high = if max < 0.0 { max * (1.0 - pad) } else { max * (1.0 + pad) };
        Self { low, high }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Patch {
    pub t_start: DateTime<Utc>,
    pub t_end: DateTime<Utc>,
    pub y_low: f64,
    pub y_high: f64,
}

impl Patch {
    /// Corner x coordinates, counter-clockwise from bottom left
    pub fn xs(&self) -> [DateTime<Utc>; 4] {
        [self.t_start, self.t_end, self.t_end, self.t_start]
    }

    pub fn ys(&self) -> [f64; 4] {
        [self.y_low, self.y_low, self.y_high, self.y_high]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TooltipPatchGenerator {
    y_range: YRange,
}

impl TooltipPatchGenerator {
    pub fn new(y_range: YRange) -> Self {
        Self { y_range }
    }

    /// One patch per consecutive pair of timestamps. With a lead-in, an
    /// extra patch of that width ending at the first timestamp comes first,
    /// giving one patch per timestamp.
    pub fn generate(
        &self,
        times: &[DateTime<Utc>],
        lead_in: Option<TimeDelta>,
    ) -> TelemetryResult<Vec<Patch>> {
        if times.len() < 2 {
            return Err(TelemetryError::InsufficientSamples { got: times.len() });
        }

        let lead = lead_in.map(|width| self.patch(times[0] - width, times[0]));
        Ok(lead
            .into_iter()
            .chain(times.windows(2).map(|w| self.patch(w[0], w[1])))
            .collect())
    }

    /// Patches for rows appended after `previous_last`, exactly one per new
    /// timestamp; the first one starts at the previous last sample.
    pub fn extend(
        &self,
        previous_last: DateTime<Utc>,
        new_times: &[DateTime<Utc>],
    ) -> TelemetryResult<Vec<Patch>> {
        let mut times = Vec::with_capacity(new_times.len() + 1);
        times.push(previous_last);
        times.extend_from_slice(new_times);
        self.generate(&times, None)
    }

    fn patch(&self, t_start: DateTime<Utc>, t_end: DateTime<Utc>) -> Patch {
        Patch {
            t_start,
            t_end,
            y_low: self.y_range.low,
            y_high: self.y_range.high,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::tests::at;
    use assert_matches::assert_matches;

    fn generator() -> TooltipPatchGenerator {
        TooltipPatchGenerator::new(YRange::new(0.0, 15.0))
    }

    #[test]
    fn test_one_patch_per_interval() {
        let times = [at(10), at(20), at(35)];
        let patches = generator().generate(&times, None).unwrap();

        assert_eq!(patches.len(), 2);
        assert_eq!((patches[0].t_start, patches[0].t_end), (at(10), at(20)));
        assert_eq!((patches[1].t_start, patches[1].t_end), (at(20), at(35)));
        assert_eq!(patches[1].xs(), [at(20), at(35), at(35), at(20)]);
        assert_eq!(patches[1].ys(), [0.0, 0.0, 15.0, 15.0]);
    }

    #[test]
    fn test_lead_in_pads_the_left_edge() {
        let times = [at(100), at(130)];
        let patches = generator()
            .generate(&times, Some(TimeDelta::seconds(60)))
            .unwrap();

        assert_eq!(patches.len(), 2);
        assert_eq!((patches[0].t_start, patches[0].t_end), (at(40), at(100)));
        assert_eq!((patches[1].t_start, patches[1].t_end), (at(100), at(130)));
    }

    #[test]
    fn test_fewer_than_two_timestamps() {
        assert_matches!(
            generator().generate(&[at(1)], Some(TimeDelta::seconds(60))),
            Err(TelemetryError::InsufficientSamples { got: 1 })
        );
        assert_matches!(
            generator().generate(&[], None),
            Err(TelemetryError::InsufficientSamples { got: 0 })
        );
    }

    #[test]
    fn test_extend_with_single_row() {
        let patches = generator().extend(at(50), &[at(55)]).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!((patches[0].t_start, patches[0].t_end), (at(50), at(55)));
    }

    #[test]
    fn test_extend_with_several_rows() {
        let patches = generator().extend(at(50), &[at(55), at(60), at(65)]).unwrap();
        assert_eq!(patches.len(), 3);
        assert_eq!(patches[0].t_start, at(50));
        assert_eq!(patches[2].t_end, at(65));
    }

    #[test]
    fn test_extend_without_rows() {
        assert_matches!(
            generator().extend(at(50), &[]),
            Err(TelemetryError::InsufficientSamples { got: 1 })
        );
    }

    #[test]
    fn test_padding_respects_sign() {
        let range = YRange::padded(-10.0, 20.0, 0.1);
        assert!((range.low - -11.0).abs() < 1e-9);
        assert!((range.high - 22.0).abs() < 1e-9);

        let range = YRange::padded(10.0, -5.0, 0.1);
        assert!((range.low - 9.0).abs() < 1e-9);
        assert!((range.high - -4.5).abs() < 1e-9);
    }
}
