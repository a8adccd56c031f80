//! Align irregular samples onto a [`TimeGrid`] and fill the gaps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::grid::TimeGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    #[default]
    Mean,
    /// Latest sample in the bucket; for commands and angles.
    Last,
}

#[derive(Default)]
struct BucketStats {
    count: usize,
    sum: f64,
    last: f64,
}

impl BucketStats {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    fn value(&self, agg: Aggregation) -> f64 {
        match agg {
            Aggregation::Mean => self.sum / self.count as f64,
            Aggregation::Last => self.last,
        }
    }
}

/// Bucket samples by the grid tick at or before their timestamp. Ticks with
/// no (non-missing) sample come back as `None`; samples outside the grid are
/// dropped.
pub fn resample_onto<I>(grid: &TimeGrid, samples: I, agg: Aggregation) -> Vec<Option<f64>>
where
    I: IntoIterator<Item = (DateTime<Utc>, Option<f64>)>,
{
    let mut buckets: BTreeMap<usize, BucketStats> = BTreeMap::new();
    for (ts, value) in samples {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            continue;
        };
        let idx = grid.floor_index(ts);
        if idx < 0 || idx as usize >= grid.len() {
            continue;
        }
        buckets.entry(idx as usize).or_default().push(value);
    }

    let mut out = vec![None; grid.len()];
    for (idx, stats) in buckets {
        out[idx] = Some(stats.value(agg));
    }
    out
}

pub fn missing_ticks<T>(series: &[Option<T>]) -> usize {
    series.iter().filter(|v| v.is_none()).count()
}

pub fn forward_fill<T: Copy>(series: &mut [Option<T>]) {
    let mut last = None;
    for v in series.iter_mut() {
        match v {
            Some(value) => last = Some(*value),
            None => *v = last,
        }
    }
}

pub fn backward_fill<T: Copy>(series: &mut [Option<T>]) {
    let mut next = None;
    for v in series.iter_mut().rev() {
        match v {
            Some(value) => next = Some(*value),
            None => *v = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, m, s).unwrap()
    }

    #[test]
    fn resample_means_per_tick_and_marks_gaps() {
        let grid = TimeGrid::new(at(0, 0), Duration::minutes(1), 4).unwrap();
        let samples = vec![
            (at(0, 0), Some(1.0)),
            (at(0, 30), Some(3.0)),
            (at(2, 10), Some(5.0)),
            (at(2, 20), None),
            (at(9, 0), Some(100.0)),
        ];
        let out = resample_onto(&grid, samples, Aggregation::Mean);
        assert_eq!(out, vec![Some(2.0), None, Some(5.0), None]);
        assert_eq!(missing_ticks(&out), 2);
    }

    #[test]
    fn resample_last_keeps_latest_sample() {
        let grid = TimeGrid::new(at(0, 0), Duration::minutes(1), 1).unwrap();
        let samples = vec![(at(0, 10), Some(4.0)), (at(0, 20), Some(1.0))];
        assert_eq!(resample_onto(&grid, samples, Aggregation::Last), vec![Some(1.0)]);
    }

    #[test]
    fn forward_then_backward_fill() {
        let mut series = vec![None, Some(true), None, Some(false), None];
        forward_fill(&mut series);
        assert_eq!(series, vec![None, Some(true), Some(true), Some(false), Some(false)]);
        backward_fill(&mut series);
        assert_eq!(series[0], Some(true));
    }
}
