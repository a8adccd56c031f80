//! Run-length reconstruction of intervals from grid columns.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use ens_core::incident::hours_between;
use ens_core::{
    AssetHierarchy, CollapsedInterval, EnergyCategory, IncidentId, IncidentStatus,
    MegawattHours, RawIncident,
};
use ens_ts::period_boundaries;

use crate::grid::IncidentGrid;

/// Inclusive tick range `[start, end]` of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub end: usize,
}

impl Run {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn ticks(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Maximal runs of one repeated `Some` value. `None` never forms a run.
pub fn detect_runs<K: PartialEq>(values: &[Option<K>]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < values.len() {
        let Some(current) = &values[i] else {
            i += 1;
            continue;
        };
        let start = i;
        while i + 1 < values.len() && values[i + 1].as_ref() == Some(current) {
            i += 1;
        }
        runs.push(Run { start, end: i });
        i += 1;
    }
    runs
}

/// Runs of `true`.
pub fn bool_runs(flags: &[bool]) -> Vec<Run> {
    let keyed: Vec<Option<()>> = flags.iter().map(|f| f.then_some(())).collect();
    detect_runs(&keyed)
}

/// One interval per run of identical winning incident on every node that
/// still carries attribution (the leaves, once propagation has run).
///
/// `window` restricts the scan to ticks in `[from, to)`, which is how chunked
/// runs avoid emitting the tick shared with the next chunk.
pub fn collapse_grid(
    grid: &IncidentGrid,
    hierarchy: &AssetHierarchy,
    incidents: &HashMap<IncidentId, &RawIncident>,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Vec<CollapsedInterval> {
    let time = grid.time();
    let range = match window {
        Some((from, to)) => time.window(from, to),
        None => 0..time.len(),
    };
    let plant_id = hierarchy.node(grid.plant()).id;
    let mut out = Vec::new();

    for slot in grid.attributed_slots() {
        let columns = grid.columns(slot);
        let Some(attribution) = columns.attribution.as_ref() else {
            continue;
        };
        let asset = hierarchy.node(columns.node);
        let keys: Vec<Option<IncidentId>> = attribution.incident_id[range.clone()]
            .iter()
            .map(|id| id.filter(|id| !id.is_null()))
            .collect();

        for run in detect_runs(&keys) {
            let first = range.start + run.start;
            let last = range.start + run.end;
            let Some(id) = attribution.incident_id[first] else {
                continue;
            };
            let ens: f64 = (first..=last).map(|t| columns.energy_at(t)).sum();
            let fallback = EnergyCategory::ALL
                .into_iter()
                .find(|c| attribution.flag(*c, first))
                .unwrap_or(EnergyCategory::UnavailabilityInternal);
            let source = incidents.get(&id);
            let start = time.timestamp(first);
            let end = time.timestamp(last);

            out.push(CollapsedInterval {
                plant_id,
                asset_id: asset.id,
                incident_id: id,
                origin_asset_id: source.map(|i| i.asset_id).unwrap_or(asset.id),
                category: source.map(|i| i.category).unwrap_or(fallback.category()),
                origin: source.map(|i| i.origin).unwrap_or(fallback.origin()),
                severity_rank: attribution.severity_rank[first],
                provenance_rank: attribution.provenance_rank[first],
                status: source.map(|i| i.status).unwrap_or(IncidentStatus::Open),
                start,
                end,
                hours: hours_between(start, end),
                ens_total: MegawattHours(ens),
                nominal_power: columns.nominal_power,
                source_anomaly: false,
            });
        }
    }

    sort_intervals(&mut out);
    out
}

pub fn sort_intervals(intervals: &mut [CollapsedInterval]) {
    intervals.sort_by(|a, b| {
        (a.plant_id, a.asset_id, a.start, a.incident_id)
            .cmp(&(b.plant_id, b.asset_id, b.start, b.incident_id))
    });
}

/// Merge intervals split across chunk boundaries: same asset, same winning
/// incident, and the later one starts exactly one step after the earlier
/// one ends.
pub fn stitch_intervals(
    mut intervals: Vec<CollapsedInterval>,
    step: Duration,
) -> Vec<CollapsedInterval> {
    sort_intervals(&mut intervals);
    let mut out: Vec<CollapsedInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        if let Some(prev) = out.last_mut() {
            let adjacent = prev.plant_id == interval.plant_id
                && prev.asset_id == interval.asset_id
                && prev.incident_id == interval.incident_id
                && prev.source_anomaly == interval.source_anomaly
                && !prev.incident_id.is_null()
                && prev.end + step == interval.start;
            if adjacent {
                prev.end = interval.end;
                prev.ens_total += interval.ens_total;
                prev.recompute_hours();
                continue;
            }
        }
        out.push(interval);
    }
    out
}

/// Cut intervals at period boundaries (multiples of `period` since the
/// epoch). A boundary tick opens the later piece, so the earlier piece ends
/// one `step` before it. Energy is prorated by tick count, with both end
/// ticks included.
pub fn split_by_period(
    intervals: &[CollapsedInterval],
    period: Duration,
    step: Duration,
) -> Vec<CollapsedInterval> {
    let tick_count = |start: DateTime<Utc>, end: DateTime<Utc>| -> f64 {
        let step_ms = step.num_milliseconds().max(1);
        ((end - start).num_milliseconds() / step_ms + 1) as f64
    };
    let mut out = Vec::with_capacity(intervals.len());
    for interval in intervals {
        let cuts = period_boundaries(interval.start, interval.end + step, period);
        if cuts.is_empty() {
            out.push(interval.clone());
            continue;
        }
        let total = tick_count(interval.start, interval.end);
        let mut starts = Vec::with_capacity(cuts.len() + 1);
        starts.push(interval.start);
        starts.extend(cuts);
        for (k, &start) in starts.iter().enumerate() {
            let end = match starts.get(k + 1) {
                Some(&next) => next - step,
                None => interval.end,
            };
            let mut piece = interval.clone();
            piece.start = start;
            piece.end = end;
            piece.ens_total = interval.ens_total * (tick_count(start, end) / total);
            piece.recompute_hours();
            out.push(piece);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::minute;
    use ens_core::{AssetId, Category, Megawatts, Origin};

    fn interval(incident: u64, start: i64, end: i64, ens: f64) -> CollapsedInterval {
        CollapsedInterval {
            plant_id: AssetId::new(1),
            asset_id: AssetId::new(2),
            incident_id: IncidentId::new(incident),
            origin_asset_id: AssetId::new(2),
            category: Category::Unavailability,
            origin: Origin::External,
            severity_rank: 1,
            provenance_rank: 1,
            status: IncidentStatus::Closed,
            start: minute(start),
            end: minute(end),
            hours: hours_between(minute(start), minute(end)),
            ens_total: MegawattHours(ens),
            nominal_power: Megawatts(2.0),
            source_anomaly: false,
        }
    }

    #[test]
    fn runs_follow_value_changes() {
        let values = vec![None, Some(1), Some(1), Some(2), None, Some(2), Some(2)];
        assert_eq!(
            detect_runs(&values),
            vec![
                Run { start: 1, end: 2 },
                Run { start: 3, end: 3 },
                Run { start: 5, end: 6 },
            ]
        );
    }

    #[test]
    fn isolated_tick_is_a_run() {
        let runs = detect_runs(&[Some('a')]);
        assert_eq!(runs, vec![Run { start: 0, end: 0 }]);
        assert_eq!(runs[0].len(), 1);
    }

    #[test]
    fn no_values_no_runs() {
        assert!(detect_runs::<u8>(&[None, None]).is_empty());
        assert!(detect_runs::<u8>(&[]).is_empty());
    }

    #[test]
    fn bool_runs_ignore_false() {
        let runs = bool_runs(&[false, true, true, false, true]);
        assert_eq!(runs, vec![Run { start: 1, end: 2 }, Run { start: 4, end: 4 }]);
    }

    #[test]
    fn stitches_adjacent_chunks() {
        let stitched = stitch_intervals(
            vec![interval(7, 60, 90, 0.5), interval(7, 0, 59, 1.0), interval(8, 91, 95, 0.1)],
            Duration::minutes(1),
        );
        assert_eq!(stitched.len(), 2);
        assert_eq!(stitched[0].start, minute(0));
        assert_eq!(stitched[0].end, minute(90));
        assert!((stitched[0].ens_total.value() - 1.5).abs() < 1e-12);
        assert!((stitched[0].hours - 1.5).abs() < 1e-12);
    }

    #[test]
    fn does_not_stitch_across_gaps() {
        let stitched = stitch_intervals(
            vec![interval(7, 0, 59, 1.0), interval(7, 61, 70, 1.0)],
            Duration::minutes(1),
        );
        assert_eq!(stitched.len(), 2);
    }

    #[test]
    fn split_at_midnight_prorates_by_ticks() {
        // 23:00 to 00:59 next day: 60 ticks on each side, 2 MWh.
        let pieces = split_by_period(
            &[interval(1, 23 * 60, 24 * 60 + 59, 2.0)],
            Duration::days(1),
            Duration::minutes(1),
        );
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].start, minute(23 * 60));
        assert_eq!(pieces[0].end, minute(23 * 60 + 59));
        assert_eq!(pieces[1].start, minute(24 * 60));
        assert_eq!(pieces[1].end, minute(24 * 60 + 59));
        assert!((pieces[0].ens_total.value() - 1.0).abs() < 1e-12);
        assert!((pieces[1].ens_total.value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn split_spanning_two_midnights_conserves_energy() {
        // 22:00 day 0 to 02:00 day 2.
        let pieces = split_by_period(
            &[interval(1, 22 * 60, 50 * 60, 4.0)],
            Duration::days(1),
            Duration::minutes(1),
        );
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[1].start, minute(24 * 60));
        assert_eq!(pieces[1].end, minute(48 * 60 - 1));
        assert!((pieces[1].ens_total.value() - 4.0 * 1440.0 / 1681.0).abs() < 1e-12);
        let total: f64 = pieces.iter().map(|p| p.ens_total.value()).sum();
        assert!((total - 4.0).abs() < 1e-12);
    }

    #[test]
    fn interval_starting_on_boundary_is_not_split() {
        let pieces = split_by_period(
            &[interval(1, 24 * 60, 25 * 60, 1.0)],
            Duration::days(1),
            Duration::minutes(1),
        );
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn split_keeps_short_intervals() {
        let pieces = split_by_period(
            &[interval(1, 10, 20, 1.0)],
            Duration::days(1),
            Duration::minutes(1),
        );
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], interval(1, 10, 20, 1.0));
    }
}
