use chrono::Duration;
use ens_algo::test_utils::{incident, minute, single_unit_plant, two_grouping_plant};
use ens_algo::{
    allocate_energy, attribute, attribute_plant, compute_availability, populate,
    propagate_attribution, stitch_intervals, AttributionOptions, IncidentGrid,
};
use ens_core::diagnostics::categories;
use ens_core::{AssetId, AttributionKey, Category, Diagnostics, IncidentId, Origin};
use ens_ts::TimeGridBuilder;

const TOL: f64 = 1e-6;

fn keep_grid() -> AttributionOptions {
    AttributionOptions {
        keep_grid: true,
        ..AttributionOptions::default()
    }
}

#[test]
fn plant_incident_lands_on_its_only_unit() {
    let hierarchy = single_unit_plant();
    let incidents = vec![incident(
        1,
        1,
        0,
        10,
        Category::Unavailability,
        Origin::External,
        1.0,
    )];
    let mut diag = Diagnostics::new();
    let results = attribute(&hierarchy, &incidents, &keep_grid(), &mut diag).unwrap();
    assert_eq!(results.len(), 1);
    let plant = &results[0];

    let grid = plant.grid.as_ref().unwrap();
    let unit = hierarchy.resolve(AssetId::new(2)).unwrap();
    let unit_energy = grid.node_columns(unit).unwrap().total_energy();
    assert!((unit_energy - 1.0).abs() < TOL);

    assert_eq!(plant.intervals.len(), 1);
    let interval = &plant.intervals[0];
    assert_eq!(interval.asset_id, AssetId::new(2));
    assert_eq!(interval.origin_asset_id, AssetId::new(1));
    assert_eq!(interval.incident_id, IncidentId::new(1));
    assert_eq!(interval.start, minute(0));
    assert_eq!(interval.end, minute(10) - Duration::minutes(1));
    assert!((interval.ens_total.value() - 1.0).abs() < TOL);
    assert!(!interval.source_anomaly);
}

#[test]
fn unranked_plant_incident_still_reaches_idle_unit() {
    let hierarchy = single_unit_plant();
    let incidents = vec![
        incident(1, 1, 0, 10, Category::Limitation, Origin::External, 1.0).with_ranks(0, 0),
    ];
    let mut diag = Diagnostics::new();
    let results = attribute(&hierarchy, &incidents, &keep_grid(), &mut diag).unwrap();
    let plant = &results[0];

    assert_eq!(plant.intervals.len(), 1);
    let interval = &plant.intervals[0];
    assert_eq!(interval.asset_id, AssetId::new(2));
    assert_eq!(interval.incident_id, IncidentId::new(1));
    assert_eq!(interval.severity_rank, 0);
    let reported: f64 = plant.intervals.iter().map(|i| i.ens_total.value()).sum();
    assert!((reported - 1.0).abs() < TOL);
}

#[test]
fn allocation_conserves_energy_at_every_node() {
    let hierarchy = two_grouping_plant();
    let incidents = vec![
        incident(1, 1, 0, 10, Category::Limitation, Origin::External, 0.8),
        incident(2, 10, 3, 6, Category::Unavailability, Origin::External, 0.3),
        incident(3, 11, 2, 4, Category::Unavailability, Origin::Internal, 0.0),
    ];
    let plant = hierarchy.plants()[0];
    let time = TimeGridBuilder::new(Duration::minutes(1))
        .extent(minute(0), minute(10))
        .build()
        .unwrap();
    let mut grid = IncidentGrid::new(&hierarchy, plant, time);
    let mut diag = Diagnostics::new();
    populate(&mut grid, &hierarchy, &incidents, &mut diag).unwrap();
    compute_availability(&mut grid);

    // Parent energy before it receives anything from above.
    let own: Vec<f64> = (0..grid.slot_count())
        .map(|s| grid.columns(s).total_energy())
        .collect();
    allocate_energy(&mut grid, &hierarchy, &mut diag);

    let mut checked = 0;
    for slot in 0..grid.slot_count() {
        if grid.is_leaf(slot) {
            continue;
        }
        let parent = grid.columns(slot);
        for t in 0..grid.tick_count() {
            if parent.associated_power[t] <= 0.0 {
                continue;
            }
            let expected = parent.energy_at(t);
            let received: f64 = grid
                .children(slot)
                .iter()
                .map(|&c| {
                    let child = grid.columns(c);
                    child.energy_at(t) - own_at(&grid, &incidents, &hierarchy, c, t)
                })
                .sum();
            assert!(
                (received - expected).abs() <= TOL * expected.abs().max(1.0),
                "slot {slot} tick {t}: {received} != {expected}"
            );
            checked += 1;
        }
    }
    assert!(checked > 0);
    assert!(own.iter().sum::<f64>() > 0.0);
}

/// Energy a slot got from its own incidents (rate per tick).
fn own_at(
    grid: &IncidentGrid,
    incidents: &[ens_core::RawIncident],
    hierarchy: &ens_core::AssetHierarchy,
    slot: usize,
    t: usize,
) -> f64 {
    let node = grid.columns(slot).node;
    let ts = grid.time().timestamp(t);
    incidents
        .iter()
        .filter(|i| hierarchy.resolve(i.asset_id) == Some(node))
        .filter(|i| i.start <= ts && ts < i.end)
        .map(|i| {
            let ticks = grid.time().tick_span(i.start, i.end);
            i.ens_total.value() / (ticks.end - ticks.start) as f64
        })
        .sum()
}

#[test]
fn collapse_recovers_non_overlapping_incidents() {
    let hierarchy = single_unit_plant();
    let incidents = vec![
        incident(1, 2, 0, 10, Category::Unavailability, Origin::Internal, 1.0),
        incident(2, 2, 10, 20, Category::Limitation, Origin::External, 0.5),
        incident(3, 2, 30, 31, Category::Limitation, Origin::Internal, 0.1),
    ];
    let mut diag = Diagnostics::new();
    let results = attribute(&hierarchy, &incidents, &AttributionOptions::default(), &mut diag)
        .unwrap();
    let intervals = &results[0].intervals;
    assert_eq!(intervals.len(), incidents.len());
    for (interval, source) in intervals.iter().zip(&incidents) {
        assert_eq!(interval.incident_id, source.id);
        assert_eq!(interval.start, source.start);
        assert_eq!(interval.end, source.end - Duration::minutes(1));
        assert_eq!(interval.category, source.category);
        assert_eq!(interval.origin, source.origin);
        assert!((interval.ens_total.value() - source.ens_total.value()).abs() < TOL);
    }
    assert_eq!(results[0].diagnostics.count_in(categories::OVERLAP), 0);
}

#[test]
fn overlapping_incidents_keep_both_rates() {
    let hierarchy = single_unit_plant();
    let incidents = vec![
        incident(1, 2, 0, 10, Category::Unavailability, Origin::Internal, 1.0),
        incident(2, 2, 5, 15, Category::Limitation, Origin::External, 2.0),
    ];
    let plant = hierarchy.plants()[0];
    let result = attribute_plant(&hierarchy, plant, &incidents, &keep_grid()).unwrap();
    let grid = result.grid.as_ref().unwrap();
    let unit = hierarchy.resolve(AssetId::new(2)).unwrap();
    let columns = grid.node_columns(unit).unwrap();

    for t in 5..10 {
        assert!(columns.energy_at(t) >= 0.1 + 0.2 - 1e-12);
    }
    let attribution = columns.attribution.as_ref().unwrap();
    assert_eq!(attribution.incident_id[5], Some(IncidentId::new(2)));
    assert!(attribution.unavailability(5) && attribution.limitation(5));
    assert_eq!(result.diagnostics.count_in(categories::OVERLAP), 1);

    let total: f64 = result.intervals.iter().map(|i| i.ens_total.value()).sum();
    assert!((total - 3.0).abs() < TOL);
}

fn leaf_keys(grid: &IncidentGrid) -> Vec<Vec<AttributionKey>> {
    (0..grid.slot_count())
        .filter(|s| grid.is_leaf(*s))
        .map(|s| {
            let attribution = grid.columns(s).attribution.as_ref();
            (0..grid.tick_count())
                .map(|t| attribution.map(|a| a.key(t)).unwrap_or_default())
                .collect()
        })
        .collect()
}

#[test]
fn propagation_never_weakens_a_child() {
    let hierarchy = two_grouping_plant();
    let incidents = vec![
        incident(1, 1, 0, 10, Category::Unavailability, Origin::External, 0.5).with_ranks(2, 1),
        incident(2, 11, 0, 5, Category::Unavailability, Origin::Internal, 0.1).with_ranks(3, 1),
        incident(3, 21, 0, 10, Category::Limitation, Origin::Internal, 0.1).with_ranks(1, 5),
        incident(4, 20, 2, 4, Category::Limitation, Origin::External, 0.1).with_ranks(2, 3),
    ];
    let plant = hierarchy.plants()[0];
    let time = TimeGridBuilder::new(Duration::minutes(1))
        .extent(minute(0), minute(10))
        .build()
        .unwrap();
    let mut grid = IncidentGrid::new(&hierarchy, plant, time);
    let mut diag = Diagnostics::new();
    populate(&mut grid, &hierarchy, &incidents, &mut diag).unwrap();
    compute_availability(&mut grid);
    allocate_energy(&mut grid, &hierarchy, &mut diag);

    let before = leaf_keys(&grid);
    propagate_attribution(&mut grid);
    let after = leaf_keys(&grid);
    for (b, a) in before.iter().zip(&after) {
        for (kb, ka) in b.iter().zip(a) {
            assert!(ka >= kb);
        }
    }

    let unit = |id| {
        grid.node_columns(hierarchy.resolve(AssetId::new(id)).unwrap())
            .and_then(|c| c.attribution.as_ref())
            .unwrap()
    };
    assert_eq!(unit(11).incident_id[0], Some(IncidentId::new(2)));
    assert_eq!(unit(11).incident_id[7], Some(IncidentId::new(1)));
    assert_eq!(unit(21).incident_id[3], Some(IncidentId::new(4)));
    assert_eq!(unit(21).incident_id[8], Some(IncidentId::new(1)));
    assert_eq!(unit(22).incident_id[3], Some(IncidentId::new(4)));
    assert!(grid.columns(0).attribution.is_none());
}

#[test]
fn empty_incident_table_is_not_an_error() {
    let hierarchy = two_grouping_plant();
    let mut diag = Diagnostics::new();
    let results = attribute(&hierarchy, &[], &AttributionOptions::default(), &mut diag).unwrap();
    assert!(results.iter().all(|r| r.intervals.is_empty()));
}

#[test]
fn chunked_runs_stitch_back_to_one_interval() {
    let hierarchy = single_unit_plant();
    let incidents = vec![incident(
        9,
        2,
        2,
        12,
        Category::Limitation,
        Origin::External,
        1.0,
    )];
    let plant = hierarchy.plants()[0];

    let whole = attribute_plant(&hierarchy, plant, &incidents, &AttributionOptions::default())
        .unwrap()
        .intervals;

    let mut pieces = Vec::new();
    for (from, to) in [(minute(0), minute(5)), (minute(5), minute(20))] {
        let opts = AttributionOptions {
            extent: Some((from, to)),
            window: Some((from, to)),
            ..AttributionOptions::default()
        };
        pieces.extend(
            attribute_plant(&hierarchy, plant, &incidents, &opts)
                .unwrap()
                .intervals,
        );
    }
    assert_eq!(pieces.len(), 2);
    let stitched = stitch_intervals(pieces, Duration::minutes(1));

    assert_eq!(stitched.len(), 1);
    assert_eq!(whole.len(), 1);
    assert_eq!(stitched[0].start, whole[0].start);
    assert_eq!(stitched[0].end, whole[0].end);
    assert!((stitched[0].ens_total.value() - whole[0].ens_total.value()).abs() < TOL);
    assert!((stitched[0].ens_total.value() - 1.0).abs() < TOL);
}
