//! Derive per-node telemetry signals on a regular grid.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ens_core::diagnostics::categories;
use ens_core::{
    AssetHierarchy, AssetId, Degrees, Diagnostics, Megawatts, NodeIdx, PowerCurveLibrary,
    TelemetryRecord,
};
use ens_ts::{missing_ticks, resample_onto, Aggregation, TimeGrid};

/// Signals for one node; every series has one entry per grid tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSignals {
    /// MW, clipped at zero.
    pub generated: Vec<Option<f64>>,
    /// MW the node could have produced.
    pub available: Vec<Option<f64>>,
    pub capacity_factor: Vec<Option<f64>>,
    pub available_ratio: Vec<Option<f64>>,
    pub wind_speed: Vec<Option<f64>>,
    pub wind_direction: Vec<Option<f64>>,
    pub setpoint: Vec<Option<f64>>,
    /// Nominal power, or the sum of the units below for nodes without one.
    pub capacity: Megawatts,
}

#[derive(Debug, Clone)]
pub struct PlantSignals {
    pub plant: NodeIdx,
    pub time: TimeGrid,
    pub nodes: BTreeMap<NodeIdx, NodeSignals>,
}

impl PlantSignals {
    pub fn get(&self, node: NodeIdx) -> Option<&NodeSignals> {
        self.nodes.get(&node)
    }

    pub fn plant_signals(&self) -> Option<&NodeSignals> {
        self.nodes.get(&self.plant)
    }
}

#[derive(Default)]
struct RawSeries {
    active_power: Vec<Option<f64>>,
    available_power: Vec<Option<f64>>,
    wind_speed: Vec<Option<f64>>,
    wind_direction: Vec<Option<f64>>,
    setpoint: Vec<Option<f64>>,
}

fn resample_field<F>(
    time: &TimeGrid,
    records: &[&TelemetryRecord],
    agg: Aggregation,
    field: F,
) -> Vec<Option<f64>>
where
    F: Fn(&TelemetryRecord) -> Option<f64>,
{
    resample_onto(time, records.iter().map(|r| (r.timestamp, field(r))), agg)
}

fn mean_of<'a>(series: impl Iterator<Item = &'a Vec<Option<f64>>>, len: usize) -> Vec<Option<f64>> {
    let mut sum = vec![0.0; len];
    let mut count = vec![0usize; len];
    for s in series {
        for (t, v) in s.iter().enumerate() {
            if let Some(v) = v {
                sum[t] += v;
                count[t] += 1;
            }
        }
    }
    sum.into_iter()
        .zip(count)
        .map(|(s, c)| (c > 0).then(|| s / c as f64))
        .collect()
}

fn direction_mean_of<'a>(
    series: impl Iterator<Item = &'a Vec<Option<f64>>>,
    len: usize,
) -> Vec<Option<f64>> {
    let series: Vec<&Vec<Option<f64>>> = series.collect();
    (0..len)
        .map(|t| {
            Degrees::circular_mean(series.iter().filter_map(|s| s[t]).map(Degrees))
                .map(|d| d.0)
        })
        .collect()
}

fn sum_of<'a>(series: impl Iterator<Item = &'a Vec<Option<f64>>>, len: usize) -> Vec<Option<f64>> {
    let mut out: Vec<Option<f64>> = vec![None; len];
    for s in series {
        for (t, v) in s.iter().enumerate() {
            if let Some(v) = v {
                *out[t].get_or_insert(0.0) += v;
            }
        }
    }
    out
}

fn ratio(values: &[Option<f64>], capacity: Megawatts) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| {
            v.filter(|_| capacity.value() > 0.0)
                .map(|v| v / capacity.value())
        })
        .collect()
}

/// Resample a plant's telemetry onto `time` and derive generation,
/// availability and wind signals for every node of the plant.
///
/// Units missing a measured available power take it from their reference
/// curve (zero without one). Non-leaf nodes sum generation and average wind
/// over their children when they have no measurement of their own; their
/// available ratio is the mean over the units below. Units with no ratio at
/// a tick borrow the plant mean.
pub fn derive_signals(
    hierarchy: &AssetHierarchy,
    plant: NodeIdx,
    time: &TimeGrid,
    telemetry: &[TelemetryRecord],
    curves: &PowerCurveLibrary,
    diag: &mut Diagnostics,
) -> PlantSignals {
    let len = time.len();
    let mut grouped: HashMap<NodeIdx, Vec<&TelemetryRecord>> = HashMap::new();
    let mut unresolved: BTreeSet<AssetId> = BTreeSet::new();
    for record in telemetry {
        match hierarchy.resolve(record.asset_id) {
            Some(node) if hierarchy.plant_of(node) == plant => {
                grouped.entry(node).or_default().push(record)
            }
            Some(_) => {}
            None => {
                unresolved.insert(record.asset_id);
            }
        }
    }
    for asset in unresolved {
        diag.add_warning_with_entity(
            categories::UNRESOLVED_ASSET,
            "telemetry references an unknown asset; rows ignored",
            &format!("asset {asset}"),
        );
    }

    let order = hierarchy.subtree(plant);
    let mut raw: HashMap<NodeIdx, RawSeries> = HashMap::new();
    for &node in &order {
        let records = grouped.get(&node).map(Vec::as_slice).unwrap_or(&[]);
        raw.insert(
            node,
            RawSeries {
                active_power: resample_field(time, records, Aggregation::Mean, |r| {
                    r.active_power
                }),
                available_power: resample_field(time, records, Aggregation::Mean, |r| {
                    r.available_power
                }),
                wind_speed: resample_field(time, records, Aggregation::Mean, |r| r.wind_speed),
                wind_direction: resample_field(time, records, Aggregation::Last, |r| {
                    r.wind_direction
                }),
                setpoint: resample_field(time, records, Aggregation::Last, |r| r.setpoint),
            },
        );
    }

    let mut nodes: BTreeMap<NodeIdx, NodeSignals> = BTreeMap::new();
    let leaves = hierarchy.leaves(plant);

    // Units first: measured values, curve fallback for available power.
    for &leaf in &leaves {
        let info = hierarchy.node(leaf);
        let series = raw.remove(&leaf).unwrap_or_default();
        let generated: Vec<Option<f64>> = series
            .active_power
            .iter()
            .map(|p| p.map(|p| p.max(0.0)))
            .collect();

        let gaps = missing_ticks(&generated);
        if gaps > 0 && gaps < len {
            diag.add_warning_with_entity(
                categories::TELEMETRY_GAP,
                &format!("{gaps} of {len} tick(s) have no active power"),
                &format!("asset {}", info.id),
            );
        }

        let curve = curves.get(info.id);
        let needs_curve = series
            .available_power
            .iter()
            .zip(series.wind_speed.iter())
            .any(|(a, w)| a.is_none() && w.is_some());
        if curve.is_none() && needs_curve {
            diag.add_warning_with_entity(
                categories::MISSING_CURVE,
                "no reference power curve; available power defaults to zero",
                &format!("asset {}", info.id),
            );
        }
        let available: Vec<Option<f64>> = series
            .available_power
            .iter()
            .zip(series.wind_speed.iter())
            .map(|(measured, wind)| match (measured, wind) {
                (Some(a), _) => Some(*a),
                (None, Some(ws)) => {
                    Some(curve.map(|c| c.interpolate(*ws).value()).unwrap_or(0.0))
                }
                (None, None) => None,
            })
            .collect();

        let capacity = info.nominal_power;
        nodes.insert(
            leaf,
            NodeSignals {
                capacity_factor: ratio(&generated, capacity),
                available_ratio: ratio(&available, capacity),
                generated,
                available,
                wind_speed: series.wind_speed,
                wind_direction: series.wind_direction,
                setpoint: series.setpoint,
                capacity,
            },
        );
    }

    // Plant mean ratio over units, then fill unit gaps with it.
    let plant_ratio = mean_of(leaves.iter().map(|l| &nodes[l].available_ratio), len);
    for leaf in &leaves {
        if let Some(signals) = nodes.get_mut(leaf) {
            let capacity = signals.capacity.value();
            for t in 0..len {
                if signals.available_ratio[t].is_none() {
                    signals.available_ratio[t] = plant_ratio[t];
                    if signals.available[t].is_none() {
                        signals.available[t] = plant_ratio[t].map(|r| r * capacity);
                    }
                }
            }
        }
    }

    // Non-leaf nodes, deepest first so children are final.
    for &node in order.iter().rev() {
        if hierarchy.is_leaf(node) {
            continue;
        }
        let info = hierarchy.node(node);
        let series = raw.remove(&node).unwrap_or_default();
        let children = hierarchy.children(node);
        let units: Vec<NodeIdx> = hierarchy.leaves(node);

        let capacity = if info.nominal_power.value() > 0.0 {
            info.nominal_power
        } else {
            units.iter().map(|u| hierarchy.node(*u).nominal_power).sum()
        };

        let generated: Vec<Option<f64>> = if series.active_power.iter().any(Option::is_some) {
            series
                .active_power
                .iter()
                .map(|p| p.map(|p| p.max(0.0)))
                .collect()
        } else {
            sum_of(children.iter().map(|c| &nodes[c].generated), len)
        };
        let wind_speed = if series.wind_speed.iter().any(Option::is_some) {
            series.wind_speed
        } else {
            mean_of(children.iter().map(|c| &nodes[c].wind_speed), len)
        };
        let wind_direction = if series.wind_direction.iter().any(Option::is_some) {
            series.wind_direction
        } else {
            direction_mean_of(children.iter().map(|c| &nodes[c].wind_direction), len)
        };
        let available_ratio = if node == plant {
            plant_ratio.clone()
        } else {
            mean_of(units.iter().map(|u| &nodes[u].available_ratio), len)
        };
        let available = available_ratio
            .iter()
            .map(|r| r.map(|r| r * capacity.value()))
            .collect();

        nodes.insert(
            node,
            NodeSignals {
                capacity_factor: ratio(&generated, capacity),
                generated,
                available,
                available_ratio,
                wind_speed,
                wind_direction,
                setpoint: series.setpoint,
                capacity,
            },
        );
    }

    PlantSignals {
        plant,
        time: time.clone(),
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{second, two_grouping_plant};
    use chrono::Duration;
    use ens_core::ReferenceCurve;

    fn record(s: i64, asset: u32, p: Option<f64>, a: Option<f64>, ws: Option<f64>) -> TelemetryRecord {
        let mut r = TelemetryRecord::new(second(s), AssetId::new(asset));
        r.active_power = p;
        r.available_power = a;
        r.wind_speed = ws;
        r
    }

    #[test]
    fn derives_unit_and_aggregate_signals() {
        let h = two_grouping_plant();
        let plant = h.plants()[0];
        let time = TimeGrid::new(second(0), Duration::seconds(10), 2).unwrap();
        let mut curves = PowerCurveLibrary::new();
        curves.insert(
            AssetId::new(12),
            ReferenceCurve::new(vec![(0.0, 0.0), (10.0, 2.0)]).unwrap(),
        );
        let telemetry = vec![
            record(0, 11, Some(-0.1), Some(2.0), Some(6.0)),
            record(0, 12, Some(1.0), None, Some(5.0)),
            record(0, 21, Some(3.0), Some(3.0), Some(8.0)),
            record(0, 22, Some(0.5), Some(0.5), Some(8.0)),
            record(10, 11, Some(1.0), Some(2.0), Some(6.0)),
        ];
        let mut diag = Diagnostics::new();
        let signals = derive_signals(&h, plant, &time, &telemetry, &curves, &mut diag);

        let node = |id: u32| signals.get(h.resolve(AssetId::new(id)).unwrap()).unwrap();
        assert_eq!(node(11).generated[0], Some(0.0));
        assert_eq!(node(11).capacity_factor[1], Some(0.5));
        // Curve fallback: 5 m/s on a 0..10 m/s -> 0..2 MW line.
        assert_eq!(node(12).available[0], Some(1.0));
        assert_eq!(node(12).available_ratio[0], Some(0.5));
        // Grouping sums generation and averages wind.
        assert_eq!(node(10).generated[0], Some(1.0));
        assert_eq!(node(10).wind_speed[0], Some(5.5));
        assert_eq!(node(10).capacity, Megawatts(4.0));
        // Plant ratio is the mean over units: (1 + 0.5 + 1 + 0.5) / 4.
        assert_eq!(node(1).available_ratio[0], Some(0.75));
        // Unit 12 has no data at tick 1 and borrows the plant mean (unit 11 only).
        assert_eq!(node(12).available_ratio[1], Some(1.0));
        assert_eq!(node(12).available[1], Some(2.0));
        assert!(diag.count_in(categories::TELEMETRY_GAP) >= 1);
    }

    #[test]
    fn aggregate_direction_wraps_through_north() {
        let h = two_grouping_plant();
        let plant = h.plants()[0];
        let time = TimeGrid::new(second(0), Duration::seconds(10), 1).unwrap();
        let mut telemetry = vec![
            record(0, 11, Some(1.0), Some(2.0), Some(6.0)),
            record(0, 12, Some(1.0), Some(2.0), Some(6.0)),
        ];
        telemetry[0].wind_direction = Some(350.0);
        telemetry[1].wind_direction = Some(10.0);
        let mut diag = Diagnostics::new();
        let signals = derive_signals(
            &h,
            plant,
            &time,
            &telemetry,
            &PowerCurveLibrary::new(),
            &mut diag,
        );
        let grouping = signals.get(h.resolve(AssetId::new(10)).unwrap()).unwrap();
        let direction = grouping.wind_direction[0].unwrap();
        assert!(direction < 1e-6 || 360.0 - direction < 1e-6, "{direction}");
    }

    #[test]
    fn missing_curve_is_reported_once() {
        let h = two_grouping_plant();
        let plant = h.plants()[0];
        let time = TimeGrid::new(second(0), Duration::seconds(10), 2).unwrap();
        let telemetry = vec![
            record(0, 21, Some(0.0), None, Some(9.0)),
            record(10, 21, Some(0.0), None, Some(9.0)),
            record(0, 99, Some(0.0), None, Some(9.0)),
        ];
        let mut diag = Diagnostics::new();
        let signals = derive_signals(
            &h,
            plant,
            &time,
            &telemetry,
            &PowerCurveLibrary::new(),
            &mut diag,
        );
        assert_eq!(diag.count_in(categories::MISSING_CURVE), 1);
        assert_eq!(diag.count_in(categories::UNRESOLVED_ASSET), 1);
        let unit = signals.get(h.resolve(AssetId::new(21)).unwrap()).unwrap();
        assert_eq!(unit.available[0], Some(0.0));
    }
}
