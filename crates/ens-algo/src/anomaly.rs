//! Detection of undocumented unavailability and limitation from telemetry.

use std::collections::BTreeMap;

use ens_core::{
    AnomalyKind, AssetHierarchy, Category, DetectedAnomaly, NodeIdx, RawIncident,
    TriggerParameters,
};
use serde::{Deserialize, Serialize};

use crate::collapse::bool_runs;
use crate::signals::{NodeSignals, PlantSignals};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnavailabilityThresholds {
    /// Shortest run reported, measured as last tick minus first tick.
    pub min_duration_s: i64,
    pub capacity_factor_max: f64,
    pub wind_speed_min: f64,
    pub available_ratio_min: f64,
    /// Extra plant-level context required for groupings and units.
    pub plant_wind_speed_min: Option<f64>,
    pub plant_available_ratio_min: Option<f64>,
}

impl Default for UnavailabilityThresholds {
    fn default() -> Self {
        Self {
            min_duration_s: 30,
            capacity_factor_max: 0.0,
            wind_speed_min: 3.75,
            available_ratio_min: 0.03,
            plant_wind_speed_min: None,
            plant_available_ratio_min: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitationOptions {
    pub min_duration_s: i64,
    pub plant: bool,
    pub units: bool,
}

impl Default for LimitationOptions {
    fn default() -> Self {
        Self {
            min_duration_s: 30,
            plant: true,
            units: false,
        }
    }
}

fn at_least(value: Option<f64>, min: f64) -> bool {
    value.is_some_and(|v| v >= min)
}

pub fn generating(signals: &NodeSignals) -> Vec<bool> {
    signals
        .generated
        .iter()
        .map(|g| g.is_some_and(|g| g > 0.0))
        .collect()
}

/// Ticks where the node looks stopped while it should be producing.
/// `plant` supplies the optional plant-level context for non-plant nodes.
pub fn trigger(
    signals: &NodeSignals,
    plant: Option<&NodeSignals>,
    th: &UnavailabilityThresholds,
) -> Vec<bool> {
    (0..signals.generated.len())
        .map(|t| {
            let measured = signals.generated[t].is_some() && signals.available[t].is_some();
            let own = measured
                && signals.capacity_factor[t].is_some_and(|fc| fc <= th.capacity_factor_max)
                && at_least(signals.available_ratio[t], th.available_ratio_min)
                && at_least(signals.wind_speed[t], th.wind_speed_min);
            let context = match plant {
                Some(p) => {
                    th.plant_wind_speed_min
                        .map_or(true, |min| at_least(p.wind_speed[t], min))
                        && th
                            .plant_available_ratio_min
                            .map_or(true, |min| at_least(p.available_ratio[t], min))
                }
                None => true,
            };
            own && context
        })
        .collect()
}

/// Latch state carried from one stretch of telemetry into the next, per node.
pub type LatchState = BTreeMap<NodeIdx, bool>;

/// Hysteresis latch: generating clears the flag, a trigger sets it, and
/// anything else holds the previous state. Leading ticks take the first
/// known state.
pub fn latch(trigger: &[bool], generating: &[bool]) -> Vec<bool> {
    latch_seeded(trigger, generating, None).0
}

/// [`latch`] continuing from `seed`, the state an earlier stretch ended in.
/// Leading undecided ticks hold the seed when there is one. Also returns
/// the state to carry on, `None` while nothing has decided it.
pub fn latch_seeded(
    trigger: &[bool],
    generating: &[bool],
    seed: Option<bool>,
) -> (Vec<bool>, Option<bool>) {
    let mut state: Vec<Option<bool>> = trigger
        .iter()
        .zip(generating.iter())
        .map(|(&trig, &gen)| {
            if gen {
                Some(false)
            } else if trig {
                Some(true)
            } else {
                None
            }
        })
        .collect();
    if let Some(first) = state.first_mut().filter(|first| first.is_none()) {
        *first = seed;
    }
    ens_ts::forward_fill(&mut state);
    let carry = state.last().copied().flatten().or(seed);
    ens_ts::backward_fill(&mut state);
    let flags = state.into_iter().map(|s| s.unwrap_or(false)).collect();
    (flags, carry)
}

/// Clear each node's flags on ticks where any ancestor is flagged.
pub fn suppress_by_ancestors(
    hierarchy: &AssetHierarchy,
    plant: NodeIdx,
    raw: &BTreeMap<NodeIdx, Vec<bool>>,
) -> BTreeMap<NodeIdx, Vec<bool>> {
    let mut covered: BTreeMap<NodeIdx, Vec<bool>> = BTreeMap::new();
    let mut effective = BTreeMap::new();
    for node in hierarchy.subtree(plant) {
        let Some(flags) = raw.get(&node) else {
            continue;
        };
        let inherited = hierarchy.parent(node).and_then(|p| {
            let above = covered.get(&p)?;
            let parent_flags = raw.get(&p);
            Some(
                above
                    .iter()
                    .enumerate()
                    .map(|(t, c)| *c || parent_flags.is_some_and(|f| f[t]))
                    .collect::<Vec<bool>>(),
            )
        });
        let inherited = inherited.unwrap_or_else(|| vec![false; flags.len()]);
        effective.insert(
            node,
            flags
                .iter()
                .zip(inherited.iter())
                .map(|(f, c)| *f && !*c)
                .collect::<Vec<bool>>(),
        );
        covered.insert(node, inherited);
    }
    effective
}

fn runs_to_anomalies(
    hierarchy: &AssetHierarchy,
    signals: &PlantSignals,
    node: NodeIdx,
    flags: &[bool],
    kind: AnomalyKind,
    min_duration_s: i64,
    params: TriggerParameters,
) -> Vec<DetectedAnomaly> {
    let plant_id = hierarchy.node(signals.plant).id;
    let asset_id = hierarchy.node(node).id;
    bool_runs(flags)
        .into_iter()
        .filter_map(|run| {
            let start = signals.time.timestamp(run.start);
            let end = signals.time.timestamp(run.end);
            ((end - start).num_seconds() >= min_duration_s).then(|| DetectedAnomaly {
                plant_id,
                asset_id,
                kind,
                start,
                end,
                trigger_parameters: params.clone(),
                related_incident_ids: Vec::new(),
            })
        })
        .collect()
}

/// Latch every node of the plant, suppress nodes covered by a flagged
/// ancestor, and report runs at least `min_duration_s` long.
pub fn detect_unavailability(
    hierarchy: &AssetHierarchy,
    signals: &PlantSignals,
    th: &UnavailabilityThresholds,
) -> Vec<DetectedAnomaly> {
    detect_unavailability_seeded(hierarchy, signals, th, &LatchState::new()).0
}

/// [`detect_unavailability`] with each node's latch resumed from `seed`.
/// Returns the latch state at the last tick alongside the anomalies.
pub fn detect_unavailability_seeded(
    hierarchy: &AssetHierarchy,
    signals: &PlantSignals,
    th: &UnavailabilityThresholds,
    seed: &LatchState,
) -> (Vec<DetectedAnomaly>, LatchState) {
    let plant_signals = signals.plant_signals();
    let mut raw = BTreeMap::new();
    let mut carry = LatchState::new();
    for (&node, node_signals) in &signals.nodes {
        let context = if node == signals.plant {
            None
        } else {
            plant_signals
        };
        let (flags, state) = latch_seeded(
            &trigger(node_signals, context, th),
            &generating(node_signals),
            seed.get(&node).copied(),
        );
        if let Some(state) = state {
            carry.insert(node, state);
        }
        raw.insert(node, flags);
    }

    let effective = suppress_by_ancestors(hierarchy, signals.plant, &raw);
    let mut out = Vec::new();
    for (node, flags) in &effective {
        let Some(node_signals) = signals.get(*node) else {
            continue;
        };
        let capacity = node_signals.capacity;
        let params = TriggerParameters::Unavailability {
            min_duration_s: th.min_duration_s,
            max_generated_power: capacity * th.capacity_factor_max,
            min_available_power: capacity * th.available_ratio_min,
            min_wind_speed: th.wind_speed_min,
            plant_min_wind_speed: th.plant_wind_speed_min,
            plant_min_available_ratio: th.plant_available_ratio_min,
        };
        out.extend(runs_to_anomalies(
            hierarchy,
            signals,
            *node,
            flags,
            AnomalyKind::Unavailability,
            th.min_duration_s,
            params,
        ));
    }
    tracing::debug!(count = out.len(), "detected unavailability anomalies");
    (out, carry)
}

fn below_setpoint(signals: &NodeSignals) -> Vec<bool> {
    let capacity = signals.capacity.value();
    signals
        .setpoint
        .iter()
        .map(|sp| sp.is_some_and(|sp| sp < capacity))
        .collect()
}

/// Ticks where the active-power setpoint sits below nominal power. Plant
/// limitations suppress unit limitations on the same ticks.
pub fn detect_limitations(
    hierarchy: &AssetHierarchy,
    signals: &PlantSignals,
    opts: &LimitationOptions,
) -> Vec<DetectedAnomaly> {
    let mut out = Vec::new();
    let plant_flags = signals
        .plant_signals()
        .filter(|_| opts.plant)
        .map(below_setpoint);

    let params = |capacity| TriggerParameters::Limitation {
        min_duration_s: opts.min_duration_s,
        nominal_power: capacity,
    };

    if let (Some(flags), Some(plant)) = (&plant_flags, signals.plant_signals()) {
        out.extend(runs_to_anomalies(
            hierarchy,
            signals,
            signals.plant,
            flags,
            AnomalyKind::Limitation,
            opts.min_duration_s,
            params(plant.capacity),
        ));
    }

    if opts.units {
        for leaf in hierarchy.leaves(signals.plant) {
            let Some(unit) = signals.get(leaf) else {
                continue;
            };
            let mut flags = below_setpoint(unit);
            if let Some(plant) = &plant_flags {
                for (f, p) in flags.iter_mut().zip(plant.iter()) {
                    *f = *f && !*p;
                }
            }
            out.extend(runs_to_anomalies(
                hierarchy,
                signals,
                leaf,
                &flags,
                AnomalyKind::Limitation,
                opts.min_duration_s,
                params(unit.capacity),
            ));
        }
    }
    out
}

/// Attach ids of incidents that plausibly document each anomaly.
///
/// Unavailability: non-limitation incidents on the anomaly's asset or any
/// ancestor. Limitation: limitation incidents on the same asset. Both
/// require inclusive time overlap.
pub fn relate_incidents(
    hierarchy: &AssetHierarchy,
    anomalies: &mut [DetectedAnomaly],
    incidents: &[RawIncident],
) {
    for anomaly in anomalies.iter_mut() {
        let Some(node) = hierarchy.resolve(anomaly.asset_id) else {
            continue;
        };
        let mut scope = vec![anomaly.asset_id];
        if anomaly.kind == AnomalyKind::Unavailability {
            scope.extend(hierarchy.ancestors(node).map(|a| hierarchy.node(a).id));
        }
        let mut related: Vec<_> = incidents
            .iter()
            .filter(|inc| scope.contains(&inc.asset_id))
            .filter(|inc| match anomaly.kind {
                AnomalyKind::Unavailability => inc.category != Category::Limitation,
                AnomalyKind::Limitation => inc.category == Category::Limitation,
            })
            .filter(|inc| inc.start <= anomaly.end && inc.end >= anomaly.start)
            .map(|inc| inc.id)
            .collect();
        related.sort();
        related.dedup();
        anomaly.related_incident_ids = related;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{flat_plant, incident, second};
    use chrono::Duration;
    use ens_core::{AssetId, IncidentId, Megawatts, Origin};
    use ens_ts::TimeGrid;

    #[test]
    fn latch_clears_on_generation() {
        // gen>0, gen>0, trigger, trigger, gen>0
        let trigger = [false, false, true, true, false];
        let generating = [true, true, false, false, true];
        assert_eq!(latch(&trigger, &generating), vec![false, false, true, true, false]);
    }

    #[test]
    fn latch_backfills_leading_tick() {
        // gen=0, trigger, gen=0 without trigger
        let trigger = [false, true, false];
        let generating = [false, false, false];
        assert_eq!(latch(&trigger, &generating), vec![true, true, true]);
    }

    #[test]
    fn seed_holds_until_first_decision() {
        let trigger = [false, false, false, true];
        let generating = [false, false, true, false];
        let (flags, carry) = latch_seeded(&trigger, &generating, Some(true));
        assert_eq!(flags, vec![true, true, false, true]);
        assert_eq!(carry, Some(true));
        // Without a seed the leading ticks take the first decision.
        assert_eq!(latch(&trigger, &generating), vec![false, false, false, true]);
    }

    #[test]
    fn undecided_stretch_passes_the_seed_on() {
        let (flags, carry) = latch_seeded(&[false, false], &[false, false], Some(true));
        assert_eq!(flags, vec![true, true]);
        assert_eq!(carry, Some(true));
        assert_eq!(latch_seeded(&[false], &[false], None), (vec![false], None));
        assert_eq!(latch_seeded(&[], &[], Some(false)), (vec![], Some(false)));
    }

    #[test]
    fn latch_without_any_state_is_clear() {
        assert_eq!(latch(&[false, false], &[false, false]), vec![false, false]);
    }

    fn signals(
        generated: Vec<Option<f64>>,
        ratio: Vec<Option<f64>>,
        wind: Vec<Option<f64>>,
    ) -> NodeSignals {
        let capacity = Megawatts(2.0);
        NodeSignals {
            capacity_factor: generated.iter().map(|g| g.map(|g| g / 2.0)).collect(),
            available: ratio.iter().map(|r| r.map(|r| r * 2.0)).collect(),
            generated,
            available_ratio: ratio,
            wind_speed: wind,
            wind_direction: vec![],
            setpoint: vec![],
            capacity,
        }
    }

    #[test]
    fn trigger_requires_every_threshold() {
        let th = UnavailabilityThresholds::default();
        let s = signals(
            vec![Some(0.0), Some(0.0), Some(0.0), None, Some(0.5)],
            vec![Some(1.0), Some(0.01), Some(1.0), Some(1.0), Some(1.0)],
            vec![Some(8.0), Some(8.0), Some(2.0), Some(8.0), Some(8.0)],
        );
        assert_eq!(trigger(&s, None, &th), vec![true, false, false, false, false]);
    }

    #[test]
    fn plant_context_gates_units() {
        let th = UnavailabilityThresholds {
            plant_wind_speed_min: Some(5.0),
            ..UnavailabilityThresholds::default()
        };
        let unit = signals(vec![Some(0.0); 2], vec![Some(1.0); 2], vec![Some(8.0); 2]);
        let plant = signals(vec![Some(1.0); 2], vec![Some(1.0); 2], vec![Some(4.0), Some(6.0)]);
        assert_eq!(trigger(&unit, Some(&plant), &th), vec![false, true]);
    }

    #[test]
    fn ancestors_suppress_descendants() {
        let h = flat_plant();
        let plant = h.plants()[0];
        let unit = h.resolve(AssetId::new(2)).unwrap();
        let mut raw = BTreeMap::new();
        raw.insert(plant, vec![true, true, false]);
        raw.insert(unit, vec![true, true, true]);
        let effective = suppress_by_ancestors(&h, plant, &raw);
        assert_eq!(effective[&plant], vec![true, true, false]);
        assert_eq!(effective[&unit], vec![false, false, true]);
    }

    fn unit_only_signals(h: &AssetHierarchy, flags_len: usize) -> PlantSignals {
        let plant = h.plants()[0];
        let time = TimeGrid::new(second(0), Duration::seconds(10), flags_len).unwrap();
        let mut nodes = BTreeMap::new();
        for node in h.subtree(plant) {
            let producing = node != h.resolve(AssetId::new(2)).unwrap();
            let g = if producing { 1.0 } else { 0.0 };
            nodes.insert(
                node,
                signals(
                    vec![Some(g); flags_len],
                    vec![Some(1.0); flags_len],
                    vec![Some(9.0); flags_len],
                ),
            );
        }
        PlantSignals { plant, time, nodes }
    }

    #[test]
    fn detects_stopped_unit_and_filters_duration() {
        let h = flat_plant();
        let signals = unit_only_signals(&h, 4);
        let found = detect_unavailability(&h, &signals, &UnavailabilityThresholds::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].asset_id, AssetId::new(2));
        assert_eq!(found[0].start, second(0));
        assert_eq!(found[0].end, second(30));

        let strict = UnavailabilityThresholds {
            min_duration_s: 31,
            ..UnavailabilityThresholds::default()
        };
        assert!(detect_unavailability(&h, &signals, &strict).is_empty());
    }

    #[test]
    fn limitation_on_plant_suppresses_units() {
        let h = flat_plant();
        let mut s = unit_only_signals(&h, 5);
        let plant = h.plants()[0];
        let unit = h.resolve(AssetId::new(3)).unwrap();
        s.nodes.get_mut(&plant).unwrap().setpoint =
            vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0), None];
        s.nodes.get_mut(&unit).unwrap().setpoint = vec![Some(0.5); 5];
        let opts = LimitationOptions {
            min_duration_s: 0,
            plant: true,
            units: true,
        };
        let found = detect_limitations(&h, &s, &opts);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].asset_id, AssetId::new(1));
        assert_eq!(found[0].end, second(30));
        assert_eq!(found[1].asset_id, AssetId::new(3));
        assert_eq!(found[1].start, second(40));
    }

    #[test]
    fn relates_ancestor_incidents_but_not_limitations() {
        let h = flat_plant();
        let mut anomalies = vec![DetectedAnomaly {
            plant_id: AssetId::new(1),
            asset_id: AssetId::new(2),
            kind: AnomalyKind::Unavailability,
            start: second(0),
            end: second(600),
            trigger_parameters: TriggerParameters::Limitation {
                min_duration_s: 0,
                nominal_power: Megawatts(2.0),
            },
            related_incident_ids: vec![],
        }];
        let incidents = vec![
            incident(1, 1, 5, 20, Category::Unavailability, Origin::External, 0.0),
            incident(2, 2, 0, 1, Category::Limitation, Origin::External, 0.0),
            incident(3, 2, 10, 11, Category::Unavailability, Origin::Internal, 0.0),
            incident(4, 3, 0, 10, Category::Unavailability, Origin::Internal, 0.0),
            incident(5, 2, 0, 10, Category::Unavailability, Origin::Internal, 0.0),
        ];
        relate_incidents(&h, &mut anomalies, &incidents);
        assert_eq!(
            anomalies[0].related_incident_ids,
            vec![IncidentId::new(1), IncidentId::new(3), IncidentId::new(5)]
        );
    }
}
