//! Per-plant orchestration of the grid passes.
//!
//! Each plant is independent: its grid is built, populated, aggregated,
//! allocated, propagated and collapsed as a strict sequence of full passes.
//! Plants run in parallel when the `rayon` feature is on.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use ens_core::diagnostics::categories;
use ens_core::{
    AssetHierarchy, AssetId, CollapsedInterval, DetectedAnomaly, Diagnostics, EnsResult,
    IncidentId, IncidentStatus, NodeIdx, PowerCurveLibrary, RawIncident, TelemetryRecord,
};
use ens_ts::{TimeGrid, TimeGridBuilder};
use serde::Serialize;
use tracing::{debug, info};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::allocation::{allocate_energy, AllocationSummary};
use crate::anomaly::{
    detect_limitations, detect_unavailability_seeded, relate_incidents, LatchState,
    LimitationOptions, UnavailabilityThresholds,
};
use crate::availability::compute_availability;
use crate::collapse::collapse_grid;
use crate::estimate::{EnsEstimate, EnsEstimator};
use crate::grid::IncidentGrid;
use crate::populate::{populate, PopulateSummary};
use crate::power_curve::{DirectionSector, MeasuredCurve, PowerCurveBuilder};
use crate::propagation::{propagate_attribution, PropagationSummary};
use crate::signals::{derive_signals, PlantSignals};

#[derive(Debug, Clone)]
pub struct AttributionOptions {
    pub step: Duration,
    /// Fixed grid extent; derived from the incidents when absent.
    pub extent: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Only ticks in `[from, to)` are collapsed.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub keep_grid: bool,
}

impl Default for AttributionOptions {
    fn default() -> Self {
        Self {
            step: Duration::minutes(1),
            extent: None,
            window: None,
            keep_grid: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributionSummary {
    pub ticks: usize,
    pub populate: PopulateSummary,
    pub allocation: AllocationSummary,
    pub propagation: PropagationSummary,
}

#[derive(Debug)]
pub struct PlantAttribution {
    pub plant_id: AssetId,
    pub intervals: Vec<CollapsedInterval>,
    pub grid: Option<IncidentGrid>,
    pub summary: AttributionSummary,
    pub diagnostics: Diagnostics,
}

impl PlantAttribution {
    fn empty(plant_id: AssetId) -> Self {
        Self {
            plant_id,
            intervals: Vec::new(),
            grid: None,
            summary: AttributionSummary::default(),
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Reject structurally invalid incidents before any grid is allocated.
pub fn validate_incidents(incidents: &[RawIncident]) -> EnsResult<()> {
    incidents.iter().try_for_each(RawIncident::validate)
}

/// Group incidents by the plant of their asset. Unresolvable incidents are
/// dropped with a warning; discarded ones are skipped silently.
pub fn partition_by_plant(
    hierarchy: &AssetHierarchy,
    incidents: &[RawIncident],
    diag: &mut Diagnostics,
) -> BTreeMap<NodeIdx, Vec<RawIncident>> {
    let mut out: BTreeMap<NodeIdx, Vec<RawIncident>> = BTreeMap::new();
    let mut discarded = 0usize;
    for incident in incidents {
        if incident.is_discarded() {
            discarded += 1;
            continue;
        }
        match hierarchy.resolve(incident.asset_id) {
            Some(node) => out
                .entry(hierarchy.plant_of(node))
                .or_default()
                .push(incident.clone()),
            None => diag.add_warning_with_entity(
                categories::UNRESOLVED_ASSET,
                &format!(
                    "incident {} references unknown asset {}; dropped",
                    incident.id, incident.asset_id
                ),
                &format!("incident {}", incident.id),
            ),
        }
    }
    if discarded > 0 {
        debug!(discarded, "skipped discarded incidents");
    }
    out
}

fn incident_grid(
    step: Duration,
    extent: Option<(DateTime<Utc>, DateTime<Utc>)>,
    incidents: &[RawIncident],
) -> EnsResult<TimeGrid> {
    match extent {
        Some((from, to)) => TimeGridBuilder::new(step).extent(from, to).build(),
        None => TimeGridBuilder::new(step)
            .extents(incidents.iter().map(|i| (i.start, i.end)))
            .build(),
    }
}

/// Run every grid pass for one plant.
pub fn attribute_plant(
    hierarchy: &AssetHierarchy,
    plant: NodeIdx,
    incidents: &[RawIncident],
    opts: &AttributionOptions,
) -> EnsResult<PlantAttribution> {
    let plant_id = hierarchy.node(plant).id;
    if incidents.is_empty() {
        return Ok(PlantAttribution::empty(plant_id));
    }
    let mut diag = Diagnostics::new();
    let time = incident_grid(opts.step, opts.extent, incidents)?;
    let mut grid = IncidentGrid::new(hierarchy, plant, time);
    let mut summary = AttributionSummary {
        ticks: grid.tick_count(),
        ..AttributionSummary::default()
    };
    debug!(plant = %plant_id, ticks = summary.ticks, slots = grid.slot_count(), "built grid");

    summary.populate = populate(&mut grid, hierarchy, incidents, &mut diag)?;
    debug!(plant = %plant_id, applied = summary.populate.applied, "populated grid");

    compute_availability(&mut grid);
    debug!(plant = %plant_id, "aggregated availability");

    summary.allocation = allocate_energy(&mut grid, hierarchy, &mut diag);
    summary.propagation = propagate_attribution(&mut grid);

    let lookup: HashMap<IncidentId, &RawIncident> =
        incidents.iter().map(|i| (i.id, i)).collect();
    let intervals = collapse_grid(&grid, hierarchy, &lookup, opts.window);
    debug!(plant = %plant_id, intervals = intervals.len(), "collapsed grid");

    Ok(PlantAttribution {
        plant_id,
        intervals,
        grid: opts.keep_grid.then_some(grid),
        summary,
        diagnostics: diag,
    })
}

/// Attribute every plant that has incidents.
pub fn attribute(
    hierarchy: &AssetHierarchy,
    incidents: &[RawIncident],
    opts: &AttributionOptions,
    diag: &mut Diagnostics,
) -> EnsResult<Vec<PlantAttribution>> {
    validate_incidents(incidents)?;
    let partitions: Vec<(NodeIdx, Vec<RawIncident>)> =
        partition_by_plant(hierarchy, incidents, diag).into_iter().collect();

    #[cfg(feature = "rayon")]
    let iter = partitions.par_iter();
    #[cfg(not(feature = "rayon"))]
    let iter = partitions.iter();

    let results: EnsResult<Vec<PlantAttribution>> = iter
        .map(|(plant, list)| attribute_plant(hierarchy, *plant, list, opts))
        .collect();
    let results = results?;

    info!(
        plants = results.len(),
        intervals = results.iter().map(|r| r.intervals.len()).sum::<usize>(),
        "attribution finished"
    );
    Ok(results)
}

#[derive(Debug, Clone)]
pub struct DetectionOptions {
    pub step: Duration,
    pub extent: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub unavailability: UnavailabilityThresholds,
    pub limitation: LimitationOptions,
    pub detect_limitations: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            step: Duration::seconds(10),
            extent: None,
            unavailability: UnavailabilityThresholds::default(),
            limitation: LimitationOptions::default(),
            detect_limitations: true,
        }
    }
}

#[derive(Debug)]
pub struct PlantDetection {
    pub plant_id: AssetId,
    pub anomalies: Vec<DetectedAnomaly>,
    pub signals: Option<PlantSignals>,
    /// Unavailability latch state at the last tick.
    pub latch: LatchState,
    pub diagnostics: Diagnostics,
}

/// Derive signals for one plant and run both detectors. `telemetry` should
/// already be restricted to the plant.
pub fn detect_plant(
    hierarchy: &AssetHierarchy,
    plant: NodeIdx,
    telemetry: &[TelemetryRecord],
    curves: &PowerCurveLibrary,
    incidents: &[RawIncident],
    opts: &DetectionOptions,
) -> EnsResult<PlantDetection> {
    detect_plant_seeded(
        hierarchy,
        plant,
        telemetry,
        curves,
        incidents,
        opts,
        &LatchState::new(),
    )
}

/// [`detect_plant`] resuming the unavailability latch from `seed`, the
/// state an earlier stretch of the same plant ended in. With an explicit
/// extent the grid is built even when no row falls inside it, so a latched
/// stop carries through a telemetry outage.
pub fn detect_plant_seeded(
    hierarchy: &AssetHierarchy,
    plant: NodeIdx,
    telemetry: &[TelemetryRecord],
    curves: &PowerCurveLibrary,
    incidents: &[RawIncident],
    opts: &DetectionOptions,
    seed: &LatchState,
) -> EnsResult<PlantDetection> {
    let plant_id = hierarchy.node(plant).id;
    let mut diag = Diagnostics::new();
    if telemetry.is_empty() && opts.extent.is_none() {
        return Ok(PlantDetection {
            plant_id,
            anomalies: Vec::new(),
            signals: None,
            latch: seed.clone(),
            diagnostics: diag,
        });
    }

    let time = match opts.extent {
        Some((from, to)) => TimeGridBuilder::new(opts.step).extent(from, to).build()?,
        None => TimeGridBuilder::new(opts.step)
            .extents(telemetry.iter().map(|r| (r.timestamp, r.timestamp)))
            .build()?,
    };
    let signals = derive_signals(hierarchy, plant, &time, telemetry, curves, &mut diag);
    debug!(plant = %plant_id, ticks = time.len(), "derived signals");

    let (mut anomalies, latch) =
        detect_unavailability_seeded(hierarchy, &signals, &opts.unavailability, seed);
    if opts.detect_limitations {
        anomalies.extend(detect_limitations(hierarchy, &signals, &opts.limitation));
    }
    relate_incidents(hierarchy, &mut anomalies, incidents);
    anomalies.sort_by(|a, b| (a.asset_id, a.start).cmp(&(b.asset_id, b.start)));
    debug!(plant = %plant_id, anomalies = anomalies.len(), "detected anomalies");

    Ok(PlantDetection {
        plant_id,
        anomalies,
        signals: Some(signals),
        latch,
        diagnostics: diag,
    })
}

/// Detect anomalies on every plant with telemetry.
pub fn detect_all(
    hierarchy: &AssetHierarchy,
    telemetry: &[TelemetryRecord],
    curves: &PowerCurveLibrary,
    incidents: &[RawIncident],
    opts: &DetectionOptions,
    diag: &mut Diagnostics,
) -> EnsResult<Vec<PlantDetection>> {
    let partitions: Vec<(NodeIdx, Vec<TelemetryRecord>)> =
        partition_telemetry(hierarchy, telemetry, diag).into_iter().collect();

    #[cfg(feature = "rayon")]
    let iter = partitions.par_iter();
    #[cfg(not(feature = "rayon"))]
    let iter = partitions.iter();

    let results: EnsResult<Vec<PlantDetection>> = iter
        .map(|(plant, records)| detect_plant(hierarchy, *plant, records, curves, incidents, opts))
        .collect();
    let results = results?;

    info!(
        plants = results.len(),
        anomalies = results.iter().map(|r| r.anomalies.len()).sum::<usize>(),
        "detection finished"
    );
    Ok(results)
}

/// Estimate incident energy from the signals of each detected plant.
/// With `open_only` only incidents still open are considered.
pub fn estimate_all(
    hierarchy: &AssetHierarchy,
    detections: &[PlantDetection],
    incidents: &[RawIncident],
    estimator: &EnsEstimator,
    open_only: bool,
    diag: &mut Diagnostics,
) -> EnsResult<Vec<EnsEstimate>> {
    estimator.validate()?;
    let selected: Vec<RawIncident> = incidents
        .iter()
        .filter(|i| !open_only || i.status == IncidentStatus::Open)
        .cloned()
        .collect();
    let mut estimates = Vec::new();
    for detection in detections {
        let Some(signals) = &detection.signals else {
            continue;
        };
        estimates.extend(estimator.estimate_plant(hierarchy, signals, &selected, diag));
    }
    estimates.sort_by_key(|e| e.incident_id);
    info!(estimates = estimates.len(), "estimated incident energy");
    Ok(estimates)
}

/// Group telemetry rows by plant. Rows of unknown assets are dropped with one
/// warning per asset.
pub fn partition_telemetry(
    hierarchy: &AssetHierarchy,
    telemetry: &[TelemetryRecord],
    diag: &mut Diagnostics,
) -> BTreeMap<NodeIdx, Vec<TelemetryRecord>> {
    let mut by_plant: BTreeMap<NodeIdx, Vec<TelemetryRecord>> = BTreeMap::new();
    let mut unresolved: BTreeMap<AssetId, usize> = BTreeMap::new();
    for record in telemetry {
        match hierarchy.resolve(record.asset_id) {
            Some(node) => by_plant
                .entry(hierarchy.plant_of(node))
                .or_default()
                .push(record.clone()),
            None => *unresolved.entry(record.asset_id).or_insert(0) += 1,
        }
    }
    for (asset, rows) in unresolved {
        diag.add_warning_with_entity(
            categories::UNRESOLVED_ASSET,
            &format!("{rows} telemetry row(s) reference an unknown asset; ignored"),
            &format!("asset {asset}"),
        );
    }
    by_plant
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitCurves {
    pub curve: MeasuredCurve,
    pub rose: Vec<DirectionSector>,
}

/// Measured curve and direction rose for every unit of the plant.
///
/// When an attribution grid is supplied only ticks whose unit is at full
/// performance in that grid are used; ticks outside the grid count as full
/// performance.
pub fn build_unit_curves(
    hierarchy: &AssetHierarchy,
    signals: &PlantSignals,
    attribution: Option<&IncidentGrid>,
    builder: &PowerCurveBuilder,
) -> Vec<UnitCurves> {
    hierarchy
        .leaves(signals.plant)
        .into_iter()
        .filter_map(|unit| {
            let node_signals = signals.get(unit)?;
            let mask = attribution.map(|grid| full_performance_mask(grid, unit, &signals.time));
            let asset_id = hierarchy.node(unit).id;
            let curve = builder.build(
                asset_id,
                &node_signals.wind_speed,
                &node_signals.generated,
                mask.as_deref(),
            );
            let rose = builder.build_rose(
                &node_signals.wind_direction,
                &node_signals.generated,
                mask.as_deref(),
            );
            Some(UnitCurves { curve, rose })
        })
        .collect()
}

fn full_performance_mask(grid: &IncidentGrid, unit: NodeIdx, time: &TimeGrid) -> Vec<bool> {
    let attribution = grid
        .node_columns(unit)
        .and_then(|columns| columns.attribution.as_ref());
    time.timestamps()
        .map(|ts| {
            let Some(attribution) = attribution else {
                return true;
            };
            let index = grid.time().floor_index(ts);
            if index < 0 || index as usize >= grid.tick_count() {
                return true;
            }
            attribution.full_performance(index as usize)
        })
        .collect()
}
