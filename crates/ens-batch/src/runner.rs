use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use ens_algo::{
    attribute_plant, detect_plant_seeded, partition_by_plant, partition_telemetry, sort_intervals,
    split_by_period, stitch_intervals, validate_incidents, write_grid, AttributionOptions,
    DetectionOptions, LatchState,
};
use ens_core::{
    AnomalyKind, AssetHierarchy, CollapsedInterval, DetectedAnomaly, Diagnostics, Megawatts,
    NodeIdx, PowerCurveLibrary, RawIncident, TelemetryRecord, TriggerParameters,
};
use ens_io::{write_anomalies, write_intervals};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::job::{plan_jobs, run_window, BatchJobRecord, PlantJob};
use crate::manifest::{write_batch_manifest, BatchManifest};

/// Everything a run reads, already loaded.
pub struct BatchInputs {
    pub hierarchy: AssetHierarchy,
    pub incidents: Vec<RawIncident>,
    pub telemetry: Vec<TelemetryRecord>,
    pub curves: PowerCurveLibrary,
}

pub struct BatchRunnerConfig {
    pub engine: EngineConfig,
    pub output_root: PathBuf,
    /// Run the telemetry detectors alongside attribution.
    pub detect: bool,
    /// Write the consolidated grid of every job under `grid/`.
    pub export_grid: bool,
}

/// Summary returned after the run so clients can log counts and the manifest location.
pub struct BatchSummary {
    pub success: usize,
    pub failure: usize,
    pub intervals: Vec<CollapsedInterval>,
    pub anomalies: Vec<DetectedAnomaly>,
    pub diagnostics: Diagnostics,
    pub manifest_path: PathBuf,
    pub jobs: Vec<BatchJobRecord>,
}

struct JobOutcome {
    record: BatchJobRecord,
    intervals: Vec<CollapsedInterval>,
    anomalies: Vec<DetectedAnomaly>,
    diagnostics: Diagnostics,
}

type JobProducts = (Vec<CollapsedInterval>, Vec<DetectedAnomaly>, Diagnostics, LatchState);

/// Inputs of one plant, shared read-only by all of its chunk jobs.
#[derive(Default)]
struct PlantInputs {
    incidents: Vec<RawIncident>,
    telemetry: Vec<TelemetryRecord>,
    /// First and last telemetry timestamp of the plant.
    telemetry_span: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

struct RunSettings {
    step: Duration,
    detection: Option<DetectionOptions>,
    export_grid: bool,
    grid_dir: PathBuf,
    grid_format: String,
}

pub fn run_batch(inputs: &BatchInputs, config: &BatchRunnerConfig) -> Result<BatchSummary> {
    let engine = &config.engine;
    let problems = engine.validate();
    if !problems.is_empty() {
        return Err(anyhow!("invalid configuration: {}", problems.join("; ")));
    }
    validate_incidents(&inputs.incidents).context("validating incidents")?;

    fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "creating batch output root '{}'",
            config.output_root.display()
        )
    })?;

    let hierarchy = &inputs.hierarchy;
    let mut diagnostics = Diagnostics::new();
    let mut by_plant: BTreeMap<NodeIdx, PlantInputs> = BTreeMap::new();
    for (plant, incidents) in partition_by_plant(hierarchy, &inputs.incidents, &mut diagnostics) {
        by_plant.insert(
            plant,
            PlantInputs {
                incidents,
                ..PlantInputs::default()
            },
        );
    }
    if config.detect {
        let telemetry = partition_telemetry(hierarchy, &inputs.telemetry, &mut diagnostics);
        for (plant, telemetry) in telemetry {
            let first = telemetry.iter().map(|r| r.timestamp).min();
            let last = telemetry.iter().map(|r| r.timestamp).max();
            let entry = by_plant.entry(plant).or_default();
            entry.telemetry_span = first.zip(last);
            entry.telemetry = telemetry;
        }
    }

    let step = engine.step()?;
    let extents = by_plant.values().flat_map(|p| {
        p.incidents
            .iter()
            .map(|i| (i.start, i.end))
            .chain(p.telemetry.iter().map(|r| (r.timestamp, r.timestamp)))
    });
    let window = run_window(extents, step, engine.window()?)?;
    let plants: Vec<NodeIdx> = by_plant.keys().copied().collect();
    let jobs = match window {
        Some(window) => plan_jobs(hierarchy, &plants, window, engine.chunk()?)?,
        None => Vec::new(),
    };
    info!(plants = plants.len(), jobs = jobs.len(), "planned batch");

    let settings = RunSettings {
        step,
        detection: if config.detect {
            Some(engine.detection_options()?)
        } else {
            None
        },
        export_grid: config.export_grid,
        grid_dir: config.output_root.join("grid"),
        grid_format: engine.batch.output_format.clone(),
    };

    // threads = 0 means one worker per CPU
    let thread_count = if engine.batch.threads == 0 {
        num_cpus::get()
    } else {
        engine.batch.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for batch runs")?;

    let dispatch = |job: &PlantJob, carry: &mut LatchState| match by_plant.get(&job.plant) {
        Some(plant) => run_job(job, hierarchy, plant, &inputs.curves, &settings, carry),
        None => failed(job, anyhow!("plant {} has no inputs", job.plant_id)),
    };
    let outcomes: Vec<JobOutcome> = pool.install(|| {
        if settings.detection.is_some() {
            // The chunks of one plant run in order so the latch carries over.
            plant_lanes(&jobs)
                .par_iter()
                .flat_map_iter(|lane| {
                    let mut carry = LatchState::new();
                    lane.iter()
                        .map(|job| dispatch(*job, &mut carry))
                        .collect::<Vec<_>>()
                })
                .collect()
        } else {
            jobs.par_iter()
                .map(|job| dispatch(job, &mut LatchState::new()))
                .collect()
        }
    });

    let mut records = Vec::with_capacity(outcomes.len());
    let mut intervals = Vec::new();
    let mut anomalies = Vec::new();
    for outcome in outcomes {
        records.push(outcome.record);
        intervals.extend(outcome.intervals);
        anomalies.extend(outcome.anomalies);
        diagnostics.merge(outcome.diagnostics);
    }

    let mut intervals = stitch_intervals(intervals, step);
    if let Some(period) = engine.split()? {
        intervals = split_by_period(&intervals, period, step);
    }
    let anomalies = match &settings.detection {
        Some(detection) => {
            let stitched = stitch_anomalies(anomalies, detection.step);
            stitched
                .into_iter()
                .filter_map(|mut a| {
                    let min = min_duration_s(engine, a.kind);
                    if a.duration_s() < min {
                        return None;
                    }
                    match &mut a.trigger_parameters {
                        TriggerParameters::Unavailability { min_duration_s, .. }
                        | TriggerParameters::Limitation { min_duration_s, .. } => {
                            *min_duration_s = min
                        }
                    }
                    Some(a)
                })
                .collect()
        }
        None => Vec::new(),
    };
    if engine.batch.merge_anomalies {
        intervals.extend(anomalies.iter().map(|a| {
            let nominal = hierarchy
                .resolve(a.asset_id)
                .map(|node| hierarchy.node(node).nominal_power)
                .unwrap_or(Megawatts(0.0));
            a.to_interval(nominal)
        }));
        sort_intervals(&mut intervals);
    }

    let mut outputs = BTreeMap::new();
    let extension = engine.batch.output_format.as_str();
    let intervals_path = config.output_root.join(format!("intervals.{extension}"));
    write_intervals(&intervals, &intervals_path)?;
    outputs.insert(
        "intervals".to_string(),
        intervals_path.display().to_string(),
    );
    if config.detect {
        let anomalies_path = config.output_root.join(format!("anomalies.{extension}"));
        write_anomalies(&anomalies, &anomalies_path)?;
        outputs.insert(
            "anomalies".to_string(),
            anomalies_path.display().to_string(),
        );
    }
    if config.export_grid {
        outputs.insert(
            "grid".to_string(),
            settings.grid_dir.display().to_string(),
        );
    }

    let success = records.iter().filter(|record| record.status == "ok").count();
    let failure = records.len() - success;
    if failure > 0 {
        warn!(failure, "some batch jobs failed; see the manifest");
    }

    let manifest = BatchManifest {
        created_at: Utc::now(),
        window_start: window.map(|(start, _)| start.to_rfc3339()),
        window_end: window.map(|(_, end)| end.to_rfc3339()),
        num_jobs: records.len(),
        success,
        failure,
        intervals: intervals.len(),
        anomalies: anomalies.len(),
        outputs,
        diagnostics: diagnostics.counts(),
        jobs: records.clone(),
    };
    let manifest_path = config.output_root.join("batch_manifest.json");
    write_batch_manifest(&manifest_path, &manifest)?;
    info!(
        success,
        failure,
        intervals = intervals.len(),
        anomalies = anomalies.len(),
        "batch finished"
    );

    Ok(BatchSummary {
        success,
        failure,
        intervals,
        anomalies,
        diagnostics,
        manifest_path,
        jobs: records,
    })
}

fn min_duration_s(engine: &EngineConfig, kind: AnomalyKind) -> i64 {
    match kind {
        AnomalyKind::Unavailability => engine.anomaly.min_duration_s,
        AnomalyKind::Limitation => engine.limitation.min_duration_s,
    }
}

fn in_window(ts: DateTime<Utc>, (from, to): (DateTime<Utc>, DateTime<Utc>)) -> bool {
    from <= ts && ts < to
}

/// Jobs grouped by plant, chunks in order.
fn plant_lanes(jobs: &[PlantJob]) -> Vec<Vec<&PlantJob>> {
    let mut lanes: BTreeMap<NodeIdx, Vec<&PlantJob>> = BTreeMap::new();
    for job in jobs {
        lanes.entry(job.plant).or_default().push(job);
    }
    let mut lanes: Vec<Vec<&PlantJob>> = lanes.into_values().collect();
    for lane in &mut lanes {
        lane.sort_by_key(|job| job.chunk);
    }
    lanes
}

/// Incidents a chunk has to see: those overlapping `[from, to)`, plus
/// zero-length ones placed inside it so populate can report them.
fn touches_window(incident: &RawIncident, (from, to): (DateTime<Utc>, DateTime<Utc>)) -> bool {
    if incident.start == incident.end {
        return in_window(incident.start, (from, to));
    }
    incident.start < to && incident.end > from
}

/// Attribute and optionally detect one plant over one chunk, resuming the
/// detection latch from `carry` and leaving the chunk's final state in it.
/// Failures are captured in the record so the other jobs keep running.
fn run_job(
    job: &PlantJob,
    hierarchy: &AssetHierarchy,
    plant: &PlantInputs,
    curves: &PowerCurveLibrary,
    settings: &RunSettings,
    carry: &mut LatchState,
) -> JobOutcome {
    let (from, to) = job.window;
    let runner = || -> Result<JobProducts> {
        let mut diagnostics = Diagnostics::new();
        let incidents: Vec<RawIncident> = plant
            .incidents
            .iter()
            .filter(|i| touches_window(i, job.window))
            .cloned()
            .collect();

        let mut intervals = Vec::new();
        if !incidents.is_empty() {
            let opts = AttributionOptions {
                step: settings.step,
                extent: Some(job.window),
                window: Some(job.window),
                keep_grid: settings.export_grid,
            };
            let result = attribute_plant(hierarchy, job.plant, &incidents, &opts)?;
            if let Some(grid) = &result.grid {
                let path = settings
                    .grid_dir
                    .join(format!("{}.{}", job.job_id, settings.grid_format));
                write_grid(hierarchy, [grid], &path)?;
            }
            intervals = result.intervals;
            diagnostics.merge(result.diagnostics);
        }

        let mut anomalies = Vec::new();
        let mut latch = carry.clone();
        if let (Some(detection), Some((first, last))) = (&settings.detection, plant.telemetry_span)
        {
            // The chunk grid covers the plant's telemetry span, so ticks
            // without rows inside it still carry the latch.
            let start = from.max(first);
            let end = (to - detection.step).min(last);
            if start <= end {
                let telemetry: Vec<TelemetryRecord> = plant
                    .telemetry
                    .iter()
                    .filter(|r| in_window(r.timestamp, job.window))
                    .cloned()
                    .collect();
                // Unfiltered runs; the minimum duration applies after stitching.
                let mut opts = detection.clone();
                opts.extent = Some((start, end));
                opts.unavailability.min_duration_s = 0;
                opts.limitation.min_duration_s = 0;
                let result = detect_plant_seeded(
                    hierarchy,
                    job.plant,
                    &telemetry,
                    curves,
                    &incidents,
                    &opts,
                    carry,
                )?;
                anomalies = result.anomalies;
                latch = result.latch;
                diagnostics.merge(result.diagnostics);
            }
        }
        Ok((intervals, anomalies, diagnostics, latch))
    };

    match runner() {
        Ok((intervals, anomalies, diagnostics, latch)) => {
            *carry = latch;
            JobOutcome {
                record: BatchJobRecord {
                    job_id: job.job_id.clone(),
                    plant_id: job.plant_id,
                    window_start: from.to_rfc3339(),
                    window_end: to.to_rfc3339(),
                    status: "ok".to_string(),
                    error: None,
                    intervals: intervals.len(),
                    anomalies: anomalies.len(),
                    diagnostics: diagnostics.counts(),
                },
                intervals,
                anomalies,
                diagnostics,
            }
        }
        Err(err) => failed(job, err),
    }
}

fn failed(job: &PlantJob, err: anyhow::Error) -> JobOutcome {
    warn!(job = %job.job_id, "batch job failed: {err:#}");
    JobOutcome {
        record: BatchJobRecord {
            job_id: job.job_id.clone(),
            plant_id: job.plant_id,
            window_start: job.window.0.to_rfc3339(),
            window_end: job.window.1.to_rfc3339(),
            status: "error".to_string(),
            error: Some(format!("{err:#}")),
            intervals: 0,
            anomalies: 0,
            diagnostics: BTreeMap::new(),
        },
        intervals: Vec::new(),
        anomalies: Vec::new(),
        diagnostics: Diagnostics::new(),
    }
}

/// Join anomaly pieces cut at chunk boundaries: same asset and kind, and the
/// later piece starts one telemetry step after the earlier one ends.
pub fn stitch_anomalies(
    mut anomalies: Vec<DetectedAnomaly>,
    step: Duration,
) -> Vec<DetectedAnomaly> {
    anomalies.sort_by(|a, b| {
        (a.plant_id, a.asset_id, a.kind, a.start).cmp(&(b.plant_id, b.asset_id, b.kind, b.start))
    });
    let mut out: Vec<DetectedAnomaly> = Vec::with_capacity(anomalies.len());
    for anomaly in anomalies {
        if let Some(prev) = out.last_mut() {
            if prev.plant_id == anomaly.plant_id
                && prev.asset_id == anomaly.asset_id
                && prev.kind == anomaly.kind
                && prev.end + step == anomaly.start
            {
                prev.end = anomaly.end;
                let related: BTreeSet<_> = prev
                    .related_incident_ids
                    .drain(..)
                    .chain(anomaly.related_incident_ids)
                    .collect();
                prev.related_incident_ids = related.into_iter().collect();
                continue;
            }
        }
        out.push(anomaly);
    }
    out.sort_by(|a, b| (a.asset_id, a.start).cmp(&(b.asset_id, b.start)));
    out
}
