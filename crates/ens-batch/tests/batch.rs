use chrono::Duration;
use ens_algo::test_utils::{flat_plant, incident, minute, second, single_unit_plant};
use ens_batch::{load_batch_manifest, run_batch, BatchInputs, BatchRunnerConfig, EngineConfig};
use ens_core::diagnostics::categories;
use ens_core::{
    AnomalyKind, AssetId, Category, IncidentStatus, Origin, PowerCurveLibrary, TelemetryRecord,
};
use tempfile::tempdir;

const TOL: f64 = 1e-6;

fn config(chunk: Option<&str>, root: &std::path::Path) -> BatchRunnerConfig {
    let mut engine = EngineConfig::default();
    engine.grid.chunk = chunk.map(str::to_string);
    engine.batch.threads = 2;
    BatchRunnerConfig {
        engine,
        output_root: root.to_path_buf(),
        detect: false,
        export_grid: false,
    }
}

fn attribution_inputs() -> BatchInputs {
    BatchInputs {
        hierarchy: single_unit_plant(),
        incidents: vec![
            incident(1, 2, 0, 90, Category::Limitation, Origin::External, 1.5),
            incident(2, 2, 100, 130, Category::Unavailability, Origin::Internal, 0.5),
        ],
        telemetry: Vec::new(),
        curves: PowerCurveLibrary::new(),
    }
}

#[test]
fn chunked_run_matches_single_window() {
    let inputs = attribution_inputs();
    let whole_dir = tempdir().unwrap();
    let chunked_dir = tempdir().unwrap();

    let whole = run_batch(&inputs, &config(None, whole_dir.path())).unwrap();
    let chunked = run_batch(&inputs, &config(Some("1h"), chunked_dir.path())).unwrap();

    assert_eq!(whole.jobs.len(), 1);
    assert_eq!(chunked.jobs.len(), 3);
    assert_eq!(chunked.failure, 0);
    assert_eq!(whole.intervals.len(), 2);
    assert_eq!(chunked.intervals.len(), 2);
    for (a, b) in whole.intervals.iter().zip(&chunked.intervals) {
        assert_eq!(a.incident_id, b.incident_id);
        assert_eq!(a.start, b.start);
        assert_eq!(a.end, b.end);
        assert!((a.ens_total.value() - b.ens_total.value()).abs() < TOL);
    }
    assert_eq!(chunked.intervals[0].end, minute(89));
    assert!((chunked.intervals[0].ens_total.value() - 1.5).abs() < TOL);
    assert_eq!(chunked.intervals[1].start, minute(100));
    assert_eq!(chunked.intervals[1].end, minute(129));
}

#[test]
fn manifest_and_outputs_are_written() {
    let dir = tempdir().unwrap();
    let mut inputs = attribution_inputs();
    inputs
        .incidents
        .push(incident(3, 99, 0, 5, Category::Limitation, Origin::External, 0.1));
    inputs.incidents.push(
        incident(4, 2, 0, 5, Category::Limitation, Origin::External, 9.0)
            .with_status(IncidentStatus::Discarded),
    );
    let mut cfg = config(Some("1h"), dir.path());
    cfg.export_grid = true;

    let summary = run_batch(&inputs, &cfg).unwrap();
    assert_eq!(summary.diagnostics.count_in(categories::UNRESOLVED_ASSET), 1);
    let total: f64 = summary.intervals.iter().map(|i| i.ens_total.value()).sum();
    assert!((total - 2.0).abs() < TOL);

    let manifest = load_batch_manifest(&summary.manifest_path).unwrap();
    assert_eq!(manifest.num_jobs, 3);
    assert_eq!(manifest.success, 3);
    assert_eq!(manifest.intervals, 2);
    assert_eq!(manifest.diagnostics[categories::UNRESOLVED_ASSET], 1);
    assert!(manifest.jobs.iter().all(|job| job.status == "ok"));
    assert!(dir.path().join("intervals.csv").exists());
    assert!(dir.path().join("grid").join("plant-1-0.csv").exists());
    assert!(!dir.path().join("anomalies.csv").exists());
}

#[test]
fn empty_input_writes_an_empty_run() {
    let dir = tempdir().unwrap();
    let inputs = BatchInputs {
        incidents: Vec::new(),
        ..attribution_inputs()
    };
    let summary = run_batch(&inputs, &config(Some("1d"), dir.path())).unwrap();
    assert!(summary.jobs.is_empty());
    assert!(summary.intervals.is_empty());
    let manifest = load_batch_manifest(&summary.manifest_path).unwrap();
    assert_eq!(manifest.num_jobs, 0);
    assert!(manifest.window_start.is_none());
}

#[test]
fn invalid_configuration_is_rejected() {
    let dir = tempdir().unwrap();
    let mut cfg = config(None, dir.path());
    cfg.engine.grid.step = "fortnight".into();
    assert!(run_batch(&attribution_inputs(), &cfg).is_err());
}

/// Three units over 20 minutes of 10 s telemetry; unit 2 is stopped from
/// 500 s to 690 s, across the 10 minute chunk boundary.
fn detection_inputs() -> BatchInputs {
    let mut telemetry = Vec::new();
    for asset in [2, 3, 4] {
        for tick in 0..120 {
            let stopped = asset == 2 && (50..70).contains(&tick);
            let mut record = TelemetryRecord::new(second(tick * 10), AssetId::new(asset));
            record.active_power = Some(if stopped { 0.0 } else { 1.5 });
            record.available_power = Some(2.0);
            record.wind_speed = Some(8.0);
            record.wind_direction = Some(200.0);
            telemetry.push(record);
        }
    }
    BatchInputs {
        hierarchy: flat_plant(),
        incidents: Vec::new(),
        telemetry,
        curves: PowerCurveLibrary::new(),
    }
}

#[test]
fn anomalies_are_stitched_across_chunks() {
    let inputs = detection_inputs();
    let mut runs = Vec::new();
    for chunk in [None, Some("10m")] {
        let dir = tempdir().unwrap();
        let mut cfg = config(chunk, dir.path());
        cfg.detect = true;
        cfg.engine.batch.merge_anomalies = true;
        let summary = run_batch(&inputs, &cfg).unwrap();
        assert!(dir.path().join("anomalies.csv").exists());
        runs.push(summary);
    }

    for summary in &runs {
        assert_eq!(summary.anomalies.len(), 1);
        let anomaly = &summary.anomalies[0];
        assert_eq!(anomaly.asset_id, AssetId::new(2));
        assert_eq!(anomaly.kind, AnomalyKind::Unavailability);
        assert_eq!(anomaly.start, second(500));
        assert_eq!(anomaly.end, second(690));
        assert_eq!(anomaly.end - anomaly.start, Duration::seconds(190));

        assert_eq!(summary.intervals.len(), 1);
        assert!(summary.intervals[0].source_anomaly);
        assert_eq!(summary.intervals[0].category, Category::Unavailability);
    }
    assert_eq!(runs[1].jobs.len(), 3);
}

/// Unit 2 stops at 500 s in good wind, then the wind drops below the
/// trigger threshold while it stays stopped until 750 s. The latched stop
/// spans the 600 s chunk boundary.
fn latched_stop_inputs() -> BatchInputs {
    let mut inputs = detection_inputs();
    for record in inputs.telemetry.iter_mut() {
        if record.asset_id != AssetId::new(2) {
            continue;
        }
        let tick = (record.timestamp - second(0)).num_seconds() / 10;
        if (50..75).contains(&tick) {
            record.active_power = Some(0.0);
        } else {
            record.active_power = Some(1.5);
        }
        if (55..75).contains(&tick) {
            record.wind_speed = Some(2.0);
        }
    }
    inputs
}

#[test]
fn latched_stop_survives_chunk_boundaries() {
    let inputs = latched_stop_inputs();
    let mut spans = Vec::new();
    for chunk in [None, Some("10m"), Some("5m")] {
        let dir = tempdir().unwrap();
        let mut cfg = config(chunk, dir.path());
        cfg.detect = true;
        let summary = run_batch(&inputs, &cfg).unwrap();
        assert_eq!(summary.failure, 0);
        let spans_of_run: Vec<_> = summary
            .anomalies
            .iter()
            .map(|a| (a.asset_id, a.kind, a.start, a.end))
            .collect();
        spans.push(spans_of_run);
    }

    assert_eq!(
        spans[0],
        vec![(AssetId::new(2), AnomalyKind::Unavailability, second(500), second(740))]
    );
    assert_eq!(spans[1], spans[0]);
    assert_eq!(spans[2], spans[0]);
}

#[test]
fn zero_length_incident_on_chunk_boundary_is_reported() {
    let mut inputs = attribution_inputs();
    inputs
        .incidents
        .push(incident(5, 2, 60, 60, Category::Limitation, Origin::External, 0.0));
    let mut counts = Vec::new();
    for chunk in [None, Some("1h")] {
        let dir = tempdir().unwrap();
        let summary = run_batch(&inputs, &config(chunk, dir.path())).unwrap();
        assert_eq!(summary.intervals.len(), 2);
        counts.push(summary.diagnostics.count_in(categories::ZERO_DURATION));
    }
    assert_eq!(counts, vec![1, 1]);
}
