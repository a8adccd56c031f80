use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use ens_algo::{attribute, build_unit_curves, detect_all, AttributionOptions, UnitCurves};
use ens_cli::cli::CurvesArgs;
use ens_core::Diagnostics;
use ens_io::write_json;
use serde::Serialize;
use tracing::{info, warn};

use crate::commands::util::{ensure_valid, load_config, load_inputs, require};

#[derive(Serialize)]
struct ReferenceRow {
    asset_id: u32,
    wind_speed: f64,
    power: f64,
}

/// Measured curves in the layout the `--curves` importer reads back.
fn write_reference(curves: &[UnitCurves], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for unit in curves {
        let reference = match unit.curve.to_reference() {
            Ok(reference) => reference,
            Err(err) => {
                warn!(asset = %unit.curve.asset_id, "no reference curve: {err}");
                continue;
            }
        };
        for &(wind_speed, power) in reference.points() {
            writer.serialize(ReferenceRow {
                asset_id: unit.curve.asset_id.value(),
                wind_speed,
                power,
            })?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))
}

pub fn handle(args: &CurvesArgs) -> Result<()> {
    let mut engine = load_config(args.inputs.config.as_deref())?;
    if let Some(width) = args.bin_width {
        engine.curves.wind_bin_width = width;
    }
    if let Some(min_count) = args.min_count {
        engine.curves.min_count = min_count;
    }
    if let Some(sectors) = args.sectors {
        engine.curves.direction_sectors = sectors;
    }
    ensure_valid(&engine)?;
    require(&args.inputs.telemetry, "--telemetry")?;

    let inputs = load_inputs(&args.inputs, &engine)?;
    let hierarchy = &inputs.hierarchy;
    let mut diag = Diagnostics::new();

    // Attribution grids restrict the curves to full-performance ticks.
    let grids = if inputs.incidents.is_empty() {
        BTreeMap::new()
    } else {
        let opts = AttributionOptions {
            step: engine.step()?,
            keep_grid: true,
            ..AttributionOptions::default()
        };
        attribute(hierarchy, &inputs.incidents, &opts, &mut diag)?
            .into_iter()
            .filter_map(|plant| Some((plant.plant_id, plant.grid?)))
            .collect()
    };

    let detections = detect_all(
        hierarchy,
        &inputs.telemetry,
        &inputs.curves,
        &inputs.incidents,
        &engine.detection_options()?,
        &mut diag,
    )?;
    let mut curves = Vec::new();
    for detection in detections {
        let Some(signals) = detection.signals else {
            continue;
        };
        let grid = grids.get(&detection.plant_id);
        info!(
            plant = %detection.plant_id,
            filtered = grid.is_some(),
            "building unit curves"
        );
        curves.extend(build_unit_curves(hierarchy, &signals, grid, &engine.curves));
    }

    write_json(&curves, &args.out)?;
    println!(
        "Wrote curves for {} unit(s) to {}",
        curves.len(),
        args.out.display()
    );
    if let Some(path) = &args.reference_out {
        write_reference(&curves, path)?;
        println!("Wrote reference curves to {}", path.display());
    }
    Ok(())
}
