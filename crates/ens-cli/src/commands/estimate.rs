use std::path::Path;

use anyhow::{Context, Result};
use ens_algo::{detect_all, estimate_all, EnsEstimate, ReferenceMethod};
use ens_cli::cli::EstimateArgs;
use ens_core::Diagnostics;
use serde::Serialize;

use crate::commands::util::{ensure_valid, load_config, load_inputs, require};

#[derive(Serialize)]
struct EstimateRow {
    incident_id: u64,
    plant_id: u32,
    asset_id: u32,
    status: &'static str,
    recorded: f64,
    estimated: f64,
}

fn write_estimates(estimates: &[EnsEstimate], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for estimate in estimates {
        writer.serialize(EstimateRow {
            incident_id: estimate.incident_id.value(),
            plant_id: estimate.plant_id.value(),
            asset_id: estimate.asset_id.value(),
            status: estimate.status.as_str(),
            recorded: estimate.recorded.value(),
            estimated: estimate.estimated.value(),
        })?;
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))
}

pub fn handle(args: &EstimateArgs) -> Result<()> {
    let mut engine = load_config(args.inputs.config.as_deref())?;
    if let Some(sample) = args.sample {
        engine.estimate.sample = sample;
    }
    if args.quantile {
        engine.estimate.method = ReferenceMethod::Quantile;
    }
    if args.include_external {
        engine.estimate.include_external_limitations = true;
    }
    ensure_valid(&engine)?;
    require(&args.inputs.telemetry, "--telemetry")?;
    require(&args.inputs.incidents, "--incidents")?;

    let inputs = load_inputs(&args.inputs, &engine)?;
    let mut diag = Diagnostics::new();
    let mut opts = engine.detection_options()?;
    opts.detect_limitations = false;
    let detections = detect_all(
        &inputs.hierarchy,
        &inputs.telemetry,
        &inputs.curves,
        &inputs.incidents,
        &opts,
        &mut diag,
    )?;
    let estimates = estimate_all(
        &inputs.hierarchy,
        &detections,
        &inputs.incidents,
        &engine.estimate,
        args.open_only,
        &mut diag,
    )?;

    write_estimates(&estimates, &args.out)?;
    println!(
        "Wrote {} estimate(s) to {} ({})",
        estimates.len(),
        args.out.display(),
        diag.summary()
    );
    Ok(())
}
