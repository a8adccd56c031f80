use anyhow::Result;
use ens_algo::detect_all;
use ens_cli::cli::DetectArgs;
use ens_core::Diagnostics;
use ens_io::write_anomalies;

use crate::commands::util::{configure_threads, ensure_valid, load_config, load_inputs, require};

pub fn handle(args: &DetectArgs) -> Result<()> {
    configure_threads(&args.threads);
    let mut engine = load_config(args.inputs.config.as_deref())?;
    if let Some(step) = &args.step {
        engine.grid.detection_step = step.clone();
    }
    if let Some(min) = args.min_duration {
        engine.anomaly.min_duration_s = min;
        engine.limitation.min_duration_s = min;
    }
    if args.units {
        engine.limitation.units = true;
    }
    ensure_valid(&engine)?;
    require(&args.inputs.telemetry, "--telemetry")?;

    let inputs = load_inputs(&args.inputs, &engine)?;
    let opts = engine.detection_options()?;
    let mut diag = Diagnostics::new();
    let plants = detect_all(
        &inputs.hierarchy,
        &inputs.telemetry,
        &inputs.curves,
        &inputs.incidents,
        &opts,
        &mut diag,
    )?;

    let mut anomalies = Vec::new();
    for plant in plants {
        println!("Plant {}: {} anomaly(ies)", plant.plant_id, plant.anomalies.len());
        diag.merge(plant.diagnostics);
        anomalies.extend(plant.anomalies);
    }
    write_anomalies(&anomalies, &args.out)?;
    println!(
        "Wrote {} anomaly(ies) to {} ({})",
        anomalies.len(),
        args.out.display(),
        diag.summary()
    );
    Ok(())
}
