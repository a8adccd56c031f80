use anyhow::{anyhow, Result};
use ens_batch::{run_batch, BatchInputs, BatchRunnerConfig, BatchSummary};
use ens_cli::cli::AttributeArgs;
use tracing::info;

use crate::commands::util::{ensure_valid, load_config, load_inputs, require, thread_count};

fn print_summary(summary: &BatchSummary) {
    println!(
        "Attribution: {} job(s), {} ok, {} failed",
        summary.jobs.len(),
        summary.success,
        summary.failure
    );
    println!("  Intervals : {}", summary.intervals.len());
    println!("  Anomalies : {}", summary.anomalies.len());
    println!("  Issues    : {}", summary.diagnostics.summary());
    println!("  Manifest  : {}", summary.manifest_path.display());

    if summary.failure > 0 {
        println!();
        println!("Failed jobs:");
        for job in summary.jobs.iter().filter(|j| j.status == "error") {
            println!(
                "  {} - {}",
                job.job_id,
                job.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

pub fn handle(args: &AttributeArgs) -> Result<()> {
    let mut engine = load_config(args.inputs.config.as_deref())?;
    if let Some(step) = &args.step {
        engine.grid.step = step.clone();
    }
    if let Some(chunk) = &args.chunk {
        engine.grid.chunk = Some(chunk.clone());
    }
    if let Some(split) = &args.split {
        engine.attribution.split = Some(split.clone());
    }
    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        engine.attribution.window = Some((from.clone(), to.clone()));
    }
    if let Some(threads) = &args.threads {
        engine.batch.threads = thread_count(threads);
    }
    if let Some(format) = args.format {
        engine.batch.output_format = format.as_str().to_string();
    }
    if args.merge_anomalies {
        engine.batch.merge_anomalies = true;
    }
    ensure_valid(&engine)?;

    require(&args.inputs.incidents, "--incidents")?;
    if args.detect {
        require(&args.inputs.telemetry, "--telemetry")?;
    }
    let loaded = load_inputs(&args.inputs, &engine)?;
    if loaded.hierarchy.plants().is_empty() {
        return Err(anyhow!("asset table has no plant"));
    }

    let inputs = BatchInputs {
        hierarchy: loaded.hierarchy,
        incidents: loaded.incidents,
        telemetry: loaded.telemetry,
        curves: loaded.curves,
    };
    let config = BatchRunnerConfig {
        engine,
        output_root: args.out.clone(),
        detect: args.detect,
        export_grid: args.export_grid,
    };
    info!("Attributing into {}", args.out.display());
    let summary = run_batch(&inputs, &config)?;
    print_summary(&summary);
    if summary.failure > 0 {
        return Err(anyhow!("{} batch job(s) failed", summary.failure));
    }
    Ok(())
}
