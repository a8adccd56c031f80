use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use ens_batch::EngineConfig;
use ens_cli::cli::InputArgs;
use ens_core::{AssetHierarchy, PowerCurveLibrary, RawIncident, TelemetryRecord};
use ens_io::{read_assets, read_curves, read_incidents, read_telemetry};
use rayon::ThreadPoolBuilder;
use tracing::info;

pub fn configure_threads(spec: &str) {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse().unwrap_or_else(|_| num_cpus::get())
    };
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
}

/// Worker count for the batch pool; "auto" and unparsable values mean every core.
pub fn thread_count(spec: &str) -> usize {
    if spec.eq_ignore_ascii_case("auto") {
        0
    } else {
        spec.parse().unwrap_or(0)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            info!("Loading engine configuration from {}", path.display());
            EngineConfig::load_from(path)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Fail with every problem when the merged configuration is unusable.
pub fn ensure_valid(config: &EngineConfig) -> Result<()> {
    let problems = config.validate();
    if problems.is_empty() {
        return Ok(());
    }
    Err(anyhow!("invalid configuration:\n  {}", problems.join("\n  ")))
}

pub fn require<'a>(path: &'a Option<PathBuf>, flag: &str) -> Result<&'a Path> {
    path.as_deref()
        .ok_or_else(|| anyhow!("{flag} is required for this command"))
}

pub struct LoadedInputs {
    pub hierarchy: AssetHierarchy,
    pub incidents: Vec<RawIncident>,
    pub telemetry: Vec<TelemetryRecord>,
    pub curves: PowerCurveLibrary,
}

/// Read every table named in `inputs`; absent tables load as empty.
pub fn load_inputs(inputs: &InputArgs, config: &EngineConfig) -> Result<LoadedInputs> {
    let hierarchy = read_assets(&inputs.assets)?;
    let incidents = match &inputs.incidents {
        Some(path) => read_incidents(path, &config.attribution.provenance_order)?,
        None => Vec::new(),
    };
    let telemetry = match &inputs.telemetry {
        Some(path) => read_telemetry(path)?,
        None => Vec::new(),
    };
    let curves = match &inputs.curves {
        Some(path) => read_curves(path)?,
        None => PowerCurveLibrary::new(),
    };
    info!(
        assets = hierarchy.len(),
        incidents = incidents.len(),
        telemetry = telemetry.len(),
        curves = curves.len(),
        "loaded inputs"
    );
    Ok(LoadedInputs {
        hierarchy,
        incidents,
        telemetry,
        curves,
    })
}
