use std::path::Path;

use anyhow::{Context, Result};
use ens_core::{AnomalyKind, DetectedAnomaly};
use polars::prelude::{DataFrame, NamedFrom, Series};

use super::rfc3339;

fn kind_name(kind: AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::Unavailability => "unavailability",
        AnomalyKind::Limitation => "limitation",
    }
}

/// Related incident ids are joined with `;`.
pub fn anomalies_frame(anomalies: &[DetectedAnomaly]) -> Result<DataFrame> {
    let ids = |f: fn(&DetectedAnomaly) -> u32| anomalies.iter().map(f).collect::<Vec<u32>>();
    let text = |f: fn(&DetectedAnomaly) -> String| {
        anomalies.iter().map(f).collect::<Vec<String>>()
    };
    DataFrame::new(vec![
        Series::new("plant_id", ids(|a| a.plant_id.value())),
        Series::new("asset_id", ids(|a| a.asset_id.value())),
        Series::new("kind", text(|a| kind_name(a.kind).to_string())),
        Series::new("start", text(|a| rfc3339(&a.start))),
        Series::new("end", text(|a| rfc3339(&a.end))),
        Series::new(
            "duration_s",
            anomalies.iter().map(|a| a.duration_s()).collect::<Vec<i64>>(),
        ),
        Series::new("trigger_parameters", text(|a| a.trigger_parameters.to_string())),
        Series::new(
            "related_incident_ids",
            text(|a| {
                a.related_incident_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(";")
            }),
        ),
    ])
    .context("building anomaly frame")
}

pub fn write_anomalies(anomalies: &[DetectedAnomaly], path: &Path) -> Result<()> {
    let mut frame = anomalies_frame(anomalies)?;
    ens_ts::write_frame(&mut frame, path)?;
    tracing::info!(rows = anomalies.len(), path = %path.display(), "wrote anomalies");
    Ok(())
}
