use std::path::Path;

use anyhow::{Context, Result};
use ens_core::CollapsedInterval;
use polars::prelude::{DataFrame, NamedFrom, Series};

use super::rfc3339;

/// Column layout mirrors the raw incident table plus the enrichment fields.
pub fn intervals_frame(intervals: &[CollapsedInterval]) -> Result<DataFrame> {
    let col = |f: fn(&CollapsedInterval) -> u32| intervals.iter().map(f).collect::<Vec<u32>>();
    let text = |f: fn(&CollapsedInterval) -> String| {
        intervals.iter().map(f).collect::<Vec<String>>()
    };
    DataFrame::new(vec![
        Series::new("plant_id", col(|i| i.plant_id.value())),
        Series::new("asset_id", col(|i| i.asset_id.value())),
        Series::new(
            "incident_id",
            intervals
                .iter()
                .map(|i| i.incident_id.value())
                .collect::<Vec<u64>>(),
        ),
        Series::new("origin_asset_id", col(|i| i.origin_asset_id.value())),
        Series::new("category", text(|i| i.category.as_str().to_string())),
        Series::new("origin", text(|i| i.origin.as_str().to_string())),
        Series::new("severity_rank", col(|i| i.severity_rank)),
        Series::new("provenance_rank", col(|i| i.provenance_rank)),
        Series::new("status", text(|i| i.status.as_str().to_string())),
        Series::new("start", text(|i| rfc3339(&i.start))),
        Series::new("end", text(|i| rfc3339(&i.end))),
        Series::new(
            "hours",
            intervals.iter().map(|i| i.hours).collect::<Vec<f64>>(),
        ),
        Series::new(
            "ens_total",
            intervals
                .iter()
                .map(|i| i.ens_total.value())
                .collect::<Vec<f64>>(),
        ),
        Series::new(
            "nominal_power",
            intervals
                .iter()
                .map(|i| i.nominal_power.value())
                .collect::<Vec<f64>>(),
        ),
        Series::new(
            "source_anomaly",
            intervals
                .iter()
                .map(|i| i.source_anomaly)
                .collect::<Vec<bool>>(),
        ),
    ])
    .context("building interval frame")
}

/// Write intervals as CSV or parquet, chosen by extension.
pub fn write_intervals(intervals: &[CollapsedInterval], path: &Path) -> Result<()> {
    let mut frame = intervals_frame(intervals)?;
    ens_ts::write_frame(&mut frame, path)?;
    tracing::info!(rows = intervals.len(), path = %path.display(), "wrote intervals");
    Ok(())
}
