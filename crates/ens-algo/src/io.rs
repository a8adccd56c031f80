//! Long-table export of the consolidated attribution grid.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use ens_core::AssetHierarchy;
use polars::prelude::{DataFrame, NamedFrom, Series};

use crate::grid::IncidentGrid;

/// One row per (leaf, tick) with flags, available power, total ENS and the
/// winning incident id.
pub fn grid_frame(hierarchy: &AssetHierarchy, grid: &IncidentGrid) -> Result<DataFrame> {
    let plant_id = hierarchy.node(grid.plant()).id.value();
    let time = grid.time();
    let stamps: Vec<String> = time
        .timestamps()
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .collect();

    let mut timestamp = Vec::new();
    let mut plant = Vec::new();
    let mut asset = Vec::new();
    let mut full_performance = Vec::new();
    let mut limitation = Vec::new();
    let mut unavailability = Vec::new();
    let mut available_power = Vec::new();
    let mut ens = Vec::new();
    let mut incident_id: Vec<Option<u64>> = Vec::new();

    for slot in (0..grid.slot_count()).filter(|s| grid.is_leaf(*s)) {
        let columns = grid.columns(slot);
        let asset_id = hierarchy.node(columns.node).id.value();
        let attribution = columns.attribution.as_ref();
        for (t, stamp) in stamps.iter().enumerate() {
            timestamp.push(stamp.clone());
            plant.push(plant_id);
            asset.push(asset_id);
            full_performance.push(attribution.map_or(true, |a| a.full_performance(t)));
            limitation.push(attribution.is_some_and(|a| a.limitation(t)));
            unavailability.push(attribution.is_some_and(|a| a.unavailability(t)));
            available_power.push(columns.available_power[t]);
            ens.push(columns.energy_at(t));
            incident_id.push(
                attribution
                    .and_then(|a| a.incident_id[t])
                    .filter(|id| !id.is_null())
                    .map(|id| id.value()),
            );
        }
    }

    DataFrame::new(vec![
        Series::new("timestamp", timestamp),
        Series::new("plant", plant),
        Series::new("asset", asset),
        Series::new("full_performance", full_performance),
        Series::new("limitation", limitation),
        Series::new("unavailability", unavailability),
        Series::new("available_power", available_power),
        Series::new("ens", ens),
        Series::new("incident_id", incident_id),
    ])
    .context("building grid frame")
}

/// Stack the frames of several plants and write them as CSV or parquet.
pub fn write_grid<'a, I>(hierarchy: &AssetHierarchy, grids: I, path: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a IncidentGrid>,
{
    let mut combined: Option<DataFrame> = None;
    for grid in grids {
        let frame = grid_frame(hierarchy, grid)?;
        combined = Some(match combined {
            Some(acc) => acc.vstack(&frame).context("stacking grid frames")?,
            None => frame,
        });
    }
    let Some(mut frame) = combined else {
        return Ok(0);
    };
    ens_ts::write_frame(&mut frame, path)?;
    Ok(frame.height())
}
