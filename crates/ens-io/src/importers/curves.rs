use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use ens_core::{AssetId, PowerCurveLibrary, ReferenceCurve};
use serde::Deserialize;

use super::read_rows;

#[derive(Debug, Deserialize)]
struct CurveRow {
    asset_id: u32,
    wind_speed: f64,
    power: f64,
}

/// Read `asset_id,wind_speed,power` points into one reference curve per unit.
pub fn read_curves(path: &Path) -> Result<PowerCurveLibrary> {
    let rows: Vec<CurveRow> = read_rows(path)?;
    let mut points: BTreeMap<u32, Vec<(f64, f64)>> = BTreeMap::new();
    for row in rows {
        points
            .entry(row.asset_id)
            .or_default()
            .push((row.wind_speed, row.power));
    }
    let mut library = PowerCurveLibrary::new();
    for (asset, pts) in points {
        let curve = ReferenceCurve::new(pts)
            .with_context(|| format!("power curve for asset {asset}"))?;
        library.insert(AssetId::new(asset), curve);
    }
    tracing::debug!(curves = library.len(), "loaded power curves");
    Ok(library)
}
