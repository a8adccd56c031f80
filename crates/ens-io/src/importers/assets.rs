use std::path::Path;

use anyhow::{Context, Result};
use ens_core::{AssetHierarchy, AssetId, AssetKind, AssetNode, Megawatts};
use serde::Deserialize;

use super::read_rows;

#[derive(Debug, Deserialize)]
struct AssetRow {
    id: u32,
    name: String,
    #[serde(default)]
    parent_id: Option<u32>,
    kind: String,
    #[serde(default)]
    nominal_power: Option<f64>,
}

/// Read `id,name,parent_id,kind,nominal_power` and build the hierarchy.
pub fn read_assets(path: &Path) -> Result<AssetHierarchy> {
    let rows: Vec<AssetRow> = read_rows(path)?;
    let nodes = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let kind: AssetKind = row
                .kind
                .parse()
                .with_context(|| format!("{}: row {}", path.display(), i + 1))?;
            Ok(AssetNode {
                id: AssetId::new(row.id),
                name: row.name,
                parent_id: row.parent_id.map(AssetId::new),
                kind,
                nominal_power: Megawatts(row.nominal_power.unwrap_or(0.0)),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let count = nodes.len();
    let hierarchy = AssetHierarchy::new(nodes)
        .with_context(|| format!("building asset hierarchy from {}", path.display()))?;
    tracing::debug!(assets = count, plants = hierarchy.plants().len(), "loaded assets");
    Ok(hierarchy)
}
