use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use ens_algo::find_overlaps;
use ens_core::{AssetId, IncidentId, ProvenanceOrder};
use ens_io::read_incidents;
use serde::Serialize;
use tabwriter::TabWriter;

#[derive(Serialize)]
struct OverlapGroup {
    asset_id: AssetId,
    incident_ids: Vec<IncidentId>,
}

pub fn handle(incidents: &Path, json: bool) -> Result<()> {
    let incidents = read_incidents(incidents, &ProvenanceOrder::default())?;
    let asset_of: HashMap<IncidentId, AssetId> =
        incidents.iter().map(|i| (i.id, i.asset_id)).collect();
    let groups: Vec<OverlapGroup> = find_overlaps(&incidents)
        .into_iter()
        .filter_map(|ids| {
            let asset_id = *asset_of.get(ids.first()?)?;
            Some(OverlapGroup {
                asset_id,
                incident_ids: ids,
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    if groups.is_empty() {
        println!("No overlapping incidents");
        return Ok(());
    }
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "ASSET\tINCIDENTS")?;
    for group in &groups {
        let ids: Vec<String> = group.incident_ids.iter().map(|id| id.to_string()).collect();
        writeln!(writer, "{}\t{}", group.asset_id, ids.join(", "))?;
    }
    writer.flush()?;
    Ok(())
}
