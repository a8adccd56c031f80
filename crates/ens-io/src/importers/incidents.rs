use std::path::Path;

use anyhow::{Context, Result};
use ens_core::{
    AssetId, IncidentId, IncidentStatus, MegawattHours, ProvenanceOrder, RawIncident,
    ResponsibleParty,
};
use ens_ts::parse_timestamp;
use serde::Deserialize;

use super::read_rows;

#[derive(Debug, Deserialize)]
struct IncidentRow {
    id: u64,
    asset_id: u32,
    start: String,
    end: String,
    category: String,
    origin: String,
    #[serde(default)]
    severity_rank: Option<u32>,
    #[serde(default)]
    provenance_rank: Option<u32>,
    #[serde(default)]
    ens_total: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    responsible: Option<String>,
}

impl IncidentRow {
    fn into_incident(self, order: &ProvenanceOrder) -> Result<RawIncident> {
        let mut incident = RawIncident::new(
            IncidentId::new(self.id),
            AssetId::new(self.asset_id),
            parse_timestamp(&self.start)?,
            parse_timestamp(&self.end)?,
            self.category.parse()?,
            self.origin.parse()?,
        )
        .with_energy(MegawattHours(self.ens_total.unwrap_or(0.0)));

        if let Some(status) = self.status.as_deref() {
            incident = incident.with_status(status.parse::<IncidentStatus>()?);
        }
        if let Some(party) = self.responsible.as_deref().filter(|s| !s.is_empty()) {
            incident = incident.with_responsible(party.parse::<ResponsibleParty>()?, order);
        }
        incident.severity_rank = self.severity_rank.unwrap_or(0);
        if let Some(rank) = self.provenance_rank {
            incident.provenance_rank = rank;
        }
        incident.validate()?;
        Ok(incident)
    }
}

/// Read the raw incident table.
///
/// Required columns: `id,asset_id,start,end,category,origin`. Optional:
/// `severity_rank`, `provenance_rank`, `ens_total` (MWh), `status`,
/// `responsible`. A missing `provenance_rank` is derived from `responsible`
/// through `order`.
pub fn read_incidents(path: &Path, order: &ProvenanceOrder) -> Result<Vec<RawIncident>> {
    let rows: Vec<IncidentRow> = read_rows(path)?;
    let incidents = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_incident(order)
                .with_context(|| format!("{}: row {}", path.display(), i + 1))
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(incidents = incidents.len(), "loaded incidents");
    Ok(incidents)
}
