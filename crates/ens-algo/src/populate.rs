//! Explode incident intervals onto the dense grid.

use std::collections::BTreeMap;

use ens_core::diagnostics::categories;
use ens_core::{AssetHierarchy, Diagnostics, EnsResult, IncidentId, RawIncident};
use serde::Serialize;

use crate::grid::{Attribution, IncidentGrid};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulateSummary {
    pub applied: usize,
    pub unresolved: usize,
    pub zero_duration: usize,
    /// Incidents whose ticks all fall outside the grid (other chunks).
    pub outside_grid: usize,
    pub overwritten_ticks: usize,
}

/// Write every incident's flags, energy rate and provenance onto the grid.
///
/// Ticks are `floor(start)..ceil(end)`. The per-tick rate is the incident's
/// total energy over that full span, so a grid that only covers part of the
/// incident (a chunk) receives exactly its share. Energy is added; the
/// provenance columns are last-writer-wins in input order.
pub fn populate(
    grid: &mut IncidentGrid,
    hierarchy: &AssetHierarchy,
    incidents: &[RawIncident],
    diag: &mut Diagnostics,
) -> EnsResult<PopulateSummary> {
    let mut summary = PopulateSummary::default();

    for incident in incidents {
        incident.validate()?;

        let Some(slot) = hierarchy
            .resolve(incident.asset_id)
            .and_then(|node| grid.slot(node))
        else {
            summary.unresolved += 1;
            diag.add_warning_with_entity(
                categories::UNRESOLVED_ASSET,
                &format!(
                    "incident {} references asset {} outside this plant",
                    incident.id, incident.asset_id
                ),
                &format!("incident {}", incident.id),
            );
            continue;
        };

        if incident.is_zero_duration() {
            summary.zero_duration += 1;
            diag.add_warning_with_entity(
                categories::ZERO_DURATION,
                &format!("incident {} starts and ends at {}", incident.id, incident.start),
                &format!("incident {}", incident.id),
            );
            continue;
        }

        let span = grid.time().tick_span(incident.start, incident.end);
        let tick_count = (span.end - span.start).max(1) as f64;
        let rate = incident.ens_total.value() / tick_count;
        let ticks = grid.time().clip(span);
        if ticks.is_empty() {
            summary.outside_grid += 1;
            continue;
        }

        let category = incident.energy_category().index();
        let columns = grid.columns_mut(slot);
        let len = columns.available_power.len();
        let attribution = columns
            .attribution
            .get_or_insert_with(|| Attribution::new(len));

        let mut overwritten: BTreeMap<IncidentId, usize> = BTreeMap::new();
        for t in ticks {
            if let Some(previous) = attribution.incident_id[t].filter(|p| *p != incident.id) {
                *overwritten.entry(previous).or_insert(0) += 1;
            }
            attribution.flags[category][t] = true;
            attribution.incident_id[t] = Some(incident.id);
            attribution.severity_rank[t] = incident.severity_rank;
            attribution.provenance_rank[t] = incident.provenance_rank;
            columns.energy[category][t] += rate;
        }

        for (previous, ticks) in overwritten {
            summary.overwritten_ticks += ticks;
            diag.add_warning_with_entity(
                categories::OVERLAP,
                &format!(
                    "incident {} overwrites incident {} on {} tick(s)",
                    incident.id, previous, ticks
                ),
                &format!("asset {}", incident.asset_id),
            );
        }
        summary.applied += 1;
    }

    Ok(summary)
}
