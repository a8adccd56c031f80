//! Telemetry estimate of the energy an incident did not supply.
//!
//! The plant's own fleet is the reference: at each tick the best performing
//! units give the capacity factor the affected asset should have reached.
//! The estimate is the shortfall of the asset's generation against that
//! factor times its capacity, summed over the incident's ticks.

use ens_core::diagnostics::categories;
use ens_core::{
    AssetHierarchy, AssetId, Category, Diagnostics, EnsError, EnsResult, IncidentId,
    IncidentStatus, MegawattHours, Origin, RawIncident,
};
use serde::{Deserialize, Serialize};

use crate::signals::PlantSignals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMethod {
    /// Mean capacity factor of the top `sample` share of units.
    #[default]
    TopMean,
    /// The `1 - sample` quantile of the unit capacity factors, rounded up
    /// to the next observed value.
    Quantile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsEstimator {
    /// Share of the plant's units forming the reference, in `(0, 1]`.
    pub sample: f64,
    pub method: ReferenceMethod,
    /// External limitations are left out unless this is set.
    pub include_external_limitations: bool,
}

impl Default for EnsEstimator {
    fn default() -> Self {
        Self {
            sample: 0.33,
            method: ReferenceMethod::TopMean,
            include_external_limitations: false,
        }
    }
}

/// Estimated energy for one incident next to the recorded figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsEstimate {
    pub incident_id: IncidentId,
    pub plant_id: AssetId,
    pub asset_id: AssetId,
    pub status: IncidentStatus,
    pub recorded: MegawattHours,
    pub estimated: MegawattHours,
}

impl EnsEstimator {
    pub fn validate(&self) -> EnsResult<()> {
        if !(self.sample > 0.0 && self.sample <= 1.0) {
            return Err(EnsError::Config(format!(
                "estimate sample must be in (0, 1], got {}",
                self.sample
            )));
        }
        Ok(())
    }

    /// Whether this incident is estimated at all.
    pub fn applies_to(&self, incident: &RawIncident) -> bool {
        if incident.is_discarded() {
            return false;
        }
        self.include_external_limitations
            || !(incident.category == Category::Limitation && incident.origin == Origin::External)
    }

    /// Reference capacity factor per tick over the plant's units. Units
    /// without a factor at a tick count as zero.
    pub fn reference_capacity_factor(
        &self,
        hierarchy: &AssetHierarchy,
        signals: &PlantSignals,
    ) -> Vec<f64> {
        let units = hierarchy.leaves(signals.plant);
        let len = signals.time.len();
        if units.is_empty() {
            return vec![0.0; len];
        }
        let take = ((units.len() as f64 * self.sample).round() as usize).clamp(1, units.len());
        let mut factors = vec![0.0; units.len()];
        (0..len)
            .map(|t| {
                for (slot, unit) in factors.iter_mut().zip(&units) {
                    *slot = signals
                        .get(*unit)
                        .and_then(|s| s.capacity_factor[t])
                        .unwrap_or(0.0);
                }
                factors.sort_by(f64::total_cmp);
                match self.method {
                    ReferenceMethod::TopMean => {
                        factors[factors.len() - take..].iter().sum::<f64>() / take as f64
                    }
                    ReferenceMethod::Quantile => {
                        let q = 1.0 - self.sample;
                        let index = (q * (factors.len() - 1) as f64).ceil() as usize;
                        factors[index.min(factors.len() - 1)]
                    }
                }
            })
            .collect()
    }

    /// Shortfall of the incident's asset against `reference` over the
    /// incident's ticks. Ticks without measured generation add nothing.
    /// `None` when the asset has no signals or the grid does not cover the
    /// whole incident.
    pub fn estimate(
        &self,
        hierarchy: &AssetHierarchy,
        signals: &PlantSignals,
        reference: &[f64],
        incident: &RawIncident,
    ) -> Option<MegawattHours> {
        let node = hierarchy.resolve(incident.asset_id)?;
        let node_signals = signals.get(node)?;
        let time = &signals.time;
        let span = time.tick_span(incident.start, incident.end);
        if span.start < 0 || span.end > time.len() as i64 || span.is_empty() {
            return None;
        }
        let capacity = node_signals.capacity.value();
        let shortfall: f64 = time
            .clip(span)
            .filter_map(|t| {
                let generated = node_signals.generated[t]?;
                Some((capacity * reference[t] - generated).max(0.0))
            })
            .sum();
        Some(MegawattHours(shortfall * time.step_hours()))
    }

    /// Estimate every applicable incident of the plant. Incidents the
    /// telemetry cannot cover are reported and skipped.
    pub fn estimate_plant(
        &self,
        hierarchy: &AssetHierarchy,
        signals: &PlantSignals,
        incidents: &[RawIncident],
        diag: &mut Diagnostics,
    ) -> Vec<EnsEstimate> {
        let plant_id = hierarchy.node(signals.plant).id;
        let reference = self.reference_capacity_factor(hierarchy, signals);
        let mut out = Vec::new();
        for incident in incidents.iter().filter(|i| self.applies_to(i)) {
            let in_plant = hierarchy
                .resolve(incident.asset_id)
                .is_some_and(|node| hierarchy.plant_of(node) == signals.plant);
            if !in_plant {
                continue;
            }
            match self.estimate(hierarchy, signals, &reference, incident) {
                Some(estimated) => out.push(EnsEstimate {
                    incident_id: incident.id,
                    plant_id,
                    asset_id: incident.asset_id,
                    status: incident.status,
                    recorded: incident.ens_total,
                    estimated,
                }),
                None => diag.add_warning_with_entity(
                    categories::ESTIMATE_SKIPPED,
                    "telemetry does not cover the incident; energy not estimated",
                    &format!("incident {}", incident.id),
                ),
            }
        }
        out
    }
}

/// Overwrite the recorded energy of the estimated incidents. Returns how
/// many were changed.
pub fn apply_estimates(incidents: &mut [RawIncident], estimates: &[EnsEstimate]) -> usize {
    let mut changed = 0;
    for incident in incidents.iter_mut() {
        if let Some(estimate) = estimates.iter().find(|e| e.incident_id == incident.id) {
            incident.ens_total = estimate.estimated;
            changed += 1;
        }
    }
    changed
}
