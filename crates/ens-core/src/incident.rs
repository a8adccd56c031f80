//! Incident records, attribution keys and the engine's output rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EnsError, EnsResult};
use crate::units::{MegawattHours, Megawatts};
use crate::{AssetId, IncidentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Curtailment: the asset could produce but was told to produce less.
    Limitation,
    /// Outage: the asset could not produce.
    Unavailability,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Limitation => "limitation",
            Category::Unavailability => "unavailability",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = EnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "limitation" | "curtailment" => Ok(Category::Limitation),
            "unavailability" | "outage" => Ok(Category::Unavailability),
            other => Err(EnsError::Parse(format!("unknown incident category '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Internal,
    External,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Internal => "internal",
            Origin::External => "external",
        }
    }
}

impl std::str::FromStr for Origin {
    type Err = EnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" | "int" => Ok(Origin::Internal),
            "external" | "ext" => Ok(Origin::External),
            other => Err(EnsError::Parse(format!("unknown incident origin '{other}'"))),
        }
    }
}

/// The four leaf energy columns tracked per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyCategory {
    LimitationExternal,
    LimitationInternal,
    UnavailabilityExternal,
    UnavailabilityInternal,
}

impl EnergyCategory {
    pub const ALL: [EnergyCategory; 4] = [
        EnergyCategory::LimitationExternal,
        EnergyCategory::LimitationInternal,
        EnergyCategory::UnavailabilityExternal,
        EnergyCategory::UnavailabilityInternal,
    ];

    pub fn of(category: Category, origin: Origin) -> Self {
        match (category, origin) {
            (Category::Limitation, Origin::External) => EnergyCategory::LimitationExternal,
            (Category::Limitation, Origin::Internal) => EnergyCategory::LimitationInternal,
            (Category::Unavailability, Origin::External) => {
                EnergyCategory::UnavailabilityExternal
            }
            (Category::Unavailability, Origin::Internal) => {
                EnergyCategory::UnavailabilityInternal
            }
        }
    }

    /// Position in [`EnergyCategory::ALL`]; grid columns are laid out in this order.
    pub fn index(&self) -> usize {
        match self {
            EnergyCategory::LimitationExternal => 0,
            EnergyCategory::LimitationInternal => 1,
            EnergyCategory::UnavailabilityExternal => 2,
            EnergyCategory::UnavailabilityInternal => 3,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            EnergyCategory::LimitationExternal | EnergyCategory::LimitationInternal => {
                Category::Limitation
            }
            _ => Category::Unavailability,
        }
    }

    pub fn origin(&self) -> Origin {
        match self {
            EnergyCategory::LimitationExternal | EnergyCategory::UnavailabilityExternal => {
                Origin::External
            }
            _ => Origin::Internal,
        }
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            EnergyCategory::LimitationExternal => "ens_limitation_external",
            EnergyCategory::LimitationInternal => "ens_limitation_internal",
            EnergyCategory::UnavailabilityExternal => "ens_unavailability_external",
            EnergyCategory::UnavailabilityInternal => "ens_unavailability_internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[default]
    Open,
    Closed,
    /// Rejected by the operator; ignored by the overlap finder.
    Discarded,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Closed => "closed",
            IncidentStatus::Discarded => "discarded",
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = EnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "open" | "pending" => Ok(IncidentStatus::Open),
            "closed" | "approved" => Ok(IncidentStatus::Closed),
            "discarded" | "rejected" => Ok(IncidentStatus::Discarded),
            other => Err(EnsError::Parse(format!("unknown incident status '{other}'"))),
        }
    }
}

/// Who is held responsible for an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsibleParty {
    /// The generating unit itself (turbine manufacturer / O&M).
    Unit,
    /// Balance of plant: collection network, substation.
    Bop,
    /// Transmission grid operator.
    Grid,
}

impl std::str::FromStr for ResponsibleParty {
    type Err = EnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit" | "wtg" => Ok(ResponsibleParty::Unit),
            "bop" => Ok(ResponsibleParty::Bop),
            "grid" => Ok(ResponsibleParty::Grid),
            other => Err(EnsError::Parse(format!("unknown responsible party '{other}'"))),
        }
    }
}

/// Ordered list of responsible parties; earlier entries rank higher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceOrder(Vec<ResponsibleParty>);

impl Default for ProvenanceOrder {
    fn default() -> Self {
        Self(vec![
            ResponsibleParty::Unit,
            ResponsibleParty::Bop,
            ResponsibleParty::Grid,
        ])
    }
}

impl ProvenanceOrder {
    pub fn new(order: Vec<ResponsibleParty>) -> EnsResult<Self> {
        if order.is_empty() {
            return Err(EnsError::Config("provenance order is empty".into()));
        }
        for (i, party) in order.iter().enumerate() {
            if order[..i].contains(party) {
                return Err(EnsError::Config(format!(
                    "provenance order lists {party:?} twice"
                )));
            }
        }
        Ok(Self(order))
    }

    pub fn parties(&self) -> &[ResponsibleParty] {
        &self.0
    }

    /// Rank of a party: `len` for the first entry down to 1 for the last,
    /// 0 for parties not listed.
    pub fn rank(&self, party: ResponsibleParty) -> u32 {
        self.0
            .iter()
            .position(|p| *p == party)
            .map(|pos| (self.0.len() - pos) as u32)
            .unwrap_or(0)
    }
}

/// Comparison key for priority propagation. Field order matters: the
/// derived `Ord` compares severity first and falls back to provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct AttributionKey {
    pub severity_rank: u32,
    pub provenance_rank: u32,
}

impl AttributionKey {
    pub fn new(severity_rank: u32, provenance_rank: u32) -> Self {
        Self {
            severity_rank,
            provenance_rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIncident {
    pub id: IncidentId,
    pub asset_id: AssetId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub category: Category,
    pub origin: Origin,
    pub severity_rank: u32,
    pub provenance_rank: u32,
    pub ens_total: MegawattHours,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default)]
    pub responsible: Option<ResponsibleParty>,
}

impl RawIncident {
    pub fn new(
        id: IncidentId,
        asset_id: AssetId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: Category,
        origin: Origin,
    ) -> Self {
        Self {
            id,
            asset_id,
            start,
            end,
            category,
            origin,
            severity_rank: 0,
            provenance_rank: 0,
            ens_total: MegawattHours::ZERO,
            status: IncidentStatus::Open,
            responsible: None,
        }
    }

    pub fn with_ranks(mut self, severity_rank: u32, provenance_rank: u32) -> Self {
        self.severity_rank = severity_rank;
        self.provenance_rank = provenance_rank;
        self
    }

    pub fn with_energy(mut self, ens_total: MegawattHours) -> Self {
        self.ens_total = ens_total;
        self
    }

    pub fn with_status(mut self, status: IncidentStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the responsible party and derives the provenance rank from `order`.
    pub fn with_responsible(mut self, party: ResponsibleParty, order: &ProvenanceOrder) -> Self {
        self.responsible = Some(party);
        self.provenance_rank = order.rank(party);
        self
    }

    pub fn key(&self) -> AttributionKey {
        AttributionKey::new(self.severity_rank, self.provenance_rank)
    }

    pub fn energy_category(&self) -> EnergyCategory {
        EnergyCategory::of(self.category, self.origin)
    }

    pub fn is_zero_duration(&self) -> bool {
        self.start == self.end
    }

    pub fn is_discarded(&self) -> bool {
        self.status == IncidentStatus::Discarded
    }

    /// Inclusive overlap on the same asset.
    pub fn overlaps(&self, other: &RawIncident) -> bool {
        self.asset_id == other.asset_id && self.start <= other.end && self.end >= other.start
    }

    /// Structural checks; violations abort the run.
    pub fn validate(&self) -> EnsResult<()> {
        if self.start > self.end {
            return Err(EnsError::invalid_incident(
                self.id,
                format!("start {} is after end {}", self.start, self.end),
            ));
        }
        if !self.ens_total.is_finite() || self.ens_total.value() < 0.0 {
            return Err(EnsError::invalid_incident(
                self.id,
                format!("energy not supplied must be >= 0, got {}", self.ens_total),
            ));
        }
        Ok(())
    }
}

/// One reconstructed run of identical attribution on one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollapsedInterval {
    pub plant_id: AssetId,
    pub asset_id: AssetId,
    /// Incident that won the run; null (0) for rows built from anomalies.
    pub incident_id: IncidentId,
    /// Asset the winning incident was recorded against.
    pub origin_asset_id: AssetId,
    pub category: Category,
    pub origin: Origin,
    pub severity_rank: u32,
    pub provenance_rank: u32,
    pub status: IncidentStatus,
    pub start: DateTime<Utc>,
    /// Timestamp of the last tick in the run.
    pub end: DateTime<Utc>,
    pub hours: f64,
    pub ens_total: MegawattHours,
    pub nominal_power: Megawatts,
    pub source_anomaly: bool,
}

impl CollapsedInterval {
    pub fn recompute_hours(&mut self) {
        self.hours = hours_between(self.start, self.end);
    }

    pub fn key(&self) -> AttributionKey {
        AttributionKey::new(self.severity_rank, self.provenance_rank)
    }
}

pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Unavailability,
    Limitation,
}

impl AnomalyKind {
    pub fn category(&self) -> Category {
        match self {
            AnomalyKind::Unavailability => Category::Unavailability,
            AnomalyKind::Limitation => Category::Limitation,
        }
    }
}

/// Thresholds that produced a detection, scaled to the asset where useful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerParameters {
    Unavailability {
        min_duration_s: i64,
        max_generated_power: Megawatts,
        min_available_power: Megawatts,
        min_wind_speed: f64,
        plant_min_wind_speed: Option<f64>,
        plant_min_available_ratio: Option<f64>,
    },
    Limitation {
        min_duration_s: i64,
        nominal_power: Megawatts,
    },
}

impl std::fmt::Display for TriggerParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerParameters::Unavailability {
                min_duration_s,
                max_generated_power,
                min_available_power,
                min_wind_speed,
                plant_min_wind_speed,
                plant_min_available_ratio,
            } => {
                write!(
                    f,
                    "generated <= {:.3} MW, available >= {:.3} MW, wind >= {:.2} m/s for >= {}s",
                    max_generated_power.value(),
                    min_available_power.value(),
                    min_wind_speed,
                    min_duration_s
                )?;
                if let Some(ws) = plant_min_wind_speed {
                    write!(f, ", plant wind >= {ws:.2} m/s")?;
                }
                if let Some(ratio) = plant_min_available_ratio {
                    write!(f, ", plant available ratio >= {ratio:.3}")?;
                }
                Ok(())
            }
            TriggerParameters::Limitation {
                min_duration_s,
                nominal_power,
            } => write!(
                f,
                "setpoint < {:.3} MW for >= {}s",
                nominal_power.value(),
                min_duration_s
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedAnomaly {
    pub plant_id: AssetId,
    pub asset_id: AssetId,
    pub kind: AnomalyKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub trigger_parameters: TriggerParameters,
    #[serde(default)]
    pub related_incident_ids: Vec<IncidentId>,
}

impl DetectedAnomaly {
    pub fn duration_s(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    /// Undocumented anomalies become incident-shaped rows flagged as
    /// `source_anomaly` so they can be merged into the interval table.
    pub fn to_interval(&self, nominal_power: Megawatts) -> CollapsedInterval {
        CollapsedInterval {
            plant_id: self.plant_id,
            asset_id: self.asset_id,
            incident_id: IncidentId::new(0),
            origin_asset_id: self.asset_id,
            category: self.kind.category(),
            origin: Origin::Internal,
            severity_rank: 0,
            provenance_rank: 0,
            status: IncidentStatus::Open,
            start: self.start,
            end: self.end,
            hours: hours_between(self.start, self.end),
            ens_total: MegawattHours::ZERO,
            nominal_power,
            source_anomaly: true,
        }
    }
}
