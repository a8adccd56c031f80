//! # ens-core: shared model for wind-plant ENS attribution
//!
//! Provides the asset hierarchy (plant, groupings, units), the incident and
//! interval records that flow through the attribution pipeline, and the
//! error/diagnostics types every other crate reports through.
//!
//! ## Design
//!
//! The hierarchy is stored as an arena: every node gets a dense [`NodeIdx`]
//! and parent/children links are index vectors. Attribution grids in
//! `ens-algo` are keyed by the same indices so no per-tick lookup goes
//! through a hash map.
//!
//! ```
//! use ens_core::*;
//!
//! let hierarchy = AssetHierarchy::new(vec![
//!     AssetNode::plant(AssetId::new(1), "Plant"),
//!     AssetNode::unit(AssetId::new(2), "WTG01", AssetId::new(1), Megawatts(2.0)),
//! ])
//! .unwrap();
//!
//! let plant = hierarchy.resolve(AssetId::new(1)).unwrap();
//! assert_eq!(hierarchy.children(plant).len(), 1);
//! ```

pub mod asset;
pub mod curve;
pub mod diagnostics;
pub mod error;
pub mod incident;
pub mod telemetry;
pub mod topology;
pub mod units;

pub use asset::{AssetHierarchy, AssetKind, AssetNode, NodeIdx};
pub use curve::{PowerCurveLibrary, ReferenceCurve};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{EnsError, EnsResult};
pub use incident::{
    AnomalyKind, AttributionKey, Category, CollapsedInterval, DetectedAnomaly, EnergyCategory,
    IncidentStatus, Origin, ProvenanceOrder, RawIncident, ResponsibleParty, TriggerParameters,
};
pub use telemetry::TelemetryRecord;
pub use units::{Degrees, MegawattHours, Megawatts};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(u32);

impl AssetId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(u64);

impl IncidentId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Zero is never a real incident; run detection treats it like "no incident".
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
