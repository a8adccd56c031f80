//! Raw telemetry rows as delivered by the data collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AssetId;

/// One sample for one asset. Every measurement is optional; gaps are filled
/// during signal derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub asset_id: AssetId,
    /// Active power in MW; negative values are auxiliary consumption.
    pub active_power: Option<f64>,
    pub available_power: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    /// Active-power setpoint in MW.
    pub setpoint: Option<f64>,
}

impl TelemetryRecord {
    pub fn new(timestamp: DateTime<Utc>, asset_id: AssetId) -> Self {
        Self {
            timestamp,
            asset_id,
            active_power: None,
            available_power: None,
            wind_speed: None,
            wind_direction: None,
            setpoint: None,
        }
    }
}
