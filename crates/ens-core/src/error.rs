//! Unified error types for the attribution engine.
//!
//! [`EnsError`] covers the structurally invalid inputs that abort a run.
//! Data-quality problems (unresolved assets, missing curves, overlaps) are
//! not errors: they are recorded in [`crate::Diagnostics`] and the run
//! continues.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::IncidentId;

#[derive(Error, Debug)]
pub enum EnsError {
    /// Time extents that cannot produce a grid (empty, inverted, bad step).
    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    /// An incident that violates a structural rule (negative energy, start after end).
    #[error("Invalid incident {id}: {reason}")]
    InvalidIncident { id: IncidentId, reason: String },

    /// Asset hierarchy errors (cycles, duplicate ids, dangling parents)
    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type EnsResult<T> = Result<T, EnsError>;

impl EnsError {
    pub fn inverted_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        EnsError::InvalidRange(format!("start {start} is after end {end}"))
    }

    pub fn invalid_incident(id: IncidentId, reason: impl Into<String>) -> Self {
        EnsError::InvalidIncident {
            id,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for EnsError {
    fn from(err: anyhow::Error) -> Self {
        EnsError::Other(err.to_string())
    }
}

impl From<String> for EnsError {
    fn from(s: String) -> Self {
        EnsError::Other(s)
    }
}

impl From<&str> for EnsError {
    fn from(s: &str) -> Self {
        EnsError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for EnsError {
    fn from(err: serde_json::Error) -> Self {
        EnsError::Parse(err.to_string())
    }
}

impl From<chrono::ParseError> for EnsError {
    fn from(err: chrono::ParseError) -> Self {
        EnsError::Parse(err.to_string())
    }
}
