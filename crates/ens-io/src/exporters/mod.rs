//! Writers for collapsed intervals, detected anomalies and JSON summaries.

mod anomalies;
mod intervals;

pub use anomalies::{anomalies_frame, write_anomalies};
pub use intervals::{intervals_frame, write_intervals};

use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub(crate) fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Pretty-printed JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serializing JSON output")?;
    fs::write(path, json).with_context(|| format!("writing JSON to {}", path.display()))
}
