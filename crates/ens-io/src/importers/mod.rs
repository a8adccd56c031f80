//! Readers for the collaborator tables.

mod assets;
mod curves;
mod incidents;
mod telemetry;

pub use assets::read_assets;
pub use curves::read_curves;
pub use incidents::read_incidents;
pub use telemetry::read_telemetry;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Deserialize every row of a headed CSV file. Rows are numbered from 1
/// after the header.
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{}: row {}", path.display(), i + 1)))
        .collect()
}
