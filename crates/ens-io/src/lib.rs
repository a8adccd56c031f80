//! # ens-io: collaborator tables in and out
//!
//! The engine owns no file formats; this crate adapts the tables supplied by
//! the data collaborators into `ens-core` types and writes the results back.
//!
//! | Table | Reader / writer | Format |
//! |-------|-----------------|--------|
//! | assets | [`importers::read_assets`] | CSV |
//! | incidents | [`importers::read_incidents`] | CSV |
//! | power curves | [`importers::read_curves`] | CSV |
//! | telemetry | [`importers::read_telemetry`] | CSV or parquet (polars) |
//! | intervals | [`exporters::write_intervals`] | CSV or parquet |
//! | anomalies | [`exporters::write_anomalies`] | CSV or parquet |
//!
//! Readers fail on structurally broken rows with the row number in the
//! error context.

pub mod exporters;
pub mod importers;

pub use exporters::{anomalies_frame, intervals_frame, write_anomalies, write_intervals, write_json};
pub use importers::{read_assets, read_curves, read_incidents, read_telemetry};
