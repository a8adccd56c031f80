pub mod config;
pub mod job;
pub mod manifest;
pub mod runner;

pub use config::{AttributionConfig, BatchConfig, EngineConfig, GridConfig};
pub use job::{plan_jobs, run_window, BatchJobRecord, PlantJob};
pub use manifest::{load_batch_manifest, write_batch_manifest, BatchManifest};
pub use runner::{run_batch, stitch_anomalies, BatchInputs, BatchRunnerConfig, BatchSummary};
