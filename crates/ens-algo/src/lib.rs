//! # ens-algo: attribution, allocation and anomaly passes
//!
//! The engine behind ENS attribution for wind plants. For each plant an
//! [`IncidentGrid`] holds dense per-node columns over a regular time grid and
//! the passes below run over it as full barriers:
//!
//! | Pass | Function | Direction |
//! |------|----------|-----------|
//! | Populate | [`populate`] | incidents onto the grid |
//! | Availability | [`compute_availability`] | bottom-up |
//! | Allocation | [`allocate_energy`] | top-down, level by level |
//! | Propagation | [`propagate_attribution`] | top-down, retiring parents |
//! | Collapse | [`collapse_grid`] | grid back to intervals |
//!
//! [`attribute`] runs the whole sequence for every plant (in parallel with
//! the `rayon` feature).
//!
//! A separate telemetry pass derives per-node [`signals`] and feeds the
//! [`anomaly`] detectors (unavailability latch and setpoint limitation), the
//! [`power_curve`] builder and the fleet-referenced [`estimate`] of incident
//! energy.
//!
//! ## Example
//!
//! ```ignore
//! use ens_algo::{attribute, AttributionOptions};
//! use ens_core::Diagnostics;
//!
//! let mut diag = Diagnostics::new();
//! let plants = attribute(&hierarchy, &incidents, &AttributionOptions::default(), &mut diag)?;
//! for plant in &plants {
//!     println!("{}: {} intervals", plant.plant_id, plant.intervals.len());
//! }
//! ```

pub mod allocation;
pub mod anomaly;
pub mod availability;
pub mod collapse;
pub mod estimate;
pub mod grid;
#[cfg(feature = "polars")]
pub mod io;
pub mod overlap;
pub mod pipeline;
pub mod populate;
pub mod power_curve;
pub mod propagation;
pub mod signals;
pub mod test_utils;

pub use allocation::{allocate_energy, AllocationSummary};
pub use anomaly::{
    detect_limitations, detect_unavailability, detect_unavailability_seeded, latch,
    latch_seeded, relate_incidents, LatchState, LimitationOptions, UnavailabilityThresholds,
};
pub use availability::compute_availability;
pub use collapse::{
    collapse_grid, detect_runs, sort_intervals, split_by_period, stitch_intervals,
};
pub use estimate::{apply_estimates, EnsEstimate, EnsEstimator, ReferenceMethod};
pub use grid::{Attribution, IncidentGrid, NodeColumns};
#[cfg(feature = "polars")]
pub use io::{grid_frame, write_grid};
pub use overlap::find_overlaps;
pub use pipeline::{
    attribute, attribute_plant, build_unit_curves, detect_all, detect_plant,
    detect_plant_seeded, estimate_all, partition_by_plant, partition_telemetry,
    validate_incidents, AttributionOptions, AttributionSummary, DetectionOptions,
    PlantAttribution, PlantDetection, UnitCurves,
};
pub use populate::{populate, PopulateSummary};
pub use power_curve::{CurveBin, DirectionSector, MeasuredCurve, PowerCurveBuilder};
pub use propagation::{propagate_attribution, PropagationSummary};
pub use signals::{derive_signals, NodeSignals, PlantSignals};
