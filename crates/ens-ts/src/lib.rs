//! Time axis utilities: regular grids, step rules, resampling of irregular
//! telemetry onto a grid, chunk windows, and polars frame I/O.

pub mod frame;
pub mod grid;
pub mod resample;
pub mod time;
pub mod window;

pub use frame::{read_frame, write_frame};
pub use grid::{floor_bucket, parse_step, TimeGrid, TimeGridBuilder};
pub use resample::{backward_fill, forward_fill, missing_ticks, resample_onto, Aggregation};
pub use time::parse_timestamp;
pub use window::{chunk_windows, period_boundaries};
