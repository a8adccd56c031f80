pub mod attribute;
pub mod config;
pub mod curves;
pub mod detect;
pub mod estimate;
pub mod hierarchy;
pub mod overlaps;
pub mod util;
