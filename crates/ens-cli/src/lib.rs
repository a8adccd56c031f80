pub mod cli;

pub use cli::{
    AttributeArgs, Cli, Commands, ConfigCommands, CurvesArgs, DetectArgs, EstimateArgs, InputArgs,
    OutputFormat,
};
