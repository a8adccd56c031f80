use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ens", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Attribute incident energy down the asset hierarchy and collapse it into intervals
    Attribute(AttributeArgs),
    /// Detect undocumented unavailability and limitation from telemetry
    Detect(DetectArgs),
    /// Build measured power curves and direction roses per unit
    Curves(CurvesArgs),
    /// Estimate incident energy from the telemetry of the plant's best units
    Estimate(EstimateArgs),
    /// List incidents that overlap on the same asset
    Overlaps {
        /// Incident table (CSV)
        #[arg(long, value_hint = ValueHint::FilePath)]
        incidents: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Validate an asset table and print hierarchy statistics
    Hierarchy {
        /// Asset table (CSV)
        #[arg(long, value_hint = ValueHint::FilePath)]
        assets: PathBuf,
        /// Print JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Engine configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a configuration file with every default spelled out
    Init {
        /// Destination TOML file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Report every problem in a configuration file
    Validate {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
}

/// Inputs shared by the commands that read the asset model.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Asset table (CSV: id,name,parent_id,kind,nominal_power)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub assets: PathBuf,
    /// Incident table (CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub incidents: Option<PathBuf>,
    /// Telemetry (CSV or Parquet)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub telemetry: Option<PathBuf>,
    /// Reference power curves (CSV: asset_id,wind_speed,power)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub curves: Option<PathBuf>,
    /// Engine configuration (TOML)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

#[derive(Args, Debug)]
pub struct AttributeArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
    /// Output directory for intervals, anomalies and the run manifest
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub out: PathBuf,
    /// Grid step (e.g. 1m, 10m)
    #[arg(long)]
    pub step: Option<String>,
    /// Process the run in windows of this length (e.g. 1d)
    #[arg(long)]
    pub chunk: Option<String>,
    /// Cut output intervals at multiples of this period (e.g. 1d)
    #[arg(long)]
    pub split: Option<String>,
    /// Clip the run to start at this timestamp
    #[arg(long, requires = "to")]
    pub from: Option<String>,
    /// Clip the run to end at this timestamp
    #[arg(long, requires = "from")]
    pub to: Option<String>,
    /// Worker threads ("auto" uses every core)
    #[arg(long)]
    pub threads: Option<String>,
    /// Run the telemetry detectors as well (needs --telemetry)
    #[arg(long)]
    pub detect: bool,
    /// Append detected anomalies to the interval table
    #[arg(long, requires = "detect")]
    pub merge_anomalies: bool,
    /// Write the consolidated per-tick grid of every job
    #[arg(long)]
    pub export_grid: bool,
    /// Table format of the outputs
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
    /// Output table of anomalies (CSV or Parquet)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub out: PathBuf,
    /// Telemetry grid step (e.g. 10s)
    #[arg(long)]
    pub step: Option<String>,
    /// Shortest anomaly reported, in seconds
    #[arg(long)]
    pub min_duration: Option<i64>,
    /// Detect setpoint limitation on units as well as plants
    #[arg(long)]
    pub units: bool,
    /// Worker threads ("auto" uses every core)
    #[arg(long, default_value = "auto")]
    pub threads: String,
}

#[derive(Args, Debug)]
pub struct CurvesArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
    /// Output JSON with curves and direction roses
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub out: PathBuf,
    /// Also write the measured curves as a reference curve table (CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub reference_out: Option<PathBuf>,
    /// Wind speed bin width in m/s
    #[arg(long)]
    pub bin_width: Option<f64>,
    /// Drop bins with fewer samples
    #[arg(long)]
    pub min_count: Option<usize>,
    /// Number of direction sectors
    #[arg(long)]
    pub sectors: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
    /// Output table of estimates (CSV)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub out: PathBuf,
    /// Share of the plant's units forming the reference, in (0, 1]
    #[arg(long)]
    pub sample: Option<f64>,
    /// Use the quantile of the unit capacity factors instead of the top mean
    #[arg(long)]
    pub quantile: bool,
    /// Estimate external limitations as well
    #[arg(long)]
    pub include_external: bool,
    /// Only estimate incidents that are still open
    #[arg(long)]
    pub open_only: bool,
}
