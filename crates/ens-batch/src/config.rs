//! Engine configuration loaded from TOML. Every field has a default, so an
//! empty file is a valid configuration.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use ens_algo::{
    DetectionOptions, EnsEstimator, LimitationOptions, PowerCurveBuilder, UnavailabilityThresholds,
};
use ens_core::ProvenanceOrder;
use ens_ts::{parse_step, parse_timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub anomaly: UnavailabilityThresholds,
    #[serde(default)]
    pub limitation: LimitationOptions,
    #[serde(default)]
    pub curves: PowerCurveBuilder,
    #[serde(default)]
    pub estimate: EnsEstimator,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Attribution grid step rule.
    #[serde(default = "default_step")]
    pub step: String,
    /// Telemetry grid step rule for detection.
    #[serde(default = "default_detection_step")]
    pub detection_step: String,
    /// Chunk length rule; one window when absent.
    #[serde(default)]
    pub chunk: Option<String>,
}

fn default_step() -> String {
    "1m".to_string()
}

fn default_detection_step() -> String {
    "10s".to_string()
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            step: default_step(),
            detection_step: default_detection_step(),
            chunk: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributionConfig {
    #[serde(default)]
    pub provenance_order: ProvenanceOrder,
    /// `[start, end]` clip of the run.
    #[serde(default)]
    pub window: Option<(String, String)>,
    /// Cut output intervals at multiples of this period (e.g. `"1d"`).
    #[serde(default)]
    pub split: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker threads; 0 uses every core.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Append detected anomalies to the interval table.
    #[serde(default)]
    pub merge_anomalies: bool,
}

fn default_output_format() -> String {
    "csv".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            output_format: default_output_format(),
            merge_anomalies: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing engine configuration")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading engine configuration '{}'", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("in engine configuration '{}'", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing engine configuration")
    }

    /// Every problem in the configuration; empty when it is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, rule) in [
            ("grid.step", Some(&self.grid.step)),
            ("grid.detection_step", Some(&self.grid.detection_step)),
            ("grid.chunk", self.grid.chunk.as_ref()),
            ("attribution.split", self.attribution.split.as_ref()),
        ] {
            if let Some(Err(err)) = rule.map(|r| parse_step(r)) {
                problems.push(format!("{name}: {err}"));
            }
        }
        if let Some(Ok(chunk)) = self.grid.chunk.as_deref().map(parse_step) {
            for (name, rule) in [
                ("grid.step", &self.grid.step),
                ("grid.detection_step", &self.grid.detection_step),
            ] {
                let Ok(step) = parse_step(rule) else {
                    continue;
                };
                if chunk.num_milliseconds() % step.num_milliseconds() != 0 {
                    problems.push(format!(
                        "grid.chunk ({}) must be a multiple of {name} ({rule})",
                        self.grid.chunk.as_deref().unwrap_or_default(),
                    ));
                }
            }
        }
        if let Err(err) = self.window() {
            problems.push(format!("attribution.window: {err:#}"));
        }
        if self.anomaly.min_duration_s < 0 {
            problems.push("anomaly.min_duration_s must not be negative".to_string());
        }
        if self.limitation.min_duration_s < 0 {
            problems.push("limitation.min_duration_s must not be negative".to_string());
        }
        let width = self.curves.wind_bin_width;
        if width.is_nan() || width <= 0.0 {
            problems.push("curves.wind_bin_width must be positive".to_string());
        }
        if self.curves.direction_sectors == 0 {
            problems.push("curves.direction_sectors must be at least 1".to_string());
        }
        if let Err(err) = self.estimate.validate() {
            problems.push(err.to_string());
        }
        if !matches!(self.batch.output_format.as_str(), "csv" | "parquet") {
            problems.push(format!(
                "batch.output_format '{}' is not one of csv, parquet",
                self.batch.output_format
            ));
        }
        problems
    }

    pub fn step(&self) -> Result<Duration> {
        Ok(parse_step(&self.grid.step)?)
    }

    pub fn detection_step(&self) -> Result<Duration> {
        Ok(parse_step(&self.grid.detection_step)?)
    }

    pub fn chunk(&self) -> Result<Option<Duration>> {
        Ok(self.grid.chunk.as_deref().map(parse_step).transpose()?)
    }

    pub fn split(&self) -> Result<Option<Duration>> {
        Ok(self.attribution.split.as_deref().map(parse_step).transpose()?)
    }

    pub fn window(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let Some((start, end)) = &self.attribution.window else {
            return Ok(None);
        };
        let start = parse_timestamp(start)?;
        let end = parse_timestamp(end)?;
        if end <= start {
            return Err(anyhow!("window end {end} is not after start {start}"));
        }
        Ok(Some((start, end)))
    }

    /// Detection options for telemetry runs, minus the grid extent.
    pub fn detection_options(&self) -> Result<DetectionOptions> {
        Ok(DetectionOptions {
            step: self.detection_step()?,
            extent: None,
            unavailability: self.anomaly.clone(),
            limitation: self.limitation.clone(),
            detect_limitations: self.limitation.plant || self.limitation.units,
        })
    }
}
