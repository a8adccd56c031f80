use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use ens_core::{AssetId, TelemetryRecord};
use ens_ts::{parse_timestamp, read_frame};
use polars::prelude::{DataFrame, DataType};

fn column_f64(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let Ok(series) = df.column(column) else {
        return Ok(vec![None; df.height()]);
    };
    let series = series
        .cast(&DataType::Float64)
        .with_context(|| format!("column '{column}' must be numeric"))?;
    Ok(series.f64()?.into_iter().collect())
}

fn column_asset(df: &DataFrame) -> Result<Vec<Option<u32>>> {
    let series = df
        .column("asset_id")
        .context("missing 'asset_id' column in telemetry")?
        .cast(&DataType::UInt32)
        .context("'asset_id' column must be integers")?;
    Ok(series.u32()?.into_iter().collect())
}

fn column_timestamp(df: &DataFrame) -> Result<Vec<Option<DateTime<Utc>>>> {
    let series = df
        .column("timestamp")
        .context("missing 'timestamp' column in telemetry")?;
    if let Ok(text) = series.utf8() {
        return text
            .into_iter()
            .map(|v| v.map(parse_timestamp).transpose().map_err(anyhow::Error::from))
            .collect();
    }
    // Integer columns are epoch milliseconds.
    let millis = series
        .cast(&DataType::Int64)
        .context("'timestamp' column must be text or epoch milliseconds")?;
    let out = millis
        .i64()?
        .into_iter()
        .map(|v| v.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
        .collect();
    Ok(out)
}

/// Read telemetry (`timestamp, asset_id, active_power, available_power,
/// wind_speed, wind_direction, setpoint`) from CSV or parquet. Only
/// `timestamp` and `asset_id` are required; rows missing either are dropped.
pub fn read_telemetry(path: &Path) -> Result<Vec<TelemetryRecord>> {
    let df = read_frame(path)?;
    let timestamps = column_timestamp(&df)?;
    let assets = column_asset(&df)?;
    let active = column_f64(&df, "active_power")?;
    let available = column_f64(&df, "available_power")?;
    let wind_speed = column_f64(&df, "wind_speed")?;
    let wind_direction = column_f64(&df, "wind_direction")?;
    let setpoint = column_f64(&df, "setpoint")?;

    let mut records = Vec::with_capacity(df.height());
    let mut dropped = 0usize;
    for row in 0..df.height() {
        let (Some(timestamp), Some(asset)) = (timestamps[row], assets[row]) else {
            dropped += 1;
            continue;
        };
        records.push(TelemetryRecord {
            timestamp,
            asset_id: AssetId::new(asset),
            active_power: active[row],
            available_power: available[row],
            wind_speed: wind_speed[row],
            wind_direction: wind_direction[row],
            setpoint: setpoint[row],
        });
    }
    if dropped > 0 {
        tracing::warn!(dropped, "telemetry rows without timestamp or asset were dropped");
    }
    if records.is_empty() && df.height() > 0 {
        return Err(anyhow!("{}: no usable telemetry rows", path.display()));
    }
    tracing::debug!(rows = records.len(), "loaded telemetry");
    Ok(records)
}
