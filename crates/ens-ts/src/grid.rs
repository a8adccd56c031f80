use std::ops::Range;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ens_core::{EnsError, EnsResult};

/// Parse a step rule such as `"10s"`, `"1m"`, `"2h"` or `"1d"`. A bare
/// number is read as seconds.
pub fn parse_step(rule: &str) -> EnsResult<Duration> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(EnsError::Config("step rule cannot be empty".into()));
    }
    let (value_str, unit) = match trimmed.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => (&trimmed[..trimmed.len() - 1], Some(ch)),
        _ => (trimmed, None),
    };

    let value = value_str
        .trim()
        .parse::<i64>()
        .map_err(|e| EnsError::Config(format!("parsing step '{rule}': {e}")))?;
    let multiplier = match unit.unwrap_or('s') {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        other => {
            return Err(EnsError::Config(format!(
                "unsupported time unit '{other}'; expected s/m/h/d"
            )))
        }
    };
    if value <= 0 {
        return Err(EnsError::Config(format!("step '{rule}' must be positive")));
    }
    Ok(Duration::seconds(value * multiplier))
}

/// Start of the bucket `ts` falls into, for buckets aligned on multiples of `period`.
pub fn floor_bucket(ts: i64, period: i64) -> i64 {
    ts - ts.rem_euclid(period)
}

fn ceil_bucket(ts: i64, period: i64) -> i64 {
    let floor = floor_bucket(ts, period);
    if floor == ts {
        ts
    } else {
        floor + period
    }
}

fn from_millis(ms: i64) -> EnsResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| EnsError::InvalidRange(format!("timestamp {ms}ms is out of range")))
}

/// Regular, gapless sequence of timestamps `start + i * step` for `i < len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGrid {
    start: DateTime<Utc>,
    step: Duration,
    len: usize,
}

impl TimeGrid {
    pub fn new(start: DateTime<Utc>, step: Duration, len: usize) -> EnsResult<Self> {
        if step <= Duration::zero() {
            return Err(EnsError::InvalidRange(format!(
                "grid step must be positive, got {step}"
            )));
        }
        if len == 0 {
            return Err(EnsError::InvalidRange("grid has no ticks".into()));
        }
        Ok(Self { start, step, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Timestamp of the last tick.
    pub fn end(&self) -> DateTime<Utc> {
        self.timestamp(self.len - 1)
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn step_hours(&self) -> f64 {
        self.step.num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn timestamp(&self, index: usize) -> DateTime<Utc> {
        self.start + Duration::milliseconds(self.step.num_milliseconds() * index as i64)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.len).map(move |i| self.timestamp(i))
    }

    fn offset_ms(&self, t: DateTime<Utc>) -> i64 {
        (t - self.start).num_milliseconds()
    }

    /// Index of the tick at or before `t`. May fall outside the grid.
    pub fn floor_index(&self, t: DateTime<Utc>) -> i64 {
        self.offset_ms(t).div_euclid(self.step.num_milliseconds())
    }

    /// Index of the first tick at or after `t`. May fall outside the grid.
    pub fn ceil_index(&self, t: DateTime<Utc>) -> i64 {
        -(-self.offset_ms(t)).div_euclid(self.step.num_milliseconds())
    }

    /// Exact position of `t` on the grid, if it is a tick.
    pub fn index_of(&self, t: DateTime<Utc>) -> Option<usize> {
        let idx = self.floor_index(t);
        if idx < 0 || idx as usize >= self.len || self.timestamp(idx as usize) != t {
            return None;
        }
        Some(idx as usize)
    }

    /// Unclipped tick indices an interval `[start, end)` touches:
    /// `floor(start)..ceil(end)`.
    pub fn tick_span(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Range<i64> {
        self.floor_index(start)..self.ceil_index(end)
    }

    /// Clip an index span to the grid.
    pub fn clip(&self, span: Range<i64>) -> Range<usize> {
        let lo = span.start.clamp(0, self.len as i64) as usize;
        let hi = span.end.clamp(0, self.len as i64) as usize;
        lo..hi.max(lo)
    }

    /// Ticks `i` with `from <= timestamp(i) < to`.
    pub fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Range<usize> {
        self.clip(self.ceil_index(from)..self.ceil_index(to))
    }
}

/// Collects time extents and builds the grid covering all of them.
#[derive(Debug, Clone)]
pub struct TimeGridBuilder {
    step: Duration,
    extents: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TimeGridBuilder {
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            extents: Vec::new(),
        }
    }

    pub fn extent(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.extents.push((start, end));
        self
    }

    pub fn extents<I>(mut self, extents: I) -> Self
    where
        I: IntoIterator<Item = (DateTime<Utc>, DateTime<Utc>)>,
    {
        self.extents.extend(extents);
        self
    }

    /// Grid from `floor(min start)` to `ceil(max end)` inclusive, aligned
    /// to multiples of the step since the Unix epoch.
    pub fn build(&self) -> EnsResult<TimeGrid> {
        let step_ms = self.step.num_milliseconds();
        if step_ms <= 0 {
            return Err(EnsError::InvalidRange(format!(
                "grid step must be positive, got {}",
                self.step
            )));
        }
        if self.extents.is_empty() {
            return Err(EnsError::InvalidRange("no time extents to cover".into()));
        }
        for (start, end) in &self.extents {
            if start > end {
                return Err(EnsError::inverted_range(*start, *end));
            }
        }
        let min_start = self
            .extents
            .iter()
            .map(|(s, _)| s.timestamp_millis())
            .min()
            .unwrap_or_default();
        let max_end = self
            .extents
            .iter()
            .map(|(_, e)| e.timestamp_millis())
            .max()
            .unwrap_or_default();

        let lo = floor_bucket(min_start, step_ms);
        let hi = ceil_bucket(max_end, step_ms);
        let len = ((hi - lo) / step_ms) as usize + 1;
        tracing::debug!(ticks = len, step = %self.step, "built time grid");
        TimeGrid::new(from_millis(lo)?, self.step, len)
    }
}
