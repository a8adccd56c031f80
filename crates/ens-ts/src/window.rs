use chrono::{DateTime, Duration, TimeZone, Utc};
use ens_core::{EnsError, EnsResult};

use crate::grid::floor_bucket;

fn boundary_after(t: DateTime<Utc>, period_ms: i64) -> DateTime<Utc> {
    let floor = floor_bucket(t.timestamp_millis(), period_ms);
    Utc.timestamp_millis_opt(floor + period_ms)
        .single()
        .unwrap_or(t)
}

/// Period boundaries (multiples of `period` since the epoch) strictly
/// inside `(start, end)`.
pub fn period_boundaries(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period: Duration,
) -> Vec<DateTime<Utc>> {
    let period_ms = period.num_milliseconds();
    let mut out = Vec::new();
    if period_ms <= 0 || start >= end {
        return out;
    }
    let mut b = boundary_after(start, period_ms);
    while b < end {
        out.push(b);
        b += period;
    }
    out
}

/// Half-open windows `[a, b)` on period boundaries that together cover
/// `[start, end)`. The first window starts at `start`, the last ends at `end`.
pub fn chunk_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period: Duration,
) -> EnsResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    if start > end {
        return Err(EnsError::inverted_range(start, end));
    }
    if period <= Duration::zero() {
        return Err(EnsError::InvalidRange(format!(
            "chunk period must be positive, got {period}"
        )));
    }
    if start == end {
        return Ok(vec![(start, end)]);
    }
    let mut edges = vec![start];
    edges.extend(period_boundaries(start, end, period));
    edges.push(end);
    Ok(edges.windows(2).map(|w| (w[0], w[1])).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap()
    }

    #[test]
    fn boundaries_are_strictly_inside() {
        let b = period_boundaries(day(1, 0), day(3, 0), Duration::days(1));
        assert_eq!(b, vec![day(2, 0)]);
        let b = period_boundaries(day(1, 6), day(3, 6), Duration::days(1));
        assert_eq!(b, vec![day(2, 0), day(3, 0)]);
    }

    #[test]
    fn chunks_cover_the_range() {
        let chunks = chunk_windows(day(1, 12), day(3, 6), Duration::days(1)).unwrap();
        assert_eq!(
            chunks,
            vec![
                (day(1, 12), day(2, 0)),
                (day(2, 0), day(3, 0)),
                (day(3, 0), day(3, 6)),
            ]
        );
    }

    #[test]
    fn chunks_reject_inverted() {
        assert!(chunk_windows(day(2, 0), day(1, 0), Duration::days(1)).is_err());
        assert!(chunk_windows(day(1, 0), day(2, 0), Duration::zero()).is_err());
    }
}
