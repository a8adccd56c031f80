//! Reference power curves: expected power as a function of wind speed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EnsError, EnsResult};
use crate::units::Megawatts;
use crate::AssetId;

/// Piecewise-linear curve over sorted wind speeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCurve {
    points: Vec<(f64, f64)>,
}

impl ReferenceCurve {
    /// Points are sorted by wind speed; duplicate speeds keep the last power.
    pub fn new(mut points: Vec<(f64, f64)>) -> EnsResult<Self> {
        if points.is_empty() {
            return Err(EnsError::Parse("power curve has no points".into()));
        }
        if points.iter().any(|(ws, p)| !ws.is_finite() || !p.is_finite()) {
            return Err(EnsError::Parse("power curve contains non-finite values".into()));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|next, prev| {
            if next.0 == prev.0 {
                prev.1 = next.1;
                true
            } else {
                false
            }
        });
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn wind_range(&self) -> (f64, f64) {
        (self.points[0].0, self.points[self.points.len() - 1].0)
    }

    /// Linear interpolation; speeds outside the curve's range give zero.
    pub fn interpolate(&self, wind_speed: f64) -> Megawatts {
        let (lo, hi) = self.wind_range();
        if !wind_speed.is_finite() || wind_speed < lo || wind_speed > hi {
            return Megawatts::ZERO;
        }
        let upper = self.points.partition_point(|(ws, _)| *ws < wind_speed);
        if upper == 0 {
            return Megawatts(self.points[0].1);
        }
        let (x1, y1) = self.points[upper];
        let (x0, y0) = self.points[upper - 1];
        if x1 == x0 {
            return Megawatts(y1);
        }
        Megawatts(y0 + (y1 - y0) * (wind_speed - x0) / (x1 - x0))
    }
}

/// Reference curves keyed by unit.
#[derive(Debug, Clone, Default)]
pub struct PowerCurveLibrary {
    curves: HashMap<AssetId, ReferenceCurve>,
}

impl PowerCurveLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: AssetId, curve: ReferenceCurve) {
        self.curves.insert(asset, curve);
    }

    pub fn get(&self, asset: AssetId) -> Option<&ReferenceCurve> {
        self.curves.get(&asset)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> ReferenceCurve {
        ReferenceCurve::new(vec![(12.0, 2.0), (3.0, 0.0), (8.0, 1.0)]).unwrap()
    }

    #[test]
    fn interpolates_between_points() {
        let c = curve();
        assert_eq!(c.interpolate(3.0), Megawatts(0.0));
        assert!((c.interpolate(5.5).value() - 0.5).abs() < 1e-12);
        assert!((c.interpolate(10.0).value() - 1.5).abs() < 1e-12);
        assert_eq!(c.interpolate(12.0), Megawatts(2.0));
    }

    #[test]
    fn outside_range_is_zero() {
        let c = curve();
        assert_eq!(c.interpolate(2.9), Megawatts::ZERO);
        assert_eq!(c.interpolate(25.0), Megawatts::ZERO);
        assert_eq!(c.interpolate(f64::NAN), Megawatts::ZERO);
    }

    #[test]
    fn rejects_empty_curve() {
        assert!(ReferenceCurve::new(vec![]).is_err());
    }

    #[test]
    fn duplicate_speeds_keep_last() {
        let c = ReferenceCurve::new(vec![(4.0, 1.0), (4.0, 2.0), (5.0, 3.0)]).unwrap();
        assert_eq!(c.points().len(), 2);
        assert_eq!(c.interpolate(4.0), Megawatts(2.0));
    }
}
