//! Measured power curves and direction roses from grid-aligned telemetry.

use std::collections::BTreeMap;

use ens_core::{AssetId, Degrees, EnsResult, ReferenceCurve};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveBin {
    /// Bin centre in m/s.
    pub wind_speed: f64,
    /// Mean generated power in MW.
    pub mean_power: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredCurve {
    pub asset_id: AssetId,
    pub bins: Vec<CurveBin>,
}

impl MeasuredCurve {
    pub fn to_reference(&self) -> EnsResult<ReferenceCurve> {
        ReferenceCurve::new(
            self.bins
                .iter()
                .map(|b| (b.wind_speed, b.mean_power))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionSector {
    pub sector: usize,
    pub center_deg: f64,
    pub mean_power: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerCurveBuilder {
    pub wind_bin_width: f64,
    pub min_count: usize,
    pub direction_sectors: usize,
}

impl Default for PowerCurveBuilder {
    fn default() -> Self {
        Self {
            wind_bin_width: 0.5,
            min_count: 0,
            direction_sectors: 16,
        }
    }
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl PowerCurveBuilder {
    fn samples<'a>(
        x: &'a [Option<f64>],
        power: &'a [Option<f64>],
        mask: Option<&'a [bool]>,
    ) -> impl Iterator<Item = (f64, f64)> + 'a {
        x.iter()
            .zip(power.iter())
            .enumerate()
            .filter(move |(t, _)| mask.map_or(true, |m| m.get(*t).copied().unwrap_or(false)))
            .filter_map(|(_, (x, p))| match (x, p) {
                (Some(x), Some(p)) if x.is_finite() && p.is_finite() => Some((*x, *p)),
                _ => None,
            })
    }

    /// Mean power per wind-speed bin. Bins are centred on multiples of the
    /// bin width; `mask` keeps only ticks flagged `true` (full performance).
    pub fn build(
        &self,
        asset_id: AssetId,
        wind_speed: &[Option<f64>],
        power: &[Option<f64>],
        mask: Option<&[bool]>,
    ) -> MeasuredCurve {
        let width = self.wind_bin_width;
        let mut bins: BTreeMap<i64, Accumulator> = BTreeMap::new();
        for (ws, p) in Self::samples(wind_speed, power, mask) {
            let key = (ws / width).round() as i64;
            let acc = bins.entry(key).or_default();
            acc.sum += p;
            acc.count += 1;
        }
        let bins = bins
            .into_iter()
            .filter(|(_, acc)| acc.count > 0 && acc.count >= self.min_count)
            .map(|(key, acc)| CurveBin {
                wind_speed: key as f64 * width,
                mean_power: acc.sum / acc.count as f64,
                count: acc.count,
            })
            .collect();
        MeasuredCurve { asset_id, bins }
    }

    /// Mean power per compass sector.
    pub fn build_rose(
        &self,
        wind_direction: &[Option<f64>],
        power: &[Option<f64>],
        mask: Option<&[bool]>,
    ) -> Vec<DirectionSector> {
        let sectors = self.direction_sectors.max(1);
        let mut acc: Vec<Accumulator> = (0..sectors).map(|_| Accumulator::default()).collect();
        for (dir, p) in Self::samples(wind_direction, power, mask) {
            let sector = Degrees(dir).sector(sectors);
            acc[sector].sum += p;
            acc[sector].count += 1;
        }
        let width = 360.0 / sectors as f64;
        acc.into_iter()
            .enumerate()
            .filter(|(_, a)| a.count > 0 && a.count >= self.min_count)
            .map(|(sector, a)| DirectionSector {
                sector,
                center_deg: sector as f64 * width,
                mean_power: a.sum / a.count as f64,
                count: a.count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_average_and_respect_mask() {
        let builder = PowerCurveBuilder::default();
        let ws = vec![Some(4.1), Some(3.9), Some(6.0), Some(6.1), None];
        let p = vec![Some(0.4), Some(0.2), Some(1.0), Some(5.0), Some(1.0)];
        let mask = vec![true, true, true, false, true];
        let curve = builder.build(AssetId::new(3), &ws, &p, Some(&mask));
        assert_eq!(curve.bins.len(), 2);
        assert_eq!(curve.bins[0].wind_speed, 4.0);
        assert!((curve.bins[0].mean_power - 0.3).abs() < 1e-12);
        assert_eq!(curve.bins[0].count, 2);
        assert_eq!(curve.bins[1].mean_power, 1.0);

        let reference = curve.to_reference().unwrap();
        assert!((reference.interpolate(5.0).value() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn min_count_drops_sparse_bins() {
        let builder = PowerCurveBuilder {
            min_count: 2,
            ..PowerCurveBuilder::default()
        };
        let ws = vec![Some(4.0), Some(4.0), Some(9.0)];
        let p = vec![Some(1.0), Some(1.0), Some(2.0)];
        let curve = builder.build(AssetId::new(1), &ws, &p, None);
        assert_eq!(curve.bins.len(), 1);
    }

    #[test]
    fn rose_groups_by_sector() {
        let builder = PowerCurveBuilder {
            direction_sectors: 4,
            ..PowerCurveBuilder::default()
        };
        let dir = vec![Some(350.0), Some(10.0), Some(180.0)];
        let p = vec![Some(1.0), Some(3.0), Some(2.0)];
        let rose = builder.build_rose(&dir, &p, None);
        assert_eq!(rose.len(), 2);
        assert_eq!(rose[0].sector, 0);
        assert_eq!(rose[0].mean_power, 2.0);
        assert_eq!(rose[1].center_deg, 180.0);
    }
}
