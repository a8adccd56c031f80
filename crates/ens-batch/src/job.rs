use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use ens_core::{AssetHierarchy, AssetId, EnsResult, NodeIdx};
use ens_ts::{chunk_windows, TimeGridBuilder};
use serde::{Deserialize, Serialize};

/// One plant over one chunk window `[start, end)`.
#[derive(Debug, Clone)]
pub struct PlantJob {
    pub job_id: String,
    pub plant: NodeIdx,
    pub plant_id: AssetId,
    pub chunk: usize,
    pub window: (DateTime<Utc>, DateTime<Utc>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobRecord {
    pub job_id: String,
    pub plant_id: AssetId,
    pub window_start: String,
    pub window_end: String,
    pub status: String,
    pub error: Option<String>,
    pub intervals: usize,
    pub anomalies: usize,
    #[serde(default)]
    pub diagnostics: BTreeMap<String, usize>,
}

/// Half-open window covering every extent on the `step` grid, or the
/// explicit `clip` when one is given. `None` when there is nothing to cover.
pub fn run_window<I>(
    extents: I,
    step: Duration,
    clip: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> EnsResult<Option<(DateTime<Utc>, DateTime<Utc>)>>
where
    I: IntoIterator<Item = (DateTime<Utc>, DateTime<Utc>)>,
{
    if clip.is_some() {
        return Ok(clip);
    }
    let extents: Vec<_> = extents.into_iter().collect();
    if extents.is_empty() {
        return Ok(None);
    }
    let grid = TimeGridBuilder::new(step).extents(extents).build()?;
    Ok(Some((grid.start(), grid.end() + step)))
}

/// Cross every plant with every chunk of `window`. Job ids read
/// `plant-<id>-<chunk>`.
pub fn plan_jobs(
    hierarchy: &AssetHierarchy,
    plants: &[NodeIdx],
    window: (DateTime<Utc>, DateTime<Utc>),
    chunk: Option<Duration>,
) -> EnsResult<Vec<PlantJob>> {
    let windows = match chunk {
        Some(period) => chunk_windows(window.0, window.1, period)?,
        None => vec![window],
    };
    let mut jobs = Vec::with_capacity(plants.len() * windows.len());
    for &plant in plants {
        let plant_id = hierarchy.node(plant).id;
        for (chunk, w) in windows.iter().enumerate() {
            jobs.push(PlantJob {
                job_id: format!("plant-{plant_id}-{chunk}"),
                plant,
                plant_id,
                chunk,
                window: *w,
            });
        }
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ens_core::{AssetNode, Megawatts};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn two_plants() -> AssetHierarchy {
        AssetHierarchy::new(vec![
            AssetNode::plant(AssetId::new(1), "A"),
            AssetNode::unit(AssetId::new(2), "A1", AssetId::new(1), Megawatts(1.0)),
            AssetNode::plant(AssetId::new(5), "B"),
            AssetNode::unit(AssetId::new(6), "B1", AssetId::new(5), Megawatts(1.0)),
        ])
        .unwrap()
    }

    #[test]
    fn window_covers_extents_on_the_grid() {
        let window = run_window(
            [(at(0, 1), at(0, 9)), (at(0, 30), at(0, 41))],
            Duration::minutes(10),
            None,
        )
        .unwrap();
        assert_eq!(window, Some((at(0, 0), at(1, 0))));
        assert_eq!(run_window([], Duration::minutes(1), None).unwrap(), None);
    }

    #[test]
    fn explicit_clip_wins() {
        let clip = Some((at(3, 0), at(4, 0)));
        let window = run_window([(at(0, 0), at(9, 0))], Duration::minutes(1), clip).unwrap();
        assert_eq!(window, clip);
    }

    #[test]
    fn jobs_cross_plants_and_chunks() {
        let hierarchy = two_plants();
        let jobs = plan_jobs(
            &hierarchy,
            hierarchy.plants(),
            (at(0, 0), at(3, 0)),
            Some(Duration::hours(1)),
        )
        .unwrap();
        assert_eq!(jobs.len(), 6);
        assert_eq!(jobs[0].job_id, "plant-1-0");
        assert_eq!(jobs[5].job_id, "plant-5-2");
        assert_eq!(jobs[1].window, (at(1, 0), at(2, 0)));
    }
}
