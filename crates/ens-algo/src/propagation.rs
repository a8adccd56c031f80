//! Top-down priority propagation of attribution state.

use serde::Serialize;

use crate::grid::{Attribution, IncidentGrid};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropagationSummary {
    /// (child, tick) pairs whose attribution was replaced by the parent's.
    pub overridden_ticks: usize,
    /// Non-leaf nodes whose attribution columns were dropped.
    pub retired_nodes: usize,
}

/// Push each parent's attribution into its children wherever the parent
/// carries an active incident and the child either has none or a strictly
/// weaker key.
///
/// Levels are processed plant first. Once a parent has been pushed down its
/// attribution columns are retired; only leaves keep theirs. Plants without
/// a grouping level go straight from plant to units because the pass walks
/// the actual parent/child links.
pub fn propagate_attribution(grid: &mut IncidentGrid) -> PropagationSummary {
    let mut summary = PropagationSummary::default();
    let levels = grid.levels().to_vec();
    let ticks = grid.tick_count();

    for level in &levels {
        for &slot in level {
            if grid.is_leaf(slot) {
                continue;
            }
            let Some(parent) = grid.columns_mut(slot).attribution.take() else {
                continue;
            };
            summary.retired_nodes += 1;

            for &child in grid.children(slot).to_vec().iter() {
                let child_is_leaf = grid.is_leaf(child);
                let columns = grid.columns_mut(child);
                let attribution = columns
                    .attribution
                    .get_or_insert_with(|| Attribution::new(ticks));
                let mut changed = 0usize;
                for t in 0..ticks {
                    if parent.is_active(t)
                        && (!attribution.is_active(t) || parent.key(t) > attribution.key(t))
                    {
                        attribution.copy_tick(&parent, t);
                        changed += 1;
                    }
                }
                summary.overridden_ticks += changed;
                if child_is_leaf && changed > 0 {
                    grid.refresh_leaf_availability(child);
                }
            }
        }
    }

    tracing::debug!(
        overridden = summary.overridden_ticks,
        retired = summary.retired_nodes,
        "propagated attribution"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populate::populate;
    use crate::test_utils::{flat_plant, incident, minute, two_grouping_plant};
    use chrono::Duration;
    use ens_core::{AssetId, Category, Diagnostics, IncidentId, Origin};
    use ens_ts::TimeGrid;

    #[test]
    fn parent_overrides_weaker_child_only() {
        let h = flat_plant();
        let time = TimeGrid::new(minute(0), Duration::minutes(1), 6).unwrap();
        let mut grid = IncidentGrid::new(&h, h.plants()[0], time);
        let mut diag = Diagnostics::new();
        let incidents = vec![
            incident(1, 1, 0, 6, Category::Unavailability, Origin::External, 0.0).with_ranks(2, 1),
            incident(2, 2, 0, 6, Category::Limitation, Origin::Internal, 0.0).with_ranks(3, 0),
            incident(3, 3, 0, 6, Category::Limitation, Origin::Internal, 0.0).with_ranks(2, 0),
        ];
        populate(&mut grid, &h, &incidents, &mut diag).unwrap();
        let summary = propagate_attribution(&mut grid);

        let slot = |id: u32| grid.slot(h.resolve(AssetId::new(id)).unwrap()).unwrap();
        let att = |id: u32| grid.columns(slot(id)).attribution.as_ref().unwrap();
        assert_eq!(att(2).incident_id[0], Some(IncidentId::new(2)));
        // Equal severity, higher provenance wins.
        assert_eq!(att(3).incident_id[0], Some(IncidentId::new(1)));
        assert!(att(3).unavailability(0) && !att(3).limitation(0));
        // No incident on unit 4: plant wins.
        assert_eq!(att(4).incident_id[5], Some(IncidentId::new(1)));
        assert_eq!(grid.columns(slot(4)).available_power, vec![0.0; 6]);

        assert!(grid.columns(slot(1)).attribution.is_none());
        assert_eq!(summary.retired_nodes, 1);
        assert_eq!(summary.overridden_ticks, 12);
    }

    #[test]
    fn equal_keys_do_not_override() {
        let h = flat_plant();
        let time = TimeGrid::new(minute(0), Duration::minutes(1), 2).unwrap();
        let mut grid = IncidentGrid::new(&h, h.plants()[0], time);
        let mut diag = Diagnostics::new();
        let incidents = vec![
            incident(1, 1, 0, 2, Category::Unavailability, Origin::External, 0.0),
            incident(2, 2, 0, 2, Category::Limitation, Origin::Internal, 0.0),
        ];
        populate(&mut grid, &h, &incidents, &mut diag).unwrap();
        propagate_attribution(&mut grid);
        let unit = grid.slot(h.resolve(AssetId::new(2)).unwrap()).unwrap();
        let att = grid.columns(unit).attribution.as_ref().unwrap();
        assert_eq!(att.incident_id[0], Some(IncidentId::new(2)));
    }

    #[test]
    fn two_levels_resolve_plant_first() {
        let h = two_grouping_plant();
        let time = TimeGrid::new(minute(0), Duration::minutes(1), 4).unwrap();
        let mut grid = IncidentGrid::new(&h, h.plants()[0], time);
        let mut diag = Diagnostics::new();
        let incidents = vec![
            incident(1, 1, 0, 2, Category::Unavailability, Origin::External, 0.0).with_ranks(5, 1),
            incident(2, 10, 0, 4, Category::Unavailability, Origin::Internal, 0.0).with_ranks(3, 1),
        ];
        populate(&mut grid, &h, &incidents, &mut diag).unwrap();
        propagate_attribution(&mut grid);

        let slot = |id: u32| grid.slot(h.resolve(AssetId::new(id)).unwrap()).unwrap();
        let att = grid.columns(slot(11)).attribution.as_ref().unwrap();
        assert_eq!(
            att.incident_id,
            vec![
                Some(IncidentId::new(1)),
                Some(IncidentId::new(1)),
                Some(IncidentId::new(2)),
                Some(IncidentId::new(2)),
            ]
        );
        let other = grid.columns(slot(21)).attribution.as_ref().unwrap();
        assert_eq!(other.incident_id[2], None);
        assert_eq!(grid.attributed_slots().count(), 4);
    }
}
