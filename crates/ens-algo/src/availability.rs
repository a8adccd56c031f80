//! Available power per tick, and its bottom-up aggregation.

use crate::grid::IncidentGrid;

/// Leaves: `nominal * !unavailable`. Non-leaf nodes: associated available
/// power is the sum of the children's available power, computed deepest
/// level first so every child is final before its parent reads it.
pub fn compute_availability(grid: &mut IncidentGrid) {
    let levels = grid.levels().to_vec();
    for level in levels.iter().rev() {
        for &slot in level {
            if grid.is_leaf(slot) {
                grid.refresh_leaf_availability(slot);
                continue;
            }
            let children = grid.children(slot).to_vec();
            let mut associated = vec![0.0; grid.tick_count()];
            for child in children {
                for (acc, value) in associated
                    .iter_mut()
                    .zip(grid.columns(child).available_power.iter())
                {
                    *acc += value;
                }
            }
            let columns = grid.columns_mut(slot);
            columns.available_power.clone_from(&associated);
            columns.associated_power = associated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populate::populate;
    use crate::test_utils::{incident, minute, two_grouping_plant};
    use chrono::Duration;
    use ens_core::{AssetId, Category, Diagnostics, Origin};
    use ens_ts::TimeGrid;

    #[test]
    fn aggregates_bottom_up() {
        let h = two_grouping_plant();
        let time = TimeGrid::new(minute(0), Duration::minutes(1), 4).unwrap();
        let mut grid = IncidentGrid::new(&h, h.plants()[0], time);
        let mut diag = Diagnostics::new();
        let incidents = vec![
            incident(1, 21, 1, 3, Category::Unavailability, Origin::Internal, 0.0),
            incident(2, 11, 0, 4, Category::Limitation, Origin::External, 0.0),
        ];
        populate(&mut grid, &h, &incidents, &mut diag).unwrap();
        compute_availability(&mut grid);

        let slot = |id: u32| grid.slot(h.resolve(AssetId::new(id)).unwrap()).unwrap();
        // A limitation does not reduce available power.
        assert_eq!(grid.columns(slot(11)).available_power, vec![2.0; 4]);
        assert_eq!(grid.columns(slot(21)).available_power, vec![3.0, 0.0, 0.0, 3.0]);
        assert_eq!(grid.columns(slot(20)).associated_power, vec![4.0, 1.0, 1.0, 4.0]);
        assert_eq!(grid.columns(slot(1)).associated_power, vec![8.0, 5.0, 5.0, 8.0]);
        assert_eq!(grid.columns(slot(1)).available_power, vec![8.0, 5.0, 5.0, 8.0]);
    }
}
