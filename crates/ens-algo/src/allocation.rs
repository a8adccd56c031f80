//! Top-down proportional allocation of energy not supplied.

use ens_core::diagnostics::categories;
use ens_core::{AssetHierarchy, Diagnostics};
use serde::Serialize;

use crate::grid::{IncidentGrid, CATEGORY_COUNT};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocationSummary {
    /// (node, tick) pairs whose energy was pushed to children.
    pub allocated_ticks: usize,
    /// (node, tick) pairs left at the parent because nothing below was available.
    pub skipped_ticks: usize,
}

/// Push each non-leaf node's energy down to its children, level by level,
/// in proportion to `child.available / parent.associated`. Each of the
/// leaf categories is allocated independently. When the parent's
/// associated power is zero the energy stays at the parent for that tick.
pub fn allocate_energy(
    grid: &mut IncidentGrid,
    hierarchy: &AssetHierarchy,
    diag: &mut Diagnostics,
) -> AllocationSummary {
    let mut summary = AllocationSummary::default();
    let levels = grid.levels().to_vec();

    for level in &levels {
        for &slot in level {
            if grid.is_leaf(slot) {
                continue;
            }
            let children = grid.children(slot).to_vec();
            let parent = grid.columns(slot);
            let energy = parent.energy.clone();
            let associated = parent.associated_power.clone();
            let node = parent.node;

            let mut skipped = 0usize;
            for t in 0..grid.tick_count() {
                let quantities: [f64; CATEGORY_COUNT] = std::array::from_fn(|c| energy[c][t]);
                if quantities.iter().all(|q| *q == 0.0) {
                    continue;
                }
                let base = associated[t];
                if base <= 0.0 {
                    skipped += 1;
                    continue;
                }
                summary.allocated_ticks += 1;
                for &child in &children {
                    let columns = grid.columns_mut(child);
                    let share = columns.available_power[t] / base;
                    for (c, q) in quantities.iter().enumerate() {
                        columns.energy[c][t] += q * share;
                    }
                }
            }

            if skipped > 0 {
                summary.skipped_ticks += skipped;
                let asset = hierarchy.node(node).id;
                diag.add_warning_with_entity(
                    categories::ALLOCATION_SKIPPED,
                    &format!(
                        "{skipped} tick(s) carry energy but no child is available; energy stays unallocated"
                    ),
                    &format!("asset {asset}"),
                );
            }
        }
    }

    tracing::debug!(
        allocated = summary.allocated_ticks,
        skipped = summary.skipped_ticks,
        "allocated energy"
    );
    summary
}
