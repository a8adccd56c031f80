//! Dense per-node columns over one plant's time grid.
//!
//! Every node of the plant subtree gets a slot. Slots are laid out in
//! pre-order so a parent's slot always precedes its children's, and
//! `levels` lists slots by depth for the level-by-level passes.

use ens_core::{
    AssetHierarchy, AttributionKey, EnergyCategory, IncidentId, Megawatts, NodeIdx,
};
use ens_ts::TimeGrid;

pub const CATEGORY_COUNT: usize = EnergyCategory::ALL.len();

/// Attribution state of one node: which incident wins each tick and the
/// category flags it set.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub incident_id: Vec<Option<IncidentId>>,
    pub severity_rank: Vec<u32>,
    pub provenance_rank: Vec<u32>,
    /// Indexed by [`EnergyCategory::index`].
    pub flags: [Vec<bool>; CATEGORY_COUNT],
}

impl Attribution {
    pub fn new(len: usize) -> Self {
        Self {
            incident_id: vec![None; len],
            severity_rank: vec![0; len],
            provenance_rank: vec![0; len],
            flags: std::array::from_fn(|_| vec![false; len]),
        }
    }

    pub fn key(&self, t: usize) -> AttributionKey {
        AttributionKey::new(self.severity_rank[t], self.provenance_rank[t])
    }

    pub fn is_active(&self, t: usize) -> bool {
        self.incident_id[t].is_some_and(|id| !id.is_null())
    }

    pub fn flag(&self, category: EnergyCategory, t: usize) -> bool {
        self.flags[category.index()][t]
    }

    pub fn limitation(&self, t: usize) -> bool {
        self.flag(EnergyCategory::LimitationExternal, t)
            || self.flag(EnergyCategory::LimitationInternal, t)
    }

    pub fn unavailability(&self, t: usize) -> bool {
        self.flag(EnergyCategory::UnavailabilityExternal, t)
            || self.flag(EnergyCategory::UnavailabilityInternal, t)
    }

    pub fn full_performance(&self, t: usize) -> bool {
        !(self.limitation(t) || self.unavailability(t))
    }

    /// Overwrite tick `t` with `other`'s state.
    pub fn copy_tick(&mut self, other: &Attribution, t: usize) {
        self.incident_id[t] = other.incident_id[t];
        self.severity_rank[t] = other.severity_rank[t];
        self.provenance_rank[t] = other.provenance_rank[t];
        for (mine, theirs) in self.flags.iter_mut().zip(other.flags.iter()) {
            mine[t] = theirs[t];
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeColumns {
    pub node: NodeIdx,
    pub nominal_power: Megawatts,
    /// `None` once the node's level has been pushed down and retired.
    pub attribution: Option<Attribution>,
    /// Energy not supplied per tick in MWh, one column per leaf category.
    pub energy: [Vec<f64>; CATEGORY_COUNT],
    /// MW available per tick; equals `associated_power` for non-leaf nodes.
    pub available_power: Vec<f64>,
    /// Sum of the children's available power. Empty for leaves.
    pub associated_power: Vec<f64>,
}

impl NodeColumns {
    fn new(node: NodeIdx, nominal_power: Megawatts, is_leaf: bool, len: usize) -> Self {
        Self {
            node,
            nominal_power,
            attribution: Some(Attribution::new(len)),
            energy: std::array::from_fn(|_| vec![0.0; len]),
            available_power: vec![0.0; len],
            associated_power: if is_leaf { Vec::new() } else { vec![0.0; len] },
        }
    }

    pub fn energy_at(&self, t: usize) -> f64 {
        self.energy.iter().map(|col| col[t]).sum()
    }

    pub fn energy_in(&self, category: EnergyCategory, t: usize) -> f64 {
        self.energy[category.index()][t]
    }

    pub fn limitation_energy_at(&self, t: usize) -> f64 {
        self.energy_in(EnergyCategory::LimitationExternal, t)
            + self.energy_in(EnergyCategory::LimitationInternal, t)
    }

    pub fn unavailability_energy_at(&self, t: usize) -> f64 {
        self.energy_in(EnergyCategory::UnavailabilityExternal, t)
            + self.energy_in(EnergyCategory::UnavailabilityInternal, t)
    }

    pub fn total_energy(&self) -> f64 {
        self.energy.iter().flat_map(|col| col.iter()).sum()
    }

    pub fn is_unavailable(&self, t: usize) -> bool {
        self.attribution
            .as_ref()
            .is_some_and(|a| a.unavailability(t))
    }
}

#[derive(Debug, Clone)]
pub struct IncidentGrid {
    plant: NodeIdx,
    time: TimeGrid,
    slots: Vec<NodeColumns>,
    slot_of: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    levels: Vec<Vec<usize>>,
}

impl IncidentGrid {
    pub fn new(hierarchy: &AssetHierarchy, plant: NodeIdx, time: TimeGrid) -> Self {
        let order = hierarchy.subtree(plant);
        let mut slot_of = vec![None; hierarchy.len()];
        for (slot, node) in order.iter().enumerate() {
            slot_of[node.index()] = Some(slot);
        }

        let len = time.len();
        let base_depth = hierarchy.depth(plant);
        let mut slots = Vec::with_capacity(order.len());
        let mut children = Vec::with_capacity(order.len());
        let mut levels: Vec<Vec<usize>> = Vec::new();
        for (slot, &node) in order.iter().enumerate() {
            slots.push(NodeColumns::new(
                node,
                hierarchy.node(node).nominal_power,
                hierarchy.is_leaf(node),
                len,
            ));
            children.push(
                hierarchy
                    .children(node)
                    .iter()
                    .filter_map(|c| slot_of[c.index()])
                    .collect(),
            );
            let level = hierarchy.depth(node) - base_depth;
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(slot);
        }

        Self {
            plant,
            time,
            slots,
            slot_of,
            children,
            levels,
        }
    }

    pub fn plant(&self) -> NodeIdx {
        self.plant
    }

    pub fn time(&self) -> &TimeGrid {
        &self.time
    }

    pub fn tick_count(&self) -> usize {
        self.time.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, node: NodeIdx) -> Option<usize> {
        self.slot_of.get(node.index()).copied().flatten()
    }

    pub fn columns(&self, slot: usize) -> &NodeColumns {
        &self.slots[slot]
    }

    pub fn columns_mut(&mut self, slot: usize) -> &mut NodeColumns {
        &mut self.slots[slot]
    }

    pub fn node_columns(&self, node: NodeIdx) -> Option<&NodeColumns> {
        self.slot(node).map(|s| &self.slots[s])
    }

    pub fn slots(&self) -> &[NodeColumns] {
        &self.slots
    }

    pub fn children(&self, slot: usize) -> &[usize] {
        &self.children[slot]
    }

    pub fn is_leaf(&self, slot: usize) -> bool {
        self.children[slot].is_empty()
    }

    /// Slots grouped by depth below the plant, plant level first.
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Slots that still carry attribution columns.
    pub fn attributed_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.slots.len()).filter(|&s| self.slots[s].attribution.is_some())
    }

    /// Recompute a leaf's available power from its nominal power and
    /// unavailability flag.
    pub fn refresh_leaf_availability(&mut self, slot: usize) {
        let columns = &mut self.slots[slot];
        let nominal = columns.nominal_power.value();
        let attribution = columns.attribution.as_ref();
        for (t, available) in columns.available_power.iter_mut().enumerate() {
            *available = if attribution.is_some_and(|a| a.unavailability(t)) {
                0.0
            } else {
                nominal
            };
        }
    }
}
