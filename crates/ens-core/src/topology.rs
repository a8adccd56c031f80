//! Graph checks and summary statistics for asset hierarchies.

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::asset::{AssetHierarchy, AssetKind, NodeIdx};
use crate::error::{EnsError, EnsResult};
use crate::units::Megawatts;

/// Summary printed by `ens hierarchy`.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyStats {
    pub plants: usize,
    pub groupings: usize,
    pub units: usize,
    pub max_depth: usize,
    pub installed_power: Megawatts,
}

/// Parent -> child edges as a petgraph graph, one graph node per asset.
pub fn parent_child_graph(children: &[Vec<NodeIdx>]) -> DiGraph<usize, ()> {
    let mut graph = DiGraph::with_capacity(children.len(), children.len());
    for i in 0..children.len() {
        graph.add_node(i);
    }
    for (parent, kids) in children.iter().enumerate() {
        for child in kids {
            graph.add_edge(NodeIndex::new(parent), NodeIndex::new(child.index()), ());
        }
    }
    graph
}

pub fn ensure_acyclic(children: &[Vec<NodeIdx>]) -> EnsResult<()> {
    let graph = parent_child_graph(children);
    if is_cyclic_directed(&graph) {
        let culprit = toposort(&graph, None)
            .err()
            .map(|cycle| graph[cycle.node_id()])
            .unwrap_or_default();
        return Err(EnsError::Hierarchy(format!(
            "parent links form a cycle through node #{culprit}"
        )));
    }
    Ok(())
}

pub fn hierarchy_stats(hierarchy: &AssetHierarchy) -> HierarchyStats {
    let count = |kind: AssetKind| hierarchy.nodes().iter().filter(|n| n.kind == kind).count();
    let max_depth = (0..hierarchy.len())
        .map(|i| hierarchy.depth(NodeIdx::new(i)))
        .max()
        .unwrap_or(0);
    let installed_power = hierarchy
        .nodes()
        .iter()
        .filter(|n| n.kind == AssetKind::Unit)
        .map(|n| n.nominal_power)
        .sum();
    HierarchyStats {
        plants: count(AssetKind::Plant),
        groupings: count(AssetKind::Grouping),
        units: count(AssetKind::Unit),
        max_depth,
        installed_power,
    }
}
