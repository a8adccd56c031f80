//! Plant / grouping / unit hierarchy.
//!
//! A plant is the root of its own tree. Groupings (feeders, circuits) sit
//! between the plant and its generating units, and may nest. Units are
//! always leaves. Several plants can share one [`AssetHierarchy`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EnsError, EnsResult};
use crate::topology;
use crate::units::Megawatts;
use crate::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Plant,
    Grouping,
    Unit,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Plant => "plant",
            AssetKind::Grouping => "grouping",
            AssetKind::Unit => "unit",
        }
    }
}

impl std::str::FromStr for AssetKind {
    type Err = EnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plant" | "park" => Ok(AssetKind::Plant),
            "grouping" | "group" | "feeder" | "circuit" => Ok(AssetKind::Grouping),
            "unit" | "wtg" | "turbine" => Ok(AssetKind::Unit),
            other => Err(EnsError::Parse(format!("unknown asset kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetNode {
    pub id: AssetId,
    pub name: String,
    pub parent_id: Option<AssetId>,
    pub kind: AssetKind,
    /// Rated power. Only units need a meaningful value; plants and groupings
    /// derive their available power from their children.
    pub nominal_power: Megawatts,
}

impl AssetNode {
    pub fn plant(id: AssetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: None,
            kind: AssetKind::Plant,
            nominal_power: Megawatts::ZERO,
        }
    }

    pub fn grouping(id: AssetId, name: impl Into<String>, parent: AssetId) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: Some(parent),
            kind: AssetKind::Grouping,
            nominal_power: Megawatts::ZERO,
        }
    }

    pub fn unit(id: AssetId, name: impl Into<String>, parent: AssetId, nominal: Megawatts) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: Some(parent),
            kind: AssetKind::Unit,
            nominal_power: nominal,
        }
    }

    pub fn with_nominal_power(mut self, nominal: Megawatts) -> Self {
        self.nominal_power = nominal;
        self
    }
}

/// Dense index of a node inside an [`AssetHierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdx(usize);

impl NodeIdx {
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Validated, immutable asset forest.
#[derive(Debug, Clone)]
pub struct AssetHierarchy {
    nodes: Vec<AssetNode>,
    index: HashMap<AssetId, NodeIdx>,
    parent: Vec<Option<NodeIdx>>,
    children: Vec<Vec<NodeIdx>>,
    depth: Vec<usize>,
    plant_of: Vec<NodeIdx>,
    plants: Vec<NodeIdx>,
}

impl AssetHierarchy {
    /// Build and validate the hierarchy. Node order is preserved, so
    /// `NodeIdx(i)` refers to `nodes[i]`.
    pub fn new(nodes: Vec<AssetNode>) -> EnsResult<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id, NodeIdx(i)).is_some() {
                return Err(EnsError::Hierarchy(format!(
                    "duplicate asset id {}",
                    node.id
                )));
            }
            if !node.nominal_power.is_finite() || node.nominal_power.value() < 0.0 {
                return Err(EnsError::Hierarchy(format!(
                    "asset {} has invalid nominal power {}",
                    node.id,
                    node.nominal_power.value()
                )));
            }
        }

        let mut parent = vec![None; nodes.len()];
        let mut children = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            match (node.kind, node.parent_id) {
                (AssetKind::Plant, Some(p)) => {
                    return Err(EnsError::Hierarchy(format!(
                        "plant {} cannot have a parent (found {})",
                        node.id, p
                    )))
                }
                (AssetKind::Plant, None) => {}
                (_, None) => {
                    return Err(EnsError::Hierarchy(format!(
                        "{} {} has no parent",
                        node.kind.as_str(),
                        node.id
                    )))
                }
                (_, Some(p)) => {
                    let p_idx = *index.get(&p).ok_or_else(|| {
                        EnsError::Hierarchy(format!(
                            "asset {} references missing parent {}",
                            node.id, p
                        ))
                    })?;
                    if nodes[p_idx.0].kind == AssetKind::Unit {
                        return Err(EnsError::Hierarchy(format!(
                            "unit {} cannot be the parent of {}",
                            p, node.id
                        )));
                    }
                    parent[i] = Some(p_idx);
                    children[p_idx.0].push(NodeIdx(i));
                }
            }
        }

        topology::ensure_acyclic(&children)?;

        let plants: Vec<NodeIdx> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.kind == AssetKind::Plant)
            .map(|(i, _)| NodeIdx(i))
            .collect();

        let mut depth = vec![0; nodes.len()];
        let mut plant_of = vec![NodeIdx(0); nodes.len()];
        for &plant in &plants {
            let mut stack = vec![plant];
            while let Some(idx) = stack.pop() {
                plant_of[idx.0] = plant;
                for &child in &children[idx.0] {
                    depth[child.0] = depth[idx.0] + 1;
                    stack.push(child);
                }
            }
        }

        Ok(Self {
            nodes,
            index,
            parent,
            children,
            depth,
            plant_of,
            plants,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIdx) -> &AssetNode {
        &self.nodes[idx.0]
    }

    pub fn nodes(&self) -> &[AssetNode] {
        &self.nodes
    }

    pub fn resolve(&self, id: AssetId) -> Option<NodeIdx> {
        self.index.get(&id).copied()
    }

    pub fn parent(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.parent[idx.0]
    }

    pub fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.children[idx.0]
    }

    pub fn is_leaf(&self, idx: NodeIdx) -> bool {
        self.children[idx.0].is_empty()
    }

    /// Distance from the plant root; plants are depth 0.
    pub fn depth(&self, idx: NodeIdx) -> usize {
        self.depth[idx.0]
    }

    pub fn plant_of(&self, idx: NodeIdx) -> NodeIdx {
        self.plant_of[idx.0]
    }

    pub fn plants(&self) -> &[NodeIdx] {
        &self.plants
    }

    /// Ancestors from the direct parent up to the plant.
    pub fn ancestors(&self, idx: NodeIdx) -> Ancestors<'_> {
        Ancestors {
            hierarchy: self,
            next: self.parent[idx.0],
        }
    }

    /// All nodes of a plant in pre-order (parents before children).
    pub fn subtree(&self, root: NodeIdx) -> Vec<NodeIdx> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            for &child in self.children[idx.0].iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Nodes of a subtree grouped by depth, shallowest level first.
    pub fn levels(&self, root: NodeIdx) -> Vec<Vec<NodeIdx>> {
        let base = self.depth[root.0];
        let mut levels: Vec<Vec<NodeIdx>> = Vec::new();
        for idx in self.subtree(root) {
            let level = self.depth[idx.0] - base;
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(idx);
        }
        levels
    }

    pub fn leaves(&self, root: NodeIdx) -> Vec<NodeIdx> {
        self.subtree(root)
            .into_iter()
            .filter(|&idx| self.is_leaf(idx))
            .collect()
    }

    pub fn stats(&self) -> topology::HierarchyStats {
        topology::hierarchy_stats(self)
    }
}

pub struct Ancestors<'a> {
    hierarchy: &'a AssetHierarchy,
    next: Option<NodeIdx>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeIdx;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.hierarchy.parent[current.0];
        Some(current)
    }
}
