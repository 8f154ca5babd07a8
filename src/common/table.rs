use std::collections::HashMap;

use super::node::{LpaNode, NodeId};

/// Owner of every node the planner ever generates.
///
/// Nodes live in a dense arena addressed by `NodeId` and are never freed
/// individually; the incremental search may revisit any generated state.
/// Lookup is two-level: a fixed outer array by cell, an inner map by timestep
/// (timesteps are sparse per cell).
#[derive(Debug, Clone)]
pub(crate) struct StateTable {
    nodes: Vec<LpaNode>,
    index: Vec<HashMap<usize, NodeId>>,
}

impl StateTable {
    pub(crate) fn new(map_size: usize) -> Self {
        StateTable {
            nodes: Vec::new(),
            index: vec![HashMap::new(); map_size],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn get(&self, loc_id: usize, timestep: usize) -> Option<NodeId> {
        self.index[loc_id].get(&timestep).copied()
    }

    pub(crate) fn insert(&mut self, node: LpaNode) -> NodeId {
        debug_assert!(
            self.get(node.loc_id, node.timestep).is_none(),
            "state ({}, {}) generated twice",
            node.loc_id,
            node.timestep
        );
        let id = NodeId::new(self.nodes.len());
        self.index[node.loc_id].insert(node.timestep, id);
        self.nodes.push(node);
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &LpaNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut LpaNode {
        &mut self.nodes[id.index()]
    }
}
