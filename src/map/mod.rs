// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! In-memory representation of a single map tile.
//!
//! A [RoutingGraph] owns the nodes, the connection pool and the shared
//! [ConnectionData] arena. A [RoutingMap] couples it with the two
//! [DisturbanceStorage] overlays: a temporary one, rolled back after every route,
//! and a main one, persisting across routes.

mod builder;
mod connection;
mod node;
mod xml;

pub use builder::{LoadError, MapBuilder, MAX_CONNECTIONS_PER_NODE};
pub use connection::{
    sec_to_time_cost, time_cost_to_sec, Connection, ConnectionData, ExternalConnection,
    ExternalNode, NORMAL_SPEED_MS,
};
pub use node::{
    is_lower_level, is_upper_level, segment_id, toggle_direction, DestNode, EntryRestriction,
    Gradient, NodeState, RoutingNode, DIRECTION_BIT, UPPER_LEVEL_BIT,
};
pub use xml::{load_from_file, load_from_reader, FileFormat, ReadError};

use crate::config::Penalties;
use crate::disturbance::{Disturbance, DisturbanceStorage};
use crate::INFINITY;
use std::collections::{BTreeMap, BTreeSet};

/// Map ids at or above this value belong to overview (higher level) maps.
pub const OVERVIEW_MAP_BIT: u32 = 0x8000_0000;

/// Costs are never scaled past this value, so that sums of a few of them can't overflow.
pub const MAX_SCALED_COST: u32 = INFINITY / 256;

#[inline]
pub fn is_overview_map(map_id: u32) -> bool {
    map_id >= OVERVIEW_MAP_BIT
}

/// Error returned by [RoutingMap] operations naming a node by its item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("node {0:#x} does not exist on this map")]
    UnknownNode(u32),
}

/// Nodes, connections and metadata of a single map tile.
#[derive(Debug, Clone)]
pub struct RoutingGraph {
    pub(crate) map_id: u32,

    /// Sorted by item id.
    pub(crate) nodes: Vec<RoutingNode>,

    /// Forward ranges of all nodes come first, then the backward ranges.
    pub(crate) connections: Vec<Connection>,
    pub(crate) data: Vec<ConnectionData>,

    /// Sorted by item id.
    pub(crate) external_nodes: Vec<ExternalNode>,

    /// `(expanded node id, index into multi_connections)`, sorted.
    pub(crate) expansions: Vec<(u32, u32)>,
    pub(crate) multi_connections: Vec<(u32, u32)>,

    /// level → map id
    pub(crate) levels: BTreeMap<u32, u32>,

    /// `(lower map id, lower segment id)` → higher segment id
    pub(crate) to_higher: BTreeMap<(u32, u32), u32>,

    /// higher segment id → `(lower map id, lower segment id)`
    pub(crate) to_lower: BTreeMap<u32, (u32, u32)>,

    pub(crate) neighbours: BTreeSet<u32>,

    pub(crate) generation: u64,
    pub(crate) penalties: Penalties,
}

impl RoutingGraph {
    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn is_overview(&self) -> bool {
        is_overview_map(self.map_id)
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RoutingNode] {
        &self.nodes
    }

    pub fn node(&self, index: u32) -> Option<&RoutingNode> {
        self.nodes.get(index as usize)
    }

    /// Finds the index of the node with the provided item id.
    pub fn node_index(&self, item_id: u32) -> Option<u32> {
        self.nodes
            .binary_search_by_key(&item_id, |n| n.item_id)
            .ok()
            .map(|i| i as u32)
    }

    /// Retrieves a [RoutingNode] by its item id ("true node number").
    pub fn node_by_id(&self, item_id: u32) -> Option<&RoutingNode> {
        self.node_index(item_id).map(|i| &self.nodes[i as usize])
    }

    /// Item id of the node at the provided index, [INFINITY] for unknown indices.
    #[inline]
    pub fn item_id(&self, index: u32) -> u32 {
        self.node(index).map_or(INFINITY, |n| n.item_id)
    }

    #[inline]
    pub fn restriction(&self, index: u32) -> EntryRestriction {
        self.nodes[index as usize].restriction
    }

    /// Gets outgoing (`forward == true`) or incoming connections of a node.
    pub fn connections(&self, index: u32, forward: bool) -> &[Connection] {
        match self.nodes.get(index as usize) {
            Some(n) if forward => &self.connections[n.forward.as_range()],
            Some(n) => &self.connections[n.backward.as_range()],
            None => &[],
        }
    }

    /// Finds the connection between two nodes, given by their indices.
    pub fn connection_to(&self, from: u32, to: u32, forward: bool) -> Option<Connection> {
        self.connections(from, forward)
            .iter()
            .find(|c| c.node == to)
            .copied()
    }

    #[inline]
    pub fn data(&self, index: u32) -> &ConnectionData {
        &self.data[index as usize]
    }

    /// In-place access to shared connection data, for the disturbance overlays.
    #[inline]
    pub(crate) fn data_mut(&mut self, index: u32) -> &mut ConnectionData {
        &mut self.data[index as usize]
    }

    pub fn penalties(&self) -> &Penalties {
        &self.penalties
    }

    pub fn set_penalties(&mut self, penalties: Penalties) {
        self.penalties = penalties;
    }

    pub fn external_nodes(&self) -> &[ExternalNode] {
        &self.external_nodes
    }

    pub fn external_node(&self, item_id: u32) -> Option<&ExternalNode> {
        self.external_nodes
            .binary_search_by_key(&item_id, |n| n.item_id)
            .ok()
            .map(|i| &self.external_nodes[i])
    }

    // Transient state

    /// Returns the per-route state of a node; stale nodes read as [NodeState::UNSET].
    #[inline]
    pub fn state(&self, index: u32) -> NodeState {
        let n = &self.nodes[index as usize];
        if n.stamp == self.generation {
            n.state
        } else {
            NodeState::UNSET
        }
    }

    /// Returns the per-route state of a node for modification,
    /// first resetting it if it belongs to a previous generation.
    #[inline]
    pub fn state_mut(&mut self, index: u32) -> &mut NodeState {
        let generation = self.generation;
        let n = &mut self.nodes[index as usize];
        if n.stamp != generation {
            n.stamp = generation;
            n.state = NodeState::UNSET;
        }
        &mut n.state
    }

    /// Logically resets the transient state of every node.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            log::debug!("generation counter wrapped, clearing all nodes");
            for n in &mut self.nodes {
                n.stamp = 0;
                n.state = NodeState::UNSET;
            }
            self.generation = 1;
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Allocates scratch synthetic destination nodes.
    pub fn create_dest_nodes(&self, n: usize) -> Vec<DestNode> {
        vec![DestNode::UNSET; n]
    }

    // Hierarchy

    /// Returns the map id at the given level, if known.
    pub fn map_at_level(&self, level: u32) -> Option<u32> {
        self.levels.get(&level).copied()
    }

    /// Returns the level of this map, if present in the level table.
    pub fn level(&self) -> Option<u32> {
        self.levels
            .iter()
            .find(|&(_, &map_id)| map_id == self.map_id)
            .map(|(&level, _)| level)
    }

    pub fn neighbours(&self) -> impl Iterator<Item = u32> + '_ {
        self.neighbours.iter().copied()
    }

    /// Translates a node of a lower level map into a node of this (overview) map.
    /// The direction bit is preserved.
    pub fn translate_to_higher(&self, map_id: u32, node_id: u32) -> Option<u32> {
        self.to_higher
            .get(&(map_id, segment_id(node_id)))
            .map(|&higher| higher | (node_id & DIRECTION_BIT))
    }

    /// Translates a node of this (overview) map into `(map id, node id)` on the lower level.
    /// The direction bit is preserved.
    pub fn translate_to_lower(&self, node_id: u32) -> Option<(u32, u32)> {
        self.to_lower
            .get(&segment_id(node_id))
            .map(|&(map_id, lower)| (map_id, lower | (node_id & DIRECTION_BIT)))
    }

    /// Checks whether the connection between two nodes (given by item ids) is a multi-connection.
    pub fn is_multi_connection(&self, from_id: u32, to_id: u32) -> bool {
        self.multi_connections.contains(&(from_id, to_id))
    }

    /// Returns `(from, to)` item id pairs of every multi-connection
    /// which expands into a path going through the provided node.
    pub fn lookup_expanded_nodes(&self, node_id: u32) -> BTreeSet<(u32, u32)> {
        let start = self.expansions.partition_point(|&(n, _)| n < node_id);
        self.expansions[start..]
            .iter()
            .take_while(|&&(n, _)| n == node_id)
            .filter_map(|&(_, multi)| self.multi_connections.get(multi as usize).copied())
            .collect()
    }
}

/// A [RoutingGraph] together with its disturbance overlays.
#[derive(Debug, Clone)]
pub struct RoutingMap {
    pub(crate) graph: RoutingGraph,
    pub(crate) temp: DisturbanceStorage,
    pub(crate) main: DisturbanceStorage,
}

impl RoutingMap {
    pub(crate) fn new(graph: RoutingGraph) -> Self {
        Self {
            graph,
            temp: DisturbanceStorage::default(),
            main: DisturbanceStorage::default(),
        }
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut RoutingGraph {
        &mut self.graph
    }

    pub fn map_id(&self) -> u32 {
        self.graph.map_id
    }

    /// Returns the overlay holding temporary (`true`) or persistent changes.
    pub fn disturbances(&self, temporary: bool) -> &DisturbanceStorage {
        if temporary {
            &self.temp
        } else {
            &self.main
        }
    }

    fn split(&mut self, temporary: bool) -> (&mut RoutingGraph, &mut DisturbanceStorage) {
        if temporary {
            (&mut self.graph, &mut self.temp)
        } else {
            (&mut self.graph, &mut self.main)
        }
    }

    fn index_of(&self, node_id: u32) -> Result<u32, MapError> {
        self.graph
            .node_index(node_id)
            .ok_or(MapError::UnknownNode(node_id))
    }

    /// Blocks every outgoing connection of a node for all vehicles.
    pub fn avoid_node(&mut self, node_id: u32, temporary: bool) -> Result<(), MapError> {
        let index = self.index_of(node_id)?;
        let (g, storage) = self.split(temporary);
        storage.avoid_node(g, index);
        Ok(())
    }

    /// Replaces the data of the connection `from_id → to_id`.
    pub fn change_connection_costs(
        &mut self,
        from_id: u32,
        to_id: u32,
        temporary: bool,
        new: ConnectionData,
    ) -> Result<bool, MapError> {
        let from = self.index_of(from_id)?;
        let to = self.index_of(to_id)?;
        let (g, storage) = self.split(temporary);
        Ok(storage.change_connection_costs(g, from, to, new))
    }

    /// Multiplies costs A, B and C of every outgoing connection of a node,
    /// clamping at [MAX_SCALED_COST].
    pub fn change_node_cost(
        &mut self,
        node_id: u32,
        factor: f32,
        temporary: bool,
    ) -> Result<(), MapError> {
        let index = self.index_of(node_id)?;
        let (g, storage) = self.split(temporary);

        let outgoing = g.connections(index, true).to_vec();
        for conn in outgoing {
            let d = *g.data(conn.data);
            let scale = |c: u32| ((c as f64 * factor as f64) as u64).min(MAX_SCALED_COST as u64) as u32;
            let new = ConnectionData::new(scale(d.cost_a), scale(d.cost_b), scale(d.cost_c), d.vehicles);
            storage.change_connection_costs(g, index, conn.node, new);
        }
        Ok(())
    }

    /// Persistently multiplies the disturbed time of every outgoing connection
    /// of a node by `permille / 1000`, replacing any earlier persistent change.
    /// `permille == INFINITY` blocks the connections instead.
    pub fn multiply_node_cost(&mut self, node_id: u32, permille: u32) -> Result<(), MapError> {
        let index = self.index_of(node_id)?;
        let g = &mut self.graph;
        let storage = &mut self.main;

        let outgoing = g.connections(index, true).to_vec();
        for conn in outgoing {
            let to_id = g.item_id(conn.node);
            storage.roll_back_one(g, node_id, to_id);

            let d = *g.data(conn.data);
            let cost_c = if permille == INFINITY {
                INFINITY
            } else {
                ((d.cost_c as u64 * permille as u64) / 1000).min(MAX_SCALED_COST as u64) as u32
            };
            let new = ConnectionData::new(d.cost_a, d.cost_b, cost_c, d.vehicles);
            storage.change_connection_costs(g, index, conn.node, new);
        }
        Ok(())
    }

    /// Rolls back persistent changes of every outgoing connection of a node.
    pub fn restore_connections(&mut self, node_id: u32) -> Result<usize, MapError> {
        let index = self.index_of(node_id)?;
        let g = &mut self.graph;
        let storage = &mut self.main;

        let targets: Vec<u32> = g
            .connections(index, true)
            .iter()
            .map(|c| g.item_id(c.node))
            .collect();

        Ok(targets
            .into_iter()
            .filter(|&to_id| storage.roll_back_one(g, node_id, to_id))
            .count())
    }

    /// Rolls back every change of the selected overlay. Returns the number of restored connections.
    pub fn roll_back(&mut self, temporary: bool) -> usize {
        let (g, storage) = self.split(temporary);
        storage.roll_back_all(g)
    }

    /// Applies a batch of disturbances. Returns the number of applied records.
    pub fn add_disturbances(&mut self, list: &[Disturbance], temporary: bool) -> usize {
        let (g, storage) = self.split(temporary);
        storage.add_disturbances(g, list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::{ALL_VEHICLES, PASSENGER_CAR};

    //   1 ──10──▶ 2 ──10──▶ 3
    //   │                   ▲
    //   └────────30─────────┘
    fn triangle() -> RoutingMap {
        let mut b = MapBuilder::new(7);
        b.add_node(1, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(2, 0, 100, EntryRestriction::NoRestrictions)
            .add_node(3, 0, 200, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(2, 3, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(1, 3, ConnectionData::new(30, 30, 30, ALL_VEHICLES))
            .add_translation(7, 2, 0x4000_0002)
            .add_level(0, 7)
            .add_level(1, 0x8000_0001)
            .add_neighbour(8);
        b.build().unwrap()
    }

    #[test]
    fn lookup_by_item_id() {
        let m = triangle();
        let g = m.graph();
        assert_eq!(g.len(), 3);
        assert_eq!(g.node_index(2), Some(1));
        assert_eq!(g.node_index(4), None);
        assert!(g.node_by_id(4).is_none());
        assert_eq!(g.item_id(2), 3);
        assert_eq!(g.item_id(99), INFINITY);
    }

    #[test]
    fn forward_and_backward_share_data() {
        let mut m = triangle();
        let from = m.graph().node_index(1).unwrap();
        let to = m.graph().node_index(2).unwrap();
        let fwd = m.graph().connection_to(from, to, true).unwrap();
        let bwd = m.graph().connection_to(to, from, false).unwrap();
        assert_eq!(fwd.data, bwd.data);

        m.graph_mut().data_mut(fwd.data).cost_c = 55;
        assert_eq!(m.graph().data(bwd.data).cost_c, 55);
    }

    #[test]
    fn generation_reset() {
        let mut m = triangle();
        let g = m.graph_mut();
        g.state_mut(0).real_cost = 5;
        g.state_mut(0).visited = true;
        assert_eq!(g.state(0).real_cost, 5);
        assert_eq!(g.state(1), NodeState::UNSET);

        g.reset();
        assert_eq!(g.state(0), NodeState::UNSET);
        assert_eq!(g.state_mut(0).real_cost, INFINITY);
    }

    #[test]
    fn generation_wrap_clears_nodes() {
        let mut m = triangle();
        let g = m.graph_mut();
        g.generation = u64::MAX;
        g.state_mut(1).real_cost = 1;
        g.reset();
        assert_eq!(g.generation(), 1);
        assert_eq!(g.state(1), NodeState::UNSET);
    }

    #[test]
    fn hierarchy_metadata() {
        let m = triangle();
        let g = m.graph();
        assert!(!g.is_overview());
        assert!(is_overview_map(0x8000_0001));
        assert_eq!(g.map_at_level(1), Some(0x8000_0001));
        assert_eq!(g.level(), Some(0));
        assert_eq!(g.neighbours().collect::<Vec<_>>(), vec![8]);
        assert_eq!(g.translate_to_higher(7, 0x8000_0002), Some(0xC000_0002));
        assert_eq!(g.translate_to_higher(7, 3), None);
        assert_eq!(g.translate_to_lower(0x4000_0002), Some((7, 2)));
    }

    #[test]
    fn node_cost_operations() {
        let mut m = triangle();
        let one_to_three = {
            let g = m.graph();
            g.connection_to(0, 2, true).unwrap().data
        };

        m.change_node_cost(1, 2.0, true).unwrap();
        assert_eq!(*m.graph().data(one_to_three), ConnectionData::new(60, 60, 60, ALL_VEHICLES));
        assert_eq!(m.roll_back(true), 2);
        assert_eq!(*m.graph().data(one_to_three), ConnectionData::new(30, 30, 30, ALL_VEHICLES));

        m.multiply_node_cost(1, 1500).unwrap();
        m.multiply_node_cost(1, 2000).unwrap();
        assert_eq!(m.graph().data(one_to_three).cost_c, 60);
        assert_eq!(m.graph().data(one_to_three).cost_b, 30);

        m.multiply_node_cost(1, INFINITY).unwrap();
        assert!(m.graph().data(one_to_three).is_blocked());
        assert_eq!(m.graph().data(one_to_three).vehicle_restriction(true) & PASSENGER_CAR, 0);

        assert_eq!(m.restore_connections(1).unwrap(), 2);
        assert_eq!(m.graph().data(one_to_three).cost_c, 30);
        assert_eq!(m.restore_connections(42), Err(MapError::UnknownNode(42)));
    }
}
