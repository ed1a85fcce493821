// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::connection::{Connection, ConnectionData, ExternalConnection, ExternalNode};
use super::node::{segment_id, ConnectionRange, EntryRestriction, RoutingNode};
use super::{RoutingGraph, RoutingMap};
use crate::config::Penalties;
use std::collections::{BTreeMap, BTreeSet};

/// Nodes with more connections (in either direction) are considered corrupt.
pub const MAX_CONNECTIONS_PER_NODE: usize = 45;

/// Structural error of map data, detected while building a [RoutingMap].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("node {0:#x} is defined more than once")]
    DuplicateNode(u32),

    #[error("reference to undefined node {0:#x}")]
    UnknownNode(u32),

    #[error("node {node:#x} has {count} connections")]
    TooManyConnections { node: u32, count: usize },

    #[error("expected {expected} nodes, got {actual}")]
    NodeCountMismatch { expected: usize, actual: usize },

    #[error("expansion references missing connection {0:#x} → {1:#x}")]
    UnknownExpansionTarget(u32, u32),
}

/// Collects the contents of a map tile and lays it out into a [RoutingMap].
///
/// Nodes and connections may be added in any order; everything is validated
/// by [MapBuilder::build].
#[derive(Debug, Default, Clone)]
pub struct MapBuilder {
    map_id: u32,
    expected_nodes: Option<usize>,
    nodes: Vec<RoutingNode>,
    connections: Vec<(u32, u32, ConnectionData)>,
    externals: Vec<(u32, ExternalConnection)>,
    expansions: Vec<(u32, u32, u32)>,
    levels: BTreeMap<u32, u32>,
    translations: Vec<(u32, u32, u32)>,
    neighbours: BTreeSet<u32>,
    penalties: Penalties,
}

impl MapBuilder {
    pub fn new(map_id: u32) -> Self {
        Self {
            map_id,
            ..Default::default()
        }
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn set_map_id(&mut self, map_id: u32) -> &mut Self {
        self.map_id = map_id;
        self
    }

    /// Declares the number of nodes the map must end up with.
    pub fn expect_nodes(&mut self, count: usize) -> &mut Self {
        self.expected_nodes = Some(count);
        self
    }

    pub fn set_penalties(&mut self, penalties: Penalties) -> &mut Self {
        self.penalties = penalties;
        self
    }

    pub fn add_node(
        &mut self,
        item_id: u32,
        lat: i32,
        lon: i32,
        restriction: EntryRestriction,
    ) -> &mut Self {
        self.nodes.push(RoutingNode::new(item_id, lat, lon, restriction));
        self
    }

    /// Adds a connection from one node to another. The data is shared by
    /// the forward representation on `from` and the backward one on `to`.
    pub fn add_connection(&mut self, from: u32, to: u32, data: ConnectionData) -> &mut Self {
        self.connections.push((from, to, data));
        self
    }

    /// Adds a connection from a boundary node to a node on another map.
    pub fn add_external_connection(
        &mut self,
        from: u32,
        map_id: u32,
        node_id: u32,
        data: ConnectionData,
    ) -> &mut Self {
        self.externals.push((
            from,
            ExternalConnection {
                map_id,
                node_id,
                data,
            },
        ));
        self
    }

    /// Declares that the multi-connection `multi_from → multi_to`
    /// expands into a path passing through `node`.
    pub fn add_expansion(&mut self, node: u32, multi_from: u32, multi_to: u32) -> &mut Self {
        self.expansions.push((node, multi_from, multi_to));
        self
    }

    pub fn add_level(&mut self, level: u32, map_id: u32) -> &mut Self {
        self.levels.insert(level, map_id);
        self
    }

    /// Declares that `lower_node` on `lower_map` corresponds to `higher_node` on this map.
    pub fn add_translation(&mut self, lower_map: u32, lower_node: u32, higher_node: u32) -> &mut Self {
        self.translations.push((lower_map, lower_node, higher_node));
        self
    }

    pub fn add_neighbour(&mut self, map_id: u32) -> &mut Self {
        self.neighbours.insert(map_id);
        self
    }

    /// Validates the collected data and lays it out into a [RoutingMap].
    pub fn build(self) -> Result<RoutingMap, LoadError> {
        let mut nodes = self.nodes;
        nodes.sort_by_key(|n| n.item_id);
        if let Some(w) = nodes.windows(2).find(|w| w[0].item_id == w[1].item_id) {
            return Err(LoadError::DuplicateNode(w[0].item_id));
        }
        if let Some(expected) = self.expected_nodes {
            if expected != nodes.len() {
                return Err(LoadError::NodeCountMismatch {
                    expected,
                    actual: nodes.len(),
                });
            }
        }

        // Resolve connection endpoints and group them per node
        let mut outgoing: Vec<Vec<Connection>> = vec![Vec::new(); nodes.len()];
        let mut incoming: Vec<Vec<Connection>> = vec![Vec::new(); nodes.len()];
        let mut data = Vec::with_capacity(self.connections.len());
        for (from_id, to_id, d) in self.connections {
            let from = index_of(&nodes, from_id)?;
            let to = index_of(&nodes, to_id)?;
            let data_idx = data.len() as u32;
            data.push(d);
            outgoing[from as usize].push(Connection {
                node: to,
                data: data_idx,
            });
            incoming[to as usize].push(Connection {
                node: from,
                data: data_idx,
            });
        }

        let mut connections = Vec::with_capacity(data.len() * 2);
        for (direction, groups) in [(true, &outgoing), (false, &incoming)] {
            for (i, group) in groups.iter().enumerate() {
                if group.len() > MAX_CONNECTIONS_PER_NODE {
                    return Err(LoadError::TooManyConnections {
                        node: nodes[i].item_id,
                        count: group.len(),
                    });
                }

                let range = ConnectionRange {
                    start: connections.len() as u32,
                    len: group.len() as u16,
                };
                if direction {
                    nodes[i].forward = range;
                } else {
                    nodes[i].backward = range;
                }
                connections.extend_from_slice(group);
            }
        }

        // External nodes
        let mut external_map: BTreeMap<u32, Vec<ExternalConnection>> = BTreeMap::new();
        for (from_id, ext) in self.externals {
            index_of(&nodes, from_id)?;
            external_map.entry(from_id).or_default().push(ext);
        }
        let external_nodes = external_map
            .into_iter()
            .map(|(item_id, connections)| {
                Ok(ExternalNode {
                    node: index_of(&nodes, item_id)?,
                    item_id,
                    connections,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        // Multi-connection expansion table
        let mut multi_connections: Vec<(u32, u32)> = Vec::new();
        let mut multi_index: BTreeMap<(u32, u32), u32> = BTreeMap::new();
        let mut expansions = Vec::with_capacity(self.expansions.len());
        for (node, multi_from, multi_to) in self.expansions {
            let from = index_of(&nodes, multi_from)
                .map_err(|_| LoadError::UnknownExpansionTarget(multi_from, multi_to))?;
            let exists = outgoing[from as usize]
                .iter()
                .any(|c| nodes[c.node as usize].item_id == multi_to);
            if !exists {
                return Err(LoadError::UnknownExpansionTarget(multi_from, multi_to));
            }

            let idx = *multi_index.entry((multi_from, multi_to)).or_insert_with(|| {
                multi_connections.push((multi_from, multi_to));
                multi_connections.len() as u32 - 1
            });
            expansions.push((node, idx));
        }
        expansions.sort_unstable();
        expansions.dedup();

        // Translation tables
        let mut to_higher = BTreeMap::new();
        let mut to_lower = BTreeMap::new();
        for (lower_map, lower_node, higher_node) in self.translations {
            to_higher.insert((lower_map, segment_id(lower_node)), segment_id(higher_node));
            to_lower.insert(segment_id(higher_node), (lower_map, segment_id(lower_node)));
        }

        log::debug!(
            "map {:#x}: {} nodes, {} connections, {} external nodes",
            self.map_id,
            nodes.len(),
            data.len(),
            external_nodes.len()
        );

        Ok(RoutingMap::new(RoutingGraph {
            map_id: self.map_id,
            nodes,
            connections,
            data,
            external_nodes,
            expansions,
            multi_connections,
            levels: self.levels,
            to_higher,
            to_lower,
            neighbours: self.neighbours,
            generation: 1,
            penalties: self.penalties,
        }))
    }
}

fn index_of(nodes: &[RoutingNode], id: u32) -> Result<u32, LoadError> {
    nodes
        .binary_search_by_key(&id, |n| n.item_id)
        .map(|i| i as u32)
        .map_err(|_| LoadError::UnknownNode(id))
}
