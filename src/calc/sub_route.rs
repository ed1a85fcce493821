// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Result sink of the [RouteCalculator](super::RouteCalculator).
//!
//! A route crossing several maps is made of sub-routes, one per map, linked together
//! through [SubRoute::prev_sub_route_id]. Sub-routes which end on a boundary node
//! carry one [External] per connection leaving the map, and the calculator
//! routing the next map looks the previous sub-route up by the external node id.

use super::orig_dest::CostSums;

/// State marker inserted into node lists: the following nodes are driven.
pub const DRIVE_ITEM_ID: u32 = 0xf000_0001;

/// State marker inserted into node lists: the following nodes are walked.
pub const WALK_ITEM_ID: u32 = 0xf000_0002;

/// Marker of an additional cost (delay) on the next connection.
/// The lower 24 bits carry the delay in seconds.
pub const ADD_COST_STATE_MASK: u32 = 0xf100_0000;

const ADD_COST_SECONDS_MASK: u32 = 0x00ff_ffff;

/// Returns the additional-cost marker for a delay of the given seconds.
#[inline]
pub fn additional_cost_marker(seconds: u32) -> u32 {
    ADD_COST_STATE_MASK | seconds.min(ADD_COST_SECONDS_MASK)
}

/// Returns the seconds of an additional-cost marker, or `None` for other ids.
#[inline]
pub fn additional_cost_seconds(id: u32) -> Option<u32> {
    if id & !ADD_COST_SECONDS_MASK == ADD_COST_STATE_MASK {
        Some(id & ADD_COST_SECONDS_MASK)
    } else {
        None
    }
}

/// Returns true for ids which don't name nodes.
#[inline]
pub fn is_marker(id: u32) -> bool {
    id == DRIVE_ITEM_ID || id == WALK_ITEM_ID || additional_cost_seconds(id).is_some()
}

/// Kind of request a [SubRouteList] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListKind {
    /// Routing on a detailed map.
    #[default]
    LowerLevel,

    /// Routing a pedestrian on a detailed map.
    LowerLevelWalk,

    /// Routing on an overview map, between nodes given on the detailed maps.
    HigherLevel,

    HigherLevelForward,
    HigherLevelBackward,
    ProximityRequest,
    PublicTransportation,
}

/// A node where a sub-route leaves its map (or ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct External {
    pub map_id: u32,
    pub node_id: u32,

    /// Cost of the whole route up to and including this node.
    pub cost: u32,
    pub est_cost: u32,

    pub lat: i32,
    pub lon: i32,

    /// Cost sums of the whole route up to this node, if requested.
    pub sums: CostSums,
}

/// Path on a single map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubRoute {
    /// Assigned by [SubRouteList::add_sub_route].
    pub id: u32,
    pub prev_sub_route_id: Option<u32>,
    pub map_id: u32,

    /// Item ids of the traversed nodes in travel order, interleaved with
    /// [WALK_ITEM_ID] and [DRIVE_ITEM_ID] state markers and
    /// [additional cost markers](additional_cost_marker).
    pub nodes: Vec<u32>,

    pub externals: Vec<External>,
    pub start_offset: u16,
    pub end_offset: u16,
    pub forward: bool,

    /// Set on sub-routes which end at a destination.
    pub complete: bool,
    pub visited: bool,
}

impl SubRoute {
    pub fn new(map_id: u32) -> Self {
        Self {
            map_id,
            forward: true,
            ..Default::default()
        }
    }

    pub fn add_external(&mut self, external: External) {
        self.externals.push(external);
    }

    /// Cost of the cheapest external, [INFINITY](crate::INFINITY) if there are none.
    pub fn cost(&self) -> u32 {
        self.externals
            .iter()
            .map(|e| e.cost)
            .min()
            .unwrap_or(crate::INFINITY)
    }

    /// Item ids of the traversed nodes, without any markers.
    pub fn route_nodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes.iter().copied().filter(|&id| !is_marker(id))
    }

    /// True if `other` reaches every external of this sub-route at most as expensively.
    fn dominated_by(&self, other: &SubRoute) -> bool {
        !self.externals.is_empty()
            && self.externals.iter().all(|e| {
                other
                    .externals
                    .iter()
                    .any(|o| o.map_id == e.map_id && o.node_id == e.node_id && o.cost <= e.cost)
            })
    }
}

/// Ordered collection of [SubRoute]s, both the input and the output of a route computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRouteList {
    pub kind: ListKind,

    /// Direction of routing: from the origins (`true`) or from the destinations.
    pub forward: bool,

    /// Routes more expensive than this are not interesting anymore.
    pub cut_off: u32,

    sub_routes: Vec<SubRoute>,
    next_id: u32,
}

impl Default for SubRouteList {
    fn default() -> Self {
        Self::new(ListKind::default(), true)
    }
}

impl SubRouteList {
    pub fn new(kind: ListKind, forward: bool) -> Self {
        Self {
            kind,
            forward,
            cut_off: crate::INFINITY,
            sub_routes: Vec::new(),
            next_id: 0,
        }
    }

    /// Appends a sub-route, unless another one already reaches all of its externals
    /// at most as expensively. Returns the id of the added sub-route.
    pub fn add_sub_route(&mut self, mut sub_route: SubRoute) -> Option<u32> {
        if self.sub_routes.iter().any(|o| sub_route.dominated_by(o)) {
            log::debug!(
                "sub-route on map {:#x} with cost {} rejected, a cheaper one exists",
                sub_route.map_id,
                sub_route.cost()
            );
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        sub_route.id = id;
        self.sub_routes.push(sub_route);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.sub_routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_routes.is_empty()
    }

    pub fn sub_routes(&self) -> &[SubRoute] {
        &self.sub_routes
    }

    pub fn get(&self, id: u32) -> Option<&SubRoute> {
        self.sub_routes.iter().find(|s| s.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut SubRoute> {
        self.sub_routes.iter_mut().find(|s| s.id == id)
    }

    /// Finds the cheapest sub-route leading into the given node.
    pub fn find_external_node(&self, map_id: u32, node_id: u32) -> Option<(&SubRoute, &External)> {
        self.sub_routes
            .iter()
            .flat_map(|s| s.externals.iter().map(move |e| (s, e)))
            .filter(|(_, e)| e.map_id == map_id && e.node_id == node_id)
            .min_by_key(|(_, e)| e.cost)
    }

    /// Returns the cheapest sub-route which ends at a destination.
    pub fn cheapest_complete(&self) -> Option<&SubRoute> {
        self.sub_routes
            .iter()
            .filter(|s| s.complete)
            .min_by_key(|s| s.cost())
    }
}
