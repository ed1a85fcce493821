// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;

use super::dijkstra::{scale_cost, Mode};
use super::orig_dest::{offset_factor, CostSums, OrigDest, MAX_OFFSET};
use super::pref::{saturate, DriverPref, WALK_FACTOR};
use super::sub_route::{additional_cost_marker, is_marker, External, ListKind, SubRoute, SubRouteList, WALK_ITEM_ID};
use super::{Engine, RouteError};
use crate::map::{
    is_lower_level, is_upper_level, segment_id, time_cost_to_sec, toggle_direction, ConnectionData, ExternalNode,
    Gradient,
};
use crate::queue::PriorityQueue;
use crate::vehicle::PEDESTRIAN;
use crate::INFINITY;

/// Delay charged on blocked connections, in seconds.
const BLOCKED_DELAY_S: u32 = 3600;

/// Delay on a connection caused by disturbances, in seconds.
pub(crate) fn delay_seconds(d: &ConnectionData) -> u32 {
    if d.cost_c == d.cost_b {
        0
    } else if d.cost_c < d.cost_b || d.is_blocked() {
        BLOCKED_DELAY_S
    } else {
        time_cost_to_sec(d.cost_c - d.cost_b).max(1)
    }
}

/// Arguments shared by every read of a single route.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadArgs<'a> {
    pub incoming: &'a SubRouteList,
    pub pref: &'a DriverPref,
    pub forward: bool,
    pub calc_sums: bool,
}

impl Engine {
    /// Follows the gradients from `dest` back to where the search started.
    ///
    /// Returns the traversed item ids in travel order (with additional cost markers),
    /// the item id of the node the search started from and the raw cost sums of the path.
    pub(crate) fn fill_sub_route_from_destination(
        &self,
        dest: u32,
        forward: bool,
        calc_sums: bool,
    ) -> Result<(Vec<u32>, u32, CostSums), RouteError> {
        let g = self.graph();
        let mut nodes = Vec::new();
        let mut sums = CostSums::default();
        let mut cur = dest;

        for _ in 0..=g.len() {
            nodes.push(g.item_id(cur));
            match self.state(cur).gradient {
                None => {
                    let start = g.item_id(cur);
                    if forward {
                        nodes.reverse();
                    }
                    return Ok((nodes, start, sums));
                }

                Some(Gradient::Origin(origin)) => {
                    if origin != cur {
                        self.add_edge(&mut nodes, &mut sums, origin, cur, forward, calc_sums);
                        nodes.push(g.item_id(origin));
                    }
                    if forward {
                        nodes.reverse();
                    }
                    return Ok((nodes, g.item_id(origin), sums));
                }

                Some(Gradient::Node(prev)) => {
                    self.add_edge(&mut nodes, &mut sums, prev, cur, forward, calc_sums);
                    cur = prev;
                }
            }
        }

        log::error!("gradients starting at {:#x} form a cycle", g.item_id(dest));
        Err(RouteError::RouteCycle { node: g.item_id(dest) })
    }

    /// Accounts for the connection between `prev` (closer to the start of the search)
    /// and `cur`. The marker lands between both nodes once the list is in travel order.
    fn add_edge(&self, nodes: &mut Vec<u32>, sums: &mut CostSums, prev: u32, cur: u32, forward: bool, calc_sums: bool) {
        let g = self.graph();
        let conn = if forward {
            g.connection_to(prev, cur, true)
        } else {
            g.connection_to(cur, prev, true)
        };

        let Some(conn) = conn else {
            log::warn!(
                "no connection between {:#x} and {:#x} on the route",
                g.item_id(prev),
                g.item_id(cur)
            );
            return;
        };

        let data = g.data(conn.data);
        match delay_seconds(data) {
            0 => {}
            delay => nodes.push(additional_cost_marker(delay)),
        }
        if calc_sums {
            sums.add(CostSums::of_connection(data));
        }
    }

    /// Reads the path to `dest` into a new [SubRoute] of `result`.
    ///
    /// With an `external` node, the sub-route leads into the neighbouring maps, with one
    /// [External] per external connection. Otherwise it ends at the destination, whose
    /// costs are increased by `extra`. Returns the id of the added sub-route.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn read_result_from_destination(
        &self,
        args: ReadArgs,
        result: &mut SubRouteList,
        dest: u32,
        external: Option<&ExternalNode>,
        end_offset: u16,
        extra: u32,
        insert_state: bool,
    ) -> Result<Option<u32>, RouteError> {
        let g = self.graph();
        let (nodes, start_id, mut sums) = self.fill_sub_route_from_destination(dest, args.forward, args.calc_sums)?;

        let mut sub_route = SubRoute::new(g.map_id());
        sub_route.nodes = nodes;
        sub_route.end_offset = end_offset;
        sub_route.forward = args.forward;

        match args.incoming.find_external_node(g.map_id(), start_id) {
            Some((prev, prev_external)) => {
                sub_route.prev_sub_route_id = Some(prev.id);
                if args.calc_sums {
                    sums.add(prev_external.sums);
                }
            }
            None if self.original => {}
            None => {
                log::error!(
                    "no sub-route leads into {:#x}, the route to {:#x} is dropped",
                    start_id,
                    g.item_id(dest)
                );
                return Ok(None);
            }
        }

        let s = self.state(dest);
        let (lat, lon) = self.coords(dest);
        match external {
            Some(ext) => {
                let pref = args.pref;
                for c in &ext.connections {
                    let d = &c.data;
                    let cost = saturate(
                        s.real_cost as u64
                            + pref.cost_a as u64 * d.cost_a as u64
                            + pref.cost_b as u64 * d.cost_b as u64
                            + pref.cost_c as u64 * d.cost_c as u64
                            + pref.cost_d as u64 * d.cost_d() as u64,
                    );

                    let to_lower = is_upper_level(ext.item_id)
                        && is_lower_level(c.node_id)
                        && matches!(
                            args.incoming.kind,
                            ListKind::HigherLevelForward | ListKind::HigherLevelBackward
                        );
                    if cost <= self.cut_off && !to_lower {
                        sub_route.add_external(External {
                            map_id: c.map_id,
                            node_id: c.node_id,
                            cost,
                            est_cost: cost,
                            lat,
                            lon,
                            sums,
                        });
                    }
                }

                if sub_route.externals.is_empty() {
                    return Ok(None);
                }
            }

            None => {
                sub_route.add_external(External {
                    map_id: g.map_id(),
                    node_id: g.item_id(dest),
                    cost: s.real_cost.saturating_add(extra),
                    est_cost: s.est_cost.saturating_add(extra),
                    lat,
                    lon,
                    sums,
                });
                sub_route.complete = true;
                sub_route.visited = true;
            }
        }

        if insert_state {
            self.insert_state_element(&mut sub_route.nodes, args.pref, args.forward);
        }
        Ok(result.add_sub_route(sub_route))
    }

    /// Marks where the traveller has to leave the vehicle, with a [WALK_ITEM_ID].
    ///
    /// Pedestrians walk the whole way. Others walk the tail of the route which
    /// couldn't be driven: restricted nodes, forbidden connections and nodes
    /// reached on foot.
    pub(crate) fn insert_state_element(&self, nodes: &mut Vec<u32>, pref: &DriverPref, forward: bool) {
        if !pref.is_driving() {
            nodes.insert(0, WALK_ITEM_ID);
            return;
        }

        let g = self.graph();
        let positions: Vec<usize> = (0..nodes.len()).filter(|&i| !is_marker(nodes[i])).collect();
        let mut walk_from = None;

        for pair in positions.windows(2).rev() {
            let (Some(n1), Some(n2)) = (g.node_index(nodes[pair[0]]), g.node_index(nodes[pair[1]])) else {
                break;
            };
            let Some(conn) = g.connection_to(n1, n2, true) else {
                break;
            };

            // Nodes labelled by the search are visited only when reached driving
            let labelled = if forward { n2 } else { n1 };
            let walked =
                g.restriction(n2).not_valid() || !pref.allows(g.data(conn.data)) || !self.state(labelled).visited;
            if !walked {
                break;
            }
            walk_from = Some(pair[1]);
        }

        if let Some(pos) = walk_from {
            let pos = if pos == 1 { 0 } else { pos };
            nodes.insert(pos, WALK_ITEM_ID);
        }
    }

    /// Reads the cheapest route to the `sought` nodes.
    ///
    /// The nodes found driving are read first. On detailed maps, the sought nodes
    /// which can't be driven to are reached on foot from the unused restricted nodes,
    /// and the cheapest of them is read as well.
    pub(crate) fn read_result(
        &mut self,
        sought: &[OrigDest],
        args: ReadArgs,
        result: &mut SubRouteList,
        read_to_external: bool,
    ) -> Result<(), RouteError> {
        let pref = args.pref;
        let forward = args.forward;
        let underview = !self.graph().is_overview();
        let half = sought.len() / 2;

        if underview {
            self.queue.reset();
            if self.reached_segments(sought) < half {
                for k in 0..self.invalid_nodes.len() {
                    let (data, node) = self.invalid_nodes[k];
                    let Some(data) = data else { continue };
                    if self.state(node).visited || !self.graph().restriction(node).has_no_throughfare() {
                        continue;
                    }
                    if pref.allows(self.graph().data(data)) {
                        self.state_mut(node).visited = true;
                        self.enqueue_main(node);
                    }
                }
            }

            if !self.queue.is_empty() {
                log::debug!("continuing through {} no-throughfare nodes", self.queue.len());
                let mode = Mode {
                    throughfare_ok: true,
                    ..Default::default()
                };
                self.relax(pref, sought, forward, mode);
            }
        }

        // Sought nodes reached driving
        let mut valid_read: BTreeSet<u32> = BTreeSet::new();
        let mut best: Option<(usize, u32, u32)> = None;
        for (k, od) in sought.iter().enumerate() {
            let Some(i) = od.index else { continue };
            let s = self.state(i);
            if s.real_cost == INFINITY || !s.visited {
                continue;
            }

            valid_read.insert(od.item_id);
            let extra = self.calc_offset_cost(sought, i, pref, forward);
            let total = s.real_cost.saturating_add(extra);
            if best.map_or(true, |(_, _, min)| total < min) {
                best = Some((k, extra, total));
            }
        }

        if let Some((k, extra, total)) = best {
            self.cut_off = self.cut_off.min(total);
            let od = &sought[k];
            if let Some(i) = od.index {
                self.read_result_from_destination(args, result, i, None, od.offset, extra, underview)?;
            }
        }

        if !underview {
            return Ok(());
        }

        // Sought nodes reached on foot
        let car_dests: BTreeSet<u32> = sought
            .iter()
            .filter(|od| od.index.is_some_and(|i| self.state(i).visited))
            .map(|od| od.item_id)
            .collect();

        if self.reached_segments(sought) < half {
            for (_, node) in std::mem::take(&mut self.invalid_nodes) {
                let item = self.graph().item_id(node);
                if !self.state(node).visited
                    && !car_dests.contains(&item)
                    && !car_dests.contains(&toggle_direction(item))
                {
                    self.enqueue_normal(node);
                }
            }
            self.expand_nodes_result(pref, forward);
        }

        for od in sought {
            let Some(i) = od.index else { continue };
            if self.state(i).est_cost == INFINITY {
                continue;
            }
            let min = self.min_cost(i, pref);
            if min == INFINITY {
                continue;
            }

            let mut add = scale_cost(min, offset_factor(od.offset));
            if let Some(gradient) = self.state(i).gradient {
                let walked = self
                    .graph()
                    .connection_to(i, gradient.index(), !forward)
                    .is_some_and(|c| self.graph().restriction(i).not_valid() || !pref.allows(self.graph().data(c.data)));
                if walked {
                    add = match self.min_cost_walk(i, pref) {
                        INFINITY => 0,
                        walk => scale_cost(walk, offset_factor(od.offset)),
                    };
                }
            }

            let s = self.state_mut(i);
            s.est_cost = s.est_cost.saturating_add(add);
            s.real_cost = s.real_cost.saturating_add(add);
        }

        let cheapest = |engine: &Engine, only_driven: bool| {
            sought
                .iter()
                .enumerate()
                .filter(|(_, od)| !valid_read.contains(&od.item_id) && !valid_read.contains(&toggle_direction(od.item_id)))
                .filter(|(_, od)| !only_driven || car_dests.contains(&od.item_id))
                .filter_map(|(k, od)| od.index.map(|i| (k, i, engine.state(i).est_cost)))
                .filter(|&(_, _, est)| est != INFINITY)
                .min_by_key(|&(_, _, est)| est)
        };

        let best = match cheapest(self, true) {
            Some(b) => Some((b, true)),
            None => cheapest(self, false).map(|b| (b, false)),
        };
        if let Some(((k, i, est), driven)) = best {
            if driven {
                self.state_mut(i).visited = true;
            }
            self.cut_off = self.cut_off.min(est);

            let od = &sought[k];
            if let Some(id) = self.read_result_from_destination(args, result, i, None, od.offset, 0, false)? {
                let s = self.state(i);
                let (lat, lon) = self.coords(i);
                let externals: Vec<External> = self
                    .graph()
                    .external_node(od.item_id)
                    .map(|ext| {
                        ext.connections
                            .iter()
                            .map(|c| External {
                                map_id: c.map_id,
                                node_id: c.node_id,
                                cost: s.real_cost,
                                est_cost: s.real_cost,
                                lat,
                                lon,
                                sums: CostSums::default(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                if let Some(sub_route) = result.get_mut(id) {
                    sub_route.externals.extend(externals);
                    self.insert_state_element(&mut sub_route.nodes, pref, forward);
                }
            }
        }

        if read_to_external {
            for k in 0..self.graph().external_nodes().len() {
                let ext = &self.graph().external_nodes()[k];
                if self.state(ext.node).est_cost != INFINITY {
                    self.read_result_from_destination(args, result, ext.node, Some(ext), 0, 0, false)?;
                }
            }
        }

        Ok(())
    }

    /// Number of distinct segments of the sought nodes which were reached driving.
    fn reached_segments(&self, sought: &[OrigDest]) -> usize {
        sought
            .iter()
            .filter_map(|od| od.index)
            .filter(|&i| {
                let s = self.state(i);
                s.real_cost != INFINITY && s.visited
            })
            .map(|i| segment_id(self.graph().item_id(i)))
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Walks from the nodes in the normal queue to everything not yet reached.
    fn expand_nodes_result(&mut self, pref: &DriverPref, forward: bool) {
        let using_cost_c = pref.using_cost_c();

        while let Some(cur) = super::init::pop_node(&mut self.normal) {
            let cur_state = self.state(cur);
            let mut k = 0;
            while let Some(c) = self.conn(cur, forward, k) {
                k += 1;
                let next = c.node;
                let data = *self.graph().data(c.data);
                let walk = pref.connection_cost_walk(&data, self.penalties());
                if walk > self.cut_off || self.state(next).visited {
                    continue;
                }

                let can_walk = data.vehicle_restriction(using_cost_c) & PEDESTRIAN != 0;
                let can_drive = pref.allows(&data);
                let restriction = self.graph().restriction(next);
                let cost = cur_state.est_cost.saturating_add(walk);
                if cost >= self.state(next).real_cost {
                    continue;
                }

                if (can_walk && (!can_drive || restriction.not_valid())) || cur_state.visited {
                    self.set_reached(next, cost, Gradient::Node(cur));
                    self.enqueue_normal(next);
                } else if restriction.has_no_throughfare() || (can_drive && can_walk && restriction.not_valid()) {
                    self.set_reached(next, cost, Gradient::Node(cur));
                    self.state_mut(next).visited = false;
                    self.enqueue_normal(next);
                }
            }
        }
    }

    /// Reads a route to every sought node, each into its own sub-route.
    pub(crate) fn read_result_to_all(
        &mut self,
        sought: &[OrigDest],
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let before = result.len();
        for (k, od) in sought.iter().enumerate() {
            let is_last = k + 1 == sought.len();
            self.read_result(std::slice::from_ref(od), args, result, is_last)?;
        }

        log::debug!("read {} routes to {} points", result.len() - before, sought.len());
        Ok(())
    }

    /// Reads the cheapest walked route, and the routes to the boundary nodes
    /// reached on foot.
    pub(crate) fn read_result_walk(
        &mut self,
        sought: &[OrigDest],
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let pref = args.pref;

        for od in sought {
            let Some(i) = od.index else { continue };
            if self.state(i).est_cost == INFINITY {
                continue;
            }
            let add = match self.min_cost(i, pref) {
                INFINITY => 0,
                min => scale_cost(min, offset_factor(od.offset)),
            };
            let s = self.state_mut(i);
            s.est_cost = s.est_cost.saturating_add(add);
            s.real_cost = s.est_cost;
        }

        let best = sought
            .iter()
            .filter_map(|od| od.index.map(|i| (od, i, self.state(i).real_cost)))
            .filter(|&(_, _, cost)| cost < INFINITY)
            .min_by_key(|&(_, _, cost)| cost);

        if let Some((od, i, cost)) = best {
            self.cut_off = self.cut_off.min(cost);
            self.read_result_from_destination(args, result, i, None, od.offset, 0, true)?;
        }

        for k in 0..self.graph().external_nodes().len() {
            let ext = &self.graph().external_nodes()[k];
            let s = self.state(ext.node);
            if s.gradient.is_some() && s.est_cost != INFINITY && !s.visited {
                self.read_result_from_destination(args, result, ext.node, Some(ext), 0, 0, false)?;
            }
        }
        Ok(())
    }

    /// Reads a route to every reached boundary node cheaper than the cut-off.
    pub(crate) fn read_result_to_external_connection(
        &mut self,
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let mut read = 0_usize;
        for k in 0..self.graph().external_nodes().len() {
            let node = self.graph().external_nodes()[k].node;
            let s = self.state(node);
            if s.gradient.is_none() || s.est_cost == INFINITY {
                continue;
            }

            // The estimate no longer matters at the boundary
            self.state_mut(node).est_cost = s.real_cost;
            if s.real_cost > self.cut_off {
                continue;
            }

            let ext = &self.graph().external_nodes()[k];
            if self.read_result_from_destination(args, result, node, Some(ext), 0, 0, false)?.is_some() {
                read += 1;
            }
        }

        log::debug!("read routes to {} external nodes", read);
        Ok(())
    }

    /// Reads the route found on an overview map, handing it over to the lower level
    /// maps through the translation table.
    pub(crate) fn read_result_on_higher_level(
        &self,
        sought: &[OrigDest],
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let g = self.graph();
        let best = sought
            .iter()
            .filter_map(|od| od.index.map(|i| (i, self.state(i).est_cost.saturating_add(od.real_cost))))
            .filter(|&(_, cost)| cost != INFINITY)
            .min_by_key(|&(_, cost)| cost);

        let Some((best, _)) = best else {
            log::warn!("no destination reached on the overview map {:#x}", g.map_id());
            return Ok(());
        };

        let (nodes, start_id, sums) = self.fill_sub_route_from_destination(best, true, args.calc_sums)?;
        let mut sub_route = SubRoute::new(g.map_id());
        sub_route.nodes = nodes;
        sub_route.prev_sub_route_id = args
            .incoming
            .sub_routes()
            .iter()
            .find(|s| {
                s.externals
                    .iter()
                    .any(|e| g.translate_to_higher(e.map_id, e.node_id) == Some(start_id))
            })
            .map(|s| s.id);

        let s = self.state(best);
        let (lat, lon) = self.coords(best);
        for c in g.connections(best, true) {
            if let Some((map_id, node_id)) = g.translate_to_lower(g.item_id(c.node)) {
                sub_route.add_external(External {
                    map_id,
                    node_id,
                    cost: s.real_cost,
                    est_cost: s.est_cost,
                    lat,
                    lon,
                    sums,
                });
            }
        }
        sub_route.complete = true;
        sub_route.visited = true;

        result.add_sub_route(sub_route);
        Ok(())
    }

    /// Routes between origins and destinations on the same node, which the
    /// relaxation can't find. Boundary node origins of a continued route are also
    /// passed on to the neighbouring maps. Returns the number of added sub-routes.
    pub(crate) fn route_on_one_segment(
        &mut self,
        origins: &[OrigDest],
        dests: &[OrigDest],
        args: ReadArgs,
        result: &mut SubRouteList,
        route_to_all: bool,
    ) -> usize {
        let g = self.graph();
        let map_id = g.map_id();
        let pref = args.pref;
        let using_cost_c = pref.using_cost_c();
        let mut added = 0;

        if !self.original {
            for od in origins {
                let Some(ext) = g.external_node(od.item_id) else { continue };
                let (lat, lon) = self.coords(ext.node);
                let mut sub_route = SubRoute::new(map_id);
                sub_route.prev_sub_route_id = args.incoming.find_external_node(map_id, od.item_id).map(|(s, _)| s.id);
                sub_route.nodes.push(od.item_id);
                sub_route.start_offset = od.offset;
                sub_route.end_offset = od.offset;
                sub_route.forward = args.forward;
                for c in &ext.connections {
                    sub_route.add_external(External {
                        map_id: c.map_id,
                        node_id: c.node_id,
                        cost: od.real_cost,
                        est_cost: od.real_cost,
                        lat,
                        lon,
                        sums: od.sums,
                    });
                }
                if result.add_sub_route(sub_route).is_some() {
                    added += 1;
                }
            }
        }

        let mut cut_off = self.cut_off;
        for orig in origins {
            for dest in dests {
                if orig.map_id != dest.map_id || orig.item_id != dest.item_id {
                    continue;
                }
                let Some(node) = dest.index else { continue };

                let forbidden = g.restriction(node).not_valid();
                let walk_forbidden = !g
                    .connections(node, !args.forward)
                    .iter()
                    .any(|c| g.data(c.data).vehicle_restriction(using_cost_c) & PEDESTRIAN != 0);
                if (forbidden && walk_forbidden) || dest.offset < orig.offset {
                    continue;
                }

                let factor = (dest.offset - orig.offset) as f64 / MAX_OFFSET as f64;
                let part = |a, b, c| match self.get_min_cost(node, pref, a, b, c) {
                    INFINITY => 0,
                    min => scale_cost(min, factor),
                };
                let mut cost = part(pref.cost_a, pref.cost_b, pref.cost_c)
                    .saturating_add(orig.turn_cost)
                    .saturating_add(orig.real_cost);
                if forbidden {
                    cost = cost.saturating_mul(WALK_FACTOR);
                }

                let mut sums = orig.sums;
                if args.calc_sums {
                    sums.add(CostSums::new(part(1, 0, 0), part(0, 1, 0), part(0, 0, 1)));
                }

                let (lat, lon) = (dest.lat, dest.lon);
                let mut sub_route = SubRoute::new(map_id);
                sub_route.prev_sub_route_id = args.incoming.find_external_node(map_id, orig.item_id).map(|(s, _)| s.id);
                if forbidden {
                    sub_route.nodes.push(WALK_ITEM_ID);
                }
                sub_route.nodes.push(dest.item_id);
                sub_route.start_offset = orig.offset;
                sub_route.end_offset = dest.offset;
                sub_route.forward = args.forward;
                sub_route.add_external(External {
                    map_id,
                    node_id: dest.item_id,
                    cost,
                    est_cost: cost,
                    lat,
                    lon,
                    sums,
                });
                if let Some(ext) = g.external_node(dest.item_id) {
                    for c in &ext.connections {
                        sub_route.add_external(External {
                            map_id: c.map_id,
                            node_id: c.node_id,
                            cost,
                            est_cost: cost,
                            lat,
                            lon,
                            sums,
                        });
                    }
                }
                sub_route.complete = true;
                sub_route.visited = true;

                if result.add_sub_route(sub_route).is_some() {
                    added += 1;
                    if !route_to_all && cost <= cut_off {
                        cut_off = cost;
                    }
                }
            }
        }

        self.cut_off = cut_off;
        added
    }
}
