// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::dijkstra::scale_cost;
use super::orig_dest::{offset_factor, OrigDest};
use super::pref::DriverPref;
use super::{Engine, RouteError, RouteRequest};
use crate::map::Gradient;
use crate::queue::{NodeRef, PriorityQueue};
use crate::vehicle::PEDESTRIAN;
use crate::INFINITY;

/// Removes points on the same node, keeping the origin with the largest offset
/// (the shortest remaining part of the segment) and the destination with the smallest.
/// Returns the number of removed points.
pub(crate) fn remove_dups(list: &mut Vec<OrigDest>, is_dest: bool) -> usize {
    let before = list.len();
    let mut kept: Vec<OrigDest> = Vec::with_capacity(before);

    for od in list.drain(..) {
        match kept
            .iter_mut()
            .find(|k| k.map_id == od.map_id && k.item_id == od.item_id)
        {
            Some(k) => {
                let replace = if is_dest {
                    od.offset <= k.offset
                } else {
                    od.offset > k.offset
                };
                if replace {
                    *k = od;
                }
            }
            None => kept.push(od),
        }
    }

    *list = kept;
    before - list.len()
}

/// Pops the next map node from a side queue, ignoring the entry order costs.
pub(crate) fn pop_node<Q: PriorityQueue>(q: &mut Q) -> Option<u32> {
    while let Some(item) = q.dequeue() {
        if let NodeRef::Map(node) = item.node {
            return Some(node);
        }
    }
    None
}

impl Engine {
    /// Guesses whether the vehicle may drive on the segment after the node: true if it
    /// may leave through a connection in `forward` direction or, unless `only_from`,
    /// enter through a connection in the other direction.
    pub(crate) fn can_drive_on_segment(&self, node: u32, pref: &DriverPref, forward: bool, only_from: bool) -> bool {
        let g = self.graph();
        let walking = pref.vehicle & PEDESTRIAN != 0;
        let restriction = g.restriction(node);
        if !walking && restriction.has_no_way() {
            return false;
        }

        let leaves = g
            .connections(node, forward)
            .iter()
            .any(|c| pref.allows(g.data(c.data)) && (walking || !g.restriction(c.node).not_valid()));
        if leaves {
            return true;
        }

        if only_from || (!walking && restriction.has_no_entry()) {
            return false;
        }
        g.connections(node, !forward)
            .iter()
            .any(|c| pref.allows(g.data(c.data)))
    }

    /// False for origins on segments which the vehicle couldn't have entered from any end.
    pub(crate) fn could_drive_into_segment(&self, node: u32, pref: &DriverPref) -> bool {
        let g = self.graph();
        let walking = pref.vehicle & PEDESTRIAN != 0;

        if !walking && g.restriction(node).not_valid() {
            if let Some(other) = self.other_side(node) {
                if g.restriction(other).not_valid() {
                    return false;
                }
            }
        }

        [true, false].into_iter().any(|direction| {
            g.connections(node, direction)
                .iter()
                .any(|c| pref.allows(g.data(c.data)))
        })
    }

    pub(crate) fn check_vehicle_restrictions(&self, node: u32, pref: &DriverPref, forward: bool) -> bool {
        let g = self.graph();
        let walking = pref.only_walking();
        if !forward && !walking && g.restriction(node).not_valid() {
            return false;
        }

        g.connections(node, forward).iter().any(|c| {
            pref.allows(g.data(c.data)) && (!forward || walking || !g.restriction(c.node).not_valid())
        })
    }

    /// Moves out the points which can only be walked from, so that the relaxation
    /// doesn't wait for them. They are read back with the rest afterwards.
    pub(crate) fn remove_unreachable(&self, list: &mut Vec<OrigDest>, pref: &DriverPref, forward: bool) -> Vec<OrigDest> {
        let g = self.graph();
        let (reachable, unreachable): (Vec<_>, Vec<_>) = list.drain(..).partition(|od| {
            let Some(i) = od.index else {
                return true;
            };
            self.check_vehicle_restrictions(i, pref, forward)
                && self.check_vehicle_restrictions(i, pref, !forward)
                && g.restriction(i).has_no_restrictions()
                && !g.connections(i, forward).is_empty()
                && !g.connections(i, !forward).is_empty()
        });

        if !unreachable.is_empty() {
            log::debug!("{} points can only be walked from", unreachable.len());
        }
        *list = reachable;
        unreachable
    }

    fn check_orig_dests(&self, seeds: &[OrigDest], sought: &[OrigDest], forward: bool) -> Result<(), RouteError> {
        let (seed_err, sought_err) = if forward {
            (RouteError::InvalidOrigins, RouteError::InvalidDestinations)
        } else {
            (RouteError::InvalidDestinations, RouteError::InvalidOrigins)
        };

        for (list, err) in [(seeds, seed_err), (sought, sought_err)] {
            if let Some(od) = list.iter().find(|od| od.index.is_none()) {
                log::error!(
                    "node {:#x} of map {:#x} does not exist on map {:#x}",
                    od.item_id,
                    od.map_id,
                    self.graph().map_id()
                );
                return Err(err);
            }
        }
        Ok(())
    }

    fn mark_sought(&mut self, sought: &[OrigDest]) {
        for i in sought.iter().filter_map(|od| od.index) {
            self.state_mut(i).dest = true;
        }
    }

    /// Seeds the queues from the `seeds` and marks the `sought` nodes.
    ///
    /// Points of an original request lie on segments, and the vehicle might not be allowed
    /// to drive where they are: see [Engine::init_route_first_time]. Otherwise the seeds are
    /// boundary nodes entered from a neighbouring map, expanded directly into the main queue.
    pub(crate) fn init_route(
        &mut self,
        original: bool,
        seeds: &[OrigDest],
        sought: &[OrigDest],
        pref: &DriverPref,
        forward: bool,
    ) -> Result<(), RouteError> {
        self.check_orig_dests(seeds, sought, forward)?;
        if original {
            return self.init_route_first_time(seeds, sought, pref, forward);
        }

        let min = seeds.iter().map(|od| od.real_cost).min().unwrap_or(0);
        self.queue.update_start_index(min);

        for od in seeds {
            let Some(seed) = od.index else { continue };
            let mut k = 0;
            while let Some(c) = self.conn(seed, forward, k) {
                k += 1;
                let data = *self.graph().data(c.data);
                if !pref.allows(&data) || !self.graph().restriction(c.node).has_no_restrictions() {
                    continue;
                }

                let cost = od.real_cost.saturating_add(pref.connection_cost(&data, self.penalties()));
                if cost < self.state(c.node).real_cost {
                    self.set_reached(c.node, cost, Gradient::Origin(seed));
                    self.state_mut(c.node).visited = true;
                    self.enqueue_main(c.node);
                }
            }
        }

        self.mark_sought(sought);
        Ok(())
    }

    /// Seeds the queues from points on segments.
    ///
    /// Nodes reachable the way the vehicle may drive go straight to the main queue.
    /// The others are sorted into the no-throughfare, normal (where driving may begin)
    /// and not-valid (walk only) queues, which are expanded until the main queue
    /// has something to start from.
    pub(crate) fn init_route_first_time(
        &mut self,
        seeds: &[OrigDest],
        sought: &[OrigDest],
        pref: &DriverPref,
        forward: bool,
    ) -> Result<(), RouteError> {
        self.mark_sought(sought);
        let walking = pref.vehicle & PEDESTRIAN != 0;
        let mut allowed_dests: Vec<u32> = Vec::new();

        for od in seeds {
            let Some(cur) = od.index else {
                log::warn!("origin {:#x} is not on this map", od.item_id);
                continue;
            };

            let could_drive_here = self.could_drive_into_segment(cur, pref);
            let drive_cur = self.can_drive_on_segment(cur, pref, forward, false);
            let cur_restriction = self.graph().restriction(cur);
            log::debug!("could drive into {:#x}: {}", od.item_id, could_drive_here);

            let lesser = match self.min_cost(cur, pref) {
                INFINITY => 0,
                min => scale_cost(min, offset_factor(od.offset)),
            };
            let lesser_walk = match self.min_cost_walk(cur, pref) {
                INFINITY => 0,
                min => scale_cost(min, offset_factor(od.offset)),
            };

            let mut k = 0;
            while let Some(c) = self.conn(cur, forward, k) {
                k += 1;
                let next = c.node;
                let data = *self.graph().data(c.data);
                let next_restriction = self.graph().restriction(next);

                let allowed = pref.allows(&data);
                let all_allowed =
                    allowed && ((!cur_restriction.has_no_way() && next_restriction.has_no_restrictions()) || walking);
                let throughfare = allowed && next_restriction.has_no_throughfare() && cur_restriction.has_no_throughfare();
                let throughfare_later =
                    allowed && next_restriction.has_no_throughfare() && !cur_restriction.has_no_throughfare();
                let walk_allowed = data.vehicle_restriction(pref.using_cost_c()) & PEDESTRIAN != 0;

                let (connection_cost, remove) = if drive_cur {
                    (pref.connection_cost(&data, self.penalties()), lesser)
                } else {
                    (pref.connection_cost_walk(&data, self.penalties()), lesser_walk)
                };
                let mut cost = od.real_cost.saturating_add(connection_cost);
                if forward {
                    cost = cost.saturating_add(od.turn_cost);
                }
                let cost = cost.saturating_sub(remove);

                if cost >= self.state(next).real_cost {
                    continue;
                }
                self.set_reached(next, cost, Gradient::Origin(cur));

                let queue_name = if all_allowed || (!could_drive_here && self.can_drive_on_segment(next, pref, forward, true)) {
                    allowed_dests.push(next);
                    if could_drive_here && all_allowed {
                        self.state_mut(next).visited = true;
                        self.enqueue_main(next);
                        "main"
                    } else if next_restriction.has_no_throughfare() {
                        self.enqueue_throughfare(next);
                        self.invalid_nodes.push((Some(c.data), next));
                        "no-throughfare"
                    } else {
                        self.enqueue_normal(next);
                        self.invalid_nodes.push((Some(c.data), next));
                        "normal"
                    }
                } else if throughfare {
                    allowed_dests.push(next);
                    self.enqueue_throughfare(next);
                    self.invalid_nodes.push((Some(c.data), next));
                    "no-throughfare"
                } else if throughfare_later {
                    self.state_mut(next).visited = false;
                    self.invalid_nodes.push((Some(c.data), next));
                    if self.state(next).dest {
                        self.cut_off = cost.saturating_add(self.min_cost(next, pref));
                    }
                    "no-throughfare later"
                } else if self.state(next).dest {
                    "none (destination)"
                } else if self.can_drive_on_segment(next, pref, forward, false) {
                    self.enqueue_normal(next);
                    self.invalid_nodes.push((Some(c.data), next));
                    "normal"
                } else if walk_allowed {
                    allowed_dests.push(next);
                    self.state_mut(next).visited = false;
                    self.enqueue_not_valid(next);
                    self.invalid_nodes.push((Some(c.data), next));
                    "not-valid"
                } else {
                    "none"
                };

                log::debug!(
                    "origin {:#x}: node {:#x} with cost {} put into the {} queue",
                    od.item_id,
                    self.graph().item_id(next),
                    cost,
                    queue_name
                );
            }
        }

        let main_was_empty = self.queue.is_empty();
        if main_was_empty {
            log::debug!("no drivable start, expanding the walk-only nodes");
            self.expand_non_valid_nodes(pref, forward);
        } else {
            while let Some(node) = pop_node(&mut self.not_valid) {
                self.invalid_nodes.push((None, node));
            }
        }

        let mut cheapest = pop_node(&mut self.normal);
        if !self.queue.is_empty() {
            cheapest = None;
        }
        if self.queue.is_empty() && !self.throughfare.is_empty() {
            self.expand_throughfare_nodes(pref, forward);
            cheapest = None;
        }

        if let Some(first) = cheapest {
            let first_state = self.state(first);

            // Destinations reached on foot may be cheaper than leaving the restricted area.
            for i in sought.iter().filter_map(|od| od.index) {
                let s = self.state(i);
                if s.gradient.is_some() {
                    let cost = s
                        .real_cost
                        .saturating_add(self.calc_offset_cost_walk(sought, i, pref, forward));
                    if cost < first_state.real_cost {
                        self.cut_off = cost;
                    }
                }
            }

            let mut cheapest_cost = first_state.real_cost;
            let cheapest_gradient = first_state.gradient;
            let mut node = Some(first);
            while let Some(n) = node {
                let s = self.state(n);
                if s.real_cost == cheapest_cost || s.gradient == cheapest_gradient {
                    self.enqueue_main(n);
                    self.protect_path(n);
                }

                node = pop_node(&mut self.normal);
                if let Some(next) = node {
                    if !main_was_empty {
                        cheapest_cost = self.state(next).real_cost;
                    }
                }
            }
        }

        self.normal.reset();
        self.expand_throughfare_nodes(pref, forward);

        for i in sought.iter().filter_map(|od| od.index) {
            if allowed_dests.contains(&i) {
                self.cut_off = self.cut_off.min(self.state(i).est_cost);
            }
        }

        if self.queue.is_empty() {
            if forward {
                log::error!("no valid start routing node");
                Err(RouteError::NoValidStartRoutingNode)
            } else {
                log::error!("no valid end routing node");
                Err(RouteError::NoValidEndRoutingNode)
            }
        } else {
            Ok(())
        }
    }

    /// Marks the path to the node as visited, so that the relaxation doesn't replace it.
    fn protect_path(&mut self, node: u32) {
        let mut cur = node;
        for _ in 0..self.graph().len() {
            self.state_mut(cur).visited = true;
            match self.state(cur).gradient {
                Some(Gradient::Node(prev)) => cur = prev,
                _ => break,
            }
        }
    }

    /// Walks out of the area the vehicle may not drive in, up to the cheapest known
    /// drivable node, filling the normal and no-throughfare queues.
    fn expand_non_valid_nodes(&mut self, pref: &DriverPref, forward: bool) {
        let using_cost_c = pref.using_cost_c();
        let mut local_cut_off = self.normal.peek().map_or(INFINITY, |item| item.cost);
        log::debug!("expanding walk-only nodes up to cost {}", local_cut_off);

        while let Some(cur) = pop_node(&mut self.not_valid) {
            if self.state(cur).dest {
                continue;
            }

            let mut next_local_cut_off = local_cut_off;
            let cur_cost = self.state(cur).real_cost;
            let mut k = 0;
            while let Some(c) = self.conn(cur, forward, k) {
                k += 1;
                let next = c.node;
                let data = *self.graph().data(c.data);
                let cost = cur_cost.saturating_add(pref.connection_cost_walk(&data, self.penalties()));
                if cost >= self.state(next).real_cost || cost > local_cut_off {
                    continue;
                }
                self.set_reached(next, cost, Gradient::Node(cur));

                let restriction = self.graph().restriction(next);
                let can_walk = data.vehicle_restriction(using_cost_c) & PEDESTRIAN != 0;
                let vehicle_ok = pref.allows(&data);

                if (vehicle_ok && !restriction.not_valid()) || self.can_drive_on_segment(next, pref, forward, true) {
                    if restriction.has_no_throughfare() {
                        self.enqueue_throughfare(next);
                    } else {
                        self.state_mut(next).visited = true;
                        self.enqueue_normal(next);
                    }
                    next_local_cut_off = cost;
                } else if can_walk {
                    self.enqueue_not_valid(next);
                }
            }
            local_cut_off = next_local_cut_off;
        }
    }

    /// Drives through the no-throughfare area, until its edges are put into the main queue.
    fn expand_throughfare_nodes(&mut self, pref: &DriverPref, forward: bool) {
        while let Some(cur) = pop_node(&mut self.throughfare) {
            self.state_mut(cur).visited = true;
            let cur_cost = self.state(cur).real_cost;
            if self.state(cur).dest {
                self.cut_off = cur_cost.saturating_add(self.min_cost(cur, pref));
                log::debug!("destination found inside a no-throughfare area, cut-off {}", self.cut_off);
                continue;
            }

            let mut k = 0;
            while let Some(c) = self.conn(cur, forward, k) {
                k += 1;
                let next = c.node;
                let data = *self.graph().data(c.data);
                let restriction = self.graph().restriction(next);
                let cost = cur_cost.saturating_add(pref.connection_cost(&data, self.penalties()));
                let ns = self.state(next);

                if pref.allows(&data) && !restriction.not_valid() {
                    if cost < ns.real_cost || !ns.visited {
                        self.set_reached(next, cost, Gradient::Node(cur));
                        self.state_mut(next).visited = true;
                        if restriction.has_no_throughfare() {
                            self.enqueue_throughfare(next);
                        } else {
                            self.enqueue_main(next);
                        }
                    }
                } else if cost < ns.real_cost && !ns.visited {
                    self.set_reached(next, cost, Gradient::Node(cur));
                    self.state_mut(next).visited = false;
                    self.invalid_nodes.push((Some(c.data), next));
                }
            }
        }
        self.throughfare.reset();
    }

    /// Seeds an overview map with the origins given on the lower level maps,
    /// and returns the destinations translated onto this map.
    pub(crate) fn init_route_on_higher_level(
        &mut self,
        req: &RouteRequest,
        origins: &[OrigDest],
        dests: &[OrigDest],
    ) -> Vec<OrigDest> {
        let min = origins.iter().map(|od| od.real_cost).min().unwrap_or(0);
        self.queue.update_start_index(min);

        for od in origins {
            let Some(i) = self.translate_to_higher(od) else {
                log::warn!("origin {:#x} of map {:#x} has no higher level node", od.item_id, od.map_id);
                continue;
            };
            let s = self.state_mut(i);
            if od.real_cost < s.real_cost {
                s.real_cost = od.real_cost;
                s.est_cost = od.real_cost;
                s.visited = true;
                self.enqueue_main(i);
            }
        }

        let map_id = self.graph().map_id();
        let mut sought = Vec::with_capacity(dests.len());
        for od in dests {
            let Some(i) = self.translate_to_higher(od) else {
                log::warn!("destination {:#x} of map {:#x} has no higher level node", od.item_id, od.map_id);
                continue;
            };
            self.state_mut(i).dest = true;

            let (lat, lon) = self.coords(i);
            let mut higher = OrigDest::new(map_id, self.graph().item_id(i), 0)
                .with_cost(od.real_cost)
                .with_coordinates(lat, lon)
                .with_sums(od.sums);
            higher.index = Some(i);
            sought.push(higher);
        }

        if req.pref.is_walking() {
            log::debug!("routing a walking traveller on the overview map");
        }
        sought
    }

    fn translate_to_higher(&self, od: &OrigDest) -> Option<u32> {
        let g = self.graph();
        g.translate_to_higher(od.map_id, od.item_id)
            .and_then(|higher| g.node_index(higher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{ConnectionData, EntryRestriction, MapBuilder, DIRECTION_BIT};
    use crate::vehicle::{ALL_VEHICLES, PASSENGER_CAR};

    fn od(item_id: u32, offset: u16) -> OrigDest {
        OrigDest::new(1, item_id, offset)
    }

    fn resolved(e: &Engine, item_id: u32) -> OrigDest {
        let mut od = od(item_id, 0);
        od.resolve(e.graph());
        od
    }

    #[test]
    fn duplicated_origins_keep_largest_offset() {
        let mut list = vec![od(1, 100), od(2, 0), od(1, 300), od(1, 200)];
        assert_eq!(remove_dups(&mut list, false), 2);
        assert_eq!(list.len(), 2);
        assert_eq!((list[0].item_id, list[0].offset), (1, 300));
        assert_eq!((list[1].item_id, list[1].offset), (2, 0));
    }

    #[test]
    fn duplicated_destinations_keep_smallest_offset() {
        let mut list = vec![od(1, 100), od(1, 300), od(1, 50)];
        assert_eq!(remove_dups(&mut list, true), 2);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].offset, 50);

        let mut other_map = vec![od(1, 100), OrigDest::new(2, 1, 0)];
        assert_eq!(remove_dups(&mut other_map, true), 0);
    }

    //   1 ──10──▶ 2 ──10──▶ 3
    //   │                   ▲
    //   └────────30─────────┘
    fn triangle() -> Engine {
        let mut b = MapBuilder::new(1);
        b.add_node(1, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(2, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(3, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(2, 3, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(1, 3, ConnectionData::new(30, 30, 30, ALL_VEHICLES));
        Engine::new(b.build().unwrap())
    }

    #[test]
    fn first_time_init_puts_drivable_nodes_into_main_queue() {
        let mut e = triangle();
        let origin = resolved(&e, 1);
        let dest = resolved(&e, 3);

        e.init_route(true, &[origin], &[dest], &DriverPref::default(), true)
            .unwrap();

        let n2 = e.graph().node_index(2).unwrap();
        let n3 = e.graph().node_index(3).unwrap();
        assert_eq!(e.queue.len(), 2);
        assert_eq!(e.state(n2).real_cost, 10);
        assert_eq!(e.state(n3).real_cost, 30);
        assert!(e.state(n3).dest);
        assert!(e.state(n2).visited);
        assert_eq!(e.cut_off, 30);
    }

    #[test]
    fn init_from_boundary_node() {
        let mut e = triangle();
        let n1 = e.graph().node_index(1).unwrap();
        let origin = resolved(&e, 1).with_cost(100);
        let dest = resolved(&e, 3);

        e.init_route(false, &[origin], &[dest], &DriverPref::default(), true)
            .unwrap();

        let n2 = e.graph().node_index(2).unwrap();
        assert_eq!(e.state(n2).real_cost, 110);
        assert_eq!(e.state(n2).gradient, Some(Gradient::Origin(n1)));
        assert!(e.state(n2).visited);
        assert_eq!(e.cut_off, INFINITY);
    }

    #[test]
    fn unknown_points_are_rejected() {
        let mut e = triangle();
        let origin = OrigDest::new(2, 1, 0);
        let dest = resolved(&e, 3);
        let pref = DriverPref::default();

        assert_eq!(
            e.init_route(true, &[origin.clone()], &[dest.clone()], &pref, true),
            Err(RouteError::InvalidOrigins)
        );
        assert_eq!(
            e.init_route(true, &[origin], &[dest], &pref, false),
            Err(RouteError::InvalidDestinations)
        );
    }

    //   1 ──walk──▶ 2
    #[test]
    fn no_drivable_start() {
        let mut b = MapBuilder::new(1);
        b.add_node(1, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(2, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, PEDESTRIAN));
        let mut e = Engine::new(b.build().unwrap());
        let origin = resolved(&e, 1);
        let dest = resolved(&e, 2);

        assert_eq!(
            e.init_route(true, &[origin.clone()], &[dest.clone()], &DriverPref::default(), true),
            Err(RouteError::NoValidStartRoutingNode)
        );
        e.reset();
        assert_eq!(
            e.init_route(true, &[origin], &[dest], &DriverPref::default(), false),
            Err(RouteError::NoValidEndRoutingNode)
        );
    }

    //   1 ──▶ 2 (no-throughfare) ──▶ 3 (no-throughfare) ──▶ 4
    #[test]
    fn drives_through_no_throughfare_area() {
        let mut b = MapBuilder::new(1);
        b.add_node(1, 0, 0, EntryRestriction::NoThroughfare)
            .add_node(2, 0, 0, EntryRestriction::NoThroughfare)
            .add_node(3, 0, 0, EntryRestriction::NoThroughfare)
            .add_node(4, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, PASSENGER_CAR))
            .add_connection(2, 3, ConnectionData::new(10, 10, 10, PASSENGER_CAR))
            .add_connection(3, 4, ConnectionData::new(10, 10, 10, PASSENGER_CAR));
        let mut e = Engine::new(b.build().unwrap());
        let origin = resolved(&e, 1);

        e.init_route(true, &[origin], &[], &DriverPref::default(), true)
            .unwrap();

        let n3 = e.graph().node_index(3).unwrap();
        let n4 = e.graph().node_index(4).unwrap();
        assert_eq!(e.state(n4).real_cost, 30);
        assert_eq!(e.state(n4).gradient, Some(Gradient::Node(n3)));
        assert!(e.throughfare.is_empty());
        assert_eq!(pop_node(&mut e.queue), Some(n4));
    }

    #[test]
    fn segment_checks() {
        let other = 1 | DIRECTION_BIT;
        let mut b = MapBuilder::new(1);
        b.add_node(1, 0, 0, EntryRestriction::NoEntry)
            .add_node(other, 0, 0, EntryRestriction::NoWay)
            .add_node(2, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, PASSENGER_CAR))
            .add_connection(2, other, ConnectionData::new(10, 10, 10, PASSENGER_CAR));
        let e = Engine::new(b.build().unwrap());
        let car = DriverPref::default();
        let walker = DriverPref::new(PEDESTRIAN);
        let idx = |id| e.graph().node_index(id).unwrap();

        assert!(!e.could_drive_into_segment(idx(1), &car));
        assert!(e.could_drive_into_segment(idx(2), &car));
        assert!(!e.could_drive_into_segment(idx(2), &walker));

        assert!(e.can_drive_on_segment(idx(1), &car, true, true));
        assert!(!e.can_drive_on_segment(idx(other), &car, true, false));
        assert!(!e.can_drive_on_segment(idx(2), &car, true, true));

        assert!(!e.check_vehicle_restrictions(idx(1), &car, false));
        assert!(e.check_vehicle_restrictions(idx(1), &car, true));
        assert!(e.check_vehicle_restrictions(idx(2), &car, false));
    }

    //   0x4000_0001 ──10──▶ 0x4000_0002
    #[test]
    fn higher_level_seeds_are_visited() {
        let mut b = MapBuilder::new(0x8000_0001);
        b.add_node(0x4000_0001, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(0x4000_0002, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(0x4000_0001, 0x4000_0002, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_translation(7, 0x4000_0010, 0x4000_0001)
            .add_translation(7, 0x4000_0020, 0x4000_0002);
        let mut e = Engine::new(b.build().unwrap());

        let origin = OrigDest::new(7, 0x4000_0010, 0).with_cost(5);
        let dest = OrigDest::new(7, 0x4000_0020, 0);
        let sought = e.init_route_on_higher_level(&RouteRequest::default(), &[origin], &[dest]);

        let n1 = e.graph().node_index(0x4000_0001).unwrap();
        let n2 = e.graph().node_index(0x4000_0002).unwrap();
        assert_eq!(e.state(n1).real_cost, 5);
        assert!(e.state(n1).visited);
        assert_eq!(e.queue.len(), 1);

        assert_eq!(sought.len(), 1);
        assert_eq!(sought[0].index, Some(n2));
        assert!(e.state(n2).dest);
    }
}
