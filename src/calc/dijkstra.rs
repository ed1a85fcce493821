// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::orig_dest::{anti_offset_factor, offset_factor, OrigDest};
use super::pref::DriverPref;
use super::Engine;
use crate::distance::{squared_mc2_distance, MC2SCALE_TO_METER};
use crate::map::{is_lower_level, is_upper_level, toggle_direction, Connection, DestNode, Gradient, RoutingGraph, NORMAL_SPEED_MS};
use crate::queue::{NodeRef, PriorityQueue, QueueItem};
use crate::INFINITY;

/// Speed assumed by the cost underestimate, in meters per second (120 km/h).
const ESTIMATE_SPEED_MS: f64 = 120.0 / 3.6;

/// Margin around the origins where every node is routed on, when climbing to the higher level.
const INNER_BBOX_MARGIN_M: u32 = 1200;

/// Margin around the origins where lower level nodes may still be reached from lower level nodes.
const OUTER_BBOX_MARGIN_M: u32 = 5000;

/// Underestimates the cost of reaching the closest of the provided points,
/// assuming a straight line traveled at 120 km/h. Returns 0 for an empty list.
pub(crate) fn estimate_dist(lat: i32, lon: i32, list: &[OrigDest], a: u32, b: u32, c: u32) -> u32 {
    let Some(min_sq) = list
        .iter()
        .map(|od| squared_mc2_distance(lat, lon, od.lat, od.lon))
        .min_by(|x, y| x.total_cmp(y))
    else {
        return 0;
    };

    let meters = min_sq.sqrt() * MC2SCALE_TO_METER;
    let time = meters / ESTIMATE_SPEED_MS * NORMAL_SPEED_MS;
    let cost = a as f64 * meters + (b as f64 + c as f64) * time;
    cost.min(INFINITY as f64) as u32
}

/// Multiplies a cost by a fraction, truncating like an integer conversion would.
#[inline]
pub(crate) fn scale_cost(cost: u32, factor: f64) -> u32 {
    (cost as f64 * factor).min(INFINITY as f64) as u32
}

/// Dequeues map nodes until one whose queued cost is still current is found.
/// Entries of synthetic destination nodes are dropped.
pub(crate) fn pop_fresh<Q: PriorityQueue>(q: &mut Q, g: &RoutingGraph) -> Option<u32> {
    while let Some(item) = q.dequeue() {
        if let NodeRef::Map(node) = item.node {
            if item.cost <= g.state(node).est_cost {
                return Some(node);
            }
        }
    }
    None
}

/// Switches of the main relaxation loop.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Mode {
    /// Continue until every sought node is found.
    pub route_to_all: bool,

    /// Order the queue by cost plus [estimate_dist].
    pub estimate: bool,

    /// Ignore the entry restrictions of nodes.
    pub walking: bool,

    /// Only enter nodes inside a no-throughfare area.
    pub throughfare_ok: bool,
}

impl Engine {
    #[inline]
    pub(crate) fn conn(&self, node: u32, forward: bool, k: usize) -> Option<Connection> {
        self.graph().connections(node, forward).get(k).copied()
    }

    #[inline]
    pub(crate) fn coords(&self, node: u32) -> (i32, i32) {
        self.graph().node(node).map_or((0, 0), |n| (n.lat, n.lon))
    }

    /// Index of the node on the other end of the segment.
    #[inline]
    pub(crate) fn other_side(&self, node: u32) -> Option<u32> {
        let g = self.graph();
        g.node_index(toggle_direction(g.item_id(node)))
    }

    /// Cheapest weighted cost of leaving the segment of the node, in any direction.
    /// Used as the length of the segment. [INFINITY] if the segment has no successors.
    pub(crate) fn get_min_cost(&self, node: u32, pref: &DriverPref, a: u32, b: u32, c: u32) -> u32 {
        let g = self.graph();
        let p = g.penalties();
        std::iter::once(node)
            .chain(self.other_side(node))
            .flat_map(|n| g.connections(n, true))
            .map(|conn| pref.weighted_cost(g.data(conn.data), p, a, b, c, 0))
            .min()
            .unwrap_or(INFINITY)
    }

    #[inline]
    pub(crate) fn min_cost(&self, node: u32, pref: &DriverPref) -> u32 {
        self.get_min_cost(node, pref, pref.cost_a, pref.cost_b, pref.cost_c)
    }

    pub(crate) fn min_cost_walk(&self, node: u32, pref: &DriverPref) -> u32 {
        match self.get_min_cost(node, pref, 1, 0, 0) {
            INFINITY => INFINITY,
            cost_a => pref.walk_cost(cost_a),
        }
    }

    /// Cost of the part of the segment between the node and the sought point on it.
    /// Zero for nodes which aren't sought, or whose segment length is unknown.
    pub(crate) fn calc_offset_cost(&self, sought: &[OrigDest], node: u32, pref: &DriverPref, forward: bool) -> u32 {
        let Some(od) = sought.iter().find(|od| od.index == Some(node)) else {
            return 0;
        };
        match self.min_cost(node, pref) {
            INFINITY => 0,
            min if forward => scale_cost(min, offset_factor(od.offset)),
            min => scale_cost(min, anti_offset_factor(od.offset)),
        }
    }

    /// Like [Engine::calc_offset_cost], but for walking along the segment.
    pub(crate) fn calc_offset_cost_walk(&self, sought: &[OrigDest], node: u32, pref: &DriverPref, forward: bool) -> u32 {
        let Some(od) = sought.iter().find(|od| od.index == Some(node)) else {
            return 0;
        };
        match self.min_cost_walk(node, pref) {
            INFINITY => INFINITY,
            min if forward => scale_cost(min, offset_factor(od.offset)),
            min => scale_cost(min, anti_offset_factor(od.offset)),
        }
    }

    /// Relaxes the main queue until the sought node (or, with `route_to_all`,
    /// every sought node) is found.
    pub(crate) fn calc_cost_dijkstra(&mut self, pref: &DriverPref, sought: &[OrigDest], forward: bool, route_to_all: bool) {
        let mode = Mode {
            route_to_all,
            estimate: sought.len() < 3,
            walking: pref.is_walking(),
            throughfare_ok: false,
        };
        self.relax(pref, sought, forward, mode);
    }

    pub(crate) fn relax(&mut self, pref: &DriverPref, sought: &[OrigDest], forward: bool, mode: Mode) {
        let underview = !self.graph().is_overview();
        let mut dests_left = if mode.route_to_all { sought.len() } else { 1 };
        let mut cut_off = self.cut_off;
        if mode.route_to_all && underview {
            cut_off = INFINITY;
        }

        self.dest_nodes = self.graph().create_dest_nodes(sought.len());
        let mut found = vec![false; sought.len()];
        let mut found_count = 0_usize;
        let mut tmp_cut_off = INFINITY;

        log::debug!(
            "map {:#x}: relaxing towards {} nodes, cut-off {}, estimate {}",
            self.graph().map_id(),
            sought.len(),
            cut_off,
            mode.estimate
        );

        while let Some(item) = self.queue.dequeue() {
            let cur = match item.node {
                NodeRef::Dest(k) => {
                    let k = k as usize;
                    if found[k] || item.cost > self.dest_nodes[k].est_cost {
                        continue;
                    }
                    found[k] = true;

                    if dests_left == 1 && found_count == 0 {
                        tmp_cut_off = tmp_cut_off.min(self.dest_nodes[k].real_cost);
                    }
                    found_count += 1;
                    dests_left = dests_left.saturating_sub(1);
                    if dests_left == 0 {
                        log::debug!(
                            "relaxation finished after finding {} destinations, cost {}",
                            found_count,
                            self.dest_nodes[k].real_cost
                        );
                        self.cut_off = tmp_cut_off;
                        return;
                    }
                    continue;
                }
                NodeRef::Map(cur) => cur,
            };

            let s = self.state(cur);
            if item.cost > s.est_cost {
                continue;
            }
            self.state_mut(cur).visited = true;

            if s.dest {
                if let Some(k) = sought.iter().position(|od| od.index == Some(cur)) {
                    let extra = self.calc_offset_cost(sought, cur, pref, forward);
                    let real = s.real_cost.saturating_add(extra);
                    if real < self.dest_nodes[k].real_cost {
                        self.dest_nodes[k] = DestNode {
                            item_id: self.graph().item_id(cur),
                            real_cost: real,
                            est_cost: s.est_cost.saturating_add(extra),
                        };
                        self.queue
                            .enqueue(QueueItem::new(NodeRef::Dest(k as u32), self.dest_nodes[k].est_cost, true));
                    }
                }
            }

            let cur_cost = s.real_cost;
            let mut k = 0;
            while let Some(c) = self.conn(cur, forward, k) {
                k += 1;
                let next = c.node;
                let data = *self.graph().data(c.data);
                let restriction = self.graph().restriction(next);
                let tmp = cur_cost.saturating_add(pref.connection_cost(&data, self.penalties()));
                let ns = self.state(next);

                let enterable = mode.walking
                    || (!mode.throughfare_ok && restriction.has_no_restrictions())
                    || (mode.throughfare_ok && restriction.has_no_throughfare());

                if pref.allows(&data) && enterable {
                    if (tmp < ns.real_cost || !ns.visited) && tmp <= cut_off {
                        let est = if mode.estimate {
                            let (lat, lon) = self.coords(next);
                            estimate_dist(lat, lon, sought, pref.cost_a, pref.cost_b, pref.cost_c)
                        } else {
                            0
                        };

                        let st = self.state_mut(next);
                        st.real_cost = tmp;
                        st.est_cost = tmp.saturating_add(est);
                        st.gradient = Some(Gradient::Node(cur));
                        st.visited = true;
                        self.enqueue_main(next);
                    }
                } else if underview && tmp < ns.real_cost && tmp < cut_off && !ns.visited {
                    let st = self.state_mut(next);
                    st.real_cost = tmp;
                    st.est_cost = tmp;
                    st.gradient = Some(Gradient::Node(cur));
                    st.visited = false;
                    self.invalid_nodes.push((Some(c.data), next));
                }
            }
        }

        log::debug!(
            "relaxation ran out of nodes, {} of {} destinations found",
            found_count,
            if mode.route_to_all { sought.len() } else { 1 }
        );
    }

    /// Relaxes the main queue over the whole map, towards the external nodes.
    ///
    /// With `route_to_higher`, only the surroundings of the origins are routed on
    /// the lower level, see [Engine::should_include_node]. Expanded nodes with skipped
    /// neighbours are saved in the outside queue for a second attempt.
    pub(crate) fn calc_cost_external_dijkstra(
        &mut self,
        pref: &DriverPref,
        route_to_higher: bool,
        forward: bool,
        all_dests: &[OrigDest],
    ) {
        let estimate = all_dests.len() < 5 && self.cut_off != INFINITY;
        let walking = pref.is_walking();
        log::debug!(
            "map {:#x}: routing to the boundary, higher level only: {}, cut-off {}",
            self.graph().map_id(),
            route_to_higher,
            self.cut_off
        );

        while let Some(cur) = pop_fresh(&mut self.queue, &self.map.graph) {
            let cur_cost = self.state(cur).real_cost;
            let cur_lower = is_lower_level(self.graph().item_id(cur));
            let mut saved = false;

            let mut k = 0;
            while let Some(c) = self.conn(cur, forward, k) {
                k += 1;
                let next = c.node;
                let data = *self.graph().data(c.data);
                let next_cost = self.state(next).real_cost;
                let enterable = walking || self.graph().restriction(next).has_no_restrictions();
                if !pref.allows(&data) || cur_cost >= next_cost || !enterable {
                    continue;
                }

                if self.should_include_node(next, cur_lower, route_to_higher) {
                    let tmp = cur_cost.saturating_add(pref.connection_cost(&data, self.penalties()));
                    let est = if estimate {
                        let (lat, lon) = self.coords(next);
                        estimate_dist(lat, lon, all_dests, pref.cost_a, pref.cost_b, pref.cost_c)
                    } else {
                        0
                    };

                    if tmp < next_cost && tmp.saturating_add(est) <= self.cut_off {
                        let st = self.state_mut(next);
                        st.real_cost = tmp;
                        st.est_cost = tmp;
                        st.gradient = Some(Gradient::Node(cur));
                        self.enqueue_main(next);
                    }
                } else if !saved {
                    saved = true;
                    let item = self.item(cur);
                    self.outside.enqueue(item);
                }
            }
        }
    }

    /// Sets up the boxes around the seeds used by [Engine::should_include_node].
    pub(crate) fn update_lower_level_bbox(&mut self, seeds: &[OrigDest]) {
        self.inner_bbox.reset();
        self.outer_bbox.reset();
        for od in seeds {
            let (lat, lon) = match od.index {
                Some(i) => self.coords(i),
                None => (od.lat, od.lon),
            };
            self.inner_bbox.update(lat, lon);
            self.outer_bbox.update(lat, lon);
        }
        self.inner_bbox.increase_meters(INNER_BBOX_MARGIN_M);
        self.outer_bbox.increase_meters(OUTER_BBOX_MARGIN_M);

        log::debug!(
            "lower level boxes are {:.0} m and {:.0} m high",
            self.inner_bbox.height_meters(),
            self.outer_bbox.height_meters()
        );
    }

    /// Everything may be entered inside the inner box. Between the boxes
    /// lower level nodes may only be reached from other lower level nodes.
    /// Outside of both boxes, only the higher level nodes may be entered.
    pub(crate) fn should_include_node(&self, next: u32, cur_lower: bool, route_to_higher: bool) -> bool {
        if !route_to_higher {
            return true;
        }

        let Some(n) = self.graph().node(next) else {
            return false;
        };
        if self.inner_bbox.inside(n.lat, n.lon) || is_upper_level(n.item_id) {
            true
        } else if self.outer_bbox.inside(n.lat, n.lon) {
            cur_lower
        } else {
            false
        }
    }
}
