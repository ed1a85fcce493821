// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Reversible changes of connection data.

use crate::config::Penalties;
use crate::map::{sec_to_time_cost, ConnectionData, RoutingGraph, MAX_SCALED_COST};
use crate::INFINITY;
use std::collections::{BTreeMap, BTreeSet};

/// Severity of a [Disturbance].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisturbanceKind {
    /// Disturbed time becomes the nominal time multiplied by the factor.
    Factor(f32),

    /// Disturbed time becomes the nominal time plus the delay.
    Delay { seconds: u32 },

    /// The node may not be left by any vehicle.
    Blocked,
}

/// A traffic disturbance on the outgoing connections of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disturbance {
    pub map_id: u32,
    pub node_id: u32,
    pub kind: DisturbanceKind,
}

impl Disturbance {
    pub fn new(map_id: u32, node_id: u32, kind: DisturbanceKind) -> Self {
        Self {
            map_id,
            node_id,
            kind,
        }
    }
}

/// A single recorded change of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionChange {
    /// Index into the connection data arena of the graph.
    pub data: u32,
    pub old: ConnectionData,
    pub new: ConnectionData,
    pub forward: bool,
}

impl ConnectionChange {
    /// Replays this change onto the data of a multi-connection containing it.
    ///
    /// Vehicles removed by the change are removed from `live`, and the difference
    /// of disturbed time is added to it. Huge costs make the result impassable.
    /// Returns false if `live` already was impassable.
    fn apply_diff(&self, live: &mut ConnectionData, p: &Penalties) -> bool {
        if live.cost_c == INFINITY {
            return false;
        }

        live.vehicles &= !(self.old.vehicles & !self.new.vehicles);

        if live.cost_c(INFINITY, p) >= MAX_SCALED_COST || self.new.cost_c(INFINITY, p) >= MAX_SCALED_COST {
            live.cost_c = INFINITY;
            return true;
        }

        let diff = self.new.cost_c as i64 - self.old.cost_c as i64;
        live.cost_c = (live.cost_c as i64 + diff).clamp(0, MAX_SCALED_COST as i64) as u32;
        true
    }

    /// Replays a change made directly on a multi-connection on top of its
    /// re-derived data. Every field moves by the same difference as in the change.
    fn apply_layer(&self, live: &mut ConnectionData) {
        let (old, new) = (self.old, self.new);

        live.vehicles = (live.vehicles & !(old.vehicles & !new.vehicles)) | (new.vehicles & !old.vehicles);
        live.cost_a = shift(live.cost_a, old.cost_a, new.cost_a, INFINITY);
        live.cost_b = shift(live.cost_b, old.cost_b, new.cost_b, INFINITY);

        live.cost_c = if new.cost_c == INFINITY || old.cost_c == INFINITY {
            new.cost_c
        } else if live.cost_c == INFINITY {
            INFINITY
        } else {
            shift(live.cost_c, old.cost_c, new.cost_c, MAX_SCALED_COST)
        };
    }
}

fn shift(value: u32, old: u32, new: u32, max: u32) -> u32 {
    let diff = new as i64 - old as i64;
    (value as i64 + diff).clamp(0, max as i64) as u32
}

/// Stack of reversible connection changes, keyed by `(from, to)` item ids.
///
/// Every connection has at most one change recorded, whose `old` data is the
/// data from before that change was made. Multi-connections are re-derived
/// from their unchanged data and every change recorded on their constituents,
/// in whatever order the constituents were changed. A change made directly on
/// a multi-connection is kept as a separate layer on top of that.
#[derive(Debug, Clone, Default)]
pub struct DisturbanceStorage {
    changed: BTreeMap<(u32, u32), ConnectionChange>,

    /// multi-connection → changed constituent connections
    nodes_in_multi: BTreeMap<(u32, u32), BTreeSet<(u32, u32)>>,

    /// multi-connection → (data index, unchanged data), for every multi-connection
    /// altered through this storage
    multi_base: BTreeMap<(u32, u32), (u32, ConnectionData)>,
}

impl DisturbanceStorage {
    pub fn len(&self) -> usize {
        self.changed.len()
            + self
                .multi_base
                .keys()
                .filter(|key| !self.changed.contains_key(key))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.multi_base.is_empty()
    }

    /// Returns the recorded change of a connection, if any.
    pub fn change(&self, from_id: u32, to_id: u32) -> Option<&ConnectionChange> {
        self.changed.get(&(from_id, to_id))
    }

    /// Returns the data a changed connection had before its change, if it was changed.
    pub fn old_data(&self, from_id: u32, to_id: u32) -> Option<ConnectionData> {
        self.change(from_id, to_id).map(|c| c.old)
    }

    /// Replaces the data of the connection between two nodes (given by indices),
    /// after rolling back any earlier change of it. Returns false if there's
    /// no such connection.
    pub fn add_connection_change(
        &mut self,
        g: &mut RoutingGraph,
        from: u32,
        to: u32,
        new: ConnectionData,
        forward: bool,
    ) -> bool {
        let (from_id, to_id) = (g.item_id(from), g.item_id(to));
        let Some(conn) = g.connection_to(from, to, forward) else {
            log::warn!("no connection {:#x} → {:#x} to change", from_id, to_id);
            return false;
        };

        self.roll_back_one(g, from_id, to_id);

        let key = (from_id, to_id);
        let old = *g.data(conn.data);
        let is_multi = g.is_multi_connection(from_id, to_id);
        if is_multi {
            self.multi_base.entry(key).or_insert((conn.data, old));
        }

        *g.data_mut(conn.data) = new;
        self.changed.insert(
            key,
            ConnectionChange {
                data: conn.data,
                old,
                new,
                forward,
            },
        );

        if is_multi {
            self.rederive_multi(g, key);
        }
        self.update_multi(g, from_id, to_id, false);
        true
    }

    /// Convenience wrapper around [DisturbanceStorage::add_connection_change]
    /// for a forward connection.
    pub fn change_connection_costs(
        &mut self,
        g: &mut RoutingGraph,
        from: u32,
        to: u32,
        new: ConnectionData,
    ) -> bool {
        self.add_connection_change(g, from, to, new, true)
    }

    /// Forbids every vehicle from using the outgoing connections of a node.
    pub fn avoid_node(&mut self, g: &mut RoutingGraph, node: u32) -> usize {
        let outgoing = g.connections(node, true).to_vec();
        outgoing
            .into_iter()
            .filter(|conn| {
                let mut new = *g.data(conn.data);
                new.vehicles = 0;
                self.add_connection_change(g, node, conn.node, new, true)
            })
            .count()
    }

    /// Restores the data of a single connection. Returns false if it wasn't changed.
    ///
    /// On a multi-connection only the change made directly on it is undone;
    /// changes of its constituents stay in effect.
    pub fn roll_back_one(&mut self, g: &mut RoutingGraph, from_id: u32, to_id: u32) -> bool {
        let key = (from_id, to_id);
        let Some(change) = self.changed.remove(&key) else {
            return false;
        };

        if self.multi_base.contains_key(&key) {
            self.rederive_multi(g, key);
        } else {
            *g.data_mut(change.data) = change.old;
        }

        self.update_multi(g, from_id, to_id, true);
        true
    }

    /// Restores every changed connection. Returns the number of restored connections.
    pub fn roll_back_all(&mut self, g: &mut RoutingGraph) -> usize {
        let count = self.len();

        for (key, change) in &self.changed {
            if !self.multi_base.contains_key(key) {
                *g.data_mut(change.data) = change.old;
            }
        }
        for &(data, pristine) in self.multi_base.values() {
            *g.data_mut(data) = pristine;
        }

        self.changed.clear();
        self.nodes_in_multi.clear();
        self.multi_base.clear();
        if count > 0 {
            log::debug!("rolled back {} connection changes", count);
        }
        count
    }

    /// Applies a batch of disturbances, skipping the ones not resolvable on this map.
    /// Returns the number of applied disturbances.
    pub fn add_disturbances(&mut self, g: &mut RoutingGraph, list: &[Disturbance]) -> usize {
        let mut added = 0;

        for d in list {
            let mut node_id = d.node_id;
            if g.is_overview() && !crate::map::is_overview_map(d.map_id) {
                match g.translate_to_higher(d.map_id, d.node_id) {
                    Some(higher) => node_id = higher,
                    None => continue,
                }
            } else if d.map_id != g.map_id() {
                continue;
            }

            let Some(node) = g.node_index(node_id) else {
                log::debug!("disturbance on unknown node {:#x}", node_id);
                continue;
            };

            let outgoing = g.connections(node, true).to_vec();
            match d.kind {
                DisturbanceKind::Blocked => {
                    self.avoid_node(g, node);
                    added += 1;
                }

                DisturbanceKind::Factor(factor) => {
                    for conn in &outgoing {
                        let old = *g.data(conn.data);
                        let mut cost_c = (old.cost_b as f64 * factor as f64).min(INFINITY as f64) as u32;
                        if cost_c == old.cost_b {
                            cost_c = cost_c.saturating_add(1);
                        }
                        let new = ConnectionData::new(old.cost_a, old.cost_b, cost_c, old.vehicles);
                        self.change_connection_costs(g, node, conn.node, new);
                    }
                    if !outgoing.is_empty() {
                        added += 1;
                    }
                }

                DisturbanceKind::Delay { seconds } => {
                    let delay = sec_to_time_cost(seconds);
                    for conn in &outgoing {
                        let old = *g.data(conn.data);
                        let cost_c = old.cost_b.saturating_add(delay);
                        let new = ConnectionData::new(old.cost_a, old.cost_b, cost_c, old.vehicles);
                        self.change_connection_costs(g, node, conn.node, new);
                    }
                    added += 1;
                }
            }
        }

        added
    }

    /// Registers (or unregisters) a changed connection with every multi-connection
    /// passing through its start, and re-derives them.
    fn update_multi(&mut self, g: &mut RoutingGraph, from_id: u32, to_id: u32, removing: bool) {
        for multi in g.lookup_expanded_nodes(from_id) {
            if multi == (from_id, to_id) {
                continue;
            }

            if removing {
                if let Some(set) = self.nodes_in_multi.get_mut(&multi) {
                    set.remove(&(from_id, to_id));
                }
            } else {
                self.nodes_in_multi
                    .entry(multi)
                    .or_default()
                    .insert((from_id, to_id));
            }

            self.rederive_multi(g, multi);
        }
    }

    /// Recomputes a multi-connection from its unchanged data, all changes of its
    /// constituents and finally the change made directly on it.
    fn rederive_multi(&mut self, g: &mut RoutingGraph, multi: (u32, u32)) {
        let constituents = match self.nodes_in_multi.get(&multi) {
            Some(set) if !set.is_empty() => set.clone(),
            _ => {
                self.nodes_in_multi.remove(&multi);
                BTreeSet::new()
            }
        };
        let direct = self.changed.get(&multi).copied();

        if constituents.is_empty() && direct.is_none() {
            if let Some((data, pristine)) = self.multi_base.remove(&multi) {
                *g.data_mut(data) = pristine;
            }
            return;
        }

        let (data, pristine) = match self.multi_base.get(&multi) {
            Some(&base) => base,
            None => {
                let conn = match (g.node_index(multi.0), g.node_index(multi.1)) {
                    (Some(from), Some(to)) => g.connection_to(from, to, true),
                    _ => None,
                };
                let Some(conn) = conn else {
                    log::warn!("multi-connection {:#x} → {:#x} is missing", multi.0, multi.1);
                    return;
                };
                let base = (conn.data, *g.data(conn.data));
                self.multi_base.insert(multi, base);
                base
            }
        };

        let mut live = pristine;
        let penalties = *g.penalties();
        for key in &constituents {
            if let Some(change) = self.changed.get(key) {
                change.apply_diff(&mut live, &penalties);
            }
        }
        if let Some(change) = direct {
            change.apply_layer(&mut live);
        }

        *g.data_mut(data) = live;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{EntryRestriction, MapBuilder, RoutingMap};
    use crate::vehicle::{ALL_VEHICLES, PASSENGER_CAR, PEDESTRIAN};

    //  1 ──▶ 2 ──▶ 3 ──▶ 4
    //  │                 ▲
    //  └──── multi ──────┘
    //
    // The 1 → 4 shortcut expands into 1 → 2 → 3 → 4.
    fn shortcut_map() -> RoutingMap {
        let mut b = MapBuilder::new(1);
        for i in 1..=4 {
            b.add_node(i, 0, 0, EntryRestriction::NoRestrictions);
        }
        b.add_connection(1, 2, ConnectionData::new(10, 100, 100, ALL_VEHICLES))
            .add_connection(2, 3, ConnectionData::new(10, 200, 200, ALL_VEHICLES))
            .add_connection(3, 4, ConnectionData::new(10, 300, 300, ALL_VEHICLES))
            .add_connection(1, 4, ConnectionData::new(30, 600, 600, ALL_VEHICLES))
            .add_expansion(2, 1, 4)
            .add_expansion(3, 1, 4);
        b.build().unwrap()
    }

    fn data_of(m: &RoutingMap, from_id: u32, to_id: u32) -> ConnectionData {
        let g = m.graph();
        let conn = g
            .connection_to(g.node_index(from_id).unwrap(), g.node_index(to_id).unwrap(), true)
            .unwrap();
        *g.data(conn.data)
    }

    fn change_c(m: &mut RoutingMap, from_id: u32, to_id: u32, cost_c: u32) {
        let mut new = data_of(m, from_id, to_id);
        new.cost_c = cost_c;
        m.change_connection_costs(from_id, to_id, true, new).unwrap();
    }

    #[test]
    fn round_trip() {
        let mut m = shortcut_map();
        let before = data_of(&m, 1, 2);

        let g = &mut m.graph;
        let (from, to) = (g.node_index(1).unwrap(), g.node_index(2).unwrap());
        let new = ConnectionData::new(1, 2, 3, PEDESTRIAN);
        assert!(m.temp.add_connection_change(g, from, to, new, true));
        assert_eq!(data_of(&m, 1, 2), new);

        let g = &mut m.graph;
        assert!(m.temp.roll_back_one(g, 1, 2));
        assert!(!m.temp.roll_back_one(g, 1, 2));
        assert_eq!(data_of(&m, 1, 2), before);
        assert!(m.temp.is_empty());
    }

    #[test]
    fn repeated_change_keeps_first_old_data() {
        let mut m = shortcut_map();
        let before = data_of(&m, 3, 4);
        change_c(&mut m, 3, 4, 400);
        change_c(&mut m, 3, 4, 500);
        assert_eq!(m.disturbances(true).old_data(3, 4), Some(before));
        m.roll_back(true);
        assert_eq!(data_of(&m, 3, 4), before);
    }

    #[test]
    fn multi_aggregation_is_order_independent() {
        let mut a = shortcut_map();
        change_c(&mut a, 2, 3, 250);
        change_c(&mut a, 3, 4, 390);

        let mut b = shortcut_map();
        change_c(&mut b, 3, 4, 390);
        change_c(&mut b, 2, 3, 250);

        assert_eq!(data_of(&a, 1, 4).cost_c, 600 + 50 + 90);
        assert_eq!(data_of(&a, 1, 4), data_of(&b, 1, 4));
    }

    #[test]
    fn multi_rollback_of_one_constituent() {
        let mut m = shortcut_map();
        change_c(&mut m, 2, 3, 250);
        change_c(&mut m, 3, 4, 390);

        let g = &mut m.graph;
        assert!(m.temp.roll_back_one(g, 2, 3));
        assert_eq!(data_of(&m, 1, 4).cost_c, 690);

        let g = &mut m.graph;
        assert!(m.temp.roll_back_one(g, 3, 4));
        assert_eq!(data_of(&m, 1, 4), ConnectionData::new(30, 600, 600, ALL_VEHICLES));
        assert!(m.temp.is_empty());
    }

    #[test]
    fn multi_blocked_by_constituent() {
        let mut m = shortcut_map();
        m.avoid_node(3, true).unwrap();
        assert_eq!(data_of(&m, 3, 4).vehicles, 0);
        assert_eq!(data_of(&m, 1, 4).vehicles, 0);
        assert_eq!(data_of(&m, 1, 4).cost_c, 600);

        change_c(&mut m, 2, 3, INFINITY);
        assert!(data_of(&m, 1, 4).is_blocked());

        assert_eq!(m.roll_back(true), 3);
        assert_eq!(data_of(&m, 1, 4), ConnectionData::new(30, 600, 600, ALL_VEHICLES));
    }

    #[test]
    fn avoided_multi_stays_avoided_after_constituent_change() {
        let mut m = shortcut_map();
        m.avoid_node(1, true).unwrap();
        change_c(&mut m, 2, 3, 250);

        assert_eq!(data_of(&m, 1, 4).vehicles, 0);
        assert_eq!(data_of(&m, 1, 4).cost_c, 650);

        assert_eq!(m.roll_back(true), 3);
        assert_eq!(data_of(&m, 1, 4), ConnectionData::new(30, 600, 600, ALL_VEHICLES));
        assert!(m.disturbances(true).is_empty());
    }

    #[test]
    fn direct_change_after_constituent_change() {
        let mut m = shortcut_map();
        change_c(&mut m, 2, 3, 250);
        assert_eq!(data_of(&m, 1, 4).cost_c, 650);

        change_c(&mut m, 1, 4, 700);
        assert_eq!(data_of(&m, 1, 4).cost_c, 700);
        assert_eq!(m.disturbances(true).old_data(1, 4).map(|d| d.cost_c), Some(650));

        change_c(&mut m, 3, 4, 390);
        assert_eq!(data_of(&m, 1, 4).cost_c, 790);

        let g = &mut m.graph;
        assert!(m.temp.roll_back_one(g, 1, 4));
        assert_eq!(data_of(&m, 1, 4).cost_c, 740);

        assert_eq!(m.roll_back(true), 3);
        assert_eq!(data_of(&m, 1, 4), ConnectionData::new(30, 600, 600, ALL_VEHICLES));
    }

    #[test]
    fn constituent_change_after_direct_change() {
        let mut m = shortcut_map();
        change_c(&mut m, 1, 4, 700);
        change_c(&mut m, 2, 3, 250);
        assert_eq!(data_of(&m, 1, 4).cost_c, 750);

        let g = &mut m.graph;
        assert!(m.temp.roll_back_one(g, 1, 4));
        assert_eq!(data_of(&m, 1, 4).cost_c, 650);
        assert_eq!(m.disturbances(true).len(), 2);

        let g = &mut m.graph;
        assert!(m.temp.roll_back_one(g, 2, 3));
        assert_eq!(data_of(&m, 1, 4), ConnectionData::new(30, 600, 600, ALL_VEHICLES));
        assert!(m.disturbances(true).is_empty());
    }

    #[test]
    fn constituent_rollback_keeps_direct_change() {
        let mut m = shortcut_map();
        m.avoid_node(3, true).unwrap();
        change_c(&mut m, 1, 4, 500);
        assert_eq!(data_of(&m, 1, 4), ConnectionData::new(30, 600, 500, 0));

        let g = &mut m.graph;
        assert!(m.temp.roll_back_one(g, 3, 4));
        assert_eq!(data_of(&m, 1, 4), ConnectionData::new(30, 600, 500, ALL_VEHICLES));
    }

    #[test]
    fn disturbances_touch_only_cost_c() {
        let mut m = shortcut_map();
        let list = [
            Disturbance::new(1, 2, DisturbanceKind::Factor(1.5)),
            Disturbance::new(1, 3, DisturbanceKind::Delay { seconds: 36 }),
            Disturbance::new(1, 99, DisturbanceKind::Blocked),
            Disturbance::new(2, 1, DisturbanceKind::Blocked),
        ];
        assert_eq!(m.add_disturbances(&list, false), 2);

        assert_eq!(data_of(&m, 2, 3), ConnectionData::new(10, 200, 300, ALL_VEHICLES));
        assert_eq!(data_of(&m, 3, 4), ConnectionData::new(10, 300, 800, ALL_VEHICLES));
        assert_eq!(data_of(&m, 1, 2), ConnectionData::new(10, 100, 100, ALL_VEHICLES));
        assert!(m.disturbances(true).is_empty());
        assert!(!m.disturbances(false).is_empty());
    }

    #[test]
    fn blocking_disturbance() {
        let mut m = shortcut_map();
        let list = [Disturbance::new(1, 1, DisturbanceKind::Blocked)];
        assert_eq!(m.add_disturbances(&list, true), 1);
        assert_eq!(data_of(&m, 1, 2).vehicles & PASSENGER_CAR, 0);
        assert_eq!(data_of(&m, 1, 4).vehicles, 0);
    }

    #[test]
    fn factor_always_changes_cost() {
        let mut m = shortcut_map();
        let list = [Disturbance::new(1, 1, DisturbanceKind::Factor(1.0))];
        m.add_disturbances(&list, true);
        assert_eq!(data_of(&m, 1, 2).cost_c, 101);
    }
}
