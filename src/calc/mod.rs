// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Route calculation on a single map.
//!
//! A [RouteCalculator] exclusively owns one [RoutingMap] and the queues used to route on it.
//! Every call to [RouteCalculator::route] runs through the same phases:
//!
//! 1. wait for the reset of the previous route (done on a background thread),
//! 2. apply the temporary disturbances of the request,
//! 3. seed the queues from the origins, classifying the origin edges by what the
//!    vehicle may do on them (drive, pass a no-throughfare area, or only walk),
//! 4. relax the graph until the destinations, or the boundary nodes of the map, are reached,
//! 5. read the cheapest path(s) back into the result [SubRouteList],
//! 6. roll back the temporary disturbances and start the next reset.
//!
//! When routing backward (`forward == false` on the incoming list), the roles of origins
//! and destinations are swapped: the search starts at the destinations and
//! follows the connections against their direction.

mod dijkstra;
mod error;
mod init;
mod orig_dest;
mod pref;
mod result;
mod sub_route;

pub use error::RouteError;
pub use orig_dest::{anti_offset_factor, offset_factor, CostSums, OrigDest, MAX_OFFSET};
pub use pref::{walking_time_cost, DriverPref, WALKING_SPEED_MS, WALK_FACTOR};
pub use sub_route::{
    additional_cost_marker, additional_cost_seconds, is_marker, External, ListKind, SubRoute,
    SubRouteList, ADD_COST_STATE_MASK, DRIVE_ITEM_ID, WALK_ITEM_ID,
};

use crate::config::{Options, Penalties};
use crate::disturbance::Disturbance;
use crate::distance::BoundingBox;
use crate::map::{DestNode, Gradient, NodeState, RoutingGraph, RoutingMap};
use crate::queue::{BucketHeap, NodeRef, PriorityQueue, QueueItem, TreeHeap};
use crate::INFINITY;
use result::ReadArgs;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Origins whose straight-line distance to every destination exceeds this many meters
/// first try to reach the boundary through the higher level nodes only.
pub const HIGHER_LEVEL_DISTANCE_M: u32 = 80_000;

/// A single route computation on one map.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub origins: Vec<OrigDest>,
    pub destinations: Vec<OrigDest>,

    /// Destinations of the whole route, on any map. Used to estimate the remaining cost
    /// when there are no destinations on this map.
    pub all_destinations: Vec<OrigDest>,

    pub pref: DriverPref,

    /// True for the first map of a route, where the origins are points on segments.
    /// Otherwise the origins are boundary nodes entered from a previous map.
    pub original_request: bool,

    /// Read a route to every destination, instead of only to the cheapest one.
    pub route_to_all: bool,

    /// Fill [External::sums] of the result.
    pub calc_cost_sums: bool,

    /// Applied before, and rolled back after, this route only.
    pub disturbances: Vec<Disturbance>,
}

/// Routing state of a single map: the map itself, the queues and the per-route scratch data.
#[derive(Debug)]
pub(crate) struct Engine {
    map: RoutingMap,

    /// The main frontier, of nodes reached in a way the vehicle may use.
    queue: BucketHeap,

    /// Nodes skipped while climbing to the higher level, for a second attempt.
    outside: TreeHeap,

    /// Edge of a restricted area, where driving may start.
    normal: TreeHeap,

    /// Nodes which may only be walked to.
    not_valid: TreeHeap,

    /// Nodes inside a no-throughfare area.
    throughfare: TreeHeap,

    /// Nodes reached in a way the vehicle may not use, with the data
    /// index of the connection used to reach them.
    invalid_nodes: Vec<(Option<u32>, u32)>,

    /// Synthetic destination nodes, see [DestNode].
    dest_nodes: Vec<DestNode>,

    cut_off: u32,
    inner_bbox: BoundingBox,
    outer_bbox: BoundingBox,

    /// True while routing the first map of a route, see [RouteRequest::original_request].
    original: bool,
}

impl Engine {
    fn new(map: RoutingMap) -> Self {
        Self {
            map,
            queue: BucketHeap::new(),
            outside: TreeHeap::new(),
            normal: TreeHeap::new(),
            not_valid: TreeHeap::new(),
            throughfare: TreeHeap::new(),
            invalid_nodes: Vec::new(),
            dest_nodes: Vec::new(),
            cut_off: INFINITY,
            inner_bbox: BoundingBox::EMPTY,
            outer_bbox: BoundingBox::EMPTY,
            original: false,
        }
    }

    /// Brings the engine back to the state before any route.
    fn reset(&mut self) {
        self.map.graph.reset();
        self.queue.reset();
        self.outside.reset();
        self.normal.reset();
        self.not_valid.reset();
        self.throughfare.reset();
        self.invalid_nodes.clear();
        self.dest_nodes.clear();
        self.cut_off = INFINITY;
        self.inner_bbox.reset();
        self.outer_bbox.reset();
        self.original = false;
    }

    #[inline]
    fn graph(&self) -> &RoutingGraph {
        &self.map.graph
    }

    #[inline]
    fn state(&self, node: u32) -> NodeState {
        self.map.graph.state(node)
    }

    #[inline]
    fn state_mut(&mut self, node: u32) -> &mut NodeState {
        self.map.graph.state_mut(node)
    }

    #[inline]
    fn penalties(&self) -> &Penalties {
        self.map.graph.penalties()
    }

    /// Queue entry of a map node, with its current estimated cost.
    #[inline]
    fn item(&self, node: u32) -> QueueItem {
        let s = self.state(node);
        QueueItem::new(NodeRef::Map(node), s.est_cost, s.dest)
    }

    #[inline]
    fn enqueue_main(&mut self, node: u32) {
        let item = self.item(node);
        self.queue.enqueue(item);
    }

    #[inline]
    fn enqueue_normal(&mut self, node: u32) {
        let item = self.item(node);
        self.normal.enqueue(item);
    }

    #[inline]
    fn enqueue_not_valid(&mut self, node: u32) {
        let item = self.item(node);
        self.not_valid.enqueue(item);
    }

    #[inline]
    fn enqueue_throughfare(&mut self, node: u32) {
        let item = self.item(node);
        self.throughfare.enqueue(item);
    }

    /// Sets both costs and the gradient of a node.
    #[inline]
    fn set_reached(&mut self, node: u32, cost: u32, gradient: Gradient) {
        let s = self.state_mut(node);
        s.real_cost = cost;
        s.est_cost = cost;
        s.gradient = Some(gradient);
    }

    fn real_route(
        &mut self,
        req: &RouteRequest,
        incoming: &SubRouteList,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        self.cut_off = incoming.cut_off;
        self.original = req.original_request;

        let mut origins = req.origins.clone();
        let mut dests = req.destinations.clone();
        for od in origins.iter_mut().chain(dests.iter_mut()) {
            od.resolve(&self.map.graph);
        }

        let args = ReadArgs {
            incoming,
            pref: &req.pref,
            forward: incoming.forward,
            calc_sums: req.calc_cost_sums,
        };

        let status = match incoming.kind {
            ListKind::LowerLevel => self.route_lower_level(req, origins, dests, args, result),
            ListKind::LowerLevelWalk => self.route_lower_level_walk(req, origins, dests, args, result),
            ListKind::HigherLevel => self.route_higher_level(req, &origins, &dests, args, result),
            kind @ (ListKind::HigherLevelForward
            | ListKind::HigherLevelBackward
            | ListKind::ProximityRequest
            | ListKind::PublicTransportation) => Err(RouteError::NotSupported(kind)),
        };

        log::debug!(
            "map {:#x}: {:?} route finished with {} sub-routes, cut-off {}",
            self.map.map_id(),
            incoming.kind,
            result.len(),
            self.cut_off,
        );
        result.cut_off = self.cut_off;
        status
    }

    fn route_lower_level(
        &mut self,
        req: &RouteRequest,
        mut origins: Vec<OrigDest>,
        mut dests: Vec<OrigDest>,
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let forward = args.forward;
        let pref = &req.pref;

        let same_segment = self.route_on_one_segment(&origins, &dests, args, result, req.route_to_all);
        if same_segment > 0 {
            log::debug!("{} routes on a single segment", same_segment);
        }

        let orig_dups = init::remove_dups(&mut origins, false);
        let dest_dups = init::remove_dups(&mut dests, true);
        if orig_dups + dest_dups > 0 {
            log::debug!("removed {} duplicated origins and {} duplicated destinations", orig_dups, dest_dups);
        }

        let (seeds, mut sought) = if forward { (origins, dests) } else { (dests, origins) };

        let unreachable = if self.graph().is_overview() {
            self.remove_unreachable(&mut sought, pref, !forward)
        } else {
            Vec::new()
        };

        self.init_route(req.original_request, &seeds, &sought, pref, forward)?;

        if sought.is_empty() && unreachable.is_empty() {
            return self.route_to_boundary(req, &seeds, args, result);
        }

        self.calc_cost_dijkstra(pref, &sought, forward, req.route_to_all);
        sought.extend(unreachable);

        if req.route_to_all {
            self.read_result_to_all(&sought, args, result)?;
            self.cut_off = INFINITY;
            self.read_result_to_external_connection(args, result)
        } else {
            self.read_result(&sought, args, result, true)
        }
    }

    /// Routes from the seeds to every boundary node, for maps without any destination.
    fn route_to_boundary(
        &mut self,
        req: &RouteRequest,
        seeds: &[OrigDest],
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let forward = args.forward;
        let pref = &req.pref;

        if self.graph().external_nodes().is_empty() {
            log::info!("map {:#x} has no external nodes", self.map.map_id());
            return Ok(());
        }

        let min_distance = seeds
            .iter()
            .map(|s| dijkstra::estimate_dist(s.lat, s.lon, &req.all_destinations, 1, 0, 0))
            .min()
            .unwrap_or(INFINITY);

        if req.original_request && min_distance > HIGHER_LEVEL_DISTANCE_M {
            self.outside.reset();
            self.update_lower_level_bbox(seeds);
            self.calc_cost_external_dijkstra(pref, true, forward, &req.all_destinations);

            let reached = self
                .graph()
                .external_nodes()
                .iter()
                .filter(|e| self.state(e.node).gradient.is_some())
                .take(3)
                .count();

            if reached <= 1 {
                log::debug!("only {} external nodes reached on the higher level, routing on all nodes", reached);
                while let Some(item) = self.outside.dequeue_unordered() {
                    self.queue.enqueue(item);
                }
                self.calc_cost_external_dijkstra(pref, false, forward, &req.all_destinations);
            }
        } else {
            self.calc_cost_external_dijkstra(pref, false, forward, &req.all_destinations);
        }

        self.read_result_to_external_connection(args, result)
    }

    fn route_lower_level_walk(
        &mut self,
        req: &RouteRequest,
        origins: Vec<OrigDest>,
        dests: Vec<OrigDest>,
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let forward = args.forward;
        let (seeds, sought) = if forward { (origins, dests) } else { (dests, origins) };

        self.init_route(req.original_request, &seeds, &sought, &req.pref, forward)?;
        if sought.is_empty() {
            self.calc_cost_external_dijkstra(&req.pref, false, forward, &req.all_destinations);
        } else {
            self.calc_cost_dijkstra(&req.pref, &sought, forward, false);
        }
        self.read_result_walk(&sought, args, result)
    }

    fn route_higher_level(
        &mut self,
        req: &RouteRequest,
        origins: &[OrigDest],
        dests: &[OrigDest],
        args: ReadArgs,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let sought = self.init_route_on_higher_level(req, origins, dests);
        if !self.queue.is_empty() {
            self.calc_cost_dijkstra(&req.pref, &sought, true, false);
        }
        self.read_result_on_higher_level(&sought, args, result)
    }
}

/// Computes routes on a single [RoutingMap].
///
/// The transient state of the map is reset after every route, on a background thread
/// unless disabled in [Options]; the next call waits for that reset to finish.
#[derive(Debug)]
pub struct RouteCalculator {
    engine: Arc<Mutex<Engine>>,
    reset_task: Option<JoinHandle<()>>,
    options: Options,
}

impl RouteCalculator {
    pub fn new(map: RoutingMap) -> Self {
        Self::with_options(map, Options::default())
    }

    pub fn with_options(map: RoutingMap, options: Options) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine::new(map))),
            reset_task: None,
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Blocks until the reset of the previous route has finished.
    pub fn wait_for_reset(&mut self) -> Result<(), RouteError> {
        if let Some(task) = self.reset_task.take() {
            task.join().map_err(|_| RouteError::ResetTaskPanicked)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Engine>, RouteError> {
        self.engine.lock().map_err(|_| RouteError::EnginePoisoned)
    }

    fn start_reset(&mut self) {
        if !self.options.background_reset {
            if let Ok(mut engine) = self.engine.lock() {
                engine.reset();
            }
            return;
        }

        let engine = Arc::clone(&self.engine);
        let spawned = std::thread::Builder::new()
            .name("routecalc-reset".to_string())
            .spawn(move || {
                if let Ok(mut engine) = engine.lock() {
                    let start = std::time::Instant::now();
                    engine.reset();
                    log::debug!("reset took {:?}", start.elapsed());
                }
            });

        match spawned {
            Ok(task) => self.reset_task = Some(task),
            Err(e) => {
                log::warn!("failed to spawn the reset thread, resetting synchronously: {}", e);
                if let Ok(mut engine) = self.engine.lock() {
                    engine.reset();
                }
            }
        }
    }

    /// Runs `f` with exclusive access to the map, for example to apply
    /// persistent disturbances between routes.
    pub fn with_map<R, F: FnOnce(&mut RoutingMap) -> R>(&mut self, f: F) -> Result<R, RouteError> {
        self.wait_for_reset()?;
        let mut engine = self.lock()?;
        Ok(f(&mut engine.map))
    }

    pub fn map_id(&mut self) -> Result<u32, RouteError> {
        self.with_map(|m| m.map_id())
    }

    /// Returns the id of the map on the given level of the hierarchy.
    pub fn higher_level_map_id(&mut self, level: u32) -> Result<Option<u32>, RouteError> {
        self.with_map(|m| m.graph().map_at_level(level))
    }

    pub fn neighbour_map_ids(&mut self) -> Result<Vec<u32>, RouteError> {
        self.with_map(|m| m.graph().neighbours().collect())
    }

    /// Computes a route on this map, appending the resulting sub-routes to `result`.
    ///
    /// The kind, direction and cut-off of the computation are taken from `incoming`,
    /// which also holds the sub-routes of the previous maps (to link the results with).
    /// On return, `result.cut_off` is the cost of the cheapest route found.
    pub fn route(
        &mut self,
        req: &RouteRequest,
        incoming: &SubRouteList,
        result: &mut SubRouteList,
    ) -> Result<(), RouteError> {
        let penalties = Penalties::from_env();
        self.wait_for_reset()?;

        let status = {
            let mut engine = self.lock()?;
            engine.map.graph.set_penalties(penalties);

            let applied = if req.disturbances.is_empty() {
                0
            } else {
                engine.map.add_disturbances(&req.disturbances, true)
            };
            if applied > 0 {
                log::debug!("applied {} temporary disturbances", applied);
            }

            let status = engine.real_route(req, incoming, result);

            if !req.disturbances.is_empty() {
                engine.map.roll_back(true);
            }
            status
        };

        if let Err(e) = status {
            log::error!("route on map failed: {}", e);
        } else {
            log::info!("route finished with {} sub-routes", result.len());
        }

        self.start_reset();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disturbance::{Disturbance, DisturbanceKind};
    use crate::map::{ConnectionData, EntryRestriction, MapBuilder};
    use crate::vehicle::{ALL_VEHICLES, PEDESTRIAN};

    //   1 ──10──▶ 2 ──10──▶ 3
    //   │                   ▲
    //   └────────30─────────┘
    fn triangle() -> RouteCalculator {
        let mut b = MapBuilder::new(7);
        b.add_node(1, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(2, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(3, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(2, 3, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(1, 3, ConnectionData::new(30, 30, 30, ALL_VEHICLES));
        RouteCalculator::new(b.build().unwrap())
    }

    fn request(origin: OrigDest, dest: Option<OrigDest>) -> RouteRequest {
        RouteRequest {
            origins: vec![origin],
            destinations: dest.into_iter().collect(),
            original_request: true,
            ..Default::default()
        }
    }

    fn route(
        calc: &mut RouteCalculator,
        req: &RouteRequest,
        incoming: &SubRouteList,
    ) -> Result<SubRouteList, RouteError> {
        let mut result = SubRouteList::new(incoming.kind, incoming.forward);
        calc.route(req, incoming, &mut result)?;
        Ok(result)
    }

    fn only_route(result: &SubRouteList) -> (Vec<u32>, u32) {
        assert_eq!(result.len(), 1);
        let s = &result.sub_routes()[0];
        (s.route_nodes().collect(), s.cost())
    }

    #[test]
    fn cheapest_route() {
        let mut calc = triangle();
        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();

        assert_eq!(only_route(&result), (vec![1, 2, 3], 20));
        assert_eq!(result.cut_off, 20);

        let s = &result.sub_routes()[0];
        assert!(s.complete);
        assert_eq!(s.prev_sub_route_id, None);
        assert_eq!(s.externals[0].node_id, 3);
    }

    #[test]
    fn consecutive_routes_are_independent() {
        let mut calc = triangle();
        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));

        let first = route(&mut calc, &req, &SubRouteList::default()).unwrap();
        let second = route(&mut calc, &req, &SubRouteList::default()).unwrap();
        assert_eq!(first, second);

        let mut sync = triangle();
        sync.options.background_reset = false;
        let third = route(&mut sync, &req, &SubRouteList::default()).unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn avoided_node_is_driven_around() {
        let mut calc = triangle();
        calc.with_map(|m| m.avoid_node(2, false)).unwrap().unwrap();

        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();
        assert_eq!(only_route(&result), (vec![1, 3], 30));

        assert_eq!(calc.with_map(|m| m.roll_back(false)).unwrap(), 1);
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();
        assert_eq!(only_route(&result), (vec![1, 2, 3], 20));
    }

    #[test]
    fn backward_route() {
        let mut calc = triangle();
        let req = request(OrigDest::new(7, 1, MAX_OFFSET), Some(OrigDest::new(7, 3, 0)));
        let incoming = SubRouteList::new(ListKind::LowerLevel, false);
        let result = route(&mut calc, &req, &incoming).unwrap();

        assert_eq!(only_route(&result), (vec![1, 2, 3], 20));
        assert!(!result.sub_routes()[0].forward);
    }

    #[test]
    fn route_on_a_single_segment() {
        let mut calc = triangle();
        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 1, MAX_OFFSET)));
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();

        assert_eq!(only_route(&result), (vec![1], 10));
        let s = &result.sub_routes()[0];
        assert!(s.complete);
        assert_eq!((s.start_offset, s.end_offset), (0, MAX_OFFSET));
        assert_eq!(result.cut_off, 10);
    }

    #[test]
    fn unsupported_and_invalid_requests() {
        let mut calc = triangle();
        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        let incoming = SubRouteList::new(ListKind::HigherLevelForward, true);
        assert_eq!(
            route(&mut calc, &req, &incoming),
            Err(RouteError::NotSupported(ListKind::HigherLevelForward))
        );

        let req = request(OrigDest::new(8, 1, 0), Some(OrigDest::new(7, 3, 0)));
        assert_eq!(
            route(&mut calc, &req, &SubRouteList::default()),
            Err(RouteError::InvalidOrigins)
        );
    }

    //   1 ──10──▶ 2 ══5══▶ (map 8, node 5)
    #[test]
    fn route_to_boundary() {
        let mut b = MapBuilder::new(7);
        b.add_node(1, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(2, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_external_connection(2, 8, 5, ConnectionData::new(5, 5, 5, ALL_VEHICLES));
        let mut calc = RouteCalculator::new(b.build().unwrap());

        let req = request(OrigDest::new(7, 1, 0), None);
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();

        assert_eq!(only_route(&result), (vec![1, 2], 15));
        let s = &result.sub_routes()[0];
        assert!(!s.complete);
        assert_eq!((s.externals[0].map_id, s.externals[0].node_id), (8, 5));
    }

    //   (map 7) ══▶ 5 ──10──▶ 6
    #[test]
    fn continued_route_links_previous_sub_route() {
        let mut b = MapBuilder::new(8);
        b.add_node(5, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(6, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(5, 6, ConnectionData::new(10, 10, 10, ALL_VEHICLES));
        let mut calc = RouteCalculator::new(b.build().unwrap());

        let mut previous = SubRoute::new(7);
        previous.nodes = vec![1, 2];
        previous.add_external(External {
            map_id: 8,
            node_id: 5,
            cost: 15,
            est_cost: 15,
            lat: 0,
            lon: 0,
            sums: CostSums::default(),
        });
        let mut incoming = SubRouteList::default();
        assert_eq!(incoming.add_sub_route(previous), Some(0));

        let mut req = request(OrigDest::new(8, 5, 0).with_cost(15), Some(OrigDest::new(8, 6, 0)));
        req.original_request = false;
        let result = route(&mut calc, &req, &incoming).unwrap();

        assert_eq!(only_route(&result), (vec![5, 6], 25));
        assert_eq!(result.sub_routes()[0].prev_sub_route_id, Some(0));
    }

    /// A list with a single sub-route leading into the given node.
    fn incoming_from(map_id: u32, node_id: u32, kind: ListKind) -> SubRouteList {
        let mut previous = SubRoute::new(map_id);
        previous.add_external(External {
            map_id,
            node_id,
            cost: 0,
            est_cost: 0,
            lat: 0,
            lon: 0,
            sums: CostSums::default(),
        });
        let mut incoming = SubRouteList::new(kind, true);
        assert_eq!(incoming.add_sub_route(previous), Some(0));
        incoming
    }

    //          ┌──2000──▶ 6 ──1──▶ 9
    //   (7) ══▶ 5          ▲
    //          └──10──▶ 7 ─5000─┘
    #[test]
    fn boundary_seed_costs_are_not_raised() {
        let mut b = MapBuilder::new(8);
        for id in [5, 6, 7, 9] {
            b.add_node(id, 0, 0, EntryRestriction::NoRestrictions);
        }
        b.add_connection(5, 6, ConnectionData::new(2000, 2000, 2000, ALL_VEHICLES))
            .add_connection(5, 7, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(7, 6, ConnectionData::new(5000, 5000, 5000, ALL_VEHICLES))
            .add_connection(6, 9, ConnectionData::new(1, 1, 1, ALL_VEHICLES));
        let mut calc = RouteCalculator::new(b.build().unwrap());
        let incoming = incoming_from(8, 5, ListKind::LowerLevel);

        let mut req = request(OrigDest::new(8, 5, 0), Some(OrigDest::new(8, 9, 0)));
        req.original_request = false;
        let result = route(&mut calc, &req, &incoming).unwrap();

        assert_eq!(only_route(&result), (vec![5, 6, 9], 2001));
        assert_eq!(result.cut_off, 2001);
    }

    //   0x4000_0001 ──10──▶ 0x4000_0002 ──10──▶ 0x4000_0003 ──10──▶ 0x4000_0004
    //        │                                       ▲
    //        └───────────────────30──────────────────┘
    //
    // The overview map translates 1 into (7, 0x10), 3 into (9, 0x30) and 4 into (9, 0x40).
    #[test]
    fn route_on_overview_map() {
        let mut b = MapBuilder::new(0x8000_0001);
        for id in 1..=4 {
            b.add_node(0x4000_0000 | id, 0, 0, EntryRestriction::NoRestrictions);
        }
        b.add_connection(0x4000_0001, 0x4000_0002, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(0x4000_0002, 0x4000_0003, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(0x4000_0001, 0x4000_0003, ConnectionData::new(30, 30, 30, ALL_VEHICLES))
            .add_connection(0x4000_0003, 0x4000_0004, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_translation(7, 0x4000_0010, 0x4000_0001)
            .add_translation(9, 0x4000_0030, 0x4000_0003)
            .add_translation(9, 0x4000_0040, 0x4000_0004);
        let mut calc = RouteCalculator::new(b.build().unwrap());

        let req = request(
            OrigDest::new(7, 0x4000_0010, 0).with_cost(5),
            Some(OrigDest::new(9, 0x4000_0030, 0)),
        );
        let incoming = incoming_from(7, 0x4000_0010, ListKind::HigherLevel);
        let result = route(&mut calc, &req, &incoming).unwrap();

        assert_eq!(only_route(&result), (vec![0x4000_0001, 0x4000_0002, 0x4000_0003], 25));
        let s = &result.sub_routes()[0];
        assert!(s.complete);
        assert_eq!(s.prev_sub_route_id, Some(0));
        assert_eq!((s.externals[0].map_id, s.externals[0].node_id), (9, 0x4000_0040));
        assert_eq!(result.cut_off, 25);
    }

    //   1 ──10──▶ 2 ──10──▶ 3
    //   │                   ▲
    //   └──5 (on foot)──────┘
    fn footpath_triangle() -> RouteCalculator {
        let mut b = MapBuilder::new(7);
        b.add_node(1, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(2, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(3, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(2, 3, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(1, 3, ConnectionData::new(5, 5, 5, PEDESTRIAN));
        RouteCalculator::new(b.build().unwrap())
    }

    #[test]
    fn walking_route() {
        let mut calc = footpath_triangle();
        let mut req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        req.pref = DriverPref::new(PEDESTRIAN);
        let incoming = SubRouteList::new(ListKind::LowerLevelWalk, true);
        let result = route(&mut calc, &req, &incoming).unwrap();

        assert_eq!(only_route(&result), (vec![1, 3], 5));
        assert_eq!(result.sub_routes()[0].nodes[0], WALK_ITEM_ID);

        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();
        assert_eq!(only_route(&result), (vec![1, 2, 3], 20));
    }

    #[test]
    fn route_to_every_destination() {
        let mut calc = triangle();
        let mut req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 2, 0)));
        req.destinations.push(OrigDest::new(7, 3, 0));
        req.route_to_all = true;
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();

        let routes: Vec<(Vec<u32>, u32)> = result
            .sub_routes()
            .iter()
            .map(|s| (s.route_nodes().collect(), s.cost()))
            .collect();
        assert_eq!(routes, vec![(vec![1, 2], 10), (vec![1, 2, 3], 20)]);
        assert!(result.sub_routes().iter().all(|s| s.complete));
    }

    #[test]
    fn request_disturbances_last_for_one_route() {
        let mut calc = triangle();
        let mut req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        req.disturbances = vec![Disturbance::new(7, 2, DisturbanceKind::Blocked)];

        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();
        assert_eq!(only_route(&result), (vec![1, 3], 30));
        assert!(calc.with_map(|m| m.disturbances(true).is_empty()).unwrap());

        req.disturbances.clear();
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();
        assert_eq!(only_route(&result), (vec![1, 2, 3], 20));
    }

    #[test]
    fn cost_sums_of_the_route() {
        let mut b = MapBuilder::new(7);
        b.add_node(1, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(2, 0, 0, EntryRestriction::NoRestrictions)
            .add_node(3, 0, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(100, 10, 12, ALL_VEHICLES))
            .add_connection(2, 3, ConnectionData::new(200, 10, 10, ALL_VEHICLES))
            .add_connection(1, 3, ConnectionData::new(300, 30, 30, ALL_VEHICLES));
        let mut calc = RouteCalculator::new(b.build().unwrap());

        let mut req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        req.calc_cost_sums = true;
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();

        assert_eq!(only_route(&result), (vec![1, 2, 3], 20));
        let s = &result.sub_routes()[0];
        assert_eq!(s.externals[0].sums, CostSums::new(300, 20, 22));
        assert!(s.nodes.iter().any(|&id| additional_cost_seconds(id).is_some()));
    }

    //   1 ──10──▶ 2 ──10──▶ 3
    //   │
    //   └──1──▶ 4 ──1──▶ 5 ──1──▶ 6
    //
    // 5 and 6 lie about 9 km away from the rest.
    #[test]
    fn estimate_keeps_distant_nodes_unexpanded() {
        let mut b = MapBuilder::new(7);
        for id in 1..=4 {
            b.add_node(id, 0, 0, EntryRestriction::NoRestrictions);
        }
        b.add_node(5, 1_000_000, 0, EntryRestriction::NoRestrictions)
            .add_node(6, 1_000_000, 0, EntryRestriction::NoRestrictions)
            .add_connection(1, 2, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(2, 3, ConnectionData::new(10, 10, 10, ALL_VEHICLES))
            .add_connection(1, 4, ConnectionData::new(1, 1, 1, ALL_VEHICLES))
            .add_connection(4, 5, ConnectionData::new(1, 1, 1, ALL_VEHICLES))
            .add_connection(5, 6, ConnectionData::new(1, 1, 1, ALL_VEHICLES));
        let mut e = Engine::new(b.build().unwrap());

        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        let mut result = SubRouteList::default();
        e.real_route(&req, &SubRouteList::default(), &mut result).unwrap();
        assert_eq!(only_route(&result), (vec![1, 2, 3], 20));

        let n5 = e.graph().node_index(5).unwrap();
        let n6 = e.graph().node_index(6).unwrap();
        assert_eq!(e.state(n5).real_cost, 2);
        assert!(e.state(n5).est_cost > 1000);
        assert_eq!(e.state(n6).real_cost, INFINITY);
    }

    //   1 ┄┄▶ 2 ┄┄▶ 3 ──10──▶ 4
    //
    // Dotted connections may only be walked.
    #[test]
    fn walk_out_to_the_first_drivable_node() {
        let mut b = MapBuilder::new(7);
        for id in 1..=4 {
            b.add_node(id, 0, 0, EntryRestriction::NoRestrictions);
        }
        b.add_connection(1, 2, ConnectionData::new(10, 10, 10, PEDESTRIAN))
            .add_connection(2, 3, ConnectionData::new(10, 10, 10, PEDESTRIAN))
            .add_connection(3, 4, ConnectionData::new(10, 10, 10, ALL_VEHICLES));
        let mut calc = RouteCalculator::new(b.build().unwrap());

        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 4, 0)));
        let result = route(&mut calc, &req, &SubRouteList::default()).unwrap();

        let walk = walking_time_cost(10);
        assert_eq!(only_route(&result), (vec![1, 2, 3, 4], 2 * walk + 10));
    }

    #[test]
    fn synchronous_reset_at_the_end_of_the_route() {
        let mut calc = triangle();
        calc.options.background_reset = false;
        let generation = calc.with_map(|m| m.graph().generation()).unwrap();

        let req = request(OrigDest::new(7, 1, 0), Some(OrigDest::new(7, 3, 0)));
        route(&mut calc, &req, &SubRouteList::default()).unwrap();

        assert!(calc.reset_task.is_none());
        assert_eq!(calc.with_map(|m| m.graph().generation()).unwrap(), generation + 1);
    }

    #[test]
    fn panic_while_holding_the_map_poisons_the_calculator() {
        let mut calc = triangle();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = calc.with_map(|_| -> u32 { panic!("callback failed") });
        }));
        assert!(outcome.is_err());

        assert_eq!(calc.map_id(), Err(RouteError::EnginePoisoned));
        assert_eq!(calc.wait_for_reset(), Ok(()));
    }
}
