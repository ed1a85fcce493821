// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Route computation over tiled, hierarchical road networks.
//!
//! A road network is split into [maps](map::RoutingMap) (tiles), each holding a directed
//! graph of segment nodes with three cost kinds per connection: distance (A), time (B)
//! and disturbed time (C). Detailed maps are linked together by external connections,
//! and to overview maps by translation tables.
//!
//! A [RouteCalculator] owns a single map and computes the part of a route lying on it,
//! appending [sub-routes](calc::SubRoute) to a [SubRouteList]. Stitching the sub-routes
//! of neighbouring maps is left to the caller, through [calc::SubRoute::prev_sub_route_id].
//!
//! Temporary and persistent changes of connection costs ("disturbances") are supported
//! through [map::RoutingMap] and [RouteRequest::disturbances].
//!
//! # Example
//!
//! ```no_run
//! use routecalc::{calc, map};
//!
//! let tile = map::load_from_file("path/to/tile.xml.gz", map::FileFormat::Unknown)
//!     .expect("failed to load the map tile");
//! let map_id = tile.map_id();
//! let mut calculator = routecalc::RouteCalculator::new(tile);
//!
//! let request = routecalc::RouteRequest {
//!     origins: vec![calc::OrigDest::new(map_id, 0x4000_0001, 0)],
//!     destinations: vec![calc::OrigDest::new(map_id, 0x4000_0107, calc::MAX_OFFSET)],
//!     original_request: true,
//!     ..Default::default()
//! };
//!
//! let mut result = routecalc::SubRouteList::default();
//! calculator
//!     .route(&request, &routecalc::SubRouteList::default(), &mut result)
//!     .expect("failed to find route");
//!
//! if let Some(route) = result.cheapest_complete() {
//!     println!("Route: {:?} (cost {})", route.route_nodes().collect::<Vec<_>>(), route.cost());
//! }
//! ```

pub mod calc;
pub mod config;
pub mod distance;
pub mod disturbance;
pub mod map;
pub mod queue;
pub mod vehicle;

pub use calc::{DriverPref, OrigDest, RouteCalculator, RouteError, RouteRequest, SubRouteList};
pub use config::{Options, Penalties};
pub use map::{MapBuilder, RoutingMap};

/// Cost of unreached nodes and impassable connections.
pub const INFINITY: u32 = u32::MAX;
