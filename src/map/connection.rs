// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::config::Penalties;
use crate::vehicle::{AVOID_HIGHWAY, AVOID_TOLL_ROAD, PEDESTRIAN};
use crate::INFINITY;

/// Speed used to convert seconds into time cost, in meters per second (50 km/h).
pub const NORMAL_SPEED_MS: f64 = 50.0 / 3.6;

/// Converts seconds into time cost units, so that time and distance costs are comparable.
#[inline]
pub fn sec_to_time_cost(seconds: u32) -> u32 {
    (seconds as f64 * NORMAL_SPEED_MS).round().min(INFINITY as f64) as u32
}

/// Inverse of [sec_to_time_cost].
#[inline]
pub fn time_cost_to_sec(cost: u32) -> u32 {
    (cost as f64 / NORMAL_SPEED_MS).round() as u32
}

/// Costs and vehicle restrictions of a single connection, shared between
/// its forward and backward representation.
///
/// `cost_a` is a distance (in meters), `cost_b` is a time, `cost_c` is a time including
/// disturbances. `cost_c == INFINITY` means the connection is blocked for vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionData {
    pub cost_a: u32,
    pub cost_b: u32,
    pub cost_c: u32,
    pub vehicles: u32,
}

impl ConnectionData {
    pub fn new(cost_a: u32, cost_b: u32, cost_c: u32, vehicles: u32) -> Self {
        Self {
            cost_a,
            cost_b,
            cost_c,
            vehicles,
        }
    }

    /// Returns the penalty flags applicable to a traveller with the given mask.
    #[inline]
    fn penalized(&self, traveller: u32) -> u32 {
        traveller & self.vehicles & (AVOID_TOLL_ROAD | AVOID_HIGHWAY)
    }

    fn penalize(&self, cost: u32, traveller: u32, toll_extra: u32, p: &Penalties) -> u32 {
        let flags = self.penalized(traveller);
        if flags == 0 {
            return cost;
        }

        let mut cur = cost;
        if flags & AVOID_HIGHWAY != 0 {
            cur = (cur as f32 * p.highway_factor).min(INFINITY as f32) as u32;
        }
        if flags & AVOID_TOLL_ROAD != 0 {
            cur = cur.saturating_add(toll_extra);
        }
        cur
    }

    /// Distance cost, including the avoidance penalties of the traveller.
    pub fn cost_a(&self, traveller: u32, p: &Penalties) -> u32 {
        self.penalize(self.cost_a, traveller, p.toll_road_distance_m, p)
    }

    /// Time cost, including the avoidance penalties of the traveller.
    pub fn cost_b(&self, traveller: u32, p: &Penalties) -> u32 {
        self.penalize(self.cost_b, traveller, sec_to_time_cost(p.toll_road_time_s), p)
    }

    /// Disturbed time cost, including the avoidance penalties of the traveller.
    pub fn cost_c(&self, traveller: u32, p: &Penalties) -> u32 {
        if self.cost_c == INFINITY {
            return INFINITY;
        }
        self.penalize(self.cost_c, traveller, sec_to_time_cost(p.toll_road_time_s), p)
    }

    /// Per-connection constant cost.
    #[inline]
    pub fn cost_d(&self) -> u32 {
        1
    }

    /// Vehicles allowed on the connection. When disturbed time is used and the
    /// connection is blocked, only pedestrians may still pass.
    #[inline]
    pub fn vehicle_restriction(&self, using_cost_c: bool) -> u32 {
        if using_cost_c && self.cost_c == INFINITY {
            self.vehicles & PEDESTRIAN
        } else {
            self.vehicles
        }
    }

    /// True if the connection is blocked for vehicles.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.cost_c == INFINITY
    }
}

/// A directed link from the owning node's perspective.
///
/// `node` is the index of the neighbour (the successor when stored among
/// forward connections, the predecessor among backward ones), and `data` indexes
/// the shared [ConnectionData] arena of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub node: u32,
    pub data: u32,
}

/// A link from a boundary node of this map to a node of another map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalConnection {
    pub map_id: u32,
    pub node_id: u32,
    pub data: ConnectionData,
}

/// A boundary node with its links into other maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalNode {
    /// Index of the node inside the map.
    pub node: u32,
    pub item_id: u32,
    pub connections: Vec<ExternalConnection>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::PASSENGER_CAR;

    #[test]
    fn time_cost_conversion() {
        assert_eq!(sec_to_time_cost(0), 0);
        assert_eq!(sec_to_time_cost(36), 500);
        assert_eq!(time_cost_to_sec(500), 36);
        assert_eq!(time_cost_to_sec(sec_to_time_cost(3600)), 3600);
    }

    #[test]
    fn penalties_only_when_both_masks_agree() {
        let p = Penalties {
            toll_road_time_s: 36,
            toll_road_distance_m: 1000,
            highway_factor: 2.0,
        };
        let highway_toll = ConnectionData::new(100, 200, 300, PASSENGER_CAR | AVOID_HIGHWAY | AVOID_TOLL_ROAD);

        assert_eq!(highway_toll.cost_a(PASSENGER_CAR, &p), 100);
        assert_eq!(highway_toll.cost_b(PASSENGER_CAR, &p), 200);

        assert_eq!(highway_toll.cost_a(PASSENGER_CAR | AVOID_HIGHWAY, &p), 200);
        assert_eq!(highway_toll.cost_a(PASSENGER_CAR | AVOID_TOLL_ROAD, &p), 1100);
        assert_eq!(highway_toll.cost_b(PASSENGER_CAR | AVOID_TOLL_ROAD, &p), 700);
        assert_eq!(
            highway_toll.cost_c(PASSENGER_CAR | AVOID_TOLL_ROAD | AVOID_HIGHWAY, &p),
            1100
        );

        let plain = ConnectionData::new(100, 200, 300, PASSENGER_CAR);
        assert_eq!(plain.cost_a(PASSENGER_CAR | AVOID_HIGHWAY, &p), 100);
    }

    #[test]
    fn blocked_connection_only_for_pedestrians() {
        let d = ConnectionData::new(10, 10, INFINITY, PASSENGER_CAR | PEDESTRIAN);
        assert!(d.is_blocked());
        assert_eq!(d.vehicle_restriction(true), PEDESTRIAN);
        assert_eq!(d.vehicle_restriction(false), PASSENGER_CAR | PEDESTRIAN);
        assert_eq!(d.cost_c(PASSENGER_CAR | AVOID_HIGHWAY, &Penalties::default()), INFINITY);
        assert_eq!(d.cost_d(), 1);
    }
}
