// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::config::Penalties;
use crate::map::{ConnectionData, NORMAL_SPEED_MS};
use crate::vehicle::{self, PASSENGER_CAR, PEDESTRIAN};
use crate::INFINITY;

/// Multiplier of the distance cost of walked connections.
pub const WALK_FACTOR: u32 = 2;

/// Assumed walking speed, in meters per second (5 km/h).
pub const WALKING_SPEED_MS: f64 = 5.0 / 3.6;

/// Converts a walked distance (in meters) into time cost units.
#[inline]
pub fn walking_time_cost(cost_a: u32) -> u32 {
    let seconds = cost_a as f64 / WALKING_SPEED_MS;
    (seconds * NORMAL_SPEED_MS).round().min(INFINITY as f64) as u32
}

#[inline]
pub(crate) fn saturate(v: u64) -> u32 {
    v.min(INFINITY as u64) as u32
}

/// Preferences of the traveller: weights of the connection costs and the vehicle mask.
///
/// The cost of a connection is `a·costA + b·costB + c·costC + d·costD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverPref {
    pub cost_a: u32,
    pub cost_b: u32,
    pub cost_c: u32,
    pub cost_d: u32,

    /// Mask of [vehicle](crate::vehicle) bits, optionally with the avoidance flags.
    pub vehicle: u32,

    /// Time of the request, in seconds since the Unix epoch.
    pub time: u32,
}

impl Default for DriverPref {
    fn default() -> Self {
        Self {
            cost_a: 0,
            cost_b: 1,
            cost_c: 0,
            cost_d: 0,
            vehicle: PASSENGER_CAR,
            time: 0,
        }
    }
}

impl DriverPref {
    /// Creates preferences minimizing the undisturbed travel time of the given vehicles.
    pub fn new(vehicle: u32) -> Self {
        Self {
            vehicle,
            ..Default::default()
        }
    }

    pub fn with_costs(mut self, a: u32, b: u32, c: u32, d: u32) -> Self {
        self.cost_a = a;
        self.cost_b = b;
        self.cost_c = c;
        self.cost_d = d;
        self
    }

    /// True if disturbances should be considered, in which case blocked
    /// connections are closed for vehicles.
    #[inline]
    pub fn using_cost_c(&self) -> bool {
        self.cost_c != 0
    }

    /// True if the traveller may walk.
    #[inline]
    pub fn is_walking(&self) -> bool {
        vehicle::is_walking(self.vehicle)
    }

    /// True if the traveller does nothing but walk.
    #[inline]
    pub fn only_walking(&self) -> bool {
        self.vehicle == PEDESTRIAN
    }

    #[inline]
    pub fn is_driving(&self) -> bool {
        vehicle::is_driving(self.vehicle)
    }

    /// True if the traveller's vehicle may use the connection.
    #[inline]
    pub fn allows(&self, d: &ConnectionData) -> bool {
        self.vehicle & d.vehicle_restriction(self.using_cost_c()) != 0
    }

    /// Weighted cost of a connection with the preferred weights.
    #[inline]
    pub fn connection_cost(&self, d: &ConnectionData, p: &Penalties) -> u32 {
        self.weighted_cost(d, p, self.cost_a, self.cost_b, self.cost_c, self.cost_d)
    }

    /// Weighted cost of a connection, with custom weights and the traveller's penalties.
    pub fn weighted_cost(&self, d: &ConnectionData, p: &Penalties, a: u32, b: u32, c: u32, dd: u32) -> u32 {
        let v = self.vehicle;
        let mut sum = 0_u64;
        if a != 0 {
            sum += a as u64 * d.cost_a(v, p) as u64;
        }
        if b != 0 {
            sum += b as u64 * d.cost_b(v, p) as u64;
        }
        if c != 0 {
            sum += c as u64 * d.cost_c(v, p) as u64;
        }
        if dd != 0 {
            sum += dd as u64 * d.cost_d() as u64;
        }
        saturate(sum)
    }

    /// Cost of walking along a connection: the distance is charged [WALK_FACTOR] times,
    /// and both time weights are charged with the walking time.
    pub fn connection_cost_walk(&self, d: &ConnectionData, p: &Penalties) -> u32 {
        self.walk_cost(d.cost_a(self.vehicle, p))
    }

    /// Cost of walking the given distance (in meters).
    pub fn walk_cost(&self, cost_a: u32) -> u32 {
        let distance = self.cost_a as u64 * cost_a as u64 * WALK_FACTOR as u64;
        let time = (self.cost_b as u64 + self.cost_c as u64) * walking_time_cost(cost_a) as u64;
        saturate(distance + time)
    }
}
