// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::str::FromStr;

/// Extra costs charged on connections the traveller asked to avoid.
///
/// Applied by the [ConnectionData](crate::map::ConnectionData) cost accessors
/// when both the traveller mask and the connection mask carry
/// [AVOID_TOLL_ROAD](crate::vehicle::AVOID_TOLL_ROAD) or
/// [AVOID_HIGHWAY](crate::vehicle::AVOID_HIGHWAY).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penalties {
    /// Seconds added to the time costs of a toll road.
    pub toll_road_time_s: u32,

    /// Meters added to the distance cost of a toll road.
    pub toll_road_distance_m: u32,

    /// Multiplier of every cost of a highway.
    pub highway_factor: f32,
}

impl Default for Penalties {
    fn default() -> Self {
        Self {
            toll_road_time_s: 3600,
            toll_road_distance_m: 10000,
            highway_factor: 3.0,
        }
    }
}

impl Penalties {
    pub const TOLL_ROAD_TIME_ENV: &'static str = "ROUTE_TOLL_ROAD_TIME_PENALTY_S";
    pub const TOLL_ROAD_DISTANCE_ENV: &'static str = "ROUTE_TOLL_ROAD_DIST_PENALTY_M";
    pub const HIGHWAY_FACTOR_ENV: &'static str = "ROUTE_HIGHWAY_PENALTY_FACTOR_PERCENT";

    /// Returns the default penalties overridden by the `ROUTE_*` environment variables.
    ///
    /// The highway factor is given in percent, so `ROUTE_HIGHWAY_PENALTY_FACTOR_PERCENT=250`
    /// results in a factor of 2.5. Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [Penalties::from_env], but reads variables through the provided function.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        let highway_percent = read_value(
            &lookup,
            Self::HIGHWAY_FACTOR_ENV,
            (defaults.highway_factor * 100.0).round() as u32,
        );

        Self {
            toll_road_time_s: read_value(&lookup, Self::TOLL_ROAD_TIME_ENV, defaults.toll_road_time_s),
            toll_road_distance_m: read_value(
                &lookup,
                Self::TOLL_ROAD_DISTANCE_ENV,
                defaults.toll_road_distance_m,
            ),
            highway_factor: highway_percent as f32 / 100.0,
        }
    }
}

fn read_value<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
    }
}

/// Additional controls of a [RouteCalculator](crate::calc::RouteCalculator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Reset the routing state on a background thread after every route,
    /// instead of synchronously at the end of the route itself.
    pub background_reset: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            background_reset: true,
        }
    }
}
