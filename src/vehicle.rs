// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Vehicle restriction bits.
//!
//! Every [ConnectionData](crate::map::ConnectionData) carries a mask of vehicles
//! allowed to use it, and every [DriverPref](crate::calc::DriverPref) carries a mask
//! of vehicles (plus avoidance flags) describing the traveller. A connection may be
//! used if the two masks intersect.

pub const PASSENGER_CAR: u32 = 0x0000_0001;
pub const TRANSPORT_TRUCK: u32 = 0x0000_0002;
pub const PUBLIC_BUS: u32 = 0x0000_0004;
pub const BICYCLE: u32 = 0x0000_0008;
pub const TAXI: u32 = 0x0000_0010;
pub const EMERGENCY_VEHICLE: u32 = 0x0000_0020;
pub const HIGH_OCCUPANCY_VEHICLE: u32 = 0x0000_0040;
pub const PEDESTRIAN: u32 = 0x0000_0080;
pub const PRIVATE_BUS: u32 = 0x0000_0400;
pub const DELIVERY_TRUCK: u32 = 0x0000_1000;
pub const MOTORCYCLE: u32 = 0x0000_2000;
pub const MOPED: u32 = 0x0000_4000;
pub const PUBLIC_TRANSPORTATION: u32 = 0x0010_0000;
pub const PASSENGER_CAR_CLOSED_SEASON: u32 = 0x0020_0000;

/// Set on a traveller mask to ask for toll roads to be penalized.
/// Set on a connection mask to mark it as a toll road.
pub const AVOID_TOLL_ROAD: u32 = 0x0040_0000;

/// Set on a traveller mask to ask for highways to be penalized.
/// Set on a connection mask to mark it as a highway.
pub const AVOID_HIGHWAY: u32 = 0x0080_0000;

/// Every vehicle, without the avoidance flags.
pub const ALL_VEHICLES: u32 = PASSENGER_CAR
    | TRANSPORT_TRUCK
    | PUBLIC_BUS
    | BICYCLE
    | TAXI
    | EMERGENCY_VEHICLE
    | HIGH_OCCUPANCY_VEHICLE
    | PEDESTRIAN
    | PRIVATE_BUS
    | DELIVERY_TRUCK
    | MOTORCYCLE
    | MOPED
    | PUBLIC_TRANSPORTATION
    | PASSENGER_CAR_CLOSED_SEASON;

/// Returns true if the traveller mask describes someone on foot.
#[inline]
pub fn is_walking(mask: u32) -> bool {
    mask & PEDESTRIAN != 0
}

/// Returns true if the traveller mask describes a motor vehicle or bicycle.
#[inline]
pub fn is_driving(mask: u32) -> bool {
    mask & !(PEDESTRIAN | AVOID_TOLL_ROAD | AVOID_HIGHWAY) != 0
}

/// Parses a vehicle name, as used by the tile reader and the CLI.
pub fn from_name(name: &str) -> Option<u32> {
    match name {
        "car" | "passengerCar" => Some(PASSENGER_CAR),
        "truck" | "transportTruck" => Some(TRANSPORT_TRUCK),
        "bus" | "publicBus" => Some(PUBLIC_BUS),
        "bicycle" => Some(BICYCLE),
        "taxi" => Some(TAXI),
        "emergency" | "emergencyVehicle" => Some(EMERGENCY_VEHICLE),
        "hov" | "highOccupancyVehicle" => Some(HIGH_OCCUPANCY_VEHICLE),
        "foot" | "pedestrian" => Some(PEDESTRIAN),
        "privateBus" => Some(PRIVATE_BUS),
        "delivery" | "deliveryTruck" => Some(DELIVERY_TRUCK),
        "motorcycle" => Some(MOTORCYCLE),
        "moped" => Some(MOPED),
        "publicTransportation" => Some(PUBLIC_TRANSPORTATION),
        "closedSeason" | "passCarClosedSeason" => Some(PASSENGER_CAR_CLOSED_SEASON),
        "avoidTollRoad" | "toll" => Some(AVOID_TOLL_ROAD),
        "avoidHighway" | "highway" => Some(AVOID_HIGHWAY),
        "all" => Some(ALL_VEHICLES),
        _ => None,
    }
}

/// Parses a vehicle mask: either a number (decimal or `0x`-prefixed hex),
/// or a comma-separated list of names accepted by [from_name].
pub fn parse_mask(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    if let Ok(v) = s.parse::<u32>() {
        return Some(v);
    }

    s.split(',')
        .map(|part| from_name(part.trim()))
        .try_fold(0, |acc, bit| bit.map(|b| acc | b))
}
