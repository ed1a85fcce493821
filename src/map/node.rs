// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::INFINITY;

/// Bit of an item id telling the two ends (travel directions) of a segment apart.
pub const DIRECTION_BIT: u32 = 0x8000_0000;

/// Bit of an item id marking nodes which also exist on the higher (overview) level.
pub const UPPER_LEVEL_BIT: u32 = 0x4000_0000;

/// Returns the id of the node at the other end of the same segment.
#[inline]
pub fn toggle_direction(item_id: u32) -> u32 {
    item_id ^ DIRECTION_BIT
}

/// Returns the id of the segment, without the direction bit.
#[inline]
pub fn segment_id(item_id: u32) -> u32 {
    item_id & !DIRECTION_BIT
}

#[inline]
pub fn is_upper_level(item_id: u32) -> bool {
    item_id & UPPER_LEVEL_BIT != 0
}

#[inline]
pub fn is_lower_level(item_id: u32) -> bool {
    !is_upper_level(item_id)
}

/// Restriction on entering the segment starting at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum EntryRestriction {
    #[default]
    NoRestrictions = 0,

    /// Entering is only allowed to reach a destination inside the area.
    NoThroughfare = 1,

    /// Entering is forbidden, but leaving is allowed.
    NoEntry = 2,

    /// Driving on the segment is forbidden altogether.
    NoWay = 3,
}

impl EntryRestriction {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::NoRestrictions),
            1 => Some(Self::NoThroughfare),
            2 => Some(Self::NoEntry),
            3 => Some(Self::NoWay),
            _ => None,
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "" | "none" | "noRestrictions" => Some(Self::NoRestrictions),
            "noThroughfare" => Some(Self::NoThroughfare),
            "noEntry" => Some(Self::NoEntry),
            "noWay" => Some(Self::NoWay),
            _ => s.parse::<u8>().ok().and_then(Self::from_u8),
        }
    }

    #[inline]
    pub fn has_no_restrictions(self) -> bool {
        self == Self::NoRestrictions
    }

    #[inline]
    pub fn has_no_throughfare(self) -> bool {
        self == Self::NoThroughfare
    }

    #[inline]
    pub fn has_no_entry(self) -> bool {
        self == Self::NoEntry
    }

    #[inline]
    pub fn has_no_way(self) -> bool {
        self == Self::NoWay
    }

    /// True for restrictions which forbid vehicles from entering the node.
    #[inline]
    pub fn not_valid(self) -> bool {
        matches!(self, Self::NoEntry | Self::NoWay)
    }
}

/// Back-pointer used to reconstruct the cheapest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gradient {
    /// The predecessor is another node, given by its index.
    Node(u32),

    /// The node was seeded directly from an origin located at the given node index.
    /// Path reconstruction stops here.
    Origin(u32),
}

impl Gradient {
    /// Index of the node this gradient points at.
    #[inline]
    pub fn index(self) -> u32 {
        match self {
            Self::Node(i) | Self::Origin(i) => i,
        }
    }
}

/// Per-route transient fields of a [RoutingNode].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    /// Cost used to order the queues (real cost plus an optional estimate).
    pub est_cost: u32,

    /// Cost of the cheapest known path to the node.
    pub real_cost: u32,

    pub gradient: Option<Gradient>,
    pub dest: bool,

    /// Set when the node was reached in a way a vehicle may use.
    pub visited: bool,
}

impl NodeState {
    pub const UNSET: Self = Self {
        est_cost: INFINITY,
        real_cost: INFINITY,
        gradient: None,
        dest: false,
        visited: false,
    };
}

impl Default for NodeState {
    fn default() -> Self {
        Self::UNSET
    }
}

/// A contiguous run of connections in the [RoutingGraph](super::RoutingGraph) pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ConnectionRange {
    pub start: u32,
    pub len: u16,
}

impl ConnectionRange {
    #[inline]
    pub fn as_range(self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        start..start + self.len as usize
    }
}

/// One directed end of a road segment.
///
/// The per-route [NodeState] is only meaningful while `stamp` equals
/// the generation of the owning graph; otherwise the node reads as unset.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingNode {
    pub item_id: u32,
    pub lat: i32,
    pub lon: i32,
    pub restriction: EntryRestriction,
    pub(crate) forward: ConnectionRange,
    pub(crate) backward: ConnectionRange,
    pub(crate) state: NodeState,
    pub(crate) stamp: u64,
}

impl RoutingNode {
    pub(crate) fn new(item_id: u32, lat: i32, lon: i32, restriction: EntryRestriction) -> Self {
        Self {
            item_id,
            lat,
            lon,
            restriction,
            forward: ConnectionRange::default(),
            backward: ConnectionRange::default(),
            state: NodeState::UNSET,
            stamp: 0,
        }
    }

    /// Number of connections leaving (`forward == true`) or entering the node.
    pub fn connection_count(&self, forward: bool) -> usize {
        if forward {
            self.forward.len as usize
        } else {
            self.backward.len as usize
        }
    }
}

/// A synthetic node standing for "reached a destination, including the offset
/// along its segment". Never part of the node array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestNode {
    pub item_id: u32,
    pub real_cost: u32,
    pub est_cost: u32,
}

impl DestNode {
    pub const UNSET: Self = Self {
        item_id: INFINITY,
        real_cost: INFINITY,
        est_cost: INFINITY,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_helpers() {
        assert_eq!(toggle_direction(0x12), 0x8000_0012);
        assert_eq!(toggle_direction(0x8000_0012), 0x12);
        assert_eq!(segment_id(0x8000_0012), 0x12);
        assert!(is_upper_level(0x4000_0001));
        assert!(is_lower_level(0x8000_0001));
    }

    #[test]
    fn restriction_predicates() {
        assert!(EntryRestriction::NoEntry.not_valid());
        assert!(EntryRestriction::NoWay.not_valid());
        assert!(!EntryRestriction::NoThroughfare.not_valid());
        assert_eq!(
            EntryRestriction::from_name("noThroughfare"),
            Some(EntryRestriction::NoThroughfare)
        );
        assert_eq!(EntryRestriction::from_name("3"), Some(EntryRestriction::NoWay));
        assert_eq!(EntryRestriction::from_name("4"), None);
    }
}
