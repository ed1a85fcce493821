// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::map::{ConnectionData, RoutingGraph};

/// Offsets are fractions of a segment, scaled to the whole `u16` range.
pub const MAX_OFFSET: u16 = u16::MAX;

/// Part of the segment before the offset point.
#[inline]
pub fn offset_factor(offset: u16) -> f64 {
    offset as f64 / MAX_OFFSET as f64
}

/// Part of the segment after the offset point.
#[inline]
pub fn anti_offset_factor(offset: u16) -> f64 {
    (MAX_OFFSET - offset) as f64 / MAX_OFFSET as f64
}

/// Sums of the unweighted distance, time and disturbed time costs along a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CostSums {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl CostSums {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { a, b, c }
    }

    /// Raw (unpenalized) costs of a connection.
    pub fn of_connection(d: &ConnectionData) -> Self {
        Self::new(d.cost_a, d.cost_b, d.cost_c)
    }

    pub fn add(&mut self, other: CostSums) {
        self.a = self.a.saturating_add(other.a);
        self.b = self.b.saturating_add(other.b);
        self.c = self.c.saturating_add(other.c);
    }
}

/// An origin or destination: a point at `offset` along the segment starting at a node.
#[derive(Debug, Clone, PartialEq)]
pub struct OrigDest {
    pub map_id: u32,
    pub item_id: u32,
    pub offset: u16,
    pub lat: i32,
    pub lon: i32,

    /// Cost already spent before reaching this point (e.g. on a previous map).
    pub real_cost: u32,
    pub est_cost: u32,

    /// Extra cost of turning onto the segment, charged for routes which
    /// start and end on the same segment.
    pub turn_cost: u32,

    pub sums: CostSums,

    pub(crate) index: Option<u32>,
}

impl OrigDest {
    pub fn new(map_id: u32, item_id: u32, offset: u16) -> Self {
        Self {
            map_id,
            item_id,
            offset,
            lat: 0,
            lon: 0,
            real_cost: 0,
            est_cost: 0,
            turn_cost: 0,
            sums: CostSums::default(),
            index: None,
        }
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.real_cost = cost;
        self.est_cost = cost;
        self
    }

    pub fn with_coordinates(mut self, lat: i32, lon: i32) -> Self {
        self.lat = lat;
        self.lon = lon;
        self
    }

    pub fn with_turn_cost(mut self, turn_cost: u32) -> Self {
        self.turn_cost = turn_cost;
        self
    }

    pub fn with_sums(mut self, sums: CostSums) -> Self {
        self.sums = sums;
        self
    }

    /// Index of the node on the routed map, once resolved.
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// Looks the node up on the provided graph. Points without coordinates
    /// take the coordinates of their node.
    pub(crate) fn resolve(&mut self, g: &RoutingGraph) {
        self.index = if self.map_id == g.map_id() {
            g.node_index(self.item_id)
        } else {
            None
        };

        if let Some(n) = self.index.and_then(|i| g.node(i)) {
            if self.lat == 0 && self.lon == 0 {
                self.lat = n.lat;
                self.lon = n.lon;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        assert_eq!(offset_factor(0), 0.0);
        assert_eq!(offset_factor(MAX_OFFSET), 1.0);
        assert_eq!(anti_offset_factor(0), 1.0);
        assert!((offset_factor(32768) + anti_offset_factor(32768) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sums_saturate() {
        let mut s = CostSums::new(1, 2, u32::MAX - 1);
        s.add(CostSums::new(10, 20, 30));
        assert_eq!(s, CostSums::new(11, 22, u32::MAX));
    }
}
