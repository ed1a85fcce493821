// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::{PriorityQueue, QueueItem};
use std::collections::BinaryHeap;

/// Number of regular buckets.
pub const ROWS: usize = 8000;

/// Number of items a bucket keeps in its array before spilling into its overflow list.
pub const COLUMNS: usize = 256;

pub const BUCKET_COST_DIFFERENCE_EXP: u32 = 10;

/// Width of the cost range covered by a single bucket.
pub const BUCKET_COST_DIFFERENCE: u32 = 1 << BUCKET_COST_DIFFERENCE_EXP;

/// Costs above `least_expected_cost + RANGE_OF_COSTS` go to the large-costs bucket.
const RANGE_OF_COSTS: u64 = ROWS as u64 * BUCKET_COST_DIFFERENCE as u64 - 1;

const LARGE_COSTS: usize = ROWS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DestItem(QueueItem);

impl PartialOrd for DestItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DestItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NOTE: We revert the order of comparison,
        // as lower costs are considered better ("higher"),
        // and Rust's BinaryHeap is a max-heap.
        other.0.cost.cmp(&self.0.cost).then_with(|| other.0.node.cmp(&self.0.node))
    }
}

/// A single cost range of a [BucketHeap].
#[derive(Debug, Clone, Default)]
struct Bucket {
    array: Vec<QueueItem>,
    overflow: Vec<QueueItem>,
    dests: BinaryHeap<DestItem>,
}

impl Bucket {
    fn len(&self) -> usize {
        self.array.len() + self.overflow.len() + self.dests.len()
    }

    fn is_empty(&self) -> bool {
        self.array.is_empty() && self.overflow.is_empty() && self.dests.is_empty()
    }

    fn push(&mut self, item: QueueItem) {
        if item.dest {
            self.dests.push(DestItem(item));
        } else if self.array.len() < COLUMNS {
            self.array.push(item);
        } else {
            self.overflow.push(item);
        }
    }

    /// Removes a non-destination item, without regard for its cost.
    ///
    /// The middle of the array is taken, which on road networks tends to be
    /// closer to the bucket minimum than either end. This is a heuristic only.
    fn pop_any(&mut self) -> Option<QueueItem> {
        if let Some(item) = self.overflow.pop() {
            return Some(item);
        }
        if self.array.is_empty() {
            return None;
        }
        let mid = self.array.len() / 2;
        Some(self.array.swap_remove(mid))
    }

    /// Removes the cheapest non-destination item, by linear scan.
    fn pop_min(&mut self) -> Option<QueueItem> {
        let in_array = self
            .array
            .iter()
            .enumerate()
            .min_by_key(|(_, i)| i.cost)
            .map(|(idx, i)| (idx, i.cost));
        let in_overflow = self
            .overflow
            .iter()
            .enumerate()
            .min_by_key(|(_, i)| i.cost)
            .map(|(idx, i)| (idx, i.cost));

        match (in_array, in_overflow) {
            (Some((a, a_cost)), Some((_, o_cost))) if a_cost <= o_cost => Some(self.array.swap_remove(a)),
            (_, Some((o, _))) => Some(self.overflow.swap_remove(o)),
            (Some((a, _)), None) => Some(self.array.swap_remove(a)),
            (None, None) => None,
        }
    }

    fn min_non_dest_cost(&self) -> Option<u32> {
        self.array.iter().chain(self.overflow.iter()).map(|i| i.cost).min()
    }

    /// Removes the next item. If the bucket holds a destination, the cheapest item overall
    /// is returned, so that destinations are found in exact order.
    fn pop(&mut self) -> Option<QueueItem> {
        let Some(dest_cost) = self.dests.peek().map(|d| d.0.cost) else {
            return self.pop_any();
        };

        match self.min_non_dest_cost() {
            Some(cost) if cost < dest_cost => self.pop_min(),
            _ => self.dests.pop().map(|d| d.0),
        }
    }

    fn pop_unordered(&mut self) -> Option<QueueItem> {
        self.pop_any().or_else(|| self.dests.pop().map(|d| d.0))
    }

    fn drain(&mut self) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> = self.array.drain(..).collect();
        items.append(&mut self.overflow);
        items.extend(self.dests.drain().map(|d| d.0));
        items
    }

    fn clear(&mut self) {
        self.array.clear();
        self.overflow.clear();
        self.dests.clear();
    }
}

/// A calendar queue: [ROWS] buckets, each covering [BUCKET_COST_DIFFERENCE]
/// consecutive costs, plus one bucket for costs beyond the covered range.
///
/// Items of a bucket come out in arbitrary order, unless the bucket contains
/// a destination item: then the cheapest item of the bucket is returned.
/// `least_expected_cost` never decreases, except on [PriorityQueue::reset].
#[derive(Debug, Clone)]
pub struct BucketHeap {
    buckets: Vec<Bucket>,
    least_expected_cost: u64,
    start_index: usize,
    total: usize,
    large: usize,
}

impl Default for BucketHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketHeap {
    pub fn new() -> Self {
        Self {
            buckets: vec![Bucket::default(); ROWS + 1],
            least_expected_cost: 0,
            start_index: 0,
            total: 0,
            large: 0,
        }
    }

    /// Lower bound of the costs of future dequeues (up to items enqueued below it).
    pub fn least_expected_cost(&self) -> u64 {
        self.least_expected_cost
    }

    fn row_index(&self, cost: u32) -> usize {
        let cost = cost as u64;
        if cost > self.least_expected_cost + RANGE_OF_COSTS {
            LARGE_COSTS
        } else if cost < self.least_expected_cost {
            self.start_index
        } else {
            let offset = ((cost - self.least_expected_cost) >> BUCKET_COST_DIFFERENCE_EXP) as usize;
            (self.start_index + offset) % ROWS
        }
    }

    fn push(&mut self, item: QueueItem) {
        let row = self.row_index(item.cost);
        if row == LARGE_COSTS {
            self.large += 1;
        }
        self.buckets[row].push(item);
    }

    fn advance(&mut self, rows: usize) {
        self.least_expected_cost += rows as u64 * BUCKET_COST_DIFFERENCE as u64;
        let next = self.start_index + rows;
        self.start_index = next % ROWS;
        if next >= ROWS {
            self.try_to_empty_large_costs_bucket();
        }
    }

    /// Moves items of the large-costs bucket which now fit into regular buckets.
    fn try_to_empty_large_costs_bucket(&mut self) {
        if self.large == 0 {
            return;
        }
        let items = self.buckets[LARGE_COSTS].drain();
        self.large = 0;
        for item in items {
            self.push(item);
        }
    }

    /// Jumps straight to the cheapest item of the large-costs bucket.
    /// Only valid when every regular bucket is empty.
    fn jump_to_large_costs(&mut self) {
        let min_cost = self.buckets[LARGE_COSTS]
            .array
            .iter()
            .chain(self.buckets[LARGE_COSTS].overflow.iter())
            .chain(self.buckets[LARGE_COSTS].dests.iter().map(|d| &d.0))
            .map(|i| i.cost as u64)
            .min()
            .unwrap_or(self.least_expected_cost);

        if min_cost > self.least_expected_cost {
            let rows = ((min_cost - self.least_expected_cost) >> BUCKET_COST_DIFFERENCE_EXP) as usize;
            self.least_expected_cost += rows as u64 * BUCKET_COST_DIFFERENCE as u64;
            self.start_index = (self.start_index + rows) % ROWS;
        }
        self.try_to_empty_large_costs_bucket();
    }

    /// Advances to the first non-empty bucket.
    fn flush(&mut self) {
        if self.total == 0 {
            return;
        }
        while self.buckets[self.start_index].is_empty() {
            if self.total == self.large {
                self.jump_to_large_costs();
            } else {
                self.advance(1);
            }
        }
    }
}

impl PriorityQueue for BucketHeap {
    fn enqueue(&mut self, item: QueueItem) {
        self.push(item);
        self.total += 1;
    }

    fn dequeue(&mut self) -> Option<QueueItem> {
        self.flush();
        let item = self.buckets[self.start_index].pop()?;
        self.total -= 1;
        Some(item)
    }

    fn dequeue_unordered(&mut self) -> Option<QueueItem> {
        self.flush();
        let item = self.buckets[self.start_index].pop_unordered()?;
        self.total -= 1;
        Some(item)
    }

    fn len(&self) -> usize {
        self.total
    }

    fn reset(&mut self) {
        for b in &mut self.buckets {
            b.clear();
        }
        self.least_expected_cost = 0;
        self.start_index = 0;
        self.total = 0;
        self.large = 0;
    }

    fn update_start_index(&mut self, cost: u32) {
        // Skipping rows is only safe when none of them hold anything.
        if self.total != self.large || cost <= BUCKET_COST_DIFFERENCE {
            return;
        }
        let target = (cost - BUCKET_COST_DIFFERENCE) as u64;
        if self.least_expected_cost < target {
            let rows = (target - self.least_expected_cost).div_ceil(BUCKET_COST_DIFFERENCE as u64);
            self.least_expected_cost += rows * BUCKET_COST_DIFFERENCE as u64;
            self.start_index = (self.start_index + rows as usize) % ROWS;
            self.try_to_empty_large_costs_bucket();
        }
    }
}
