// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Priority queues ordering nodes by their estimated cost.

mod bucket_heap;
mod tree_heap;

pub use bucket_heap::{BucketHeap, BUCKET_COST_DIFFERENCE, BUCKET_COST_DIFFERENCE_EXP, COLUMNS, ROWS};
pub use tree_heap::TreeHeap;

/// A node which can be put into a [PriorityQueue].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRef {
    /// Index of a node of the routed graph.
    Map(u32),

    /// Index of a synthetic destination node.
    Dest(u32),
}

/// An entry of a [PriorityQueue]: a node with the estimated cost it had when enqueued.
///
/// Queues don't support decrease-key: a node may be enqueued multiple times, and
/// entries whose cost no longer matches the node are skipped by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueItem {
    pub node: NodeRef,
    pub cost: u32,

    /// Destination entries are dequeued in exact cost order.
    pub dest: bool,
}

impl QueueItem {
    pub fn new(node: NodeRef, cost: u32, dest: bool) -> Self {
        Self { node, cost, dest }
    }
}

/// Common interface of [BucketHeap] and [TreeHeap].
pub trait PriorityQueue {
    fn enqueue(&mut self, item: QueueItem);

    /// Removes the cheapest item. Implementations may approximate the order
    /// of non-destination items with similar costs.
    fn dequeue(&mut self) -> Option<QueueItem>;

    /// Removes any item, for draining one queue into another.
    fn dequeue_unordered(&mut self) -> Option<QueueItem>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reset(&mut self);

    /// Hints that no item cheaper than `cost` is going to be enqueued.
    fn update_start_index(&mut self, _cost: u32) {}
}
