// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::{PriorityQueue, QueueItem};
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct TreeHeapItem {
    item: QueueItem,
    seq: u64,
}

impl PartialEq for TreeHeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.item.cost == other.item.cost && self.seq == other.seq
    }
}

impl Eq for TreeHeapItem {}

impl PartialOrd for TreeHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeHeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NOTE: We revert the order of comparison,
        // as lower costs are considered better ("higher"),
        // and Rust's BinaryHeap is a max-heap.
        // Equal costs come out in insertion order.
        other
            .item
            .cost
            .cmp(&self.item.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// An exact priority queue, used for the small secondary frontiers.
#[derive(Debug, Clone, Default)]
pub struct TreeHeap {
    heap: BinaryHeap<TreeHeapItem>,
    seq: u64,
}

impl TreeHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cheapest item without removing it.
    pub fn peek(&self) -> Option<QueueItem> {
        self.heap.peek().map(|i| i.item)
    }
}

impl PriorityQueue for TreeHeap {
    fn enqueue(&mut self, item: QueueItem) {
        self.heap.push(TreeHeapItem { item, seq: self.seq });
        self.seq += 1;
    }

    fn dequeue(&mut self) -> Option<QueueItem> {
        self.heap.pop().map(|i| i.item)
    }

    fn dequeue_unordered(&mut self) -> Option<QueueItem> {
        self.dequeue()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn reset(&mut self) {
        self.heap.clear();
        self.seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::NodeRef;

    #[test]
    fn exact_order() {
        let mut q = TreeHeap::new();
        for (i, cost) in [50, 10, 30, 10, 20].into_iter().enumerate() {
            q.enqueue(QueueItem::new(NodeRef::Map(i as u32), cost, false));
        }
        assert_eq!(q.len(), 5);
        assert_eq!(q.peek().map(|i| i.node), Some(NodeRef::Map(1)));

        let order: Vec<_> = std::iter::from_fn(|| q.dequeue()).map(|i| i.node).collect();
        assert_eq!(
            order,
            vec![
                NodeRef::Map(1),
                NodeRef::Map(3),
                NodeRef::Map(4),
                NodeRef::Map(2),
                NodeRef::Map(0)
            ]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn reset_clears() {
        let mut q = TreeHeap::new();
        q.enqueue(QueueItem::new(NodeRef::Dest(0), 1, true));
        q.reset();
        assert!(q.is_empty());
        assert_eq!(q.dequeue(), None);
    }
}
