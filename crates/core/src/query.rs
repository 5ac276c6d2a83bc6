//! Query result containers

use crate::space::DistValue;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor<D> {
    /// Caller-assigned id of the stored point
    pub id: i32,
    /// Insertion position of the stored point
    pub position: usize,
    pub distance: D,
}

impl<D: DistValue> Neighbor<D> {
    /// Ordering by distance, then by insertion position.
    pub fn cmp_by_distance(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then(self.position.cmp(&other.position))
    }
}

/// Sort hits by ascending distance; ties keep insertion order.
pub fn sort_neighbors<D: DistValue>(neighbors: &mut [Neighbor<D>]) {
    neighbors.sort_by(Neighbor::cmp_by_distance);
}

#[derive(Debug, Clone, Copy)]
struct Entry<D>(Neighbor<D>);

impl<D: DistValue> PartialEq for Entry<D> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<D: DistValue> Eq for Entry<D> {}

impl<D: DistValue> PartialOrd for Entry<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D: DistValue> Ord for Entry<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_by_distance(&other.0)
    }
}

/// Bounded k-nearest result set
///
/// A max-heap holding at most `k` hits; the top is the farthest hit kept so
/// far, and [`KnnQueue::pop`] yields hits farthest first. Use
/// [`KnnQueue::into_sorted_vec`] for ascending order.
///
/// # Examples
///
/// ```
/// use simdex_core::KnnQueue;
///
/// let mut queue = KnnQueue::<f32>::new(2);
/// queue.push(0.9, 0, 10);
/// queue.push(0.1, 1, 11);
/// queue.push(0.5, 2, 12);
///
/// let ids: Vec<i32> = queue.into_sorted_vec().iter().map(|n| n.id).collect();
/// assert_eq!(ids, vec![11, 12]);
/// ```
#[derive(Debug, Clone)]
pub struct KnnQueue<D: DistValue> {
    k: usize,
    heap: BinaryHeap<Entry<D>>,
}

impl<D: DistValue> KnnQueue<D> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(1024) + 1),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer a hit; returns true if it was kept.
    pub fn push(&mut self, distance: D, position: usize, id: i32) -> bool {
        if self.k == 0 {
            return false;
        }

        let entry = Entry(Neighbor {
            id,
            position,
            distance,
        });

        if self.heap.len() < self.k {
            self.heap.push(entry);
            return true;
        }

        match self.heap.peek() {
            Some(top) if entry < *top => {
                self.heap.pop();
                self.heap.push(entry);
                true
            }
            _ => false,
        }
    }

    /// Distance of the farthest hit kept, if any.
    pub fn top_distance(&self) -> Option<D> {
        self.heap.peek().map(|e| e.0.distance)
    }

    /// Remove and return the farthest hit.
    pub fn pop(&mut self) -> Option<Neighbor<D>> {
        self.heap.pop().map(|e| e.0)
    }

    /// Hits in ascending distance order.
    pub fn into_sorted_vec(self) -> Vec<Neighbor<D>> {
        self.heap.into_sorted_vec().into_iter().map(|e| e.0).collect()
    }
}
