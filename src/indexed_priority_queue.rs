use crate::error::{Error, Result};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
struct HeapNode<T> {
    payload: T,
    index: usize,
}

/// IndexedPriorityQueue is a binary min-heap whose elements keep a stable
/// external index for as long as the queue exists. Each element can be
/// looked up and replaced in O(log(N)) time through its index, wherever it
/// currently sits in the heap.
///
/// Ordering is given by a comparator supplied at construction. There is no
/// way to pop the minimum, so an index handed out by `insert` never becomes
/// invalid until the queue is cleared.
#[derive(Debug, Clone)]
pub struct IndexedPriorityQueue<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    heap: Vec<HeapNode<T>>,
    positions: Vec<usize>,
    comparator: C,
}

impl<T, C> IndexedPriorityQueue<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    /// Creates an empty queue ordered by `comparator`.
    pub fn new(comparator: C) -> Self {
        IndexedPriorityQueue::with_capacity(0, comparator)
    }

    pub fn with_capacity(capacity: usize, comparator: C) -> Self {
        IndexedPriorityQueue {
            heap: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            comparator,
        }
    }

    /// Adds an element and returns its external index.
    pub fn insert(&mut self, payload: T) -> usize {
        let index = self.positions.len();
        self.positions.push(self.heap.len());
        self.heap.push(HeapNode { payload, index });
        self.sift_up(self.heap.len() - 1);
        index
    }

    /// The minimum element together with its external index.
    pub fn peek(&self) -> Option<(&T, usize)> {
        self.heap.first().map(|node| (&node.payload, node.index))
    }

    pub fn get(&self, index: usize) -> Result<&T> {
        let position = self.position(index)?;
        Ok(&self.heap[position].payload)
    }

    /// Replaces the payload at `index`. The element is taken out of the heap
    /// from wherever it sits and put back in with its new payload, keeping
    /// its external index.
    pub fn update(&mut self, index: usize, payload: T) -> Result<()> {
        let position = self.position(index)?;

        let last = self.heap.len() - 1;
        self.swap(position, last);
        let mut node = self.heap.pop().ok_or(Error::IndexNotFound(index))?;
        if position < self.heap.len() {
            self.sift_down(position);
            self.sift_up(position);
        }

        node.payload = payload;
        self.positions[index] = self.heap.len();
        self.heap.push(node);
        self.sift_up(self.heap.len() - 1);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes every element. Indices handed out before are no longer valid.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    fn position(&self, index: usize) -> Result<usize> {
        self.positions
            .get(index)
            .copied()
            .ok_or(Error::IndexNotFound(index))
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.comparator)(&self.heap[a].payload, &self.heap[b].payload) == Ordering::Less
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions[self.heap[a].index] = a;
        self.positions[self.heap[b].index] = b;
    }

    fn sift_up(&mut self, mut position: usize) {
        while position > 0 {
            let parent = (position - 1) / 2;
            if !self.less(position, parent) {
                break;
            }
            self.swap(position, parent);
            position = parent;
        }
    }

    fn sift_down(&mut self, mut position: usize) {
        loop {
            let left = 2 * position + 1;
            let right = left + 1;
            let mut smallest = position;
            if left < self.heap.len() && self.less(left, smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == position {
                break;
            }
            self.swap(position, smallest);
            position = smallest;
        }
    }
}
