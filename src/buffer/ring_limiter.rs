//! Fixed-capacity, newest-first ring with optional consecutive-duplicate suppression.

use std::collections::VecDeque;

/// Front-inserting FIFO bounded to `capacity` entries.
///
/// The head is always the most recent push. Growth only happens through
/// [`push`](Self::push), so each push evicts at most one tail entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingLimiter<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RingLimiter<T> {
    /// Create a ring. A capacity of 0 is clamped to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Prepend `item`, dropping the oldest entries beyond capacity.
    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    /// Push unless `continues(head, &item)` reports the item as part of the
    /// head's group. Returns whether the item was pushed.
    pub fn push_if_distinct_from_head<F>(&mut self, item: T, continues: F) -> bool
    where
        F: FnOnce(&T, &T) -> bool,
    {
        if let Some(head) = self.items.front()
            && continues(head, &item)
        {
            return false;
        }
        self.push(item);
        true
    }

    /// Most recent entry.
    #[must_use]
    pub fn head(&self) -> Option<&T> {
        self.items.front()
    }

    /// Entries head-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> RingLimiter<T> {
    /// Snapshot of the entries head-first.
    #[must_use]
    pub fn to_list(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
