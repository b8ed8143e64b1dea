// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded, oldest-evicted history buffer.

use std::collections::VecDeque;

/// A capacity-bounded FIFO. Pushing into a full buffer evicts the oldest entry.
///
/// Unlike a fixed-size array ring, the capacity is a runtime setting and the
/// contents are owned values, so the buffer can hold whole records and be
/// rebuilt from a persisted list.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedHistory<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Creates an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Rebuilds a buffer from a list ordered oldest first, keeping the newest
    /// `capacity` entries.
    pub fn from_vec(items: Vec<T>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        let skip = items.len().saturating_sub(history.capacity);
        history.data.extend(items.into_iter().skip(skip));
        history
    }

    /// Appends a value, evicting the oldest one if the buffer is full.
    pub fn push(&mut self, value: T) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// Returns the number of elements currently in the buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent element.
    pub fn last(&self) -> Option<&T> {
        self.data.back()
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.data.iter()
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Copies the contents, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut history = BoundedHistory::new(3);
        for i in 0..5 {
            history.push(i);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.to_vec(), vec![2, 3, 4]);
        assert_eq!(history.last(), Some(&4));
    }

    #[test]
    fn test_from_vec_keeps_newest() {
        let history = BoundedHistory::from_vec((0..10).collect(), 4);
        assert_eq!(history.to_vec(), vec![6, 7, 8, 9]);
        let short = BoundedHistory::from_vec(vec![1, 2], 4);
        assert_eq!(short.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_capacity_is_enforced_on_every_insert() {
        let mut history = BoundedHistory::new(10_000);
        for i in 0..10_050u32 {
            history.push(i);
            assert!(history.len() <= 10_000);
        }
        assert_eq!(history.iter().next(), Some(&50));
    }
}
