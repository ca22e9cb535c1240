use std::collections::VecDeque;

pub use std::collections::vec_deque::Iter;

/// Fixed-capacity FIFO that drops its oldest entry once full.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T, const N: usize> {
    entries: VecDeque<T>,
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(N),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, item: T) {
        if N == 0 {
            return;
        }
        while self.entries.len() >= N {
            self.entries.pop_front();
        }
        self.entries.push_back(item);
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn latest_mut(&mut self) -> Option<&mut T> {
        self.entries.back_mut()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest-to-newest traversal. Each call starts a fresh walk.
    pub fn iter(&self) -> Iter<'_, T> {
        self.entries.iter()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a RingBuffer<T, N> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
