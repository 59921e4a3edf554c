//! Fixed-capacity ring buffers.
//!
//! Both rings keep the `% N` arithmetic in one place so call sites work with
//! logical positions (queue offsets or tick ids) only.

use std::array;

/// FIFO queue over a fixed array with logical `[min, max)` counters.
///
/// Pushing into a full queue silently drops the oldest unread element.
#[derive(Debug, Clone)]
pub struct RingQueue<T, const N: usize> {
    items: [T; N],
    min: u64,
    max: u64,
}

impl<T: Clone + Default, const N: usize> RingQueue<T, N> {
    pub fn new() -> Self {
        const {
            assert!(N != 0, "ring capacity must not be zero");
        }

        Self {
            items: array::from_fn(|_| T::default()),
            min: 0,
            max: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        (self.max - self.min) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.min == self.max
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Appends `item`, returning the evicted oldest element if the queue was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            let old = std::mem::take(&mut self.items[Self::index(self.min)]);
            self.min += 1;
            Some(old)
        } else {
            None
        };

        self.items[Self::index(self.max)] = item;
        self.max += 1;
        evicted
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = std::mem::take(&mut self.items[Self::index(self.min)]);
        self.min += 1;
        Some(item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.peek_at(0)
    }

    /// Element `offset` positions after the oldest one.
    pub fn peek_at(&self, offset: usize) -> Option<&T> {
        if offset >= self.len() {
            return None;
        }
        Some(&self.items[Self::index(self.min + offset as u64)])
    }

    pub fn peek_back(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|last| self.peek_at(last))
    }

    /// Oldest-first iteration over the queued elements.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (self.min..self.max).map(move |i| &self.items[Self::index(i)])
    }

    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }

    fn index(position: u64) -> usize {
        (position % N as u64) as usize
    }
}

impl<T: Clone + Default, const N: usize> Default for RingQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Slots addressed directly by tick id (`tick % N`).
///
/// The ring does not remember which tick last wrote a slot; owners track the
/// valid tick window themselves.
#[derive(Debug, Clone)]
pub struct TickRing<T, const N: usize> {
    slots: [T; N],
}

impl<T: Clone + Default, const N: usize> TickRing<T, N> {
    pub fn new() -> Self {
        const {
            assert!(N != 0, "ring capacity must not be zero");
        }

        Self {
            slots: array::from_fn(|_| T::default()),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn slot(&self, tick: u64) -> &T {
        &self.slots[(tick % N as u64) as usize]
    }

    pub fn slot_mut(&mut self, tick: u64) -> &mut T {
        &mut self.slots[(tick % N as u64) as usize]
    }

    /// Resets the slot for `tick` to its default value.
    pub fn reset(&mut self, tick: u64) {
        *self.slot_mut(tick) = T::default();
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = T::default();
        }
    }
}

impl<T: Clone + Default, const N: usize> Default for TickRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
