//! Bounded look-ahead shuffle
//!
//! Holds at most `capacity` elements; each output is drawn uniformly from the
//! buffer and its slot is refilled from the source. With a buffer much smaller
//! than the source this is an *approximate* shuffle: an element can move at
//! most a bounded distance towards the front, so early elements still tend to
//! come out early. That is a statistical property of the scheme, not a bug.

use rand::Rng;

/// Iterator adapter that shuffles through a bounded buffer.
pub struct ShuffleBuffer<I: Iterator, R> {
    source: I,
    buffer: Vec<I::Item>,
    capacity: usize,
    rng: R,
}

impl<I: Iterator, R: Rng> ShuffleBuffer<I, R> {
    /// Wrap `source`, buffering at most `capacity` elements (minimum 1).
    pub fn new(source: I, capacity: usize, rng: R) -> Self {
        let capacity = capacity.max(1);
        Self {
            source,
            buffer: Vec::with_capacity(capacity),
            capacity,
            rng,
        }
    }

    /// Replace the source once the current one is drained, keeping the RNG
    /// stream so the next pass draws a different order.
    pub fn restart(&mut self, source: I) {
        self.source = source;
    }

    /// Buffer capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<I: Iterator, R: Rng> Iterator for ShuffleBuffer<I, R> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.len() < self.capacity {
            match self.source.next() {
                Some(item) => self.buffer.push(item),
                None => break,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(idx))
    }
}
