//! Replay buffer implementation for AlphaZero training
//!
//! A ring buffer that stores training examples for sampling during training.

use rand::Rng;

use crate::{PipelineError, Result};

/// Ring buffer for storing training examples.
///
/// When the buffer reaches capacity, new examples overwrite the oldest ones.
#[derive(Clone, Debug)]
pub struct ReplayBuffer<T> {
    /// Maximum number of examples to store
    capacity: usize,

    /// Storage for training examples
    data: Vec<T>,

    /// Index where the next example will be written once full (the oldest slot)
    write_index: usize,
}

impl<T> ReplayBuffer<T> {
    /// Create a new replay buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: Vec::with_capacity(capacity),
            write_index: 0,
        }
    }

    /// Return the number of examples currently stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Return true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a single example to the buffer.
    ///
    /// When the buffer is full, this overwrites the oldest example.
    pub fn push(&mut self, example: T) {
        if self.capacity == 0 {
            return;
        }
        if self.data.len() < self.capacity {
            self.data.push(example);
        } else {
            self.data[self.write_index] = example;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
    }

    /// Add many examples to the buffer.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, it: I) {
        for example in it {
            self.push(example);
        }
    }

    /// Iterate from the oldest stored example to the newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (newer, older) = self.data.split_at(self.write_index);
        older.iter().chain(newer.iter())
    }

    /// Uniformly sample `batch_size` distinct examples (without replacement).
    ///
    /// Callers gate training on a warm-up threshold; asking for more examples
    /// than are stored is an `InsufficientData` error.
    pub fn sample<'a>(&'a self, rng: &mut impl Rng, batch_size: usize) -> Result<Vec<&'a T>> {
        if batch_size > self.data.len() {
            return Err(PipelineError::InsufficientData {
                requested: batch_size,
                available: self.data.len(),
            });
        }

        Ok(rand::seq::index::sample(rng, self.data.len(), batch_size)
            .into_iter()
            .map(|idx| &self.data[idx])
            .collect())
    }
}
