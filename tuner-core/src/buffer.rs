//! # Sliding Buffer Module
//!
//! Fixed-capacity history of the most recent samples, shared between the
//! audio callback (producer) and the estimation loop (consumer).
//!
//! The buffer always holds exactly `capacity` samples, oldest first. Older
//! samples are overwritten as new ones arrive; nothing is ever queued.
//! Every operation takes the same lock and does at most one bounded copy
//! or shift while holding it.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A copy of the buffer taken under the lock.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The `capacity` most recent samples, oldest first.
    pub samples: Vec<f32>,
    /// Reset generation the samples belong to.
    pub generation: u64,
}

#[derive(Debug)]
struct Inner {
    samples: Vec<f32>,
    generation: u64,
}

/// Thread-safe sliding window of samples.
#[derive(Debug)]
pub struct SlidingBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl SlidingBuffer {
    /// Creates a zero-filled buffer holding `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                samples: vec![0.0; capacity],
                generation: 0,
            }),
            capacity,
        }
    }

    /// Appends `chunk`, evicting the oldest samples.
    ///
    /// A chunk at least as long as the buffer replaces it with the chunk's
    /// last `capacity` samples. An empty chunk is a no-op.
    pub fn push(&self, chunk: &[f32]) {
        let len = chunk.len();
        if len == 0 || self.capacity == 0 {
            return;
        }

        let mut inner = self.lock();
        let samples = &mut inner.samples;
        if len >= self.capacity {
            samples.copy_from_slice(&chunk[len - self.capacity..]);
        } else {
            samples.copy_within(len.., 0);
            let tail = self.capacity - len;
            samples[tail..].copy_from_slice(chunk);
        }
    }

    /// Returns an independent copy of the current contents.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            samples: inner.samples.clone(),
            generation: inner.generation,
        }
    }

    /// Zeroes the contents and starts a new generation.
    ///
    /// Returns the new generation number.
    pub fn reset(&self) -> u64 {
        let mut inner = self.lock();
        inner.samples.fill(0.0);
        inner.generation = inner.generation.wrapping_add(1);
        inner.generation
    }

    // The buffer only holds plain samples, so a panic elsewhere while the
    // lock was held cannot leave it in a broken state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
