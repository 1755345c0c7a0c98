//! Reusable transient sample buffers.
//!
//! The BufferPool keeps released buffers in size classes so that repeated
//! requests for the same length (render blocks, shaping curves) reuse memory
//! instead of allocating. Running out of pooled buffers is never an error;
//! the pool simply allocates.

use std::collections::{HashMap, VecDeque};

use crate::config::DEFAULT_POOL_DEPTH;

/// Snapshot of pool usage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BufferPoolStats {
    /// Buffers currently pooled plus buffers handed out.
    pub total: usize,
    /// Buffers waiting in the pool.
    pub available: usize,
    /// Buffers handed out and not yet released.
    pub in_use: usize,
    /// Acquisitions served from the pool.
    pub hits: u64,
    /// Acquisitions that had to allocate.
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before the first acquisition.
    pub hit_rate: f64,
    /// Memory held by pooled buffers, in bytes.
    pub pooled_bytes: usize,
}

/// A size-keyed pool of zeroed `f32` buffers.
pub struct BufferPool {
    /// Pooled buffers per length, oldest at the front.
    classes: HashMap<usize, VecDeque<Vec<f32>>>,
    /// Maximum buffers kept per size class.
    max_per_size: usize,
    in_use: usize,
    hits: u64,
    misses: u64,
}

impl BufferPool {
    /// Creates an empty pool keeping at most `max_per_size` buffers per length.
    pub fn new(max_per_size: usize) -> Self {
        Self {
            classes: HashMap::new(),
            max_per_size: max_per_size.max(1),
            in_use: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Returns a zeroed buffer of `size` samples.
    pub fn acquire(&mut self, size: usize) -> Vec<f32> {
        self.in_use += 1;
        match self.classes.get_mut(&size).and_then(|class| class.pop_back()) {
            Some(mut buffer) => {
                self.hits += 1;
                buffer.fill(0.0);
                buffer
            }
            None => {
                self.misses += 1;
                vec![0.0; size]
            }
        }
    }

    /// Returns a buffer to its size class.
    ///
    /// When the class is full the oldest pooled buffer is dropped to make
    /// room.
    pub fn release(&mut self, buffer: Vec<f32>) {
        self.in_use = self.in_use.saturating_sub(1);

        let class = self.classes.entry(buffer.len()).or_default();
        if class.len() >= self.max_per_size {
            class.pop_front();
        }
        class.push_back(buffer);
    }

    /// Returns current usage counters.
    pub fn stats(&self) -> BufferPoolStats {
        let available: usize = self.classes.values().map(VecDeque::len).sum();
        let pooled_bytes = self
            .classes
            .iter()
            .map(|(size, class)| size * class.len() * std::mem::size_of::<f32>())
            .sum();
        let lookups = self.hits + self.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        };

        BufferPoolStats {
            total: available + self.in_use,
            available,
            in_use: self.in_use,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            pooled_bytes,
        }
    }

    /// Number of buffers pooled for one size.
    pub fn available(&self, size: usize) -> usize {
        self.classes.get(&size).map_or(0, VecDeque::len)
    }

    /// Returns the per-class cap.
    pub fn max_per_size(&self) -> usize {
        self.max_per_size
    }

    /// Drops every pooled buffer. Counters are kept.
    pub fn clear(&mut self) {
        self.classes.clear();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_buffer_pool_creation() {
        let pool = BufferPool::new(4);
        let stats = pool.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(pool.max_per_size(), 4);
    }

    #[test]
    fn test_miss_then_hit() {
        let mut pool = BufferPool::default();

        let mut buffer = pool.acquire(512);
        assert_eq!(buffer.len(), 512);
        assert_eq!(pool.stats().misses, 1);
        assert_eq!(pool.stats().in_use, 1);

        buffer.fill(0.5);
        pool.release(buffer);
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.available(512), 1);

        let reused = pool.acquire(512);
        assert!(reused.iter().all(|&s| s == 0.0));
        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_relative_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_size_classes_are_separate() {
        let mut pool = BufferPool::default();
        let small = pool.acquire(128);
        pool.release(small);

        let large = pool.acquire(256);
        assert_eq!(large.len(), 256);
        assert_eq!(pool.stats().hits, 0);
        assert_eq!(pool.available(128), 1);
    }

    #[test]
    fn test_full_class_evicts_oldest() {
        let mut pool = BufferPool::new(2);
        let buffers: Vec<_> = (0..3).map(|_| pool.acquire(4)).collect();
        // Acquire zeroes contents, so buffers are told apart by allocation.
        let addresses: Vec<*const f32> = buffers.iter().map(|b| b.as_ptr()).collect();
        for buffer in buffers {
            pool.release(buffer);
        }

        assert_eq!(pool.available(4), 2);
        let stats = pool.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.pooled_bytes, 2 * 4 * 4);

        // Newest comes back first; the first release was dropped.
        let a = pool.acquire(4);
        let b = pool.acquire(4);
        assert_eq!(a.as_ptr(), addresses[2]);
        assert_eq!(b.as_ptr(), addresses[1]);
        assert_eq!(pool.stats().hits, 2);
    }

    #[test]
    fn test_exhaustion_allocates() {
        let mut pool = BufferPool::new(1);
        let a = pool.acquire(64);
        let b = pool.acquire(64);
        assert_eq!(a.len(), b.len());
        assert_eq!(pool.stats().misses, 2);
        assert_eq!(pool.stats().total, 2);
    }

    #[test]
    fn test_clear_pool() {
        let mut pool = BufferPool::default();
        let buffer = pool.acquire(32);
        pool.release(buffer);
        pool.clear();
        assert_eq!(pool.stats().available, 0);
        assert_eq!(pool.stats().pooled_bytes, 0);
        assert_eq!(pool.stats().misses, 1);
    }
}
